//! PDF Organizer Server Library
//!
//! Core of the PDF organizer: file intake, duplicate detection, the working
//! collection, and PDF page rewriting. The HTTP binary is in main.rs.
//!
//! # Modules
//!
//! - `intake`: validation, hashing, duplicate checks, managed file construction
//! - `preview`: revocable handles to uploaded bytes
//! - `collection`: the ordered list of accepted files and its metadata views
//! - `pdf`: rotation, extraction and merging via lopdf
//! - `organizer`: async service tying the above together
//! - `routes`: axum handlers

pub mod collection;
pub mod config;
pub mod error;
pub mod intake;
pub mod organizer;
pub mod pdf;
pub mod preview;
pub mod routes;
pub mod state;
