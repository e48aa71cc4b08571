//! Application state management

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::organizer::Organizer;
use crate::preview::PreviewStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    organizer: Organizer,
    /// Thumbnail size chosen by the user, always within the configured bounds
    preview_size: RwLock<u32>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let previews = PreviewStore::with_max_handles(config.intake.max_preview_handles);
        let organizer = Organizer::new(previews, config.intake_options());
        let preview_size = config.preview.clamp(config.preview.default_size);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                organizer,
                preview_size: RwLock::new(preview_size),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the organizer service
    pub fn organizer(&self) -> &Organizer {
        &self.inner.organizer
    }

    pub async fn preview_size(&self) -> u32 {
        *self.inner.preview_size.read().await
    }

    /// Store a new thumbnail size, clamped to the bounds. Returns the stored value.
    pub async fn set_preview_size(&self, size: u32) -> u32 {
        let size = self.inner.config.preview.clamp(size);
        *self.inner.preview_size.write().await = size;
        size
    }
}
