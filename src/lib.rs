pub mod api;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod presenter;
pub mod protocol;

use std::sync::Arc;

use classifier::HttpClassifier;
use config::Config;
use coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings};

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: CoordinatorHandle,
}

impl AppState {
    /// Builds the classifier client and starts the session's coordinator.
    /// Must run inside a tokio runtime.
    pub fn new(config: Config) -> error::Result<Self> {
        let classifier = HttpClassifier::new(config.classifier_url.clone())?;
        let coordinator = Coordinator::spawn(Arc::new(classifier), CoordinatorSettings::from(&config));

        Ok(Self {
            config: Arc::new(config),
            coordinator,
        })
    }
}
