use std::sync::Arc;

use relay_core::config::RelayConfig;
use relay_core::{IncidentPipeline, TokenCache};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IncidentPipeline>,
}

impl AppState {
    pub fn new(pipeline: IncidentPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Build the pipeline with a fresh process-wide token cache.
    pub fn from_config(config: &RelayConfig) -> relay_core::Result<Self> {
        let cache = Arc::new(TokenCache::new());
        Ok(Self::new(IncidentPipeline::from_config(config, cache)?))
    }
}
