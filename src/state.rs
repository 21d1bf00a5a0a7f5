// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Config;
use crate::services::ContentService;
use crate::store::ContentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ContentStore>,
    pub content: ContentService,
    pub config: Config,
}

impl AppState {
    pub fn new(content: ContentService, config: Config) -> Self {
        Self {
            store: content.store().clone(),
            content,
            config,
        }
    }
}

impl FromRef<AppState> for Arc<dyn ContentStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for ContentService {
    fn from_ref(state: &AppState) -> Self {
        state.content.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
