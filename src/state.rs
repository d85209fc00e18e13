// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    engine::{Services, clock::Clock},
    store::{QuestionCatalog, Store},
};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let services = Services::new(store, catalog, clock, config.default_timeout_minutes);
        AppState { services, config }
    }
}

impl FromRef<AppState> for Services {
    fn from_ref(state: &AppState) -> Self {
        state.services.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
