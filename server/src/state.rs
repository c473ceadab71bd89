use std::sync::Arc;

use capsnet_model::CapsNet;

use crate::config::Config;

/// État partagé du serveur: le modèle est immuable après chargement, les
/// requêtes concurrentes le lisent sans verrou
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    model: CapsNet,
}

impl AppState {
    pub fn new(config: Config, model: CapsNet) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, model }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn model(&self) -> &CapsNet {
        &self.inner.model
    }
}
