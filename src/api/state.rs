use std::sync::Arc;

use crate::application::VerifierService;
use crate::infrastructure::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<VerifierService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(verifier: Arc<VerifierService>, config: AppConfig) -> Self {
        Self {
            verifier,
            config: Arc::new(config),
        }
    }
}
