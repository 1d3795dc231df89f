//! State shared by every API handler.

use std::{path::PathBuf, sync::Arc};

use detector::Detector;
use rate_limit::QuotaEnforcer;
use storage::{ImageKind, PredictionStore};

use crate::cache::PredictionCache;

/// Shared state of the HTTP handlers, built once in [`serve`](crate::serve).
#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<dyn PredictionStore>,
    pub quota: Arc<QuotaEnforcer>,
    pub detector: Arc<dyn Detector>,
    pub cache: PredictionCache,
    pub upload_root: Arc<PathBuf>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Directory holding images of the given kind.
    pub fn image_dir(&self, kind: ImageKind) -> PathBuf {
        self.upload_root.join(kind.as_str())
    }
}
