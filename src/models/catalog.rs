use super::ModelRef;

/// Resolver for the model used when `start` is not given an explicit list.
///
/// The provider/model catalog itself lives outside this crate; callers hand
/// the orchestrator whatever implementation fits their environment.
pub trait ModelCatalog: Send + Sync {
    /// The model to benchmark with when the parent session has none recorded
    fn default_model(&self) -> Option<ModelRef>;
}

/// Catalog backed by the `default_model` entry in `benchd.toml`
pub struct ConfigCatalog {
    default: Option<ModelRef>,
}

impl ConfigCatalog {
    pub fn new(default: Option<ModelRef>) -> Self {
        Self { default }
    }
}

impl ModelCatalog for ConfigCatalog {
    fn default_model(&self) -> Option<ModelRef> {
        self.default.clone()
    }
}
