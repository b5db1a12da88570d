pub mod catalog;
pub mod model_ref;

pub use catalog::{ConfigCatalog, ModelCatalog};
pub use model_ref::{ModelRef, ParseModelError};
