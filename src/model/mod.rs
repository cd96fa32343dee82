pub mod config;
#[cfg(feature = "ml")]
pub mod model_metadata;
#[cfg(feature = "ml")]
pub mod model_storage;
#[cfg(feature = "ml")]
pub mod tfjs_export;

pub use config::{AppConfig, DeviceType, PathSettings, SampleSettings, TrainingSettings};
#[cfg(feature = "ml")]
pub use model_metadata::ModelMetadata;
#[cfg(feature = "ml")]
pub use model_storage::{load_metadata, load_model_binary, load_model_with_metadata, print_metadata_info, save_model_with_metadata};
#[cfg(feature = "ml")]
pub use tfjs_export::{export_tfjs, TfjsExport, MODEL_JSON_FILE, WEIGHTS_SHARD_FILE};
