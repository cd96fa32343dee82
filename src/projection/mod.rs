pub mod coords;
pub mod features;
pub mod tsne;

pub use coords::{compute_coordinates, write_coordinates};
pub use features::{load_feature_matrix, load_feature_vector, FEATURE_IMAGE_SIZE};
pub use tsne::{Tsne, TsneConfig, TsneResult};
