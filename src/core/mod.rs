pub mod environment;
pub mod imaging;
pub mod metadata;
pub mod model_store;
pub mod nodes;
pub mod preprocess;
pub mod reconstruct;
pub mod segmentation;
pub mod workflow;

pub use crate::domain::model::{PreprocessReport, ReconstructionReport, SanitizedImage};
pub use crate::domain::ports::{ProcessRunner, Segmenter};
pub use crate::utils::error::Result;
