pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::TokioProcessRunner;
pub use config::{ReconConfig, SegmentationBackend};
pub use core::environment::{FrameworkEnv, FrameworkInstall};
pub use core::preprocess::Preprocessor;
pub use core::reconstruct::Reconstructor;
pub use core::workflow::StageSequence;
pub use utils::error::{ReconError, Result};
