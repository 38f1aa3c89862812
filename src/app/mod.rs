// Application layer: workflow stages wired to the core services.

pub mod stages;

pub use stages::{build_workflow, PreprocessStage, ReconstructStage, SetupStage};
