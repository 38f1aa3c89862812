pub mod preprocess_stage;
pub mod reconstruct_stage;
pub mod setup_stage;

pub use preprocess_stage::PreprocessStage;
pub use reconstruct_stage::ReconstructStage;
pub use setup_stage::SetupStage;

use crate::config::toml_config::ReconConfig;
use crate::core::workflow::StageSequence;
use crate::domain::ports::ProcessRunner;
use std::sync::Arc;

/// `run` 指令的完整流程：setup → preprocess → reconstruct
pub fn build_workflow(
    config: Arc<ReconConfig>,
    runner: Arc<dyn ProcessRunner>,
    dry_run: bool,
) -> StageSequence {
    let mut sequence =
        StageSequence::with_timestamp_id("recon").with_monitoring(config.monitoring_enabled());

    sequence.add_stage(Box::new(
        SetupStage::new(config.clone()).with_dry_run(dry_run),
    ));
    sequence.add_stage(Box::new(
        PreprocessStage::new(config.clone(), runner.clone()).with_dry_run(dry_run),
    ));
    sequence.add_stage(Box::new(
        ReconstructStage::new(config, runner).with_dry_run(dry_run),
    ));
    sequence
}
