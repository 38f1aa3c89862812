use crate::config::toml_config::{ReconConfig, SegmentationBackend};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "photo-recon")]
#[command(about = "Background removal and AliceVision photogrammetry orchestration")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "recon.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log CPU and memory usage per stage
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate the AliceVision install, register the camera sensor and write vars.sh
    Setup(SetupArgs),
    /// Segment raw photographs and write sanitized JPEGs with restored EXIF
    Preprocess(PreprocessArgs),
    /// Run the AliceVision node graph over the sanitized images
    Reconstruct(ReconstructArgs),
    /// Setup, preprocess and reconstruct in one go
    Run(RunArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct SetupArgs {
    /// AliceVision installation root
    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PreprocessArgs {
    /// Directory with the raw photographs
    #[arg(long)]
    pub raw_dir: Option<PathBuf>,

    /// Directory for the sanitized images
    #[arg(long)]
    pub sanitized_dir: Option<PathBuf>,

    /// Segmentation backend
    #[arg(long, value_enum)]
    pub backend: Option<SegmentationBackend>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ReconstructArgs {
    /// Directory with the sanitized images
    #[arg(long)]
    pub sanitized_dir: Option<PathBuf>,

    /// Reconstruction output directory
    #[arg(long)]
    pub recon_dir: Option<PathBuf>,

    /// Print the node commands without executing them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub setup: SetupArgs,

    #[command(flatten)]
    pub preprocess: PreprocessArgs,

    /// Reconstruction output directory
    #[arg(long)]
    pub recon_dir: Option<PathBuf>,

    /// Print the node commands without executing them
    #[arg(long)]
    pub dry_run: bool,
}

impl SetupArgs {
    pub fn apply(&self, config: &mut ReconConfig) {
        if let Some(root) = &self.root {
            config.framework.root = root.clone();
        }
    }
}

impl PreprocessArgs {
    pub fn apply(&self, config: &mut ReconConfig) {
        if let Some(raw_dir) = &self.raw_dir {
            config.project.raw_dir = raw_dir.clone();
        }
        if let Some(sanitized_dir) = &self.sanitized_dir {
            config.project.sanitized_dir = sanitized_dir.clone();
        }
        if let Some(backend) = self.backend {
            config.segmentation.backend = backend;
        }
    }
}

impl ReconstructArgs {
    pub fn apply(&self, config: &mut ReconConfig) {
        if let Some(sanitized_dir) = &self.sanitized_dir {
            config.project.sanitized_dir = sanitized_dir.clone();
        }
        if let Some(recon_dir) = &self.recon_dir {
            config.project.recon_dir = recon_dir.clone();
        }
    }
}

impl RunArgs {
    pub fn apply(&self, config: &mut ReconConfig) {
        self.setup.apply(config);
        self.preprocess.apply(config);
        if let Some(recon_dir) = &self.recon_dir {
            config.project.recon_dir = recon_dir.clone();
        }
    }
}

impl CliConfig {
    /// 將命令列覆蓋套用到 TOML 配置
    pub fn apply_overrides(&self, config: &mut ReconConfig) {
        match &self.command {
            Command::Setup(args) => args.apply(config),
            Command::Preprocess(args) => args.apply(config),
            Command::Reconstruct(args) => args.apply(config),
            Command::Run(args) => args.apply(config),
        }

        if self.monitor {
            config.monitoring.get_or_insert_with(Default::default).enabled = true;
        }
    }
}
