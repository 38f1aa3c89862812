//! 依序執行 AliceVision 節點，任何一步失敗即停止

use crate::config::toml_config::ReconstructionConfig;
use crate::core::environment::FrameworkEnv;
use crate::core::nodes::ReconstructionPlan;
use crate::domain::model::{NodeRun, ReconstructionReport};
use crate::domain::ports::ProcessRunner;
use crate::utils::error::{ReconError, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// 計算輸入目錄中的 .jpg 數量（前處理只輸出此副檔名）
pub fn count_input_images(input_dir: &Path) -> Result<usize> {
    if !input_dir.is_dir() {
        return Err(ReconError::MissingInput {
            path: input_dir.display().to_string(),
        });
    }

    let count = fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".jpg"))
        .count();
    Ok(count)
}

pub struct Reconstructor {
    runner: Arc<dyn ProcessRunner>,
    env: FrameworkEnv,
    config: ReconstructionConfig,
}

impl Reconstructor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        env: FrameworkEnv,
        config: ReconstructionConfig,
    ) -> Self {
        Self {
            runner,
            env,
            config,
        }
    }

    pub fn plan(&self, input_dir: &Path, output_root: &Path) -> ReconstructionPlan {
        ReconstructionPlan::build(&self.env, input_dir, output_root, &self.config)
    }

    pub fn validate_input(&self, input_dir: &Path) -> Result<usize> {
        let found = count_input_images(input_dir)?;
        if found < self.config.min_images {
            tracing::error!(
                "❌ Insufficient images: found {}, need at least {}",
                found,
                self.config.min_images
            );
            return Err(ReconError::InsufficientImages {
                path: input_dir.display().to_string(),
                found,
                required: self.config.min_images,
            });
        }
        Ok(found)
    }

    /// 清空輸出目錄後依序執行全部節點
    pub async fn run(&self, input_dir: &Path, output_root: &Path) -> Result<ReconstructionReport> {
        let found = self.validate_input(input_dir)?;
        tracing::info!("📸 {} images ready for reconstruction", found);

        if output_root.exists() {
            fs::remove_dir_all(output_root)?;
        }
        let plan = self.plan(input_dir, output_root);
        for dir in plan.layout.working_dirs() {
            fs::create_dir_all(dir)?;
        }

        let total = plan.nodes.len();
        let mut nodes = Vec::with_capacity(total);

        for (i, node) in plan.nodes.iter().enumerate() {
            tracing::info!("⚙️ [{}/{}] {}", i + 1, total, node.label);
            let started = Instant::now();

            let failed = || ReconError::NodeFailed {
                step: node.label.clone(),
                command: node.command_line(),
            };

            match self.runner.run(node).await {
                Ok(outcome) if outcome.success => {}
                Ok(outcome) => {
                    tracing::error!(
                        "❌ {} exited with code {:?}",
                        node.label,
                        outcome.code
                    );
                    return Err(failed());
                }
                Err(e) => {
                    tracing::error!("❌ {} could not be started: {}", node.label, e);
                    return Err(failed());
                }
            }

            let duration = started.elapsed();
            tracing::debug!("{} finished in {:.1}s", node.label, duration.as_secs_f64());
            nodes.push(NodeRun {
                step: node.label.clone(),
                duration,
            });
        }

        let textured_mesh = plan.layout.textured_mesh();
        tracing::info!("✅ Reconstruction complete: {}", textured_mesh.display());

        Ok(ReconstructionReport {
            output_root: output_root.to_path_buf(),
            textured_mesh,
            nodes,
        })
    }

    /// 只列出將執行的命令
    pub fn dry_run(&self, input_dir: &Path, output_root: &Path) -> Vec<String> {
        self.plan(input_dir, output_root)
            .nodes
            .iter()
            .map(|node| node.command_line())
            .collect()
    }
}
