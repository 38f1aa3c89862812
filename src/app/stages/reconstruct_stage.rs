use crate::config::toml_config::ReconConfig;
use crate::core::environment::FrameworkEnv;
use crate::core::reconstruct::Reconstructor;
use crate::core::workflow::{WorkflowContext, WorkflowStage};
use crate::domain::ports::ProcessRunner;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct ReconstructStage {
    config: Arc<ReconConfig>,
    runner: Arc<dyn ProcessRunner>,
    dry_run: bool,
}

impl ReconstructStage {
    pub fn new(config: Arc<ReconConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            runner,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// setup 階段的結果優先，否則讀取環境變數
    fn framework_env(&self, context: &WorkflowContext) -> Result<FrameworkEnv> {
        match &context.framework_env {
            Some(env) => Ok(env.clone().with_overrides(&self.config.framework)),
            None => FrameworkEnv::resolve(&self.config.framework),
        }
    }

    /// 前處理階段寫入的目錄優先
    fn input_dir(&self, context: &WorkflowContext) -> PathBuf {
        context
            .get_shared_data("sanitized_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.project.sanitized_dir.clone())
    }
}

#[async_trait::async_trait]
impl WorkflowStage for ReconstructStage {
    fn name(&self) -> &str {
        "reconstruct"
    }

    async fn execute(
        &self,
        context: &mut WorkflowContext,
    ) -> Result<HashMap<String, serde_json::Value>> {
        let env = self.framework_env(context)?;
        let input_dir = self.input_dir(context);
        let output_root = self.config.project.recon_dir.clone();

        let reconstructor =
            Reconstructor::new(self.runner.clone(), env, self.config.reconstruction.clone());

        let mut metadata = HashMap::new();

        if self.dry_run {
            let commands = reconstructor.dry_run(&input_dir, &output_root);
            for command in &commands {
                println!("{}", command);
            }
            metadata.insert(
                "commands".to_string(),
                serde_json::Value::Array(
                    commands.into_iter().map(serde_json::Value::String).collect(),
                ),
            );
            return Ok(metadata);
        }

        let report = reconstructor.run(&input_dir, &output_root).await?;

        metadata.insert(
            "textured_mesh".to_string(),
            serde_json::Value::String(report.textured_mesh.display().to_string()),
        );
        metadata.insert(
            "nodes".to_string(),
            serde_json::Value::Number(report.nodes.len().into()),
        );
        Ok(metadata)
    }
}
