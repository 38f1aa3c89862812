use crate::config::toml_config::ReconConfig;
use crate::core::preprocess::{self, build_segmenter};
use crate::core::workflow::{WorkflowContext, WorkflowStage};
use crate::domain::ports::{ProcessRunner, Segmenter};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

pub struct PreprocessStage {
    config: Arc<ReconConfig>,
    runner: Arc<dyn ProcessRunner>,
    segmenter: Option<Arc<dyn Segmenter>>,
    dry_run: bool,
}

impl PreprocessStage {
    pub fn new(config: Arc<ReconConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            runner,
            segmenter: None,
            dry_run: false,
        }
    }

    /// 指定分割器；未指定時依配置建立
    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[async_trait::async_trait]
impl WorkflowStage for PreprocessStage {
    fn name(&self) -> &str {
        "preprocess"
    }

    fn should_execute(&self, _context: &WorkflowContext) -> bool {
        !self.dry_run
    }

    async fn execute(
        &self,
        context: &mut WorkflowContext,
    ) -> Result<HashMap<String, serde_json::Value>> {
        let segmenter = match &self.segmenter {
            Some(segmenter) => segmenter.clone(),
            None => build_segmenter(&self.config).await?,
        };

        let report = preprocess::preprocess(&self.config, segmenter, self.runner.clone()).await?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "images".to_string(),
            serde_json::Value::Number(report.images.len().into()),
        );
        metadata.insert(
            "skipped".to_string(),
            serde_json::Value::Number(report.skipped.len().into()),
        );
        if let Some(exif) = &report.metadata {
            metadata.insert("metadata".to_string(), serde_json::to_value(exif)?);
        }

        context.add_shared_data(
            "sanitized_dir".to_string(),
            serde_json::Value::String(report.output_dir.display().to_string()),
        );
        Ok(metadata)
    }
}
