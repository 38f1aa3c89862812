//! 工作流程：依序執行各階段，透過上下文共享結果

use crate::core::environment::FrameworkEnv;
use crate::utils::error::{ReconError, Result};
use crate::utils::monitor::SystemMonitor;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 階段執行結果
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage_name: String,
    pub duration: Duration,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// 階段之間傳遞的上下文
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub execution_id: String,
    pub previous_results: Vec<StageResult>,
    pub shared_data: HashMap<String, serde_json::Value>,
    /// setup 階段偵測到的框架路徑，讓後續階段不必依賴 vars.sh
    pub framework_env: Option<FrameworkEnv>,
}

impl WorkflowContext {
    pub fn new(execution_id: String) -> Self {
        Self {
            execution_id,
            previous_results: Vec::new(),
            shared_data: HashMap::new(),
            framework_env: None,
        }
    }

    pub fn add_shared_data(&mut self, key: String, value: serde_json::Value) {
        self.shared_data.insert(key, value);
    }

    pub fn get_shared_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.shared_data.get(key)
    }

    pub fn add_result(&mut self, result: StageResult) {
        self.previous_results.push(result);
    }
}

#[async_trait::async_trait]
pub trait WorkflowStage: Send + Sync {
    fn name(&self) -> &str;

    /// 根據上下文決定是否執行
    fn should_execute(&self, _context: &WorkflowContext) -> bool {
        true
    }

    /// 回傳寫入執行摘要的 metadata
    async fn execute(
        &self,
        context: &mut WorkflowContext,
    ) -> Result<HashMap<String, serde_json::Value>>;
}

pub struct StageSequence {
    stages: Vec<Box<dyn WorkflowStage>>,
    monitor: Option<SystemMonitor>,
    execution_id: String,
}

impl StageSequence {
    pub fn new(execution_id: String) -> Self {
        Self {
            stages: Vec::new(),
            monitor: None,
            execution_id,
        }
    }

    /// 以時間戳記產生執行 ID
    pub fn with_timestamp_id(prefix: &str) -> Self {
        Self::new(format!(
            "{}_{}",
            prefix,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    pub fn add_stage(&mut self, stage: Box<dyn WorkflowStage>) {
        self.stages.push(stage);
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub async fn execute_all(&self) -> Result<Vec<StageResult>> {
        let mut context = WorkflowContext::new(self.execution_id.clone());
        self.execute_with_context(&mut context).await
    }

    /// 依序執行；第一個錯誤即停止
    pub async fn execute_with_context(
        &self,
        context: &mut WorkflowContext,
    ) -> Result<Vec<StageResult>> {
        let mut results = Vec::new();

        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Workflow started.");
        }

        for stage in &self.stages {
            if !stage.should_execute(context) {
                tracing::info!("⏭️ Skipping stage: {} (condition not met)", stage.name());
                continue;
            }

            tracing::info!("▶️ Stage: {}", stage.name());
            let start_time = Instant::now();

            let metadata = match stage.execute(context).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::error!("❌ Stage {} failed: {}", stage.name(), e);
                    return Err(ReconError::StageError {
                        stage: stage.name().to_string(),
                        source: Box::new(e),
                    });
                }
            };

            let result = StageResult {
                stage_name: stage.name().to_string(),
                duration: start_time.elapsed(),
                metadata,
            };
            tracing::info!(
                "✅ Stage completed: {} (duration: {:?})",
                result.stage_name,
                result.duration
            );

            if let Some(monitor) = &self.monitor {
                monitor.log_stats(&format!("After {}", result.stage_name));
            }

            context.add_result(result.clone());
            results.push(result);
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }

        Ok(results)
    }

    pub fn get_execution_summary(results: &[StageResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        summary.insert(
            "total_stages".to_string(),
            serde_json::Value::Number(results.len().into()),
        );
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::Number((total_duration.as_millis() as u64).into()),
        );

        let stage_names: Vec<serde_json::Value> = results
            .iter()
            .map(|r| serde_json::Value::String(r.stage_name.clone()))
            .collect();
        summary.insert(
            "executed_stages".to_string(),
            serde_json::Value::Array(stage_names),
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct MockStage {
        name: String,
        should_execute: bool,
        fail: bool,
        publish_env: bool,
    }

    impl MockStage {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                should_execute: true,
                fail: false,
                publish_env: false,
            }
        }

        fn skipped(mut self) -> Self {
            self.should_execute = false;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn publishing_env(mut self) -> Self {
            self.publish_env = true;
            self
        }
    }

    #[async_trait::async_trait]
    impl WorkflowStage for MockStage {
        fn name(&self) -> &str {
            &self.name
        }

        fn should_execute(&self, _context: &WorkflowContext) -> bool {
            self.should_execute
        }

        async fn execute(
            &self,
            context: &mut WorkflowContext,
        ) -> Result<HashMap<String, serde_json::Value>> {
            if self.fail {
                return Err(ReconError::NoInputImages {
                    path: "data/raw".to_string(),
                });
            }
            if self.publish_env {
                context.framework_env = Some(FrameworkEnv {
                    bin_dir: PathBuf::from("/av/bin"),
                    sensor_db: PathBuf::from("/av/db"),
                    root: None,
                    lib_dir: None,
                });
            }

            let mut metadata = HashMap::new();
            metadata.insert(
                "saw_env".to_string(),
                serde_json::Value::Bool(context.framework_env.is_some()),
            );
            Ok(metadata)
        }
    }

    #[tokio::test]
    async fn test_stages_share_context() {
        let mut sequence = StageSequence::new("test".to_string());
        sequence.add_stage(Box::new(MockStage::new("setup").publishing_env()));
        sequence.add_stage(Box::new(MockStage::new("reconstruct")));

        let results = sequence.execute_all().await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[1].metadata.get("saw_env"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_conditional_stage_is_skipped() {
        let mut sequence = StageSequence::new("test".to_string());
        sequence.add_stage(Box::new(MockStage::new("setup")));
        sequence.add_stage(Box::new(MockStage::new("preprocess").skipped()));
        sequence.add_stage(Box::new(MockStage::new("reconstruct")));

        let results = sequence.execute_all().await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.stage_name.as_str()).collect();
        assert_eq!(names, vec!["setup", "reconstruct"]);
    }

    #[tokio::test]
    async fn test_failure_stops_sequence() {
        let mut sequence = StageSequence::new("test".to_string());
        sequence.add_stage(Box::new(MockStage::new("preprocess").failing()));
        sequence.add_stage(Box::new(MockStage::new("reconstruct")));

        let mut context = WorkflowContext::new("test".to_string());
        let err = sequence
            .execute_with_context(&mut context)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconError::StageError { ref stage, .. } if stage == "preprocess"));
        assert_eq!(err.exit_code(), 1);
        assert!(context.previous_results.is_empty());
    }

    #[test]
    fn test_execution_summary() {
        let results = vec![
            StageResult {
                stage_name: "setup".to_string(),
                duration: Duration::from_millis(100),
                metadata: HashMap::new(),
            },
            StageResult {
                stage_name: "preprocess".to_string(),
                duration: Duration::from_millis(250),
                metadata: HashMap::new(),
            },
        ];

        let summary = StageSequence::get_execution_summary(&results);

        assert_eq!(summary.get("total_stages").unwrap(), &serde_json::Value::Number(2.into()));
        assert_eq!(
            summary.get("total_duration_ms").unwrap(),
            &serde_json::Value::Number(350.into())
        );
        let executed = summary.get("executed_stages").unwrap().as_array().unwrap();
        assert_eq!(executed[1], serde_json::Value::String("preprocess".to_string()));
    }

    #[test]
    fn test_context_shared_data() {
        let mut context = WorkflowContext::new("test".to_string());
        context.add_shared_data("images".to_string(), serde_json::json!(12));

        assert_eq!(context.get_shared_data("images"), Some(&serde_json::json!(12)));
        assert!(context.get_shared_data("missing").is_none());
    }
}
