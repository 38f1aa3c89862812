use crate::config::toml_config::ReconConfig;
use crate::core::environment::{self, FrameworkInstall, SensorRegistration};
use crate::core::workflow::{WorkflowContext, WorkflowStage};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SetupStage {
    config: Arc<ReconConfig>,
    dry_run: bool,
}

impl SetupStage {
    pub fn new(config: Arc<ReconConfig>) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    /// dry-run 只偵測安裝，不修改感測器資料庫也不寫 vars.sh
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

fn registration_label(registration: SensorRegistration) -> &'static str {
    match registration {
        SensorRegistration::AlreadyPresent => "already_present",
        SensorRegistration::Registered => "registered",
        SensorRegistration::PermissionDenied => "permission_denied",
    }
}

#[async_trait::async_trait]
impl WorkflowStage for SetupStage {
    fn name(&self) -> &str {
        "setup"
    }

    async fn execute(
        &self,
        context: &mut WorkflowContext,
    ) -> Result<HashMap<String, serde_json::Value>> {
        let mut metadata = HashMap::new();

        let install = if self.dry_run {
            FrameworkInstall::detect(&self.config.framework.root)?
        } else {
            let report = environment::setup(&self.config.framework, &self.config.camera)?;
            metadata.insert(
                "sensor_registration".to_string(),
                serde_json::Value::String(registration_label(report.registration).to_string()),
            );
            metadata.insert(
                "env_script".to_string(),
                serde_json::Value::String(report.env_script.display().to_string()),
            );
            report.install
        };

        metadata.insert(
            "bin_dir".to_string(),
            serde_json::Value::String(install.bin_dir.display().to_string()),
        );
        metadata.insert(
            "sensor_db".to_string(),
            serde_json::Value::String(install.sensor_db.display().to_string()),
        );

        context.framework_env = Some(install.env().with_overrides(&self.config.framework));
        Ok(metadata)
    }
}
