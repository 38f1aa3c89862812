//! 以 exiftool 將原始照片的 EXIF 複製到處理後的影像

use crate::adapters::process::find_program;
use crate::config::toml_config::MetadataConfig;
use crate::domain::model::{MetadataReport, ProcessInvocation, SanitizedImage};
use crate::domain::ports::ProcessRunner;
use std::path::PathBuf;
use std::sync::Arc;

pub struct MetadataTransfer {
    runner: Arc<dyn ProcessRunner>,
    config: MetadataConfig,
}

impl MetadataTransfer {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: MetadataConfig) -> Self {
        Self { runner, config }
    }

    pub fn locate_exiftool(&self) -> Option<PathBuf> {
        find_program(&self.config.exiftool)
    }

    /// 單張影像的 exiftool 命令
    pub fn invocation(&self, exiftool: PathBuf, image: &SanitizedImage) -> ProcessInvocation {
        let mut invocation = ProcessInvocation::new(image.original_stem(), exiftool)
            .arg("-overwrite_original")
            .arg("-TagsFromFile")
            .arg(image.source.to_string_lossy().into_owned())
            .arg("-all:all");

        if self.config.normalize_orientation {
            // 數值模式寫入 Orientation=1，避免框架旋轉影像
            invocation = invocation.arg("-n").arg("-Orientation=1");
        }

        invocation
            .arg(image.output.to_string_lossy().into_owned())
            .quiet()
    }

    /// 個別失敗只計數，不中斷
    pub async fn transfer_all(&self, images: &[SanitizedImage]) -> MetadataReport {
        tracing::info!("🏷️ Transferring and normalizing EXIF metadata...");

        let mut report = MetadataReport {
            total: images.len(),
            ..MetadataReport::default()
        };

        let Some(exiftool) = self.locate_exiftool() else {
            tracing::error!(
                "❌ '{}' not found. Skipping metadata; the framework may fail to detect the sensor.",
                self.config.exiftool
            );
            report.skipped = true;
            return report;
        };

        for image in images {
            let invocation = self.invocation(exiftool.clone(), image);
            match self.runner.run(&invocation).await {
                Ok(outcome) if outcome.success => report.transferred += 1,
                Ok(outcome) => {
                    tracing::debug!(
                        "exiftool exited with {:?} for {}",
                        outcome.code,
                        image.output.display()
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!("⚠️ exiftool failed for {}: {}", image.output.display(), e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "✅ Metadata processed in {}/{} files",
            report.transferred,
            report.total
        );
        report
    }
}
