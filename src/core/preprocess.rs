//! 影像前處理：分割 → 溢色抑制 → 黑底合成 → 依序命名的 JPEG

use crate::config::toml_config::{ReconConfig, SegmentationBackend};
use crate::core::imaging;
use crate::core::metadata::MetadataTransfer;
use crate::core::model_store;
use crate::core::segmentation::{ChromaKeySegmenter, U2NetSegmenter};
use crate::domain::model::{PreprocessReport, SanitizedImage};
use crate::domain::ports::{ProcessRunner, Segmenter};
use crate::utils::error::{ReconError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub extensions: Vec<String>,
    pub despill_factor: Option<f32>,
    pub clahe: Option<(f32, u32)>,
    pub start_index: u32,
    pub jpeg_quality: u8,
    pub intermediate_dir: Option<PathBuf>,
    pub threads: Option<usize>,
    pub show_progress: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self::from_config(&ReconConfig::default())
    }
}

impl PreprocessOptions {
    pub fn from_config(config: &ReconConfig) -> Self {
        let pre = &config.preprocess;
        Self {
            extensions: pre.extensions.clone(),
            despill_factor: pre.despill.then_some(pre.despill_factor),
            clahe: pre
                .clahe_enabled(config.segmentation.backend)
                .then_some((pre.clahe_clip_limit, pre.clahe_grid)),
            start_index: pre.start_index,
            jpeg_quality: pre.jpeg_quality,
            intermediate_dir: config.project.intermediate_dir.clone(),
            threads: pre.threads,
            show_progress: true,
        }
    }
}

/// 列出目錄中（不遞迴）符合副檔名的影像，依路徑排序
pub fn discover_images(raw_dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !raw_dir.is_dir() {
        return Err(ReconError::MissingInput {
            path: raw_dir.display().to_string(),
        });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(raw_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, quality).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(())
}

pub struct Preprocessor {
    segmenter: Arc<dyn Segmenter>,
    options: PreprocessOptions,
}

impl Preprocessor {
    pub fn new(segmenter: Arc<dyn Segmenter>, options: PreprocessOptions) -> Self {
        Self { segmenter, options }
    }

    pub fn output_name(&self, position: usize) -> String {
        format!("{}.jpg", self.options.start_index as usize + position)
    }

    /// 加上序號，避免同名不同副檔名的來源互相覆寫
    pub fn cutout_name(&self, position: usize, source: &Path) -> String {
        let index = self.options.start_index as usize + position;
        match source.file_stem() {
            Some(stem) => format!("{}_{}.png", index, stem.to_string_lossy()),
            None => format!("{}.png", index),
        }
    }

    /// 處理單張影像並寫入輸出目錄
    pub fn process_one(
        &self,
        position: usize,
        source: &Path,
        output_dir: &Path,
    ) -> Result<SanitizedImage> {
        let mut rgb = image::open(source)?.into_rgb8();
        let alpha = self.segmenter.segment(&rgb)?;

        if alpha.dimensions() != rgb.dimensions() {
            return Err(ReconError::SegmentationError {
                message: format!(
                    "mask size {:?} does not match image size {:?}",
                    alpha.dimensions(),
                    rgb.dimensions()
                ),
            });
        }

        if let Some(factor) = self.options.despill_factor {
            imaging::reduce_green_spill(&mut rgb, &alpha, factor);
        }
        if let Some((clip_limit, grid)) = self.options.clahe {
            rgb = imaging::clahe_luminance(&rgb, clip_limit, grid);
        }

        if let Some(dir) = &self.options.intermediate_dir {
            imaging::rgba_cutout(&rgb, &alpha).save(dir.join(self.cutout_name(position, source)))?;
        }

        let composite = imaging::composite_on_black(&rgb, &alpha);
        let output = output_dir.join(self.output_name(position));
        save_jpeg(&composite, &output, self.options.jpeg_quality)?;

        Ok(SanitizedImage {
            index: self.options.start_index + position as u32,
            source: source.to_path_buf(),
            output,
        })
    }

    /// 以 rayon 平行處理；輸出名稱只取決於排序後的位置
    pub fn run(&self, raw_dir: &Path, output_dir: &Path) -> Result<PreprocessReport> {
        let files = discover_images(raw_dir, &self.options.extensions)?;
        if files.is_empty() {
            tracing::error!("❌ No images found in {}", raw_dir.display());
            return Err(ReconError::NoInputImages {
                path: raw_dir.display().to_string(),
            });
        }

        reset_dir(output_dir)?;
        if let Some(dir) = &self.options.intermediate_dir {
            reset_dir(dir)?;
        }

        tracing::info!(
            "🧠 Segmenting {} images with the {} backend...",
            files.len(),
            self.segmenter.name()
        );

        let progress = if self.options.show_progress {
            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let process_all = || -> Vec<(usize, Result<SanitizedImage>)> {
            files
                .par_iter()
                .enumerate()
                .progress_with(progress.clone())
                .map(|(position, path)| (position, self.process_one(position, path, output_dir)))
                .collect()
        };

        let results = match self.options.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| ReconError::InvalidConfigValueError {
                    field: "preprocess.threads".to_string(),
                    value: threads.to_string(),
                    reason: e.to_string(),
                })?
                .install(process_all),
            None => process_all(),
        };
        progress.finish();

        let mut images = Vec::new();
        let mut skipped = Vec::new();
        for (position, result) in results {
            match result {
                Ok(image) => images.push(image),
                Err(e) => {
                    let path = &files[position];
                    tracing::error!("❌ Failed to process {}: {}", path.display(), e);
                    skipped.push(path.clone());
                }
            }
        }
        images.sort_by_key(|image| image.index);

        tracing::info!(
            "✅ {} images written to {} ({} skipped)",
            images.len(),
            output_dir.display(),
            skipped.len()
        );

        Ok(PreprocessReport {
            output_dir: output_dir.to_path_buf(),
            images,
            skipped,
            metadata: None,
        })
    }
}

/// 依配置建立分割器；U-2-Net 模型不存在時先下載
pub async fn build_segmenter(config: &ReconConfig) -> Result<Arc<dyn Segmenter>> {
    let seg = &config.segmentation;
    match seg.backend {
        SegmentationBackend::Chroma => Ok(Arc::new(ChromaKeySegmenter::new(seg.chroma.clone()))),
        SegmentationBackend::U2net => {
            let dir = model_store::model_dir(seg.model_dir.as_deref())?;
            let model_path = model_store::ensure_model(&seg.model_name, &seg.model_url, &dir).await?;
            let input_size = seg.input_size;
            let segmenter = tokio::task::spawn_blocking(move || {
                U2NetSegmenter::load(&model_path, input_size)
            })
            .await
            .map_err(|e| ReconError::SegmentationError {
                message: format!("model loading task failed: {}", e),
            })??;
            Ok(Arc::new(segmenter))
        }
    }
}

/// 前處理完整流程：分割、寫檔、EXIF 轉移
pub async fn preprocess(
    config: &ReconConfig,
    segmenter: Arc<dyn Segmenter>,
    runner: Arc<dyn ProcessRunner>,
) -> Result<PreprocessReport> {
    tracing::info!("🚀 Starting preprocessing pipeline...");

    let preprocessor = Preprocessor::new(segmenter, PreprocessOptions::from_config(config));
    let raw_dir = config.project.raw_dir.clone();
    let output_dir = config.project.sanitized_dir.clone();

    let mut report = tokio::task::spawn_blocking(move || preprocessor.run(&raw_dir, &output_dir))
        .await
        .map_err(|e| ReconError::StageFailed {
            stage: "preprocess".to_string(),
            details: e.to_string(),
        })??;

    if config.metadata.enabled && !report.images.is_empty() {
        let transfer = MetadataTransfer::new(runner, config.metadata.clone());
        report.metadata = Some(transfer.transfer_all(&report.images).await);
    }

    tracing::info!("📁 Sanitized images available in: {}", report.output_dir.display());
    Ok(report)
}
