use crate::utils::error::{ReconError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub project: ProjectConfig,
    pub framework: FrameworkConfig,
    pub camera: CameraConfig,
    pub segmentation: SegmentationConfig,
    pub preprocess: PreprocessConfig,
    pub metadata: MetadataConfig,
    pub reconstruction: ReconstructionConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub raw_dir: PathBuf,
    pub sanitized_dir: PathBuf,
    pub recon_dir: PathBuf,
    /// 設定時保留 RGBA 去背 PNG
    pub intermediate_dir: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            sanitized_dir: PathBuf::from("data/sanitized"),
            recon_dir: PathBuf::from("data/recon"),
            intermediate_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub root: PathBuf,
    pub env_script: PathBuf,
    /// 直接指定時不需要 ALICEVISION_BIN
    pub bin_dir: Option<PathBuf>,
    pub sensor_db: Option<PathBuf>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("aliceVision"),
            env_script: PathBuf::from("vars.sh"),
            bin_dir: None,
            sensor_db: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub model: String,
    pub sensor_width_mm: f64,
    pub aliases: Vec<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            model: "Samsung S22 Ultra".to_string(),
            sensor_width_mm: 9.6,
            aliases: vec!["SM-S908B".to_string(), "Samsung;SM-S908B".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum SegmentationBackend {
    U2net,
    Chroma,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub backend: SegmentationBackend,
    pub model_name: String,
    pub model_url: String,
    pub model_dir: Option<PathBuf>,
    pub input_size: u32,
    pub chroma: ChromaConfig,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            backend: SegmentationBackend::U2net,
            model_name: "u2net".to_string(),
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_dir: None,
            input_size: 320,
            chroma: ChromaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    /// OpenCV HSV 範圍（H: 0..179）
    pub lower: [u8; 3],
    pub upper: [u8; 3],
    pub roi_ratio: f32,
    pub open_kernel: u32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            lower: [69, 173, 62],
            upper: [92, 255, 255],
            roi_ratio: 0.85,
            open_kernel: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub extensions: Vec<String>,
    pub despill: bool,
    pub despill_factor: f32,
    pub start_index: u32,
    pub jpeg_quality: u8,
    /// 未設定時只有 chroma 後端套用 CLAHE
    pub clahe: Option<bool>,
    pub clahe_clip_limit: f32,
    pub clahe_grid: u32,
    pub threads: Option<usize>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            despill: true,
            despill_factor: 0.8,
            start_index: 1000,
            jpeg_quality: 100,
            clahe: None,
            clahe_clip_limit: 2.0,
            clahe_grid: 8,
            threads: None,
        }
    }
}

impl PreprocessConfig {
    pub fn clahe_enabled(&self, backend: SegmentationBackend) -> bool {
        self.clahe
            .unwrap_or(backend == SegmentationBackend::Chroma)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    pub exiftool: String,
    pub normalize_orientation: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exiftool: "exiftool".to_string(),
            normalize_orientation: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub min_images: usize,
    pub verbose_level: String,
    pub view_id_method: String,
    pub allow_single_view: bool,
    pub describer_types: String,
    pub force_cpu_extraction: bool,
    pub matching_method: String,
    pub min_nb_images: u32,
    pub nb_neighbors: u32,
    pub distance_ratio: f32,
    pub downscale: u32,
    pub min_vis: u32,
    pub texture_side: u32,
    pub color_mapping_file_type: String,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            min_images: 3,
            verbose_level: "error".to_string(),
            view_id_method: "filename".to_string(),
            allow_single_view: true,
            describer_types: "sift".to_string(),
            force_cpu_extraction: true,
            matching_method: "Sequential".to_string(),
            min_nb_images: 2,
            nb_neighbors: 50,
            distance_ratio: 0.8,
            downscale: 2,
            min_vis: 2,
            texture_side: 4096,
            color_mapping_file_type: "png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl ReconConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ReconError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 檔案不存在時使用預設值
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("📁 Loading configuration from: {}", path.display());
            Self::from_file(path)
        } else {
            tracing::debug!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReconError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${HOME})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ReconError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path(
            "project.raw_dir",
            &self.project.raw_dir.to_string_lossy(),
        )?;
        validation::validate_path(
            "project.sanitized_dir",
            &self.project.sanitized_dir.to_string_lossy(),
        )?;
        validation::validate_path(
            "project.recon_dir",
            &self.project.recon_dir.to_string_lossy(),
        )?;

        validation::validate_non_empty_string("camera.model", &self.camera.model)?;
        if self.camera.sensor_width_mm <= 0.0 {
            return Err(ReconError::InvalidConfigValueError {
                field: "camera.sensor_width_mm".to_string(),
                value: self.camera.sensor_width_mm.to_string(),
                reason: "Sensor width must be positive".to_string(),
            });
        }

        if self.segmentation.backend == SegmentationBackend::U2net {
            validation::validate_non_empty_string(
                "segmentation.model_name",
                &self.segmentation.model_name,
            )?;
            validation::validate_url("segmentation.model_url", &self.segmentation.model_url)?;
        }
        validation::validate_positive_number(
            "segmentation.input_size",
            self.segmentation.input_size as usize,
            1,
        )?;
        let chroma = &self.segmentation.chroma;
        validation::validate_hsv_bounds("segmentation.chroma", chroma.lower, chroma.upper)?;
        validation::validate_range("segmentation.chroma.roi_ratio", chroma.roi_ratio, 0.0, 1.0)?;
        validation::validate_positive_number(
            "segmentation.chroma.open_kernel",
            chroma.open_kernel as usize,
            1,
        )?;

        let pre = &self.preprocess;
        if pre.extensions.is_empty() {
            return Err(ReconError::MissingConfigError {
                field: "preprocess.extensions".to_string(),
            });
        }
        validation::validate_range("preprocess.despill_factor", pre.despill_factor, 0.0, 1.0)?;
        validation::validate_range("preprocess.jpeg_quality", pre.jpeg_quality, 1, 100)?;
        validation::validate_positive_number("preprocess.clahe_grid", pre.clahe_grid as usize, 1)?;
        if let Some(threads) = pre.threads {
            validation::validate_positive_number("preprocess.threads", threads, 1)?;
        }

        validation::validate_non_empty_string("metadata.exiftool", &self.metadata.exiftool)?;

        let rec = &self.reconstruction;
        validation::validate_positive_number("reconstruction.min_images", rec.min_images, 3)?;
        validation::validate_range("reconstruction.distance_ratio", rec.distance_ratio, 0.0, 1.0)?;
        validation::validate_positive_number(
            "reconstruction.downscale",
            rec.downscale as usize,
            1,
        )?;
        validation::validate_non_empty_string(
            "reconstruction.verbose_level",
            &rec.verbose_level,
        )?;

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl Validate for ReconConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
