use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 前處理後的單張影像：原始檔與輸出檔的對應
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedImage {
    pub index: u32,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl SanitizedImage {
    /// 原始檔名（不含副檔名）
    pub fn original_stem(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataReport {
    pub total: usize,
    pub transferred: usize,
    pub failed: usize,
    /// exiftool 不存在時整個步驟被略過
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessReport {
    pub output_dir: PathBuf,
    pub images: Vec<SanitizedImage>,
    pub skipped: Vec<PathBuf>,
    pub metadata: Option<MetadataReport>,
}

/// 外部程式呼叫
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// 丟棄子行程的 stdout/stderr
    pub quiet: bool,
}

impl ProcessInvocation {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            quiet: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag(self, name: &str, value: impl Into<String>) -> Self {
        self.arg(name).arg(value)
    }

    pub fn path_flag(self, name: &str, value: &Path) -> Self {
        self.flag(name, value.to_string_lossy().into_owned())
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.args.iter().any(|a| a == name)
    }

    /// 以空白連接的完整命令列，用於錯誤訊息
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRun {
    pub step: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub output_root: PathBuf,
    pub textured_mesh: PathBuf,
    pub nodes: Vec<NodeRun>,
}
