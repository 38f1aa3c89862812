//! AliceVision 安裝偵測、相機感測器註冊與環境變數腳本產生

use crate::config::toml_config::{CameraConfig, FrameworkConfig};
use crate::utils::error::{ReconError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const ENV_BIN: &str = "ALICEVISION_BIN";
pub const ENV_SENSOR_DB: &str = "ALICEVISION_SENSOR_DB";
pub const ENV_ROOT: &str = "ALICEVISION_ROOT";
pub const SENSOR_DB_FILENAME: &str = "cameraSensors.db";

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSensor {
    pub model: String,
    pub sensor_width_mm: f64,
    pub aliases: Vec<String>,
}

impl From<&CameraConfig> for CameraSensor {
    fn from(config: &CameraConfig) -> Self {
        Self {
            model: config.model.clone(),
            sensor_width_mm: config.sensor_width_mm,
            aliases: config.aliases.clone(),
        }
    }
}

impl CameraSensor {
    /// 寫入 cameraSensors.db 的行，每個別名一行
    pub fn database_entries(&self) -> String {
        let width = self.sensor_width_mm;
        let mut entries = format!("\n{};{}\n", self.model, width);
        for alias in &self.aliases {
            entries.push_str(&format!("{};{}\n", alias, width));
        }
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRegistration {
    AlreadyPresent,
    Registered,
    PermissionDenied,
}

/// 節點執行所需的路徑
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkEnv {
    pub bin_dir: PathBuf,
    pub sensor_db: PathBuf,
    pub root: Option<PathBuf>,
    pub lib_dir: Option<PathBuf>,
}

impl FrameworkEnv {
    /// 從 `source vars.sh` 後的行程環境讀取
    pub fn from_process_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bin_dir = non_empty(ENV_BIN).ok_or_else(|| ReconError::MissingEnvironment {
            variable: ENV_BIN.to_string(),
        })?;
        let sensor_db = non_empty(ENV_SENSOR_DB).ok_or_else(|| ReconError::MissingEnvironment {
            variable: ENV_SENSOR_DB.to_string(),
        })?;
        let root = non_empty(ENV_ROOT).map(PathBuf::from);

        Ok(Self {
            bin_dir: PathBuf::from(bin_dir),
            sensor_db: PathBuf::from(sensor_db),
            lib_dir: root.as_ref().map(|r| r.join("lib")),
            root,
        })
    }

    /// 配置中明確指定的路徑優先，其次才是環境變數
    pub fn resolve(config: &FrameworkConfig) -> Result<Self> {
        match (&config.bin_dir, &config.sensor_db) {
            (Some(bin_dir), Some(sensor_db)) => Ok(Self {
                bin_dir: bin_dir.clone(),
                sensor_db: sensor_db.clone(),
                root: None,
                lib_dir: None,
            }),
            _ => Ok(Self::from_process_env()?.with_overrides(config)),
        }
    }

    pub fn with_overrides(mut self, config: &FrameworkConfig) -> Self {
        if let Some(bin_dir) = &config.bin_dir {
            self.bin_dir = bin_dir.clone();
        }
        if let Some(sensor_db) = &config.sensor_db {
            self.sensor_db = sensor_db.clone();
        }
        self
    }

    pub fn binary(&self, node: &str) -> PathBuf {
        self.bin_dir.join(format!("aliceVision_{}", node))
    }

    /// 子行程使用的 LD_LIBRARY_PATH
    pub fn library_path(&self) -> Option<String> {
        let lib_dir = self.lib_dir.as_ref()?;
        let lib = lib_dir.to_string_lossy();
        match std::env::var("LD_LIBRARY_PATH") {
            Ok(existing) if !existing.is_empty() => Some(format!("{}:{}", lib, existing)),
            _ => Some(lib.into_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkInstall {
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub sensor_db: PathBuf,
}

impl FrameworkInstall {
    pub fn detect(root: &Path) -> Result<Self> {
        if !root.exists() {
            tracing::error!("❌ Framework root not found: {}", root.display());
            return Err(ReconError::MissingInstall {
                path: root.display().to_string(),
            });
        }

        let bin_dir = Self::locate_bin(root)?;
        tracing::info!("✅ Binaries validated at: {}", bin_dir.display());

        let sensor_db = Self::locate_sensor_db(root)?;
        tracing::info!("📁 Sensor database: {}", sensor_db.display());

        Ok(Self {
            root: root.to_path_buf(),
            bin_dir,
            sensor_db,
        })
    }

    fn locate_bin(root: &Path) -> Result<PathBuf> {
        [root.join("aliceVision").join("bin"), root.join("bin")]
            .into_iter()
            .find(|p| p.is_dir())
            .ok_or_else(|| {
                tracing::error!("❌ No 'bin' directory under {}", root.display());
                ReconError::MissingInstall {
                    path: root.join("bin").display().to_string(),
                }
            })
    }

    fn locate_sensor_db(root: &Path) -> Result<PathBuf> {
        [
            root.join("aliceVision")
                .join("share")
                .join("aliceVision")
                .join(SENSOR_DB_FILENAME),
            root.join("share").join("aliceVision").join(SENSOR_DB_FILENAME),
        ]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| {
            tracing::error!("❌ '{}' not found under {}", SENSOR_DB_FILENAME, root.display());
            ReconError::MissingInstall {
                path: root.join("share").join("aliceVision").join(SENSOR_DB_FILENAME).display().to_string(),
            }
        })
    }

    /// 框架內部根目錄 (root/aliceVision)
    pub fn framework_root(&self) -> PathBuf {
        self.root.join("aliceVision")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.framework_root().join("lib")
    }

    pub fn env(&self) -> FrameworkEnv {
        FrameworkEnv {
            bin_dir: self.bin_dir.clone(),
            sensor_db: self.sensor_db.clone(),
            root: Some(self.framework_root()),
            lib_dir: Some(self.lib_dir()),
        }
    }
}

/// 模型未登錄時附加感測器寬度
pub fn register_sensor(db_file: &Path, sensor: &CameraSensor) -> Result<SensorRegistration> {
    let content = match fs::read_to_string(db_file) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::warn!(
                "⚠️ Permission denied reading {}. Re-run with elevated privileges if needed.",
                db_file.display()
            );
            return Ok(SensorRegistration::PermissionDenied);
        }
        Err(e) => return Err(e.into()),
    };

    if content.contains(&sensor.model) {
        tracing::info!("Camera model '{}' already registered", sensor.model);
        return Ok(SensorRegistration::AlreadyPresent);
    }

    tracing::info!(
        "📝 Registering new sensor: {} ({}mm)",
        sensor.model,
        sensor.sensor_width_mm
    );

    let append = || -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(db_file)?;
        file.write_all(sensor.database_entries().as_bytes())
    };

    match append() {
        Ok(()) => {
            tracing::info!("✅ Sensor database updated");
            Ok(SensorRegistration::Registered)
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::warn!(
                "⚠️ Permission denied on {}. Re-run with elevated privileges if needed.",
                db_file.display()
            );
            Ok(SensorRegistration::PermissionDenied)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn env_script_content(install: &FrameworkInstall) -> String {
    format!(
        "# Auto-generated environment script\n\
         export {}='{}'\n\
         export {}='{}'\n\
         export {}='{}'\n\
         export LD_LIBRARY_PATH='{}:$LD_LIBRARY_PATH'\n",
        ENV_BIN,
        install.bin_dir.display(),
        ENV_SENSOR_DB,
        install.sensor_db.display(),
        ENV_ROOT,
        install.framework_root().display(),
        install.lib_dir().display(),
    )
}

pub fn write_env_script(path: &Path, install: &FrameworkInstall) -> Result<PathBuf> {
    fs::write(path, env_script_content(install))?;
    tracing::info!("✅ Environment script generated: {}", path.display());
    Ok(path.to_path_buf())
}

#[derive(Debug, Clone)]
pub struct SetupReport {
    pub install: FrameworkInstall,
    pub registration: SensorRegistration,
    pub env_script: PathBuf,
}

/// 偵測安裝、註冊感測器並產生 vars.sh
pub fn setup(framework: &FrameworkConfig, camera: &CameraConfig) -> Result<SetupReport> {
    tracing::info!("🚀 Starting infrastructure setup...");

    let install = FrameworkInstall::detect(&framework.root)?;
    let registration = register_sensor(&install.sensor_db, &CameraSensor::from(camera))?;
    let env_script = write_env_script(&framework.env_script, &install)?;

    Ok(SetupReport {
        install,
        registration,
        env_script,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sensor() -> CameraSensor {
        CameraSensor::from(&CameraConfig::default())
    }

    #[test]
    fn test_database_entries_include_aliases() {
        assert_eq!(
            sensor().database_entries(),
            "\nSamsung S22 Ultra;9.6\nSM-S908B;9.6\nSamsung;SM-S908B;9.6\n"
        );
    }

    #[test]
    fn test_from_lookup_requires_both_variables() {
        let mut vars = HashMap::new();
        vars.insert(ENV_BIN.to_string(), "/opt/av/bin".to_string());

        let err = FrameworkEnv::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(
            err,
            ReconError::MissingEnvironment { ref variable } if variable == ENV_SENSOR_DB
        ));

        vars.insert(ENV_SENSOR_DB.to_string(), "/opt/av/cameraSensors.db".to_string());
        vars.insert(ENV_ROOT.to_string(), "/opt/av/aliceVision".to_string());
        let env = FrameworkEnv::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(env.bin_dir, PathBuf::from("/opt/av/bin"));
        assert_eq!(env.lib_dir, Some(PathBuf::from("/opt/av/aliceVision/lib")));
        assert_eq!(
            env.binary("cameraInit"),
            PathBuf::from("/opt/av/bin/aliceVision_cameraInit")
        );
    }

    #[test]
    fn test_blank_variable_counts_as_missing() {
        let err = FrameworkEnv::from_lookup(|_| Some("  ".to_string())).unwrap_err();
        assert!(matches!(err, ReconError::MissingEnvironment { .. }));
    }

    #[test]
    fn test_explicit_paths_skip_process_env() {
        let config = FrameworkConfig {
            bin_dir: Some(PathBuf::from("/x/bin")),
            sensor_db: Some(PathBuf::from("/x/db")),
            ..FrameworkConfig::default()
        };
        let env = FrameworkEnv::resolve(&config).unwrap();
        assert_eq!(env.bin_dir, PathBuf::from("/x/bin"));
        assert_eq!(env.sensor_db, PathBuf::from("/x/db"));
        assert!(env.library_path().is_none());
    }
}
