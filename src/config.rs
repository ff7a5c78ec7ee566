use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::cli::args::{OutputFormat, ScanArgs};

pub const DEFAULT_JOBS: usize = 1;
pub const MAX_JOBS: usize = 64;

/// Settings from every configuration layer.
///
/// Each field is optional so that merging a layer only overrides the keys the
/// layer actually sets. Effective values come from the accessor methods.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AstsentryConfig {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanConfig {
    pub jobs: Option<usize>,
    /// `text`, `json` or `sarif`
    pub format: Option<String>,
    pub output: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PathsConfig {
    /// Root that tree filenames are resolved against.
    pub source_root: Option<PathBuf>,
    pub filelist: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesConfig {
    pub enable: Option<Vec<String>>,
    pub disable: Option<Vec<String>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid range in {field}: {value} (valid range: {valid_range})")]
    InvalidRange {
        field: String,
        value: usize,
        valid_range: String,
    },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("TOML parsing error in {}: {source}", .path.display())]
    TomlError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("IO error reading {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AstsentryConfig {
    pub fn jobs(&self) -> usize {
        self.scan.jobs.unwrap_or(DEFAULT_JOBS)
    }

    /// Output format; only valid after `validate()` succeeded.
    pub fn format(&self) -> OutputFormat {
        self.scan
            .format
            .as_deref()
            .and_then(|format| OutputFormat::from_str(format).ok())
            .unwrap_or_default()
    }

    pub fn enabled_rules(&self) -> &[String] {
        self.rules.enable.as_deref().unwrap_or_default()
    }

    pub fn disabled_rules(&self) -> &[String] {
        self.rules.disable.as_deref().unwrap_or_default()
    }

    /// Merge another config into this one (other takes precedence for set values)
    pub fn merge(&mut self, other: &AstsentryConfig) {
        if other.scan.jobs.is_some() {
            self.scan.jobs = other.scan.jobs;
        }
        if other.scan.format.is_some() {
            self.scan.format = other.scan.format.clone();
        }
        if other.scan.output.is_some() {
            self.scan.output = other.scan.output.clone();
        }

        if other.paths.source_root.is_some() {
            self.paths.source_root = other.paths.source_root.clone();
        }
        if other.paths.filelist.is_some() {
            self.paths.filelist = other.paths.filelist.clone();
        }

        if other.rules.enable.is_some() {
            self.rules.enable = other.rules.enable.clone();
        }
        if other.rules.disable.is_some() {
            self.rules.disable = other.rules.disable.clone();
        }
    }

    pub fn generate_default_config() -> String {
        format!(
            r#"# astsentry configuration file
#
# Layers, lowest priority first:
#   ~/.config/astsentry/config.toml
#   ./astsentry.toml
#   --config <FILE>
#   ASTSENTRY_* environment variables
#   command line flags

[scan]
jobs = {DEFAULT_JOBS}
format = "text"
# output = "findings.txt"

[paths]
# source_root = "wordpress_sources"
# filelist = "wordpress_ast/filelist"

[rules]
# enable = ["CVE-2017-7189", "DB-CALL"]
# disable = ["CVE-2019-9025"]
"#
        )
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the user config file path (~/.config/astsentry/config.toml)
    pub fn get_user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/astsentry/config.toml"))
    }

    /// Get the current directory config file path (./astsentry.toml)
    pub fn get_current_config_path() -> PathBuf {
        PathBuf::from("./astsentry.toml")
    }

    /// Write the default config to the user config path unless one exists.
    /// Returns the path and whether a file was created.
    pub fn ensure_user_config_exists() -> anyhow::Result<(PathBuf, bool)> {
        let user_config_path = Self::get_user_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

        if user_config_path.exists() {
            return Ok((user_config_path, false));
        }
        if let Some(parent) = user_config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&user_config_path, Self::generate_default_config())?;
        log::info!("Created user config file at: {}", user_config_path.display());

        Ok((user_config_path, true))
    }

    /// Load and merge the implicit config files:
    /// 1. User config (~/.config/astsentry/config.toml)
    /// 2. Current directory (./astsentry.toml)
    ///
    /// A file that exists but does not parse is an error.
    pub fn load_with_merged_configs() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let layers = Self::get_user_config_path()
            .into_iter()
            .chain(std::iter::once(Self::get_current_config_path()));
        for path in layers {
            if path.exists() {
                config.merge(&Self::load_from_file(&path)?);
                log::debug!("Loaded config from: {}", path.display());
            }
        }

        Ok(config)
    }

    pub fn apply_env_vars(&mut self, env_vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        for (key, value) in env_vars {
            let Some(config_key) = key.strip_prefix("ASTSENTRY_") else {
                continue;
            };
            match config_key {
                "SCAN_JOBS" => {
                    self.scan.jobs = Some(value.parse().map_err(|_| ConfigError::InvalidValue {
                        field: key.clone(),
                        value: value.clone(),
                    })?);
                }
                "SCAN_FORMAT" => self.scan.format = Some(value.clone()),
                "SCAN_OUTPUT" => self.scan.output = Some(PathBuf::from(value)),
                "PATHS_SOURCE_ROOT" => self.paths.source_root = Some(PathBuf::from(value)),
                "PATHS_FILELIST" => self.paths.filelist = Some(PathBuf::from(value)),
                "RULES_ENABLE" => self.rules.enable = Some(split_list(value)),
                "RULES_DISABLE" => self.rules.disable = Some(split_list(value)),
                _ => log::debug!("Ignoring unknown environment variable {}", key),
            }
        }
        Ok(())
    }

    pub fn apply_scan_args(&mut self, args: &ScanArgs) {
        if let Some(jobs) = args.jobs {
            self.scan.jobs = Some(jobs);
        }
        if let Some(format) = args.format {
            self.scan.format = Some(format.to_string());
        }
        if let Some(ref output) = args.output {
            self.scan.output = Some(output.clone());
        }
        if let Some(ref source_root) = args.source_root {
            self.paths.source_root = Some(source_root.clone());
        }
        if let Some(ref filelist) = args.filelist {
            self.paths.filelist = Some(filelist.clone());
        }
        if !args.enable.is_empty() {
            self.rules.enable = Some(args.enable.clone());
        }
        if !args.disable.is_empty() {
            self.rules.disable = Some(args.disable.clone());
        }
    }

    /// Load configuration with full precedence chain:
    /// 1. Default values (lowest)
    /// 2. User config (~/.config/astsentry/config.toml)
    /// 3. Current directory (./astsentry.toml)
    /// 4. Explicit `--config` file
    /// 5. Environment variables (ASTSENTRY_*)
    /// 6. CLI arguments (highest)
    pub fn load_with_precedence(
        config_path: Option<&Path>,
        cli_args: &ScanArgs,
        env_vars: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_with_merged_configs()?;

        if let Some(path) = config_path {
            config.merge(&Self::load_from_file(path)?);
            log::debug!("Loaded config from: {}", path.display());
        }

        config.apply_env_vars(env_vars)?;
        config.apply_scan_args(cli_args);
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let jobs = self.jobs();
        if jobs == 0 || jobs > MAX_JOBS {
            return Err(ConfigError::InvalidRange {
                field: "scan.jobs".to_string(),
                value: jobs,
                valid_range: format!("1-{}", MAX_JOBS),
            });
        }

        if let Some(ref format) = self.scan.format {
            if OutputFormat::from_str(format).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: "scan.format".to_string(),
                    value: format.clone(),
                });
            }
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
