//! Configuration loading and parsing.
//!
//! Parses `edcore.toml` (or an override path provided by the binary):
//! pool sizing, reflow margins, the autosave directory and logging. Missing
//! files and unparseable files both yield defaults; unknown fields are
//! ignored so older binaries keep reading newer files.
//!
//! Margins are clamped once at load time. The raw parsed values stay in
//! `file` and the usable ones land in `margins`.

use anyhow::{Context, Result};
use core_mark::{MAX_FORMAT_MARGIN, Margins};
use core_pool::PoolConfig;
use serde::Deserialize;
use std::ffi::OsString;
use std::{fs, io, path::PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "edcore.toml";
pub const AUTOSAVE_ENV: &str = "AUTOSAVE";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PoolSection {
    #[serde(default = "PoolSection::default_arena_size")]
    pub arena_size: usize,
    /// 0 means no limit.
    #[serde(default)]
    pub max_arenas: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            arena_size: Self::default_arena_size(),
            max_arenas: 0,
        }
    }
}

impl PoolSection {
    const fn default_arena_size() -> usize {
        core_pool::ARENA_GRANULE
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FormatSection {
    #[serde(default)]
    pub margin_left: usize,
    #[serde(default = "FormatSection::default_margin_right")]
    pub margin_right: usize,
}

impl Default for FormatSection {
    fn default() -> Self {
        Self {
            margin_left: 0,
            margin_right: Self::default_margin_right(),
        }
    }
}

impl FormatSection {
    const fn default_margin_right() -> usize {
        72
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct FileSection {
    #[serde(default)]
    pub autosave_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogSection {
    #[serde(default = "LogSection::default_filter")]
    pub filter: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: Self::default_filter(),
            dir: None,
        }
    }
}

impl LogSection {
    fn default_filter() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub format: FormatSection,
    #[serde(default)]
    pub file: FileSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub path: Option<PathBuf>,
    pub file: ConfigFile,
    pub margins: Margins, // clamped into the accepted range
    pub autosave_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(None, None, ConfigFile::default())
    }
}

/// Best-effort config path: the working directory first, then the platform
/// config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("edcore").join(CONFIG_FILE_NAME);
    }
    local
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let config = match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Config::from_file(Some(content), Some(path), file),
            Err(error) => {
                warn!(
                    target: "config",
                    path = %path.display(),
                    error = %error.message(),
                    "config_parse_failed"
                );
                Config::default()
            }
        },
        Err(error) if error.kind() == io::ErrorKind::NotFound => Config::default(),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("reading configuration {}", path.display()));
        }
    };
    Ok(config.with_autosave_override(std::env::var_os(AUTOSAVE_ENV)))
}

impl Config {
    fn from_file(raw: Option<String>, path: Option<PathBuf>, file: ConfigFile) -> Self {
        let margins = clamp_margins(&file.format);
        let autosave_dir = file.file.autosave_dir.clone();
        Self {
            raw,
            path,
            file,
            margins,
            autosave_dir,
        }
    }

    /// A set, non-empty `AUTOSAVE` value wins over `file.autosave_dir`.
    pub fn with_autosave_override(mut self, value: Option<OsString>) -> Self {
        if let Some(dir) = value.filter(|value| !value.is_empty()) {
            self.autosave_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            arena_size: self.file.pool.arena_size,
            max_arenas: (self.file.pool.max_arenas > 0).then_some(self.file.pool.max_arenas),
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.file.log.filter
    }

    pub fn log_dir(&self) -> PathBuf {
        self.file.log.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

fn clamp_margins(format: &FormatSection) -> Margins {
    let right = format.margin_right.clamp(1, MAX_FORMAT_MARGIN - 1);
    let left = if format.margin_left < right { format.margin_left } else { 0 };
    if (left, right) != (format.margin_left, format.margin_right) {
        info!(
            target: "config",
            raw_left = format.margin_left,
            raw_right = format.margin_right,
            left,
            right,
            max = MAX_FORMAT_MARGIN - 1,
            "format_margin_clamped"
        );
    }
    Margins { left, right }
}
