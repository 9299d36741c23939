use std::path::{Path, PathBuf};

use reliquery_adapters::ColumnMap;
use reliquery_core::{CohortColor, Palette, SheetId};
use reliquery_storage::DEFAULT_API_BASE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base: String,
    pub layout_path: PathBuf,
    pub color_state_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var("RELIQUERY_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            layout_path: std::env::var("RELIQUERY_LAYOUT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("reliquery.yaml")),
            color_state_path: std::env::var("RELIQUERY_COLOR_STATE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".color_data.txt")),
            user_agent: std::env::var("RELIQUERY_USER_AGENT")
                .unwrap_or_else(|_| "reliquery/0.1".to_string()),
            http_timeout_secs: std::env::var("RELIQUERY_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }
}

/// Which sheets to sync and where the roster columns live in each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub authoritative: SheetBinding,
    pub derived: SheetBinding,
    pub archive_sheet_id: SheetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetBinding {
    pub sheet_id: SheetId,
    pub columns: ColumnMap,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading layout {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing layout: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("palette must list exactly 3 colors, found {0}")]
    PaletteSize(usize),
}

impl SheetLayout {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let layout: Self = serde_yaml::from_str(text)?;
        layout.palette()?;
        Ok(layout)
    }

    pub fn palette(&self) -> Result<Palette, ConfigError> {
        match self.palette.as_deref() {
            None => Ok(Palette::default()),
            Some(&[a, b, c]) => Ok(Palette::new([CohortColor(a), CohortColor(b), CohortColor(c)])),
            Some(other) => Err(ConfigError::PaletteSize(other.len())),
        }
    }
}
