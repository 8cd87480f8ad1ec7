use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MatchbookError, Result};
use crate::policy::{MatchTolerances, ScoringPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanSettings {
    #[serde(default = "default_grace_days")]
    pub grace_days: i64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,
}

fn default_grace_days() -> i64 {
    5
}

fn default_batch_limit() -> i64 {
    20
}

impl Default for OrphanSettings {
    fn default() -> Self {
        Self {
            grace_days: default_grace_days(),
            batch_limit: default_batch_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Where accepted ledger posts are handed off (JSON lines).
    #[serde(default)]
    pub ledger_outbox: String,
    /// Receipt extractions below this confidence never override the amount.
    #[serde(default = "default_receipt_min_confidence")]
    pub receipt_min_confidence: i64,
    #[serde(default)]
    pub matching: MatchTolerances,
    #[serde(default)]
    pub scoring: ScoringPolicy,
    #[serde(default)]
    pub orphans: OrphanSettings,
}

fn default_receipt_min_confidence() -> i64 {
    70
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            ledger_outbox: String::new(),
            receipt_min_confidence: default_receipt_min_confidence(),
            matching: MatchTolerances::default(),
            scoring: ScoringPolicy::default(),
            orphans: OrphanSettings::default(),
        }
    }
}

impl Settings {
    pub fn ledger_outbox_path(&self) -> PathBuf {
        if self.ledger_outbox.is_empty() {
            PathBuf::from(&self.data_dir).join("ledger-outbox.jsonl")
        } else {
            PathBuf::from(&self.ledger_outbox)
        }
    }
}

fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MATCHBOOK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("matchbook")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("matchbook")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| MatchbookError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

pub fn db_path() -> PathBuf {
    get_data_dir().join("matchbook.db")
}
