// =============================================================================
// Runtime Configuration — symbol groups, selection, refresh cadence
// =============================================================================
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
//
// The group lists are static configuration loaded once at startup; only the
// *selection* changes at runtime (via the API), and the scan loop picks the
// new selection up on its next cycle.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_chart_columns() -> u32 {
    3
}

fn default_credentials_path() -> String {
    "user_data.json".to_string()
}

fn default_symbol_groups() -> Vec<SymbolGroup> {
    vec![
        SymbolGroup {
            name: "SENSEX30".to_string(),
            symbols: [
                "HDFCBANK.NS",
                "RELIANCE.NS",
                "ICICIBANK.NS",
                "INFY.NS",
                "LT.NS",
                "TCS.NS",
                "ITC.NS",
                "BHARTIARTL.NS",
                "AXISBANK.NS",
                "SBIN.NS",
                "KOTAKBANK.NS",
                "HDFC.NS",
                "M&M.NS",
                "BAJFINANCE.NS",
                "TATAMOTORS.NS",
                "NTPC.NS",
                "MARUTI.NS",
                "SUNPHARMA.NS",
                "TITAN.NS",
                "HCLTECH.NS",
                "POWERGRID.NS",
                "TATASTEEL.NS",
                "ASIANPAINT.NS",
                "ULTRACEMCO.NS",
                "INDUSINDBK.NS",
                "NESTLEIND.NS",
                "JSWSTEEL.NS",
                "TECHM.NS",
                "BAJAJFINSV.NS",
                "WIPRO.NS",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
        SymbolGroup {
            name: "INDICES".to_string(),
            symbols: [
                "^NSEI",
                "^NSEBANK",
                "^NSEFINNIFTY",
                "^CNXAUTO",
                "^NSEMETAL",
                "^NSEIT",
                "^NSEPHARMA",
                "^NSEFMCG",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
    ]
}

// =============================================================================
// SymbolGroup
// =============================================================================

/// A named, ordered, static list of symbols used to populate the selection UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolGroup {
    pub name: String,
    pub symbols: Vec<String>,
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// The available symbol groups (static constituent lists).
    #[serde(default = "default_symbol_groups")]
    pub symbol_groups: Vec<SymbolGroup>,

    /// Names of the groups currently selected for scanning. May be empty,
    /// in which case the scan loop idles (nothing to fetch).
    #[serde(default)]
    pub selected_groups: Vec<String>,

    /// Seconds between scan cycles. Read when the scan loop starts.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Number of chart columns the dashboard lays panels out in.
    #[serde(default = "default_chart_columns")]
    pub chart_columns: u32,

    /// Path of the flat JSON credential file.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbol_groups: default_symbol_groups(),
            selected_groups: Vec::new(),
            refresh_interval_secs: default_refresh_interval_secs(),
            chart_columns: default_chart_columns(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl RuntimeConfig {
    /// True if `name` is one of the configured groups.
    pub fn has_group(&self, name: &str) -> bool {
        self.symbol_groups.iter().any(|g| g.name == name)
    }

    /// Flatten the selected groups into one symbol list, keeping group order
    /// and first-seen order within it, dropping duplicates.
    pub fn selected_symbols(&self) -> Vec<String> {
        let mut symbols = Vec::new();
        for name in &self.selected_groups {
            if let Some(group) = self.symbol_groups.iter().find(|g| &g.name == name) {
                for symbol in &group.symbols {
                    if !symbols.contains(symbol) {
                        symbols.push(symbol.clone());
                    }
                }
            }
        }
        symbols
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            groups = config.symbol_groups.len(),
            selected = ?config.selected_groups,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
