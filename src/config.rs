//! Runtime configuration for trustflow
//!
//! Values come from the environment (and a `.env` file) or from a TOML file.
//! CLI flags override whatever is loaded here.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::cartographer::{Capacity, LoaderOptions, DEFAULT_CHUNK_SIZE};
use crate::solver::{BackendKind, FlowAlgorithm};

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Solver Settings ==========
    /// Which max-flow backend to build per snapshot
    pub backend: BackendKind,

    /// Algorithm for the general backend (backend default if unset)
    pub algorithm: Option<FlowAlgorithm>,

    /// Cutoff applied when a query does not pass one
    pub default_cutoff: Option<Capacity>,

    // ========== Ingestion Settings ==========
    /// Trust rows per ingestion chunk
    pub ingest_chunk_size: usize,

    /// Show a progress bar while ingesting
    pub show_progress: bool,

    /// Trust edge CSV (columns: truster, trustee)
    pub trusts_csv: String,

    /// Balance CSV (columns: account, tokenAddress, demurragedTotalBalance)
    pub balances_csv: String,

    // ========== Diagnostics ==========
    /// Vertices sampled by `info`
    pub node_info_sample: usize,

    /// tracing filter directive
    pub log_filter: String,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Missing keys fall back to defaults;
    /// present but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            backend: match get("TRUSTFLOW_BACKEND") {
                Some(v) => v.parse::<BackendKind>().map_err(|e| eyre::eyre!(e))?,
                None => defaults.backend,
            },
            algorithm: match get("TRUSTFLOW_ALGORITHM") {
                Some(v) => Some(v.parse::<FlowAlgorithm>().map_err(|e| eyre::eyre!(e))?),
                None => defaults.algorithm,
            },
            default_cutoff: match get("DEFAULT_CUTOFF") {
                Some(v) => Some(
                    v.parse::<Capacity>()
                        .map_err(|e| eyre::eyre!("Invalid DEFAULT_CUTOFF `{}`: {}", v, e))?,
                ),
                None => defaults.default_cutoff,
            },
            ingest_chunk_size: match get("INGEST_CHUNK_SIZE") {
                Some(v) => v
                    .parse::<usize>()
                    .map_err(|e| eyre::eyre!("Invalid INGEST_CHUNK_SIZE `{}`: {}", v, e))?,
                None => defaults.ingest_chunk_size,
            },
            show_progress: get("SHOW_PROGRESS")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.show_progress),
            trusts_csv: get("TRUSTS_CSV").unwrap_or(defaults.trusts_csv),
            balances_csv: get("BALANCES_CSV").unwrap_or(defaults.balances_csv),
            node_info_sample: match get("NODE_INFO_SAMPLE") {
                Some(v) => v
                    .parse::<usize>()
                    .map_err(|e| eyre::eyre!("Invalid NODE_INFO_SAMPLE `{}`: {}", v, e))?,
                None => defaults.node_info_sample,
            },
            log_filter: get("LOG_FILTER").unwrap_or(defaults.log_filter),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            chunk_size: self.ingest_chunk_size,
            show_progress: self.show_progress,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest_chunk_size == 0 {
            return Err(eyre::eyre!("INGEST_CHUNK_SIZE must be at least 1"));
        }
        if self.log_filter.trim().is_empty() {
            return Err(eyre::eyre!("LOG_FILTER must not be empty"));
        }
        if self.backend == BackendKind::Combinatorial && self.algorithm.is_some() {
            tracing::warn!("TRUSTFLOW_ALGORITHM is ignored by the combinatorial backend");
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let algorithm = self.algorithm.map_or("backend default".to_string(), |a| a.to_string());
        let cutoff = self.default_cutoff.map_or("none".to_string(), |c| c.to_string());

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                TRUSTFLOW - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SOLVER                                                     ║");
        println!("║ • Backend:         {:^40} ║", self.backend);
        println!("║ • Algorithm:       {:^40} ║", algorithm);
        println!("║ • Default Cutoff:  {:^40} ║", cutoff);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ INGESTION                                                  ║");
        println!("║ • Chunk Size:      {:^40} ║", self.ingest_chunk_size);
        println!("║ • Trusts CSV:      {:^40} ║", self.trusts_csv);
        println!("║ • Balances CSV:    {:^40} ║", self.balances_csv);
        println!("║ • Progress Bar:    {:^40} ║",
            if self.show_progress { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::General,
            algorithm: None,
            default_cutoff: None,
            ingest_chunk_size: DEFAULT_CHUNK_SIZE,
            show_progress: true,
            trusts_csv: "./data/trusts.csv".to_string(),
            balances_csv: "./data/balances.csv".to_string(),
            node_info_sample: 5,
            log_filter: "trustflow=info".to_string(),
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::General);
        assert_eq!(config.ingest_chunk_size, 100_000);
        assert!(config.default_cutoff.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("TRUSTFLOW_BACKEND", "ortools"),
            ("TRUSTFLOW_ALGORITHM", "edmonds_karp"),
            ("DEFAULT_CUTOFF", "5000"),
            ("INGEST_CHUNK_SIZE", "250"),
            ("SHOW_PROGRESS", "false"),
            ("TRUSTS_CSV", "/tmp/t.csv"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Combinatorial);
        assert_eq!(config.algorithm, Some(FlowAlgorithm::EdmondsKarp));
        assert_eq!(config.default_cutoff, Some(5000));
        assert_eq!(config.ingest_chunk_size, 250);
        assert!(!config.show_progress);
        assert_eq!(config.trusts_csv, "/tmp/t.csv");
        assert_eq!(config.balances_csv, Config::default().balances_csv);
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("TRUSTFLOW_BACKEND", "gurobi")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DEFAULT_CUTOFF", "-1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("INGEST_CHUNK_SIZE", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("NODE_INFO_SAMPLE", "a few")])).is_err());
        assert_eq!(
            Config::from_lookup(lookup(&[("NODE_INFO_SAMPLE", "12")])).unwrap().node_info_sample,
            12
        );
    }

    #[test]
    fn test_zero_chunk_size_invalid() {
        let config = Config {
            ingest_chunk_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            backend: BackendKind::Combinatorial,
            default_cutoff: Some(42),
            ..Config::default()
        };
        let path = env::temp_dir().join(format!("trustflow-config-{}.toml", std::process::id()));

        config.save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("backend = \"combinatorial\"\n").unwrap();
        assert_eq!(config.backend, BackendKind::Combinatorial);
        assert_eq!(config.ingest_chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
