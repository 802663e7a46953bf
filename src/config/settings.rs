use crate::error::{BlockchainError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_WALLET_FILE: &str = "wallet.dat";
const DEFAULT_CONFIG_FILE: &str = "ledger.toml";
const BLOCKS_DB_DIR: &str = "blocks";

/// Leading zero bits required of a block hash; 20 gives the target `1 << 236`.
pub const DEFAULT_TARGET_BITS: u32 = 20;
pub const DEFAULT_MINING_WORKERS: usize = 1;
pub const MAX_TARGET_BITS: u32 = 255;

const CONFIG_FILE_KEY: &str = "LEDGER_CONFIG";
const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const WALLET_FILE_KEY: &str = "LEDGER_WALLET_FILE";
const TARGET_BITS_KEY: &str = "LEDGER_TARGET_BITS";
const MINING_WORKERS_KEY: &str = "LEDGER_MINING_WORKERS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub wallet_file: PathBuf,
    pub target_bits: u32,
    pub mining_workers: usize,
}

/// Optional keys read from `ledger.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    wallet_file: Option<PathBuf>,
    target_bits: Option<u32>,
    mining_workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            wallet_file: PathBuf::from(DEFAULT_WALLET_FILE),
            target_bits: DEFAULT_TARGET_BITS,
            mining_workers: DEFAULT_MINING_WORKERS,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if any), then `LEDGER_*` environment variables.
    pub fn load() -> Result<Config> {
        let mut config = Config::default();

        let explicit = env::var(CONFIG_FILE_KEY).ok().map(PathBuf::from);
        let file_path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if file_path.exists() {
            config.merge_file(&file_path)?;
        } else if let Some(path) = explicit {
            return Err(BlockchainError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        self.merge_toml(&contents)
    }

    fn merge_toml(&mut self, contents: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(contents)?;
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(wallet_file) = file.wallet_file {
            self.wallet_file = wallet_file;
        }
        if let Some(target_bits) = file.target_bits {
            self.target_bits = target_bits;
        }
        if let Some(workers) = file.mining_workers {
            self.mining_workers = workers;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup(WALLET_FILE_KEY) {
            self.wallet_file = PathBuf::from(file);
        }
        if let Some(bits) = lookup(TARGET_BITS_KEY) {
            self.target_bits = bits.trim().parse().map_err(|e| {
                BlockchainError::Config(format!("{TARGET_BITS_KEY}={bits}: {e}"))
            })?;
        }
        if let Some(workers) = lookup(MINING_WORKERS_KEY) {
            self.mining_workers = workers.trim().parse().map_err(|e| {
                BlockchainError::Config(format!("{MINING_WORKERS_KEY}={workers}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_bits == 0 || self.target_bits > MAX_TARGET_BITS {
            return Err(BlockchainError::Config(format!(
                "target_bits must be between 1 and {MAX_TARGET_BITS}, got {}",
                self.target_bits
            )));
        }
        if self.mining_workers == 0 {
            return Err(BlockchainError::Config(
                "mining_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory of the sled database holding the block tree.
    pub fn blocks_path(&self) -> PathBuf {
        self.data_dir.join(BLOCKS_DB_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_bits, 20);
        assert_eq!(config.mining_workers, 1);
        assert_eq!(config.blocks_path(), PathBuf::from("data").join("blocks"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let mut config = Config::default();
        config
            .merge_toml("data_dir = \"/tmp/ledger\"\ntarget_bits = 12\n")
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.target_bits, 12);
        assert_eq!(config.wallet_file, PathBuf::from(DEFAULT_WALLET_FILE));
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let mut config = Config::default();
        let result = config.merge_toml("difficulty = 3\n");
        assert!(matches!(result, Err(BlockchainError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (TARGET_BITS_KEY, "8"),
            (MINING_WORKERS_KEY, "4"),
            (WALLET_FILE_KEY, "keys.dat"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.target_bits, 8);
        assert_eq!(config.mining_workers, 4);
        assert_eq!(config.wallet_file, PathBuf::from("keys.dat"));
    }

    #[test]
    fn test_env_parse_failure() {
        let mut config = Config::default();
        let result = config.apply_env(|key| {
            (key == TARGET_BITS_KEY).then(|| "many".to_string())
        });
        assert!(matches!(result, Err(BlockchainError::Config(_))));
    }

    #[test]
    fn test_validation_bounds() {
        let zero_bits = Config {
            target_bits: 0,
            ..Config::default()
        };
        assert!(zero_bits.validate().is_err());

        let no_workers = Config {
            mining_workers: 0,
            ..Config::default()
        };
        assert!(no_workers.validate().is_err());
    }
}
