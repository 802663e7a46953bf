use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use log::info;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallet.dat";

/// Address-to-key-pair registry backed by a single wallet file.
///
/// The file is read once in [`Wallets::open`] and rewritten after every mutation.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    path: PathBuf,
}

impl Wallets {
    /// Loads the registry at `path`. A missing file yields an empty registry.
    pub fn open(path: impl AsRef<Path>) -> Result<Wallets> {
        let path = path.as_ref().to_path_buf();
        let wallets = Self::load_from_file(&path)?;
        Ok(Wallets { wallets, path })
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let address = self.add_wallet(Wallet::new()?)?;
        info!("Created wallet {address}");
        Ok(address)
    }

    /// Registers an existing key pair under its address and saves the file.
    pub fn add_wallet(&mut self, wallet: Wallet) -> Result<String> {
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn get_path(&self) -> &Path {
        self.path.as_path()
    }

    fn load_from_file(path: &Path) -> Result<HashMap<String, Wallet>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        deserialize(&buf[..]).map_err(|e| {
            BlockchainError::Serialization(format!(
                "Corrupt wallet file {}: {e}",
                path.display()
            ))
        })
    }

    // Writes a sibling temp file and renames it so a crash never leaves a torn file.
    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| BlockchainError::Io(e.to_string()))?
            .sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
