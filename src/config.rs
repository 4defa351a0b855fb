//! Path resolution and fixed daemon parameters.
//!
//! Grounded on `CBC_Setup.h`'s constants (`PATH_DIR_ROOT`, `PATH_DIR_DB`,
//! `PATH_FILE_ROFI_MENU`, `MAX_HISTORY_ITEMS`, `PREVIEW_TXT_LEN`) and `CBC_SysFile.c`'s
//! `EnsureDB`. Path resolution is hand-rolled from environment variables, in the style of
//! KasumiNova-MultiClipRelay's `paths.rs`, rather than pulling in the `dirs` crate.

use std::path::PathBuf;

use crate::error::{Error, Result};

pub const CAPACITY: usize = 1000;
pub const PREVIEW_LEN: usize = 80;
pub const INCR_CHUNK_SIZE: usize = 64 * 1024;
pub const TRANSFER_BUFFER_SIZE: usize = 128 * 1024 * 1024;
pub const INJECT_BUDGET: usize = 8 * 1024 * 1024;
pub const TRANSACTION_DEADLINE_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_dir: PathBuf,
    pub menu_file: PathBuf,
}

impl Config {
    /// Resolves the data root from `$XCLIPD_DATA_DIR`, falling back to
    /// `$HOME/.fus/.XCBC_Data` (the original daemon's literal default, generalized away
    /// from a hardcoded user).
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os("XCLIPD_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var_os("HOME").ok_or_else(|| {
                    Error::Unsupported("neither XCLIPD_DATA_DIR nor HOME is set")
                })?;
                PathBuf::from(home).join(".fus").join(".XCBC_Data")
            }
        };
        let db_dir = data_dir.join("DBs");
        let menu_file = data_dir.join("XCBRofiMenu.txt");
        Ok(Self { data_dir, db_dir, menu_file })
    }

    /// Creates the directories if missing. Never clears existing contents: the data
    /// directory is preserved across restarts (resolves the open question in DESIGN_FULL
    /// §9 in favor of "preserve").
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.db_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honors_explicit_data_dir_override() {
        std::env::set_var("XCLIPD_DATA_DIR", "/tmp/xclipd-test-override");
        let cfg = Config::load().unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/xclipd-test-override"));
        assert_eq!(cfg.db_dir, PathBuf::from("/tmp/xclipd-test-override/DBs"));
        std::env::remove_var("XCLIPD_DATA_DIR");
    }
}
