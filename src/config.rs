use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::services::ledger::LoadPolicy;

/// Which durable table format backs the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// A single CSV file, replaced atomically on every save.
    Csv,
    /// A single SQLite database with one `referrals` table.
    Sqlite,
}

impl StorageBackend {
    /// `.db`, `.sqlite` and `.sqlite3` files are SQLite; anything else is CSV.
    pub fn infer(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("db") | Some("sqlite") | Some("sqlite3") => Self::Sqlite,
            _ => Self::Csv,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(()),
        }
    }
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ledger_path: PathBuf,
    pub storage: StorageBackend,
    pub migrations_path: PathBuf,
    pub load_policy: LoadPolicy,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let ledger_path = env::var("REFTRACK_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/referrals.csv"));

        let storage = match env::var("REFTRACK_STORAGE") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %value,
                    "Unknown REFTRACK_STORAGE, inferring backend from ledger path"
                );
                StorageBackend::infer(&ledger_path)
            }),
            Err(_) => StorageBackend::infer(&ledger_path),
        };

        let load_policy = if env_flag("REFTRACK_STRICT_LOAD") {
            LoadPolicy::Strict
        } else {
            LoadPolicy::Lenient
        };

        Self {
            host: env::var("REFTRACK_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("REFTRACK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(7070),
            ledger_path,
            storage,
            migrations_path: env::var("REFTRACK_MIGRATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("migrations")),
            load_policy,
            max_upload_bytes: env::var("REFTRACK_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_inferred_from_extension() {
        assert_eq!(
            StorageBackend::infer(Path::new("data/referrals.csv")),
            StorageBackend::Csv
        );
        assert_eq!(
            StorageBackend::infer(Path::new("data/referrals.DB")),
            StorageBackend::Sqlite
        );
        assert_eq!(
            StorageBackend::infer(Path::new("data/referrals.sqlite3")),
            StorageBackend::Sqlite
        );
        assert_eq!(
            StorageBackend::infer(Path::new("referrals")),
            StorageBackend::Csv
        );
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("SQLite".parse(), Ok(StorageBackend::Sqlite));
        assert_eq!(" csv ".parse(), Ok(StorageBackend::Csv));
        assert_eq!("parquet".parse::<StorageBackend>(), Err(()));
    }
}
