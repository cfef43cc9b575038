use std::path::PathBuf;

use anyhow::{Context, Result};

/// Server settings, read from `VELLUM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Largest history page a client may request
    pub history_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("VELLUM_DB_PATH").unwrap_or_else(|| "vellum.db".into());
        let host = lookup("VELLUM_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("VELLUM_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("VELLUM_PORT must be a port number")?;
        let history_limit = lookup("VELLUM_HISTORY_LIMIT")
            .unwrap_or_else(|| "200".into())
            .parse()
            .context("VELLUM_HISTORY_LIMIT must be a positive integer")?;
        if history_limit == 0 {
            anyhow::bail!("VELLUM_HISTORY_LIMIT must be a positive integer");
        }

        Ok(Self {
            db_path: PathBuf::from(db_path),
            host,
            port,
            history_limit,
        })
    }
}
