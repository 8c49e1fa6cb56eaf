//! Runtime configuration: where the database lives, where the server binds
//! and how chatty the logs are.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Env var holding an `env_logger` filter, e.g. `debug` or `todos=debug`.
pub const LOG_ENV: &str = "TODOS_LOG";

fn default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".todos").join("todos.db"))
}

/// `--db` / `TODOS_DB` wins, otherwise `$HOME/.todos/todos.db`.
pub fn resolve_db_path(cli_db: Option<String>) -> Result<String> {
    match cli_db {
        Some(p) => Ok(p),
        None => {
            let path = default_db_path()?;
            Ok(path
                .to_str()
                .context("default DB path is not valid UTF-8")?
                .to_string())
        }
    }
}

pub fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

pub fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_env(LOG_ENV)
        .format_timestamp_secs()
        .init();
}
