use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub sqlite_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/alertflow.db"),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: PathBuf::from(":memory:"),
            max_connections: 1,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path.as_os_str() == ":memory:"
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sqlite_path.as_os_str().is_empty() {
            return Err("SQLite path is required".to_string());
        }
        if self.max_connections == 0 {
            return Err("Database max connections must be at least 1".to_string());
        }
        Ok(())
    }
}
