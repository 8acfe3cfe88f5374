//! Environment configuration for the happy thoughts service.

use std::env;

pub const DEFAULT_DB_PATH: &str = "./happy_thoughts.db";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite file path, or `:memory:`.
    pub db_path: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("HAPPY_THOUGHTS_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let host = lookup("HAPPY_THOUGHTS_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        // PORT is what most hosting platforms inject
        let port = lookup("HAPPY_THOUGHTS_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|s| match s.parse() {
                Ok(port) => Some(port),
                Err(e) => {
                    log::warn!("Invalid port {:?} ({}), using default {}", s, e, DEFAULT_PORT);
                    None
                }
            })
            .unwrap_or(DEFAULT_PORT);

        Self { db_path, host, port }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
