//! Runtime configuration, built from CLI args in `src/cli.rs`.

use std::path::PathBuf;

use serde::Serialize;

use crate::utils::constants::{DEFAULT_CLIENT_PORT, DEFAULT_DHT_PORT, DEFAULT_SERVER_PORT};

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub host_ip: String,
    pub server_port: u16,
    pub dht_port: u16,
    pub client_port: u16,
    pub secret: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn new(host_ip: String, secret: String, data_dir: PathBuf) -> Self {
        Config {
            host_ip,
            server_port: DEFAULT_SERVER_PORT,
            dht_port: DEFAULT_DHT_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            secret,
            data_dir,
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host_ip, self.server_port)
    }

    pub fn dht_address(&self) -> String {
        format!("{}:{}", self.host_ip, self.dht_port)
    }

    pub fn client_address(&self) -> String {
        format!("{}:{}", self.host_ip, self.client_port)
    }

    /// Path under `data_dir` a data-ring value should be persisted to for
    /// `<user>:<path>`: `<data_dir>/<username>/<sys_path>`.
    pub fn persist_path(&self, username: &str, sys_path: &str) -> PathBuf {
        self.data_dir.join(username).join(sys_path)
    }
}
