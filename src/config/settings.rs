use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

static DEFAULT_DATA_DIR: &str = "./guri-data";

const DATA_DIR_KEY: &str = "DATA_DIR";
const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const PEER_READ_TIMEOUT_KEY: &str = "PEER_READ_TIMEOUT_SECS";

/// Process-wide configuration, seeded from environment variables at first
/// access and adjustable at runtime.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();

        let data_dir = env::var(DATA_DIR_KEY).unwrap_or_else(|_| String::from(DEFAULT_DATA_DIR));
        map.insert(String::from(DATA_DIR_KEY), data_dir);

        if let Ok(addr) = env::var(NODE_ADDRESS_KEY) {
            map.insert(String::from(NODE_ADDRESS_KEY), addr);
        }

        if let Ok(timeout) = env::var(PEER_READ_TIMEOUT_KEY) {
            map.insert(String::from(PEER_READ_TIMEOUT_KEY), timeout);
        }

        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn get_data_dir(&self) -> String {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(DATA_DIR_KEY)
            .expect("Data dir should always be present in config")
            .clone()
    }

    pub fn set_data_dir(&self, dir: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(DATA_DIR_KEY), dir);
    }

    pub fn get_node_addr(&self) -> Option<String> {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner.get(NODE_ADDRESS_KEY).cloned()
    }

    pub fn set_node_addr(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(NODE_ADDRESS_KEY), addr);
    }

    /// Peer socket read timeout in seconds. Zero or unset means no timeout.
    pub fn get_peer_read_timeout_secs(&self) -> u64 {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(PEER_READ_TIMEOUT_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_peer_read_timeout_secs(&self, secs: u64) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(PEER_READ_TIMEOUT_KEY), secs.to_string());
    }
}
