use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Wal,
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub listen: SocketAddr,
    /// Background WAL flush interval; 0 disables the flusher.
    pub wal_flush_ms: u64,
}

impl ServerConfig {
    pub const DEFAULT_LISTEN: &'static str = "0.0.0.0:8080";

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process env.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let data_dir = get("JSONSTASH_DATA").unwrap_or_else(|| "data".to_string());
        let store = match get("JSONSTASH_STORE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "memory" | "mem" => StoreKind::Memory,
            _ => StoreKind::Wal,
        };
        let listen = get("JSONSTASH_LISTEN")
            .unwrap_or_else(|| Self::DEFAULT_LISTEN.into())
            .parse()?;
        let wal_flush_ms = get("JSONSTASH_WAL_FLUSH_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(50);
        Ok(Self {
            data_dir: data_dir.into(),
            store,
            listen,
            wal_flush_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.store, StoreKind::Wal);
        assert_eq!(cfg.listen.port(), 8080);
        assert_eq!(cfg.wal_flush_ms, 50);
    }

    #[test]
    fn overrides_and_fallbacks() {
        let cfg = ServerConfig::from_lookup(lookup(&[
            ("JSONSTASH_DATA", "/tmp/js"),
            ("JSONSTASH_STORE", "Memory"),
            ("JSONSTASH_LISTEN", "127.0.0.1:9000"),
            ("JSONSTASH_WAL_FLUSH_MS", "not-a-number"),
        ]))
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/js"));
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.listen.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.wal_flush_ms, 50);
    }

    #[test]
    fn bad_listen_address_is_an_error() {
        assert!(ServerConfig::from_lookup(lookup(&[("JSONSTASH_LISTEN", "nowhere")])).is_err());
    }
}
