use std::path::PathBuf;

/// Server settings, read once at startup from `HOTELPARK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub user: String,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5434,
            data_dir: PathBuf::from("./data"),
            user: "hotelpark".into(),
            password: "hotelpark".into(),
            max_connections: 256,
            compact_threshold: 1000,
            tls_cert: None,
            tls_key: None,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable numbers keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse().ok());
        Self {
            bind: lookup("HOTELPARK_BIND").unwrap_or(d.bind),
            port: parsed("HOTELPARK_PORT").unwrap_or(d.port),
            data_dir: lookup("HOTELPARK_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            user: lookup("HOTELPARK_USER").unwrap_or(d.user),
            password: lookup("HOTELPARK_PASSWORD").unwrap_or(d.password),
            max_connections: lookup("HOTELPARK_MAX_CONNECTIONS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(d.max_connections),
            compact_threshold: lookup("HOTELPARK_COMPACT_THRESHOLD")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(d.compact_threshold),
            tls_cert: lookup("HOTELPARK_TLS_CERT"),
            tls_key: lookup("HOTELPARK_TLS_KEY"),
            metrics_port: parsed("HOTELPARK_METRICS_PORT"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("hotelpark.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from_pairs(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:5434");
        assert_eq!(config.wal_path(), PathBuf::from("./data/hotelpark.wal"));
    }

    #[test]
    fn overrides_are_read() {
        let config = from_pairs(&[
            ("HOTELPARK_BIND", "127.0.0.1"),
            ("HOTELPARK_PORT", "6000"),
            ("HOTELPARK_DATA_DIR", "/var/lib/hotelpark"),
            ("HOTELPARK_USER", "ops"),
            ("HOTELPARK_PASSWORD", "secret"),
            ("HOTELPARK_MAX_CONNECTIONS", "8"),
            ("HOTELPARK_COMPACT_THRESHOLD", "50"),
            ("HOTELPARK_TLS_CERT", "cert.pem"),
            ("HOTELPARK_TLS_KEY", "key.pem"),
            ("HOTELPARK_METRICS_PORT", "9100"),
        ]);
        assert_eq!(config.listen_addr(), "127.0.0.1:6000");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/hotelpark"));
        assert_eq!(config.user, "ops");
        assert_eq!(config.password, "secret");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.tls_cert.as_deref(), Some("cert.pem"));
        assert_eq!(config.tls_key.as_deref(), Some("key.pem"));
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn bad_numbers_fall_back_to_defaults() {
        let config = from_pairs(&[
            ("HOTELPARK_PORT", "not-a-port"),
            ("HOTELPARK_MAX_CONNECTIONS", "-3"),
            ("HOTELPARK_COMPACT_THRESHOLD", ""),
            ("HOTELPARK_METRICS_PORT", "99999"),
        ]);
        assert_eq!(config.port, 5434);
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.compact_threshold, 1000);
        assert_eq!(config.metrics_port, None);
    }
}
