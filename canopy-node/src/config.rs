//! Load config from file and environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

/// Node configuration. File: ~/.config/canopy/config.toml or
/// /etc/canopy/config.toml. Env overrides: CANOPY_BIND, CANOPY_PARENT,
/// CANOPY_NAME, CANOPY_PING_SECS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP bind address (default 0.0.0.0:45750).
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Parent node to attach under. Absent: start as a root.
    #[serde(default)]
    pub parent: Option<SocketAddr>,
    /// Display name prefixed to every line this node injects.
    #[serde(default = "default_name")]
    pub name: String,
    /// Seconds between ping ticks (default 4).
    #[serde(default = "default_ping_secs")]
    pub ping_secs: u64,
}

fn default_bind() -> SocketAddr {
    "0.0.0.0:45750".parse().expect("static default address")
}
fn default_name() -> String {
    "anon".to_string()
}
fn default_ping_secs() -> u64 {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            parent: None,
            name: default_name(),
            ping_secs: default_ping_secs(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("CANOPY_BIND") {
        if let Ok(a) = s.parse::<SocketAddr>() {
            c.bind = a;
        }
    }
    if let Ok(s) = std::env::var("CANOPY_PARENT") {
        if let Ok(a) = s.parse::<SocketAddr>() {
            c.parent = Some(a);
        }
    }
    if let Ok(s) = std::env::var("CANOPY_NAME") {
        if !s.is_empty() {
            c.name = s;
        }
    }
    if let Ok(s) = std::env::var("CANOPY_PING_SECS") {
        if let Ok(n) = s.parse::<u64>() {
            if n > 0 {
                c.ping_secs = n;
            }
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/canopy/config.toml"));
    }
    out.push(PathBuf::from("/etc/canopy/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_file() {
        let c: Config = toml::from_str(
            r#"
            bind = "127.0.0.1:5000"
            parent = "127.0.0.1:5001"
            name = "alice"
            ping_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(c.bind, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(c.parent, Some("127.0.0.1:5001".parse().unwrap()));
        assert_eq!(c.name, "alice");
        assert_eq!(c.ping_secs, 2);
    }

    #[test]
    fn empty_file_gives_rootless_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.parent, None);
        assert_eq!(c.ping_secs, 4);
    }
}
