use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::NodeConfig;

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/dawn/node.yaml"));
    paths.push(PathBuf::from("/etc/dawn/node.yml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("dawn/node.yaml"));
        paths.push(cfg.join("dawn/node.yml"));
    }

    paths.push(PathBuf::from(".dawn/node.yaml"));
    paths.push(PathBuf::from(".dawn/node.yml"));
    paths.push(PathBuf::from("dawn.yaml"));
    paths.push(PathBuf::from("dawn.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, an optional
/// explicit path (e.g. a `--config` CLI flag), and finally the `NODE_*`
/// environment variables, which win over every file layer.
pub fn load(extra: Option<&Path>) -> anyhow::Result<NodeConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_file(&mut merged, &path)?;
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_file(&mut merged, p)?;
    }

    let mut config: NodeConfig =
        if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
            NodeConfig::default()
        } else {
            serde_yaml::from_value(merged).unwrap_or_else(|_| NodeConfig::default())
        };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn merge_file(dst: &mut serde_yaml::Value, path: &Path) -> anyhow::Result<()> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let layer: serde_yaml::Value =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    merge_yaml(dst, layer);
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Apply the `NODE_*` environment variables over whatever the YAML
/// layers produced. Environment always wins — this is the same
/// "later layer overrides earlier" rule the YAML merge itself follows,
/// extended one step further to the process environment.
fn apply_env_overrides(config: &mut NodeConfig) -> anyhow::Result<()> {
    if let Ok(v) = std::env::var("NODE_LISTEN_ADDRESS") {
        config.listen_address = v;
    }
    if let Ok(v) = std::env::var("NODE_IDENTITY_PATH") {
        config.identity_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("NODE_BOOTSTRAP_PEERS") {
        config.bootstrap_peers = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Ok(v) = std::env::var("NODE_DISCOVERY_MULTICAST") {
        config.discovery_multicast = matches!(v.as_str(), "1" | "true" | "TRUE" | "yes");
    }
    if let Ok(v) = std::env::var("NODE_GOSSIP_INTERVAL_S") {
        config.gossip_interval_secs = v
            .parse()
            .with_context(|| format!("NODE_GOSSIP_INTERVAL_S={v:?} is not a valid integer"))?;
    }
    if let Ok(v) = std::env::var("NODE_CLIENT_ATTACH_ADDRESS") {
        config.client_attach_address = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst: serde_yaml::Value = serde_yaml::from_str("x: 1").unwrap();
        let src: serde_yaml::Value = serde_yaml::from_str("x: 2").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn load_with_no_files_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let cfg = load(None).unwrap();
        std::env::set_current_dir(cwd).unwrap();
        assert_eq!(cfg.gossip_interval_secs, 60);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "listen_address: /ip4/0.0.0.0/tcp/4001").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.listen_address, "/ip4/0.0.0.0/tcp/4001");
    }

    #[test]
    fn env_overrides_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "gossip_interval_secs: 10").unwrap();
        std::env::set_var("NODE_GOSSIP_INTERVAL_S", "5");
        let cfg = load(Some(f.path())).unwrap();
        std::env::remove_var("NODE_GOSSIP_INTERVAL_S");
        assert_eq!(cfg.gossip_interval_secs, 5);
    }

    #[test]
    fn env_bootstrap_peers_split_on_comma() {
        std::env::set_var("NODE_BOOTSTRAP_PEERS", "/ip4/1.2.3.4/tcp/1, /ip4/5.6.7.8/tcp/2");
        let cfg = load(None).unwrap();
        std::env::remove_var("NODE_BOOTSTRAP_PEERS");
        assert_eq!(cfg.bootstrap_peers.len(), 2);
    }
}
