use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use seclink_protocol::{MemberId, MembershipRegistry, RoutePolicy};

/// Decode a hex-encoded shared key.
pub fn parse_key(s: &str) -> anyhow::Result<Vec<u8>> {
    let key = hex::decode(s.trim()).map_err(|e| anyhow::anyhow!("invalid hex key: {e}"))?;
    anyhow::ensure!(!key.is_empty(), "key must not be empty");
    Ok(key)
}

/// Registry from the `--members` list.
pub fn registry(members: &[MemberId]) -> Arc<MembershipRegistry> {
    Arc::new(MembershipRegistry::with_members(members.iter().cloned()))
}

/// Load a route policy from a JSON file.
pub fn load_policy(path: &Path) -> anyhow::Result<RoutePolicy> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading policy {}", path.display()))?;
    RoutePolicy::from_json(&text).with_context(|| format!("parsing policy {}", path.display()))
}

/// Read the whole of `path`, or stdin when absent or `-`.
pub fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => {
            fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))
        }
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}
