//! Resolves drive states the server left as `Unknown`
//!
//! When a heal is restricted to some drives, the server only evaluates those
//! and reports the rest as unknown. A target set records what was asked for,
//! so unknown drives can be read as missing (targeted) or fine (untouched).

use crate::client::{DriveState, HealDriveInfo, HealResultItem};
use crate::heal::error::{HealError, HealResult};
use percent_encoding::percent_decode_str;
use std::collections::{HashMap, HashSet};
use url::{ParseError, Url};

pub const DEFAULT_NODE_ADDR: &str = "127.0.0.1:9000";
pub const DEFAULT_PORT: &str = "9000";

/// Node address -> drive paths. An empty path set targets the whole node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    nodes: HashMap<String, HashSet<String>>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `host[:port][/path]` specs; the port defaults to 9000.
    pub fn parse<I, S>(specs: I) -> HealResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut targets = Self::new();
        for spec in specs {
            let spec = spec.as_ref().trim();
            let (addr, path) = match spec.find('/') {
                Some(idx) => (&spec[..idx], &spec[idx..]),
                None => (spec, ""),
            };
            let (host, port) = split_host_port(addr)
                .ok_or_else(|| HealError::InvalidTarget(spec.to_string()))?;
            if host.is_empty() {
                return Err(HealError::InvalidTarget(spec.to_string()));
            }
            let port = if port.is_empty() { DEFAULT_PORT } else { port };
            if port.parse::<u16>().is_err() {
                return Err(HealError::InvalidTarget(spec.to_string()));
            }

            let node = format!("{host}:{port}");
            if path.is_empty() || path == "/" {
                targets.insert_node(node);
            } else {
                targets.insert_drive(node, path);
            }
        }
        Ok(targets)
    }

    /// Target every drive of `node`.
    pub fn insert_node(&mut self, node: impl Into<String>) {
        self.nodes.entry(node.into()).or_default().clear();
    }

    /// Target one drive. Has no effect if the whole node is already targeted.
    pub fn insert_drive(&mut self, node: impl Into<String>, path: impl Into<String>) {
        let node = node.into();
        match self.nodes.get_mut(&node) {
            Some(paths) if paths.is_empty() => {}
            Some(paths) => {
                paths.insert(path.into());
            }
            None => {
                self.nodes.insert(node, HashSet::from([path.into()]));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn drives(&self, node: &str) -> Option<&HashSet<String>> {
        self.nodes.get(node)
    }

    /// State an unknown drive at `node`/`path` should be read as.
    pub fn resolve(&self, node: &str, path: &str) -> DriveState {
        match self.nodes.get(node) {
            None => DriveState::Ok,
            Some(paths) if paths.is_empty() => DriveState::Missing,
            Some(paths) if paths.contains(path) => DriveState::Missing,
            Some(_) => DriveState::Ok,
        }
    }
}

/// Split `host[:port]`, keeping the brackets of an IPv6 literal.
fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if addr.starts_with('[') {
        let end = addr.find(']')?;
        let (host, rest) = addr.split_at(end + 1);
        return match rest {
            "" => Some((host, "")),
            _ => rest.strip_prefix(':').map(|port| (host, port)),
        };
    }
    Some(addr.rsplit_once(':').unwrap_or((addr, "")))
}

/// Split a drive endpoint into node address and drive path.
///
/// Path-only endpoints belong to the local node. The scheme's default port
/// is spelled out so `http://host:80/d` matches a `host:80` target. Returns
/// `None` for endpoints that cannot be parsed.
pub fn parse_drive_endpoint(endpoint: &str) -> Option<(String, String)> {
    match Url::parse(endpoint) {
        Ok(url) => {
            let node = match (url.host_str(), url.port_or_known_default()) {
                (None, _) | (Some(""), _) => DEFAULT_NODE_ADDR.to_string(),
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
            };
            let path = percent_decode_str(url.path()).decode_utf8_lossy();
            Some((node, path.into_owned()))
        }
        Err(ParseError::RelativeUrlWithoutBase) if endpoint.starts_with('/') => {
            Some((DEFAULT_NODE_ADDR.to_string(), endpoint.to_string()))
        }
        Err(_) => None,
    }
}

/// Replace every `Unknown` drive state in `item`, before and after alike.
pub fn reconcile(item: &mut HealResultItem, targets: &TargetSet) {
    reconcile_drives(&mut item.before, targets);
    reconcile_drives(&mut item.after, targets);
}

fn reconcile_drives(drives: &mut [HealDriveInfo], targets: &TargetSet) {
    for drive in drives.iter_mut() {
        if drive.state != DriveState::Unknown {
            continue;
        }
        if let Some((node, path)) = parse_drive_endpoint(&drive.endpoint) {
            drive.state = targets.resolve(&node, &path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(before: &[(&str, DriveState)], after: &[(&str, DriveState)]) -> HealResultItem {
        let drives = |list: &[(&str, DriveState)]| -> Vec<HealDriveInfo> {
            list.iter()
                .map(|(endpoint, state)| HealDriveInfo::new(*endpoint, *state))
                .collect()
        };
        HealResultItem {
            bucket: "b".to_string(),
            object: "o".to_string(),
            before: drives(before),
            after: drives(after),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_targets() {
        let targets =
            TargetSet::parse(["10.0.0.1", "10.0.0.2:9001/data1", "10.0.0.2:9001/data2"]).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.drives("10.0.0.1:9000").unwrap().is_empty());
        let paths = targets.drives("10.0.0.2:9001").unwrap();
        assert!(paths.contains("/data1"));
        assert!(paths.contains("/data2"));
    }

    #[test]
    fn test_parse_rejects_bad_targets() {
        assert!(TargetSet::parse([":9000"]).is_err());
        assert!(TargetSet::parse(["host:notaport"]).is_err());
        assert!(TargetSet::parse(["[::1"]).is_err());
        assert!(TargetSet::parse(["[::1]9000"]).is_err());
    }

    #[test]
    fn test_parse_ipv6_targets() {
        let targets = TargetSet::parse(["[::1]", "[fd00::2]:9001/data1"]).unwrap();
        assert!(targets.drives("[::1]:9000").unwrap().is_empty());
        assert!(targets.drives("[fd00::2]:9001").unwrap().contains("/data1"));

        let mut result = item(&[("http://[fd00::2]:9001/data1", DriveState::Unknown)], &[]);
        reconcile(&mut result, &targets);
        assert_eq!(result.before[0].state, DriveState::Missing);
    }

    #[test]
    fn test_default_port_endpoint_matches_target() {
        assert_eq!(
            parse_drive_endpoint("http://10.0.0.1:80/d1"),
            Some(("10.0.0.1:80".to_string(), "/d1".to_string()))
        );
        let targets = TargetSet::parse(["10.0.0.1:80/d1", "10.0.0.2:443"]).unwrap();
        let mut result = item(
            &[
                ("http://10.0.0.1:80/d1", DriveState::Unknown),
                ("https://10.0.0.2/d1", DriveState::Unknown),
            ],
            &[],
        );
        reconcile(&mut result, &targets);
        assert_eq!(result.before[0].state, DriveState::Missing);
        assert_eq!(result.before[1].state, DriveState::Missing);
    }

    #[test]
    fn test_endpoint_path_is_decoded() {
        assert_eq!(
            parse_drive_endpoint("http://10.0.0.1:9000/mnt/disk%201"),
            Some(("10.0.0.1:9000".to_string(), "/mnt/disk 1".to_string()))
        );
        let mut targets = TargetSet::new();
        targets.insert_drive("10.0.0.1:9000", "/mnt/disk 1");
        let mut result = item(&[("http://10.0.0.1:9000/mnt/disk 1", DriveState::Unknown)], &[]);
        reconcile(&mut result, &targets);
        assert_eq!(result.before[0].state, DriveState::Missing);
    }

    #[test]
    fn test_whole_node_wins() {
        let mut targets = TargetSet::new();
        targets.insert_drive("n:9000", "/d1");
        targets.insert_node("n:9000");
        targets.insert_drive("n:9000", "/d2");
        assert!(targets.drives("n:9000").unwrap().is_empty());
    }

    #[test]
    fn test_parse_drive_endpoint() {
        assert_eq!(
            parse_drive_endpoint("http://10.0.0.1:9000/data1"),
            Some(("10.0.0.1:9000".to_string(), "/data1".to_string()))
        );
        assert_eq!(
            parse_drive_endpoint("/mnt/disk1"),
            Some((DEFAULT_NODE_ADDR.to_string(), "/mnt/disk1".to_string()))
        );
        assert_eq!(parse_drive_endpoint("http://[::1"), None);
    }

    #[test]
    fn test_reconcile_rules() {
        let mut targets = TargetSet::new();
        targets.insert_drive("10.0.0.1:9000", "/d1");
        targets.insert_node("10.0.0.2:9000");

        let mut result = item(
            &[
                ("http://10.0.0.1:9000/d1", DriveState::Unknown),
                ("http://10.0.0.1:9000/d2", DriveState::Unknown),
                ("http://10.0.0.2:9000/d1", DriveState::Unknown),
                ("http://10.0.0.3:9000/d1", DriveState::Unknown),
                ("http://10.0.0.3:9000/d2", DriveState::Corrupted),
            ],
            &[
                ("http://10.0.0.1:9000/d1", DriveState::Unknown),
                ("http://10.0.0.2:9000/d1", DriveState::Unknown),
                ("http://10.0.0.3:9000/d1", DriveState::Offline),
            ],
        );
        reconcile(&mut result, &targets);

        let before: Vec<DriveState> = result.before.iter().map(|d| d.state).collect();
        assert_eq!(
            before,
            vec![
                DriveState::Missing,
                DriveState::Ok,
                DriveState::Missing,
                DriveState::Ok,
                DriveState::Corrupted,
            ]
        );
        let after: Vec<DriveState> = result.after.iter().map(|d| d.state).collect();
        // whole-node targets apply after the heal too
        assert_eq!(
            after,
            vec![DriveState::Missing, DriveState::Missing, DriveState::Offline]
        );
    }

    #[test]
    fn test_local_endpoint_uses_default_node() {
        let mut targets = TargetSet::new();
        targets.insert_drive(DEFAULT_NODE_ADDR, "/mnt/disk1");

        let mut result = item(&[("/mnt/disk1", DriveState::Unknown)], &[]);
        reconcile(&mut result, &targets);
        assert_eq!(result.before[0].state, DriveState::Missing);
    }

    #[test]
    fn test_unparseable_endpoint_stays_unknown() {
        let mut result = item(&[("http://[::1", DriveState::Unknown)], &[]);
        reconcile(&mut result, &TargetSet::new());
        assert_eq!(result.before[0].state, DriveState::Unknown);
    }
}
