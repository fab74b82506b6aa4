//! The fleet configuration document.
//!
//! One `servers.json` describes the whole fleet: identity defaults, named
//! command sequences, and one entry per managed server. The document is
//! loaded once per invocation and shared read-only with every worker.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::ConvoyError;

/// The one `status` value with meaning: the host is administratively
/// excluded from every operation.
pub const STATUS_SHUTDOWN: &str = "shutdown";

/// `value` if non-empty, else `fallback`. The merge rule used both for
/// credential resolution and for `--mod` field patching.
pub(crate) fn pick<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    pub addr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub passwd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

impl Host {
    pub fn is_shutdown(&self) -> bool {
        self.status == STATUS_SHUTDOWN
    }

    /// Port to dial, defaulting to 22 when the entry leaves it out.
    pub fn effective_port(&self) -> &str {
        pick(&self.port, "22")
    }

    /// `addr:port` dial target. Stray whitespace in `addr` is tolerated.
    pub fn target(&self) -> String {
        format!("{}:{}", self.addr.trim(), self.effective_port())
    }
}

/// Identity fields at fleet scope, used as fallback when a server entry
/// omits them, plus the named command sequences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetDefaults {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub passwd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub commands: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fleet {
    #[serde(flatten)]
    pub defaults: FleetDefaults,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub servers: HashMap<String, Host>,
}

impl Fleet {
    pub fn load(path: &Path) -> Result<Self, ConvoyError> {
        let text = fs::read_to_string(path).map_err(|source| ConvoyError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConvoyError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConvoyError> {
        // Serializing a struct we built cannot fail; only the write can.
        let mut text = serde_json::to_string_pretty(self).unwrap_or_default();
        text.push('\n');
        fs::write(path, text).map_err(|source| ConvoyError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Starter document written by `--build`. The sample server is marked
    /// shutdown so a fresh config never dispatches anywhere by accident.
    pub fn template() -> Self {
        let mut commands = HashMap::new();
        commands.insert(
            "test".to_string(),
            vec!["echo \"Hello from $SERVER_NAME\"".to_string(), "uptime".to_string()],
        );
        let mut servers = HashMap::new();
        servers.insert(
            "ubuntu1".to_string(),
            Host {
                status: STATUS_SHUTDOWN.to_string(),
                addr: "192.168.0.100".to_string(),
                ..Host::default()
            },
        );
        Self {
            defaults: FleetDefaults {
                user: "root".to_string(),
                passwd: "112233".to_string(),
                key: String::new(),
                commands,
            },
            servers,
        }
    }

    /// Servers matching `names`, every server when `names` is empty.
    /// Selection is a set: duplicates collapse, order is by name. Names
    /// that match nothing are returned separately for reporting.
    pub fn select(&self, names: &[String]) -> (Vec<(&String, &Host)>, Vec<String>) {
        if names.is_empty() {
            let all = self
                .servers
                .iter()
                .sorted_by(|a, b| a.0.cmp(b.0))
                .collect();
            return (all, Vec::new());
        }
        let mut selected = Vec::new();
        let mut unknown = Vec::new();
        for name in names.iter().sorted().dedup() {
            match self.servers.get_key_value(name) {
                Some(entry) => selected.push(entry),
                None => unknown.push(name.clone()),
            }
        }
        (selected, unknown)
    }

    /// Insert or patch one server entry. Empty patch fields keep the
    /// existing value; a new entry takes the patch as-is. The merged entry
    /// must end up with an address, since everything else is optional.
    pub fn upsert(&mut self, name: &str, patch: Host) -> Result<(), ConvoyError> {
        let merged = match self.servers.get(name) {
            Some(current) => Host {
                status: pick(&patch.status, &current.status).to_string(),
                addr: pick(&patch.addr, &current.addr).to_string(),
                port: pick(&patch.port, &current.port).to_string(),
                user: pick(&patch.user, &current.user).to_string(),
                passwd: pick(&patch.passwd, &current.passwd).to_string(),
                key: pick(&patch.key, &current.key).to_string(),
            },
            None => patch,
        };
        if merged.addr.is_empty() {
            return Err(ConvoyError::AddrRequired(name.to_string()));
        }
        self.servers.insert(name.to_string(), merged);
        Ok(())
    }

    /// Remove one server entry. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.servers.remove(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Fleet {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn parses_full_document() {
        let fleet = parse(
            r#"{
                "user": "root",
                "passwd": "secret",
                "key": "/root/.ssh/id_rsa",
                "commands": {"test": ["echo hello", "uptime"]},
                "servers": {
                    "web1": {"addr": "10.0.0.1", "port": "2222", "user": "deploy"},
                    "db1": {"addr": "10.0.0.2", "status": "shutdown"}
                }
            }"#,
        );
        assert_eq!(fleet.defaults.user, "root");
        assert_eq!(fleet.defaults.commands["test"].len(), 2);
        assert_eq!(fleet.servers["web1"].port, "2222");
        assert!(fleet.servers["web1"].passwd.is_empty());
        assert!(fleet.servers["db1"].is_shutdown());
        assert!(!fleet.servers["web1"].is_shutdown());
    }

    #[test]
    fn parses_minimal_document() {
        let fleet = parse("{}");
        assert!(fleet.defaults.user.is_empty());
        assert!(fleet.defaults.commands.is_empty());
        assert!(fleet.servers.is_empty());
    }

    #[test]
    fn server_entry_requires_addr() {
        let result: Result<Fleet, _> =
            serde_json::from_str(r#"{"servers": {"web1": {"port": "22"}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn pick_prefers_non_empty_value() {
        assert_eq!(pick("a", "b"), "a");
        assert_eq!(pick("", "b"), "b");
        assert_eq!(pick("", ""), "");
    }

    #[test]
    fn port_defaults_to_22() {
        let host = Host {
            addr: " 10.0.0.1 ".to_string(),
            ..Host::default()
        };
        assert_eq!(host.effective_port(), "22");
        assert_eq!(host.target(), "10.0.0.1:22");
    }

    #[test]
    fn empty_selection_takes_every_server_sorted() {
        let fleet = parse(
            r#"{"servers": {
                "c": {"addr": "3"}, "a": {"addr": "1"}, "b": {"addr": "2"}
            }}"#,
        );
        let (selected, unknown) = fleet.select(&[]);
        let names: Vec<_> = selected.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(unknown.is_empty());
    }

    #[test]
    fn selection_dedups_and_reports_unknown_names() {
        let fleet = parse(r#"{"servers": {"a": {"addr": "1"}}}"#);
        let names = vec!["a".to_string(), "a".to_string(), "nope".to_string()];
        let (selected, unknown) = fleet.select(&names);
        assert_eq!(selected.len(), 1);
        assert_eq!(unknown, ["nope"]);
    }

    #[test]
    fn upsert_merges_over_existing_entry() {
        let mut fleet = parse(r#"{"servers": {"a": {"addr": "1", "user": "root"}}}"#);
        let patch = Host {
            port: "2222".to_string(),
            ..Host::default()
        };
        fleet.upsert("a", patch).unwrap();
        let host = &fleet.servers["a"];
        assert_eq!(host.addr, "1");
        assert_eq!(host.user, "root");
        assert_eq!(host.port, "2222");
    }

    #[test]
    fn upsert_rejects_new_entry_without_addr() {
        let mut fleet = Fleet::default();
        let err = fleet.upsert("a", Host::default()).unwrap_err();
        assert!(matches!(err, ConvoyError::AddrRequired(_)));
        assert!(fleet
            .upsert(
                "a",
                Host {
                    addr: "10.0.0.1".to_string(),
                    ..Host::default()
                }
            )
            .is_ok());
    }

    #[test]
    fn remove_reports_existence() {
        let mut fleet = parse(r#"{"servers": {"a": {"addr": "1"}}}"#);
        assert!(fleet.remove("a"));
        assert!(!fleet.remove("a"));
    }

    #[test]
    fn template_round_trips() {
        let text = serde_json::to_string_pretty(&Fleet::template()).unwrap();
        let fleet = parse(&text);
        assert_eq!(fleet.defaults.user, "root");
        assert!(fleet.servers["ubuntu1"].is_shutdown());
        assert!(fleet.defaults.commands.contains_key("test"));
    }
}
