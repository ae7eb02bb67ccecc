// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Session parsing for `nvme list-subsys -o json`
//!
//! Depending on the nvme-cli release the document is either a single host object
//! or an array of them. Each host lists its subsystems and every subsystem lists
//! the controller paths that connect to it. One [`Session`] is produced per path.

use std::{fmt, sync::OnceLock};

use log::{debug, error};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use serde_with::{serde_as, DefaultOnNull};

use crate::Transport;

/// Dotted quad IPv4 address
static IPV4_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Controller state as reported by the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected and usable
    Live,
    /// Being torn down
    Deleting,
    /// (Re)connecting
    Connecting,
    /// Any other state, kept verbatim
    Other(String),
}

impl SessionState {
    /// The state string as printed by `nvme`
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Live => "live",
            SessionState::Deleting => "deleting",
            SessionState::Connecting => "connecting",
            SessionState::Other(state) => state,
        }
    }
}

impl From<&str> for SessionState {
    fn from(value: &str) -> Self {
        match value {
            "live" => Self::Live,
            "deleting" => Self::Deleting,
            "connecting" => Self::Connecting,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One controller path to a connected subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Subsystem NQN
    pub target: String,
    /// `ip:port` for TCP, the remote port address for Fibre Channel
    pub portal: String,
    /// Local controller name (e.g. nvme3)
    pub name: String,
    /// Transport of the path
    pub transport: Transport,
    /// Controller state
    pub state: SessionState,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} at {} [{}, {}]",
            self.name, self.target, self.portal, self.transport, self.state
        )
    }
}

/// Either top level layout of `list-subsys`
#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Hosts(Vec<Host>),
    Host(Host),
}

/// Subsystems and their paths are kept loosely typed so one odd entry never
/// sinks its siblings
#[serde_as]
#[derive(Deserialize)]
struct Host {
    #[serde(rename = "Subsystems", default)]
    #[serde_as(as = "DefaultOnNull")]
    subsystems: Vec<Value>,
}

// String value of a field, empty when absent or not a string
fn field<'a>(object: &'a Map<String, Value>, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or_default()
}

// Object elements of an array field, anything else is skipped
fn objects<'a>(object: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    object
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

// Split an address such as `traddr=10.1.1.1,trsvcid=4420,src_addr=10.1.1.2`
fn address_tokens(address: &str) -> impl Iterator<Item = &str> {
    address
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

fn tcp_portal(address: &str) -> String {
    let regex = IPV4_PATTERN.get_or_init(|| {
        Regex::new(r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(\.(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)){3}")
            .expect("Failed to initialise known-working regex")
    });

    let Some(host) = regex.find(address) else {
        return String::new();
    };

    match address_tokens(address).find_map(|token| token.strip_prefix("trsvcid=")) {
        Some(port) => format!("{}:{}", host.as_str(), port.replace('"', "")),
        None => host.as_str().to_owned(),
    }
}

fn fc_portal(address: &str) -> String {
    let token = address_tokens(address).next().unwrap_or_default();
    match token.split_once('=') {
        Some((_, value)) => value.to_owned(),
        None => token.to_owned(),
    }
}

/// Parse the stdout of `nvme list-subsys -o json`
///
/// Sessions are returned subsystem by subsystem, path by path. Paths over any
/// transport other than TCP or Fibre Channel are skipped. A document that cannot
/// be parsed is logged and yields no sessions.
pub fn parse(data: &[u8]) -> Vec<Session> {
    if data.iter().all(u8::is_ascii_whitespace) {
        debug!("Empty list-subsys output");
        return Vec::new();
    }

    let hosts = match serde_json::from_slice::<Document>(data) {
        Ok(Document::Hosts(hosts)) => hosts,
        Ok(Document::Host(host)) => vec![host],
        Err(e) => {
            error!("Failed to parse list-subsys output: {e}");
            return Vec::new();
        }
    };

    let mut sessions = Vec::new();

    let subsystems = hosts
        .iter()
        .flat_map(|host| &host.subsystems)
        .filter_map(Value::as_object);

    for subsystem in subsystems {
        let nqn = field(subsystem, "NQN");
        for path in objects(subsystem, "Paths") {
            let name = field(path, "Name");
            let address = field(path, "Address");
            let (transport, portal) = match field(path, "Transport") {
                "tcp" => (Transport::Tcp, tcp_portal(address)),
                "fc" => (Transport::Fc, fc_portal(address)),
                other => {
                    debug!("Skipping path {name} with transport {other:?}");
                    continue;
                }
            };

            sessions.push(Session {
                target: nqn.to_owned(),
                portal,
                name: name.to_owned(),
                transport,
                state: field(path, "State").into(),
            });
        }
    }

    sessions
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY: &str = include_str!("../tests/data/list-subsys-array.json");
    const LEGACY: &str = include_str!("../tests/data/list-subsys-legacy.json");

    #[test]
    fn test_single_tcp_object() {
        let input = r#"{"HostNQN":"x","HostID":"y","Subsystems":[{"NQN":"nqn.A","Paths":[{"Name":"nvme3","Transport":"tcp","Address":"traddr=10.1.1.1,trsvcid=4420,src_addr=10.1.1.2","State":"live"}]}]}"#;
        let sessions = parse(input.as_bytes());
        assert_eq!(
            sessions,
            vec![Session {
                target: "nqn.A".into(),
                portal: "10.1.1.1:4420".into(),
                name: "nvme3".into(),
                transport: Transport::Tcp,
                state: SessionState::Live,
            }]
        );
    }

    #[test]
    fn test_fc_portal_has_no_port() {
        let input = r#"{"Subsystems":[{"NQN":"nqn.B","Paths":[{"Name":"nvme1","Transport":"fc","Address":"traddr=0x10000090ff1e1234","State":"live"}]}]}"#;
        let sessions = parse(input.as_bytes());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].portal, "0x10000090ff1e1234");
        assert_eq!(sessions[0].transport, Transport::Fc);
    }

    #[test_log::test]
    fn test_array_document() {
        let sessions = parse(ARRAY.as_bytes());

        // nvme9 uses an unknown transport and is skipped, its siblings are not
        let names: Vec<_> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["nvme3", "nvme2", "nvme4"]);

        assert_eq!(sessions[0].portal, "10.1.1.1:4420");
        assert_eq!(sessions[1].portal, "10.1.1.2:4420");
        assert_eq!(sessions[1].state, SessionState::Connecting);
        assert_eq!(sessions[2].target, "nqn.1988-11.com.dell:mock:00:2b2222b2222bBB22222B");
        assert_eq!(sessions[2].portal, "nn-0x58ccf090c9200c02:pn-0x58ccf091492b0c02");
        assert_eq!(sessions[2].state, SessionState::Deleting);
    }

    #[test]
    fn test_legacy_object_document() {
        let sessions = parse(LEGACY.as_bytes());
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].portal, "10.1.1.5:4420");
        assert_eq!(sessions[0].state, SessionState::Other("resetting".into()));
        assert_eq!(sessions[0].state.to_string(), "resetting");
        assert_eq!(sessions[1].portal, "0x10000090ff1e1234");
    }

    #[test]
    fn test_parse_is_repeatable() {
        assert_eq!(parse(ARRAY.as_bytes()), parse(ARRAY.as_bytes()));
    }

    #[test]
    fn test_tcp_without_ipv4() {
        let input = r#"{"Subsystems":[{"NQN":"nqn.C","Paths":[{"Name":"nvme5","Transport":"tcp","Address":"traddr=fe80::1,trsvcid=4420","State":"live"}]}]}"#;
        let sessions = parse(input.as_bytes());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].portal, "");
    }

    #[test]
    fn test_null_and_missing_fields() {
        let input = r#"[{"Subsystems":null},{"Subsystems":[{"NQN":"nqn.D","Paths":null},{"NQN":"nqn.E","Paths":[{"Name":7,"Transport":"tcp","Address":"traddr=10.0.0.7,trsvcid=8009"}]}]}]"#;
        let sessions = parse(input.as_bytes());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].target, "nqn.E");
        assert_eq!(sessions[0].name, "");
        assert_eq!(sessions[0].portal, "10.0.0.7:8009");
        assert_eq!(sessions[0].state, SessionState::Other(String::new()));
    }

    #[test]
    fn test_odd_subsystem_keeps_siblings() {
        let input = r#"{"Subsystems":[
            {"NQN":5,"Paths":[]},
            "not a subsystem",
            {"NQN":"nqn.ok","Paths":[
                42,
                {"Name":"nvme1","Transport":"tcp","Address":"traddr=10.1.1.1,trsvcid=4420","State":"live"}
            ]},
            {"NQN":"nqn.odd-paths","Paths":{"Name":"nvme2"}}
        ]}"#;
        let sessions = parse(input.as_bytes());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].target, "nqn.ok");
        assert_eq!(sessions[0].name, "nvme1");
        assert_eq!(sessions[0].portal, "10.1.1.1:4420");
    }

    #[test_log::test]
    fn test_malformed_documents() {
        for input in [
            "",
            "   \n",
            "not json",
            "{",
            r#"[{"Subsystems":[{"NQN":"nqn.A","Paths":[{"Name":"nvme3",]}]}]"#,
            r#"{"Subsystems":"nope"}"#,
            "42",
        ] {
            assert!(parse(input.as_bytes()).is_empty(), "expected no sessions for {input:?}");
        }
    }
}
