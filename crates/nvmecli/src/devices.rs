// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Local namespace enumeration
//!
//! Covers `nvme list -o json`, `nvme list-ns <device>` and `nvme id-ns <device>`.
//!
//! `nvme list -o json` changed shape in nvme-cli 2.11. Older releases print a
//! flat `Devices` array:
//!
//! ```json
//! { "Devices": [ { "NameSpace": 9217, "DevicePath": "/dev/nvme0n1", ... } ] }
//! ```
//!
//! Newer releases nest namespaces below hosts and subsystems and name the block
//! device instead of giving its path:
//!
//! ```json
//! { "Devices": [ { "Subsystems": [ { "Namespaces": [ { "NameSpace": "nvme0n1", "NSID": 293 } ] } ] } ] }
//! ```
//!
//! Both are decoded with their own types, legacy first.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::Error;

const DEVFS_DIR: &str = "/dev";

/// A namespace block device and its namespace identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePathAndNamespace {
    /// Path to the block device (e.g. /dev/nvme0n1)
    pub device_path: PathBuf,
    /// Namespace identifier in decimal
    pub namespace: String,
}

impl DevicePathAndNamespace {
    /// Create a new device/namespace pair
    pub fn new(device_path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            namespace: namespace.into(),
        }
    }

    /// Returns the path to the block device.
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }
}

impl fmt::Display for DevicePathAndNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (nsid {})", self.device_path.display(), self.namespace)
    }
}

/// Identity fields from `nvme id-ns`
///
/// Either field may be empty when `nvme` did not print it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceIdentity {
    /// Namespace globally unique identifier
    pub nguid: String,
    /// Namespace identifier in decimal
    pub nsid: String,
}

impl NamespaceIdentity {
    /// Returns true when both fields were found
    pub fn is_complete(&self) -> bool {
        !self.nguid.is_empty() && !self.nsid.is_empty()
    }
}

/// `nvme list -o json` before nvme-cli 2.11
#[derive(Deserialize)]
struct LegacyList {
    #[serde(rename = "Devices")]
    devices: Vec<LegacyDevice>,
}

#[serde_as]
#[derive(Deserialize)]
struct LegacyDevice {
    #[serde(rename = "NameSpace")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    namespace: u64,

    #[serde(rename = "DevicePath")]
    device_path: PathBuf,
}

/// `nvme list -o json` from nvme-cli 2.11
#[derive(Deserialize)]
struct HostList {
    #[serde(rename = "Devices")]
    hosts: Vec<Host>,
}

#[derive(Deserialize)]
struct Host {
    #[serde(rename = "Subsystems")]
    subsystems: Vec<Subsystem>,
}

#[derive(Deserialize)]
struct Subsystem {
    /// Multipath namespaces hang off the subsystem
    #[serde(rename = "Namespaces", default)]
    namespaces: Vec<Namespace>,

    /// Private namespaces hang off their controller
    #[serde(rename = "Controllers", default)]
    controllers: Vec<Controller>,
}

#[derive(Deserialize)]
struct Controller {
    #[serde(rename = "Namespaces", default)]
    namespaces: Vec<Namespace>,
}

#[serde_as]
#[derive(Deserialize)]
struct Namespace {
    /// Block device name, e.g. nvme0n1
    #[serde(rename = "NameSpace")]
    name: String,

    #[serde(rename = "NSID")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    nsid: u64,
}

impl From<LegacyList> for Vec<DevicePathAndNamespace> {
    fn from(list: LegacyList) -> Self {
        list.devices
            .into_iter()
            .map(|d| DevicePathAndNamespace::new(d.device_path, d.namespace.to_string()))
            .collect()
    }
}

impl From<HostList> for Vec<DevicePathAndNamespace> {
    fn from(list: HostList) -> Self {
        list.hosts
            .iter()
            .flat_map(|host| &host.subsystems)
            .flat_map(|subsystem| {
                subsystem
                    .namespaces
                    .iter()
                    .chain(subsystem.controllers.iter().flat_map(|c| &c.namespaces))
            })
            .map(|ns| DevicePathAndNamespace::new(PathBuf::from(DEVFS_DIR).join(&ns.name), ns.nsid.to_string()))
            .collect()
    }
}

/// Parse the stdout of `nvme list -o json`
///
/// Returns [`Error::InvalidJson`] when the output is not JSON at all. Valid JSON
/// in neither known layout yields an empty list.
pub fn parse_list(data: &[u8]) -> Result<Vec<DevicePathAndNamespace>, Error> {
    if data.iter().all(u8::is_ascii_whitespace) {
        debug!("Empty nvme list output");
        return Ok(Vec::new());
    }

    let document: Value = serde_json::from_slice(data)?;

    if let Ok(list) = LegacyList::deserialize(&document) {
        debug!("Decoded nvme list output in the legacy layout");
        return Ok(list.into());
    }

    if let Ok(list) = HostList::deserialize(&document) {
        debug!("Decoded nvme list output in the 2.11 layout");
        return Ok(list.into());
    }

    warn!("Unrecognised nvme list output layout, ignoring");
    Ok(Vec::new())
}

/// Parse the stdout of `nvme list-ns <device>`
///
/// Lines look like `[   0]:0x2401`; the part after the colon is returned.
pub fn parse_namespace_ids(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split(':').nth(1))
        .map(|id| id.trim().to_owned())
        .collect()
}

/// Parse the stdout of `nvme id-ns <device>`
///
/// Scanning stops as soon as both the `nguid` line and the
/// `NVME Identify Namespace <nsid>:` banner were seen.
pub fn parse_identity(output: &str) -> NamespaceIdentity {
    let mut identity = NamespaceIdentity::default();

    for line in output.lines() {
        if line.starts_with("nguid") {
            if let Some(nguid) = line.split(':').nth(1) {
                identity.nguid = nguid.trim().to_owned();
            }
        }

        if line.starts_with("NVME Identify Namespace") {
            if let Some(nsid) = line.split_whitespace().nth(3) {
                identity.nsid = nsid.replace(':', "");
            }
        }

        if identity.is_complete() {
            break;
        }
    }

    identity
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = include_str!("../tests/data/list-legacy.json");
    const V2_11: &str = include_str!("../tests/data/list-2.11.json");
    const ID_NS: &str = include_str!("../tests/data/id-ns.txt");
    const LIST_NS: &str = include_str!("../tests/data/list-ns.txt");

    #[test_log::test]
    fn test_legacy_list() {
        let devices = parse_list(LEGACY.as_bytes()).expect("valid json");
        assert_eq!(
            devices,
            vec![
                DevicePathAndNamespace::new("/dev/nvme0n1", "9217"),
                DevicePathAndNamespace::new("/dev/nvme0n2", "9222"),
            ]
        );
    }

    #[test_log::test]
    fn test_2_11_list() {
        let devices = parse_list(V2_11.as_bytes()).expect("valid json");
        assert_eq!(
            devices,
            vec![
                DevicePathAndNamespace::new("/dev/nvme0n1", "293"),
                DevicePathAndNamespace::new("/dev/nvme1n1", "1"),
            ]
        );
    }

    #[test]
    fn test_both_layouts_agree() {
        let legacy = r#"{"Devices":[{"NameSpace":293,"DevicePath":"/dev/nvme0n1"}]}"#;
        let current = r#"{"Devices":[{"Subsystems":[{"Namespaces":[{"NameSpace":"nvme0n1","NSID":293}]}]}]}"#;
        assert_eq!(
            parse_list(legacy.as_bytes()).expect("legacy"),
            parse_list(current.as_bytes()).expect("2.11")
        );
    }

    #[test]
    fn test_string_namespace_ids() {
        let legacy = r#"{"Devices":[{"NameSpace":"12","DevicePath":"/dev/nvme2n1"}]}"#;
        let devices = parse_list(legacy.as_bytes()).expect("valid json");
        assert_eq!(devices, vec![DevicePathAndNamespace::new("/dev/nvme2n1", "12")]);
    }

    #[test]
    fn test_malformed_list_is_an_error() {
        let broken = r#"{ "Devices" : [ { ] }"#;
        assert!(matches!(parse_list(broken.as_bytes()), Err(Error::InvalidJson(_))));
    }

    #[test_log::test]
    fn test_unknown_layout_is_empty() {
        let unknown = r#"{ "Devices" : [ { "ValidButNotWhatWeExpect" : "value" } ] }"#;
        assert_eq!(parse_list(unknown.as_bytes()).expect("valid json"), vec![]);
        assert_eq!(parse_list(b"[1, 2, 3]").expect("valid json"), vec![]);
        assert_eq!(parse_list(b"").expect("empty output"), vec![]);
    }

    #[test]
    fn test_namespace_ids() {
        assert_eq!(parse_namespace_ids(LIST_NS), vec!["0x2401", "0x2406"]);
        assert!(parse_namespace_ids("\n   \n").is_empty());
        assert!(parse_namespace_ids("no colon here").is_empty());
    }

    #[test]
    fn test_identity() {
        let identity = parse_identity(ID_NS);
        assert!(identity.is_complete());
        assert_eq!(identity.nguid, "507911ecda65a2498ccf0968009a5d07");
        assert_eq!(identity.nsid, "149");
    }

    #[test]
    fn test_partial_identity() {
        let identity = parse_identity("NVME Identify Namespace 7:\nnsze    : 0x1000\n");
        assert!(!identity.is_complete());
        assert_eq!(identity.nsid, "7");
        assert_eq!(identity.nguid, "");

        assert_eq!(parse_identity(""), NamespaceIdentity::default());
    }
}
