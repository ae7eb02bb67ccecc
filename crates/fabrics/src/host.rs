// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Local initiator identity
//!
//! Fibre Channel adapters are found in sysfs, host NQNs in nvme-cli's hostnqn file.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::sysfs::{sysfs_read, FC_HOST_DIR};

/// Identity of a local Fibre Channel host adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FcHbaInfo {
    /// World wide port name, e.g. `0x10000090fa1b2c3d`
    pub port_name: String,
    /// World wide node name
    pub node_name: String,
}

impl FcHbaInfo {
    /// The address `nvme` expects for `-w`/`--host-traddr`
    pub fn host_traddr(&self) -> String {
        format!("nn-{}:pn-{}", self.node_name, self.port_name)
    }
}

impl fmt::Display for FcHbaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host_traddr())
    }
}

/// Enumerate Fibre Channel host adapters below `sysroot`
///
/// Adapters are returned in name order. An adapter lacking either name is
/// skipped, and a system without the `fc_host` class has no adapters.
pub fn fc_hosts(sysroot: &Path) -> io::Result<Vec<FcHbaInfo>> {
    let dir = sysroot.join(FC_HOST_DIR);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist, no FC adapters", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut names = entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str().map(str::to_owned))
        .filter(|name| name.starts_with("host"))
        .collect::<Vec<_>>();
    names.sort();

    let hosts = names
        .into_iter()
        .filter_map(|name| {
            let node = PathBuf::from(FC_HOST_DIR).join(&name);
            let port_name = sysfs_read(sysroot, &node, "port_name");
            let node_name = sysfs_read(sysroot, &node, "node_name");
            match (port_name, node_name) {
                (Some(port_name), Some(node_name)) => Some(FcHbaInfo { port_name, node_name }),
                _ => {
                    warn!("Skipping FC adapter {name} without port or node name");
                    None
                }
            }
        })
        .collect();

    Ok(hosts)
}

/// Read host NQNs from `path`, one per non-blank line
pub fn read_initiators(path: &Path) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}
