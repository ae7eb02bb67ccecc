// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Helpers for reading sysfs attributes

use std::{fs, path::Path, str::FromStr};

/// Directory listing one entry per Fibre Channel host adapter
pub(crate) const FC_HOST_DIR: &str = "sys/class/fc_host";

/// Reads the attribute `key` of `node` below `sysroot` and parses it as `T`
///
/// Returns `None` if the attribute is missing, unreadable, blank or does not parse.
pub(crate) fn sysfs_read<T>(sysroot: &Path, node: &Path, key: &str) -> Option<T>
where
    T: FromStr,
{
    let path = sysroot.join(node).join(key);
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_read_attribute() {
        let root = tempfile::tempdir().expect("tempdir");
        let node = PathBuf::from("sys/class/fc_host/host3");
        fs::create_dir_all(root.path().join(&node)).expect("mkdir");
        fs::write(root.path().join(&node).join("port_name"), "0x10000090fa1b2c3d\n").expect("write");
        fs::write(root.path().join(&node).join("port_state"), "\n").expect("write");
        fs::write(root.path().join(&node).join("speed_gbit"), "32\n").expect("write");

        let port: Option<String> = sysfs_read(root.path(), &node, "port_name");
        assert_eq!(port.as_deref(), Some("0x10000090fa1b2c3d"));
        assert_eq!(sysfs_read::<String>(root.path(), &node, "port_state"), None);
        assert_eq!(sysfs_read::<String>(root.path(), &node, "node_name"), None);
        assert_eq!(sysfs_read::<u32>(root.path(), &node, "speed_gbit"), Some(32));
        assert_eq!(sysfs_read::<u32>(root.path(), &node, "port_name"), None);
    }
}
