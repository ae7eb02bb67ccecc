// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Argument vectors for `nvme` subcommands
//!
//! Each builder returns the arguments that follow the binary name.

use std::path::Path;

use nvmecli::Transport;

/// Keep reconnecting forever after a controller loss
const CTRL_LOSS_TMO: &str = "--ctrl-loss-tmo=-1";

/// Allow a second controller to an already connected port
const DUPLICATE_CONNECT: &str = "-D";

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn discover_tcp(address: &str, port: &str) -> Vec<String> {
    args(["discover", "-t", Transport::Tcp.as_str(), "-a", address, "-s", port])
}

pub(crate) fn discover_fc(target_address: &str, host_traddr: &str) -> Vec<String> {
    args(["discover", "-t", Transport::Fc.as_str(), "-a", target_address, "-w", host_traddr])
}

pub(crate) fn connect_tcp(nqn: &str, portal: &str, port: &str, duplicate: bool) -> Vec<String> {
    let mut argv = args([
        "connect",
        "-t",
        Transport::Tcp.as_str(),
        "-n",
        nqn,
        "-a",
        portal,
        "-s",
        port,
        CTRL_LOSS_TMO,
    ]);
    if duplicate {
        argv.push(DUPLICATE_CONNECT.to_owned());
    }
    argv
}

pub(crate) fn connect_fc(nqn: &str, portal: &str, host_traddr: &str, duplicate: bool) -> Vec<String> {
    let mut argv = args([
        "connect",
        "-t",
        Transport::Fc.as_str(),
        "-a",
        portal,
        "-w",
        host_traddr,
        "-n",
        nqn,
        CTRL_LOSS_TMO,
    ]);
    if duplicate {
        argv.push(DUPLICATE_CONNECT.to_owned());
    }
    argv
}

pub(crate) fn disconnect(nqn: &str) -> Vec<String> {
    args(["disconnect", "-n", nqn])
}

pub(crate) fn list_subsys() -> Vec<String> {
    args(["list-subsys", "-o", "json"])
}

pub(crate) fn list() -> Vec<String> {
    args(["list", "-o", "json"])
}

pub(crate) fn list_ns(device: &Path) -> Vec<String> {
    vec!["list-ns".to_owned(), device.to_string_lossy().into_owned()]
}

pub(crate) fn id_ns(device: &Path, nsid: Option<&str>) -> Vec<String> {
    let mut argv = vec!["id-ns".to_owned(), device.to_string_lossy().into_owned()];
    if let Some(nsid) = nsid {
        argv.push("--namespace".to_owned());
        argv.push(nsid.to_owned());
    }
    argv
}

pub(crate) fn ns_rescan(device: &Path) -> Vec<String> {
    vec!["ns-rescan".to_owned(), device.to_string_lossy().into_owned()]
}
