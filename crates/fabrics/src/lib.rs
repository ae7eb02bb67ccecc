// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Host side NVMe over Fabrics management
//!
//! Discovers NVMe/TCP and NVMe/FC targets, connects and disconnects them,
//! enumerates local namespaces and reports active sessions by driving the `nvme`
//! command line tool. Parsing of its output lives in the [`nvmecli`] crate.
//!
//! [`Nvme`] is the real client and [`mock::MockNvme`] a synthetic one; both
//! implement [`Fabrics`].

use std::{collections::HashMap, io, path::Path};

use nvmecli::{ConnectOutcome, Transport};
use thiserror::Error;

mod commands;
pub mod host;
pub mod mock;
mod nvme;
mod options;
pub mod runner;
mod sysfs;

pub use host::FcHbaInfo;
pub use nvme::Nvme;
pub use nvmecli::{DevicePathAndNamespace, NamespaceIdentity, Session, SessionState, Target};
pub use options::Options;
pub use runner::{CancelToken, Output, Runner, SystemRunner};

/// Errors raised while driving `nvme`
#[derive(Debug, Error)]
pub enum Error {
    /// The command could not be started
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The command was aborted through its cancel token
    #[error("{command} was cancelled")]
    Cancelled { command: String },

    /// The command outlived the deadline of its cancel token
    #[error("{command} timed out")]
    TimedOut { command: String },

    /// The command ended without an exit status
    #[error("{command} terminated without an exit status")]
    Terminated { command: String },

    /// The command exited with a non-zero status
    #[error("{command} exited with status {code}: {stderr}")]
    Status { command: String, code: i32, stderr: String },

    /// `nvme connect` failed for a reason other than an existing connection
    #[error("nvme connect {nqn} at {portal}{} failed: {outcome}", via(.host_traddr))]
    Connect {
        nqn: String,
        portal: String,
        host_traddr: Option<String>,
        outcome: ConnectOutcome,
    },

    /// A Fibre Channel connect was requested for a target without a local adapter
    #[error("target {nqn} has no host_traddr for an FC connect")]
    MissingHostAddress { nqn: String },

    /// The target uses a transport that cannot be connected
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// No usable Fibre Channel host adapter was found in sysfs
    #[error("no fibre channel host adapters found")]
    NoFcHosts,

    /// Output of `nvme` could not be parsed
    #[error(transparent)]
    Parse(#[from] nvmecli::Error),

    /// An I/O error occurred
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// A failure injected into [`mock::MockNvme`]
    #[error("{0} induced error")]
    Induced(&'static str),
}

fn via(host_traddr: &Option<String>) -> String {
    host_traddr
        .as_deref()
        .map(|host| format!(" for host {host}"))
        .unwrap_or_default()
}

impl Error {
    /// Returns true if the operation was aborted by its cancel token
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled { .. } | Error::TimedOut { .. })
    }
}

/// Operations every NVMe over Fabrics client provides
pub trait Fabrics {
    /// Discover NVMe/TCP subsystems behind the discovery controller at `address`
    ///
    /// With `login` every discovered target is connected as well; connect
    /// failures are logged, not returned.
    fn discover_tcp_targets(&self, address: &str, login: bool) -> Result<Vec<Target>, Error>;

    /// Discover NVMe/FC subsystems behind the remote port `target_address`
    /// (`nn-<WWNN>:pn-<WWPN>`) from every local FC adapter
    fn discover_fc_targets(&self, target_address: &str, login: bool) -> Result<Vec<Target>, Error>;

    /// Host NQNs from `file`, or from the default host NQN file
    fn initiators(&self, file: Option<&Path>) -> Result<Vec<String>, Error>;

    /// Connect an NVMe/TCP target, `duplicate` allows a second controller to the same port
    fn tcp_connect(&self, target: &Target, duplicate: bool) -> Result<(), Error>;

    /// Connect an NVMe/FC target through its `host_traddr`
    fn fc_connect(&self, target: &Target, duplicate: bool) -> Result<(), Error>;

    /// Connect a target using the transport it was discovered over
    fn connect(&self, target: &Target, duplicate: bool) -> Result<(), Error> {
        match target.target_type.parse::<Transport>() {
            Ok(Transport::Tcp) => self.tcp_connect(target, duplicate),
            Ok(Transport::Fc) => self.fc_connect(target, duplicate),
            _ => Err(Error::UnsupportedTransport(target.target_type.clone())),
        }
    }

    /// Disconnect every controller of the target's subsystem
    fn disconnect(&self, target: &Target) -> Result<(), Error>;

    /// Active controller paths
    fn sessions(&self) -> Result<Vec<Session>, Error>;

    /// Namespace block devices present on this host
    fn devices_and_namespaces(&self) -> Result<Vec<DevicePathAndNamespace>, Error>;

    /// Namespace ids visible through each device
    ///
    /// Devices whose query fails are left out of the result.
    fn namespace_ids(
        &self,
        devices: &[DevicePathAndNamespace],
    ) -> Result<HashMap<DevicePathAndNamespace, Vec<String>>, Error>;

    /// NGUID and namespace id of a namespace block device
    fn namespace_identity(&self, device: &Path, nsid: Option<&str>) -> Result<NamespaceIdentity, Error>;

    /// Rescan the namespaces of a controller device
    fn rescan(&self, device: &Path) -> Result<(), Error>;
}
