// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Client configuration

use std::path::{Path, PathBuf};

use log::debug;

/// Service port used for NVMe/TCP when none is configured
pub const DEFAULT_PORT: &str = "4420";

/// Where nvme-cli keeps the host NQN
pub const DEFAULT_HOSTNQN_FILE: &str = "/etc/nvme/hostnqn";

/// Locations searched for the nvme binary, relative to the chroot
const NVME_CANDIDATES: [&str; 2] = ["/sbin/nvme", "/usr/sbin/nvme"];

/// Fallback resolved through `PATH`
const NVME_FALLBACK: &str = "nvme";

/// Settings shared by every operation of a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Root the commands run in, `/` runs them directly
    pub chroot: PathBuf,
    /// Explicit nvme binary, searched for when unset
    pub command: Option<String>,
    /// NVMe/TCP service port for discover and connect
    pub port: String,
    /// Root under which `sys/class/fc_host` is read
    pub sysroot: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            chroot: PathBuf::from("/"),
            command: None,
            port: DEFAULT_PORT.to_owned(),
            sysroot: PathBuf::from("/"),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every command through `chroot <dir>`, an empty path means `/`
    pub fn with_chroot(self, chroot: impl Into<PathBuf>) -> Self {
        let chroot = chroot.into();
        Self {
            chroot: if chroot.as_os_str().is_empty() {
                PathBuf::from("/")
            } else {
                chroot
            },
            ..self
        }
    }

    /// Use this nvme binary instead of searching for one
    pub fn with_command(self, command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..self
        }
    }

    pub fn with_port(self, port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..self
        }
    }

    /// Read sysfs below `sysroot` rather than `/`
    pub fn with_sysroot(self, sysroot: impl Into<PathBuf>) -> Self {
        Self {
            sysroot: sysroot.into(),
            ..self
        }
    }

    /// Returns true if commands are wrapped in `chroot`
    pub fn is_chrooted(&self) -> bool {
        self.chroot != Path::new("/")
    }

    /// Map an absolute path in the command root to a path on this host
    pub fn host_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match path.strip_prefix("/") {
            Ok(relative) => self.chroot.join(relative),
            Err(_) => self.chroot.join(path),
        }
    }

    /// The nvme binary to invoke
    ///
    /// An explicit command wins. Otherwise the well known locations are checked
    /// inside the chroot and the first existing one is used, falling back to a
    /// `PATH` lookup.
    pub fn resolve_command(&self) -> String {
        if let Some(command) = &self.command {
            return command.clone();
        }

        let found = NVME_CANDIDATES
            .iter()
            .find(|candidate| self.host_path(candidate).exists())
            .map(|candidate| candidate.to_string());

        match found {
            Some(command) => {
                debug!("Using nvme binary {command}");
                command
            }
            None => {
                debug!("No nvme binary below {}, relying on PATH", self.chroot.display());
                NVME_FALLBACK.to_owned()
            }
        }
    }

    /// Prefix `argv` with `chroot <dir>` when running in a chroot
    pub(crate) fn wrap(&self, argv: Vec<String>) -> Vec<String> {
        if !self.is_chrooted() {
            return argv;
        }
        let mut wrapped = Vec::with_capacity(argv.len() + 2);
        wrapped.push("chroot".to_owned());
        wrapped.push(self.chroot.to_string_lossy().into_owned());
        wrapped.extend(argv);
        wrapped
    }
}
