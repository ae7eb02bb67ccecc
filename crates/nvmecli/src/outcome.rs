// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Exit status interpretation for `nvme connect` and list style queries
//!
//! `nvme connect` reports an existing controller for the same subsystem port as a
//! failure. How it does so depends on the nvme-cli release:
//!
//! - up to 1.16 the command exits with 114 (`EALREADY`) or 70 and prints
//!   `Failed to write to /dev/nvme-fabrics: Operation already in progress`
//!   (or nothing at all)
//! - from 2.0 the command exits with 1 and prints a message containing
//!   `already connected`
//!
//! Both are reported to callers as success.

use std::fmt;

/// Exit status meaning "no records, sessions or portals to operate on"
pub const NO_OBJECTS_FOUND: i32 = 21;

/// Last stderr line of a duplicate connect on nvme-cli 1.x
pub const OPERATION_IN_PROGRESS: &str = "Failed to write to /dev/nvme-fabrics: Operation already in progress";

/// Fragment of the stderr of a duplicate connect on nvme-cli 2.x
pub const ALREADY_CONNECTED: &str = "already connected";

/// Exit statuses of a duplicate connect on nvme-cli 1.x
const LEGACY_DUPLICATE_STATUS: [i32; 2] = [114, 70];

/// Exit status of a duplicate connect on nvme-cli 2.x
const DUPLICATE_STATUS: i32 = 1;

/// How a connect attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new controller was created
    Connected,
    /// A controller for this subsystem port already exists
    AlreadyConnected,
    /// The attempt failed
    Failed {
        /// Exit status, if the process exited normally
        code: Option<i32>,
        /// Last line `nvme` printed to stderr
        reason: String,
    },
}

impl ConnectOutcome {
    /// Returns true for both a new and an existing connection
    pub fn is_success(&self) -> bool {
        !matches!(self, ConnectOutcome::Failed { .. })
    }
}

impl fmt::Display for ConnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectOutcome::Connected => f.write_str("connected"),
            ConnectOutcome::AlreadyConnected => f.write_str("already connected"),
            ConnectOutcome::Failed { code: Some(code), reason } => write!(f, "failed with status {code}: {reason}"),
            ConnectOutcome::Failed { code: None, reason } => write!(f, "terminated: {reason}"),
        }
    }
}

// Last stderr line, as nvme prints its verdict last
fn last_line(stderr: &str) -> &str {
    stderr.lines().last().unwrap_or_default().trim_end()
}

/// Classify the result of `nvme connect`
///
/// `status` is the process exit status, `None` when the process did not exit
/// normally.
pub fn classify_connect(status: Option<i32>, stderr: &str) -> ConnectOutcome {
    let last = last_line(stderr);

    match status {
        Some(0) => ConnectOutcome::Connected,
        Some(code) if LEGACY_DUPLICATE_STATUS.contains(&code) => {
            if last.is_empty() || last == OPERATION_IN_PROGRESS {
                ConnectOutcome::AlreadyConnected
            } else {
                ConnectOutcome::Failed {
                    code: Some(code),
                    reason: last.to_owned(),
                }
            }
        }
        Some(DUPLICATE_STATUS) if stderr.contains(ALREADY_CONNECTED) => ConnectOutcome::AlreadyConnected,
        code => ConnectOutcome::Failed {
            code,
            reason: last.to_owned(),
        },
    }
}

/// Returns true when a list style query exited with [`NO_OBJECTS_FOUND`]
pub fn is_no_objects(status: Option<i32>) -> bool {
    status == Some(NO_OBJECTS_FOUND)
}
