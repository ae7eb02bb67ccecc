// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Discovery log parsing
//!
//! `nvme discover` prints one block per log entry, each introduced by a
//! `=====Discovery Log Entry N======` banner and followed by `key: value` lines:
//!
//! ```text
//! Discovery Log Number of Records 2, Generation counter 2
//! =====Discovery Log Entry 0======
//! trtype:  tcp
//! adrfam:  ipv4
//! subtype: nvme subsystem
//! treq:    not specified
//! portid:  2304
//! trsvcid: 4420
//! subnqn:  nqn.1988-11.com.dell:powerstore:00:a1a1a1a111a1111a111a
//! traddr:  10.230.1.1
//! sectype: none
//! ```
//!
//! A discovery controller may report ports of every transport it serves, so the
//! caller states which transport it asked for and only matching entries are kept.

use log::debug;

use crate::{Target, Transport};

/// Banner that opens every discovery log entry
const ENTRY_MARKER: &str = "=====Discovery";

/// The discovery request whose output is being parsed
#[derive(Debug, Clone, Copy)]
pub enum Discovery<'a> {
    /// `nvme discover -t tcp ...`
    Tcp,
    /// `nvme discover -t fc -a <target_address> -w <host_traddr>`
    Fc {
        /// Remote port the discovery was addressed to
        target_address: &'a str,
        /// Local adapter the discovery was issued from
        host_traddr: &'a str,
    },
}

impl Discovery<'_> {
    /// The transport this request was issued over
    pub fn transport(&self) -> Transport {
        match self {
            Discovery::Tcp => Transport::Tcp,
            Discovery::Fc { .. } => Transport::Fc,
        }
    }

    // Push a completed entry if it qualifies for this request
    fn finish(&self, mut target: Target, skip: bool, targets: &mut Vec<Target>) {
        if skip {
            debug!("Skipping {} discovery entry for {}", target.trtype, target.portal);
            return;
        }
        if target.nqn.is_empty() {
            debug!("Dropping discovery entry without subnqn at {}", target.portal);
            return;
        }

        if let Discovery::Fc {
            target_address,
            host_traddr,
        } = self
        {
            if target.portal != *target_address {
                debug!("Ignoring FC port {} (requested {})", target.portal, target_address);
                return;
            }
            target.host_traddr = Some((*host_traddr).to_owned());
        }

        targets.push(target);
    }
}

/// Parse the stdout of `nvme discover` into the targets matching `discovery`
///
/// Entries are returned in log order. Entries of another transport, entries
/// without a subsystem NQN and, for Fibre Channel, entries for a remote port other
/// than the requested one are dropped. Unknown keys are ignored.
pub fn parse(output: &str, discovery: &Discovery<'_>) -> Vec<Target> {
    let wanted = discovery.transport().as_str();
    let mut targets = Vec::new();
    let mut pending = Target::default();
    let mut skip = false;
    let mut entries = 0usize;

    for line in output.lines() {
        let line = line.trim();

        if line.starts_with(ENTRY_MARKER) {
            // Anything before the first banner is header noise
            let entry = std::mem::take(&mut pending);
            if entries != 0 {
                discovery.finish(entry, skip, &mut targets);
            }
            skip = false;
            entries += 1;
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }
        let value = tokens[1..].join(" ");

        match tokens[0] {
            "trtype:" => {
                // Keep filling the entry so it is complete, but never emit it
                if value != wanted {
                    skip = true;
                }
                pending.trtype = value.clone();
                pending.target_type = value;
            }
            "traddr:" => pending.portal = value,
            "subnqn:" => pending.nqn = value,
            "adrfam:" => pending.adrfam = value,
            "subtype:" => pending.subtype = value,
            "treq:" => pending.treq = value,
            "portid:" => pending.port_id = value,
            "trsvcid:" => pending.trsvcid = value,
            "sectype:" => pending.sectype = value,
            _ => {}
        }
    }

    discovery.finish(pending, skip, &mut targets);

    targets
}
