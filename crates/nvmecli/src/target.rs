// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

/// A remote subsystem port reported by a discovery controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// Transport address of the port (`traddr`)
    pub portal: String,
    /// Subsystem NQN (`subnqn`)
    pub nqn: String,
    /// Transport type as reported (`trtype`)
    pub trtype: String,
    /// Address family (`adrfam`)
    pub adrfam: String,
    /// Subsystem type (`subtype`)
    pub subtype: String,
    /// Transport requirements (`treq`)
    pub treq: String,
    /// Port identifier (`portid`)
    pub port_id: String,
    /// Transport service identifier (`trsvcid`)
    pub trsvcid: String,
    /// Security type (`sectype`)
    pub sectype: String,
    /// Transport type used to pick a connect command, mirrors `trtype`
    pub target_type: String,
    /// Local adapter address (`host_traddr`), only set for Fibre Channel
    /// as `nn-<WWNN>:pn-<WWPN>`
    pub host_traddr: Option<String>,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {} ({})", self.nqn, self.portal, self.target_type)?;
        if let Some(host) = &self.host_traddr {
            write!(f, " via {host}")?;
        }
        Ok(())
    }
}
