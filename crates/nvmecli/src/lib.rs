// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Parsers for the output of the `nvme` command line tool
//!
//! Every function in this crate is pure: it receives the raw bytes or text that
//! `nvme` printed and turns them into typed records. Running the tool is somebody
//! else's job (see the `fabrics` crate).
//!
//! Output from `nvme` changes shape between releases, so the parsers are
//! deliberately forgiving. Discovery and session parsing never fail, they degrade
//! to fewer records. Device listing is the exception and reports malformed JSON.

use std::{fmt, str::FromStr};

use thiserror::Error;

pub mod devices;
pub mod discovery;
pub mod outcome;
pub mod session;
mod target;

pub use devices::{DevicePathAndNamespace, NamespaceIdentity};
pub use discovery::Discovery;
pub use outcome::ConnectOutcome;
pub use session::{Session, SessionState};
pub use target::Target;

/// Errors raised while parsing `nvme` output
#[derive(Debug, Error)]
pub enum Error {
    /// The document was not valid JSON
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// An unknown transport name
    #[error("unknown transport: {0}")]
    UnknownTransport(String),
}

/// NVMe over Fabrics transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// NVMe/TCP
    Tcp,
    /// NVMe over Fibre Channel
    Fc,
    /// NVMe over RDMA, reported by `nvme` but never driven by this crate
    Rdma,
}

impl Transport {
    /// The name `nvme` uses for this transport on the command line and in its output
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Fc => "fc",
            Transport::Rdma => "rdma",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tcp" => Ok(Self::Tcp),
            "fc" => Ok(Self::Fc),
            "rdma" => Ok(Self::Rdma),
            _ => Err(Error::UnknownTransport(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Transport;

    #[test]
    fn test_transport_names() {
        for transport in [Transport::Tcp, Transport::Fc, Transport::Rdma] {
            let parsed: Transport = transport.as_str().parse().expect("known transport");
            assert_eq!(parsed, transport);
        }
        assert!("invalid".parse::<Transport>().is_err());
        assert_eq!(Transport::Fc.to_string(), "fc");
    }
}
