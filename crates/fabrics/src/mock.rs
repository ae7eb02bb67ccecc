// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mock fabrics client for testing.
//!
//! [`MockNvme`] returns deterministic synthetic targets, sessions and namespaces
//! without running anything, so callers can exercise their own logic on hosts
//! without NVMe hardware. Failures are injected per operation through [`Faults`].

use std::{collections::HashMap, path::Path};

use nvmecli::{SessionState, Transport};

use crate::{DevicePathAndNamespace, Error, Fabrics, NamespaceIdentity, Session, Target};

/// Subsystem NQN prefix of every mock target
const TARGET_NQN_PREFIX: &str = "nqn.1988-11.com.dell.mock:e6e2d5b871f1403E169D";

/// Subsystem NQN prefix of every mock session
const SESSION_NQN_PREFIX: &str = "nqn.1988-11.com.dell.mock:00:e6e2d5b871f1403E169D";

/// Host NQN prefix of every mock initiator
const INITIATOR_PREFIX: &str = "nqn.1988-11.com.dell.mock:01:00000000";

/// Local adapter reported on mock Fibre Channel targets
const MOCK_HOST_TRADDR: &str = "nn-0x58aaa11111111a11:pn-0x58aaa11111111a11";

const MOCK_NGUID: &str = "1a111a1111aa11111aaa1111111111a1";
const MOCK_NSID: &str = "11";

/// How many of each record the mock reports, zero is treated as one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockOptions {
    pub initiators: usize,
    pub tcp_targets: usize,
    pub fc_targets: usize,
    pub sessions: usize,
    pub namespace_devices: usize,
}

/// Operations of a [`MockNvme`] that fail on request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    pub discovery: bool,
    pub initiators: bool,
    pub tcp_login: bool,
    pub fc_login: bool,
    pub logout: bool,
    pub sessions: bool,
    pub devices: bool,
    pub namespace_ids: bool,
    pub device_data: bool,
}

/// A synthetic client
#[derive(Debug, Clone, Default)]
pub struct MockNvme {
    options: MockOptions,
    faults: Faults,
}

fn at_least_one(count: usize) -> usize {
    count.max(1)
}

fn fail_if(fault: bool, operation: &'static str) -> Result<(), Error> {
    if fault {
        Err(Error::Induced(operation))
    } else {
        Ok(())
    }
}

impl MockNvme {
    /// Creates a mock reporting `options` records and failing per `faults`
    pub fn new(options: MockOptions, faults: Faults) -> Self {
        Self { options, faults }
    }

    fn targets(&self, address: &str, count: usize, transport: Transport) -> Vec<Target> {
        let (adrfam, host_traddr) = match transport {
            Transport::Fc => ("fibre-channel", Some(MOCK_HOST_TRADDR.to_owned())),
            _ => ("ipv4", None),
        };

        (0..at_least_one(count))
            .map(|idx| Target {
                portal: address.to_owned(),
                nqn: format!("{TARGET_NQN_PREFIX}{idx:05}"),
                trtype: transport.to_string(),
                adrfam: adrfam.to_owned(),
                subtype: "nvme subsystem".to_owned(),
                treq: "not specified".to_owned(),
                port_id: "0".to_owned(),
                trsvcid: "none".to_owned(),
                sectype: "none".to_owned(),
                target_type: transport.to_string(),
                host_traddr: host_traddr.clone(),
            })
            .collect()
    }

    fn devices(&self) -> impl Iterator<Item = DevicePathAndNamespace> {
        (0..at_least_one(self.options.namespace_devices))
            .map(|idx| DevicePathAndNamespace::new(format!("/dev/nvme0n{idx:05}"), format!("{idx:05}")))
    }
}

impl Fabrics for MockNvme {
    fn discover_tcp_targets(&self, address: &str, _login: bool) -> Result<Vec<Target>, Error> {
        fail_if(self.faults.discovery, "discoverTargets")?;
        Ok(self.targets(address, self.options.tcp_targets, Transport::Tcp))
    }

    fn discover_fc_targets(&self, target_address: &str, _login: bool) -> Result<Vec<Target>, Error> {
        fail_if(self.faults.discovery, "discoverTargets")?;
        Ok(self.targets(target_address, self.options.fc_targets, Transport::Fc))
    }

    fn initiators(&self, _file: Option<&Path>) -> Result<Vec<String>, Error> {
        fail_if(self.faults.initiators, "getInitiators")?;
        Ok((0..at_least_one(self.options.initiators))
            .map(|idx| format!("{INITIATOR_PREFIX}{idx:05}"))
            .collect())
    }

    fn tcp_connect(&self, _target: &Target, _duplicate: bool) -> Result<(), Error> {
        fail_if(self.faults.tcp_login, "NVMeTCP login")
    }

    fn fc_connect(&self, _target: &Target, _duplicate: bool) -> Result<(), Error> {
        fail_if(self.faults.fc_login, "NVMeFC login")
    }

    fn disconnect(&self, _target: &Target) -> Result<(), Error> {
        fail_if(self.faults.logout, "NVMe logout")
    }

    fn sessions(&self) -> Result<Vec<Session>, Error> {
        fail_if(self.faults.sessions, "getSessions")?;
        Ok((0..at_least_one(self.options.sessions))
            .map(|idx| Session {
                target: format!("{SESSION_NQN_PREFIX}{idx}"),
                portal: format!("192.168.1.{idx}"),
                name: format!("nvme{idx}"),
                transport: Transport::Tcp,
                state: SessionState::Live,
            })
            .collect())
    }

    fn devices_and_namespaces(&self) -> Result<Vec<DevicePathAndNamespace>, Error> {
        fail_if(self.faults.devices, "listNamespaceDevices")?;
        Ok(self.devices().collect())
    }

    fn namespace_ids(
        &self,
        _devices: &[DevicePathAndNamespace],
    ) -> Result<HashMap<DevicePathAndNamespace, Vec<String>>, Error> {
        fail_if(self.faults.namespace_ids, "listNamespaceID")?;
        Ok(self
            .devices()
            .map(|device| {
                let id = format!("0x{}", device.namespace);
                (device, vec![id])
            })
            .collect())
    }

    fn namespace_identity(&self, _device: &Path, _nsid: Option<&str>) -> Result<NamespaceIdentity, Error> {
        fail_if(self.faults.device_data, "NVMe namespace data")?;
        Ok(NamespaceIdentity {
            nguid: MOCK_NGUID.to_owned(),
            nsid: MOCK_NSID.to_owned(),
        })
    }

    fn rescan(&self, _device: &Path) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_counts_mean_one() {
        let mock = MockNvme::default();
        assert_eq!(mock.discover_tcp_targets("10.0.0.1", false).expect("targets").len(), 1);
        assert_eq!(mock.initiators(None).expect("initiators"), ["nqn.1988-11.com.dell.mock:01:0000000000000"]);
        assert_eq!(mock.sessions().expect("sessions").len(), 1);
        assert_eq!(mock.devices_and_namespaces().expect("devices").len(), 1);
    }

    #[test]
    fn test_counts() {
        let mock = MockNvme::new(
            MockOptions {
                tcp_targets: 3,
                fc_targets: 2,
                sessions: 4,
                namespace_devices: 2,
                ..Default::default()
            },
            Faults::default(),
        );

        let tcp = mock.discover_tcp_targets("10.0.0.1", true).expect("tcp targets");
        assert_eq!(tcp.len(), 3);
        assert_eq!(tcp[2].nqn, "nqn.1988-11.com.dell.mock:e6e2d5b871f1403E169D00002");
        assert_eq!(tcp[2].portal, "10.0.0.1");
        assert_eq!(tcp[0].host_traddr, None);

        let fc = mock
            .discover_fc_targets("nn-0x1:pn-0x2", false)
            .expect("fc targets");
        assert_eq!(fc.len(), 2);
        assert_eq!(fc[0].target_type, "fc");
        assert_eq!(fc[0].host_traddr.as_deref(), Some(MOCK_HOST_TRADDR));
        mock.connect(&fc[0], false).expect("mock login");

        let sessions = mock.sessions().expect("sessions");
        assert_eq!(sessions[3].portal, "192.168.1.3");
        assert_eq!(sessions[3].name, "nvme3");
        assert_eq!(sessions[3].state, SessionState::Live);

        let devices = mock.devices_and_namespaces().expect("devices");
        assert_eq!(devices[1], DevicePathAndNamespace::new("/dev/nvme0n00001", "00001"));
        let ids = mock.namespace_ids(&devices).expect("ids");
        assert_eq!(ids[&devices[1]], ["0x00001"]);

        let identity = mock
            .namespace_identity(devices[0].device_path(), None)
            .expect("identity");
        assert!(identity.is_complete());
        assert_eq!(identity.nsid, "11");
    }

    #[test]
    fn test_faults_are_per_operation() {
        let mock = MockNvme::new(
            MockOptions::default(),
            Faults {
                tcp_login: true,
                sessions: true,
                ..Default::default()
            },
        );

        let targets = mock.discover_tcp_targets("10.0.0.1", false).expect("discovery works");
        assert!(matches!(mock.connect(&targets[0], false), Err(Error::Induced(_))));
        assert!(matches!(mock.sessions(), Err(Error::Induced(_))));
        assert!(mock.disconnect(&targets[0]).is_ok());
        assert!(mock.devices_and_namespaces().is_ok());
        assert!(mock.rescan(Path::new("/dev/nvme0")).is_ok());
        assert_eq!(
            mock.sessions().expect_err("induced").to_string(),
            "getSessions induced error"
        );
    }
}
