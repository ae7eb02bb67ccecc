// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The `nvme` backed client

use std::{collections::HashMap, path::Path, sync::Arc};

use log::{debug, error, info, warn};
use nvmecli::{
    devices, discovery,
    outcome::{self, ConnectOutcome},
    session, DevicePathAndNamespace, Discovery, NamespaceIdentity, Session, Target,
};

use crate::{
    commands,
    host::{self, FcHbaInfo},
    options::{Options, DEFAULT_HOSTNQN_FILE},
    runner::{CancelToken, Output, Runner, SystemRunner},
    Error, Fabrics,
};

/// NVMe over Fabrics client driving the `nvme` command line tool
///
/// Cloning is cheap; clones share the runner and, unless replaced with
/// [`Nvme::with_cancel`], the cancel token.
#[derive(Clone)]
pub struct Nvme {
    options: Options,
    command: String,
    runner: Arc<dyn Runner>,
    cancel: CancelToken,
}

/// A finished `nvme` run
struct Invocation {
    command: String,
    output: Output,
}

impl Invocation {
    fn status(&self) -> Result<i32, Error> {
        self.output.status.ok_or_else(|| Error::Terminated {
            command: self.command.clone(),
        })
    }

    /// Succeeds only on a zero exit status
    fn check(self) -> Result<Output, Error> {
        match self.status()? {
            0 => Ok(self.output),
            code => Err(Error::Status {
                stderr: self.output.stderr_lossy().trim().to_owned(),
                command: self.command,
                code,
            }),
        }
    }

    /// Like [`Invocation::check`], but "no objects found" is an empty answer
    fn query(self) -> Result<Option<Output>, Error> {
        if outcome::is_no_objects(self.output.status) {
            debug!("{} found nothing", self.command);
            return Ok(None);
        }
        self.check().map(Some)
    }
}

impl Nvme {
    /// Create a client running commands as child processes
    pub fn new(options: Options) -> Self {
        Self::with_runner(options, Arc::new(SystemRunner))
    }

    /// Create a client running commands through `runner`
    pub fn with_runner(options: Options, runner: Arc<dyn Runner>) -> Self {
        let command = options.resolve_command();
        Self {
            options,
            command,
            runner,
            cancel: CancelToken::new(),
        }
    }

    /// Returns a clone whose operations all honour `cancel`
    pub fn with_cancel(&self, cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Local Fibre Channel host adapters
    pub fn fc_hosts(&self) -> Result<Vec<FcHbaInfo>, Error> {
        Ok(host::fc_hosts(&self.options.sysroot)?)
    }

    fn invoke(&self, args: Vec<String>) -> Result<Invocation, Error> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.command.clone());
        argv.extend(args);
        let argv = self.options.wrap(argv);

        let output = self.runner.run(&argv, &self.cancel)?;
        Ok(Invocation {
            command: argv.join(" "),
            output,
        })
    }

    fn connect_with(&self, target: &Target, host_traddr: Option<&str>, args: Vec<String>) -> Result<(), Error> {
        let invocation = self.invoke(args)?;
        let outcome = outcome::classify_connect(invocation.output.status, &invocation.output.stderr_lossy());

        match outcome {
            ConnectOutcome::Connected => {
                info!("Connected to {target}");
                Ok(())
            }
            ConnectOutcome::AlreadyConnected => {
                info!("Already connected to {target}");
                Ok(())
            }
            ConnectOutcome::Failed { .. } => {
                error!("Failed to connect to {target}: {outcome}");
                Err(Error::Connect {
                    nqn: target.nqn.clone(),
                    portal: target.portal.clone(),
                    host_traddr: host_traddr.map(str::to_owned),
                    outcome,
                })
            }
        }
    }

    // Connect each discovered target, logging rather than returning failures
    fn login(&self, targets: &[Target]) -> Result<(), Error> {
        for target in targets {
            match self.connect(target, false) {
                Ok(()) => {}
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => warn!("Login to {target} failed: {e}"),
            }
        }
        Ok(())
    }
}

impl Fabrics for Nvme {
    fn discover_tcp_targets(&self, address: &str, login: bool) -> Result<Vec<Target>, Error> {
        let output = self
            .invoke(commands::discover_tcp(address, &self.options.port))?
            .check()?;
        let targets = discovery::parse(&output.stdout_lossy(), &Discovery::Tcp);
        debug!("Discovered {} TCP targets at {address}", targets.len());

        if login {
            self.login(&targets)?;
        }
        Ok(targets)
    }

    fn discover_fc_targets(&self, target_address: &str, login: bool) -> Result<Vec<Target>, Error> {
        let hosts = self.fc_hosts()?;
        if hosts.is_empty() {
            return Err(Error::NoFcHosts);
        }

        let mut targets = Vec::new();
        let mut last_error = None;

        for hba in &hosts {
            let host_traddr = hba.host_traddr();
            let result = self
                .invoke(commands::discover_fc(target_address, &host_traddr))
                .and_then(Invocation::check);

            match result {
                Ok(output) => targets.extend(discovery::parse(
                    &output.stdout_lossy(),
                    &Discovery::Fc {
                        target_address,
                        host_traddr: &host_traddr,
                    },
                )),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!("FC discovery of {target_address} from {host_traddr} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        if targets.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        debug!("Discovered {} FC targets at {target_address}", targets.len());

        if login {
            self.login(&targets)?;
        }
        Ok(targets)
    }

    fn initiators(&self, file: Option<&Path>) -> Result<Vec<String>, Error> {
        let path = match file {
            Some(file) => file.to_path_buf(),
            None => self.options.host_path(DEFAULT_HOSTNQN_FILE),
        };
        let initiators = host::read_initiators(&path)?;
        debug!("Read {} host NQNs from {}", initiators.len(), path.display());
        Ok(initiators)
    }

    fn tcp_connect(&self, target: &Target, duplicate: bool) -> Result<(), Error> {
        let args = commands::connect_tcp(&target.nqn, &target.portal, &self.options.port, duplicate);
        self.connect_with(target, None, args)
    }

    fn fc_connect(&self, target: &Target, duplicate: bool) -> Result<(), Error> {
        let host_traddr = target
            .host_traddr
            .as_deref()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::MissingHostAddress {
                nqn: target.nqn.clone(),
            })?;
        let args = commands::connect_fc(&target.nqn, &target.portal, host_traddr, duplicate);
        self.connect_with(target, Some(host_traddr), args)
    }

    fn disconnect(&self, target: &Target) -> Result<(), Error> {
        self.invoke(commands::disconnect(&target.nqn))?.check()?;
        info!("Disconnected {}", target.nqn);
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<Session>, Error> {
        match self.invoke(commands::list_subsys())?.query()? {
            Some(output) => Ok(session::parse(&output.stdout)),
            None => Ok(Vec::new()),
        }
    }

    fn devices_and_namespaces(&self) -> Result<Vec<DevicePathAndNamespace>, Error> {
        match self.invoke(commands::list())?.query()? {
            Some(output) => Ok(devices::parse_list(&output.stdout)?),
            None => Ok(Vec::new()),
        }
    }

    fn namespace_ids(
        &self,
        namespaces: &[DevicePathAndNamespace],
    ) -> Result<HashMap<DevicePathAndNamespace, Vec<String>>, Error> {
        let mut ids = HashMap::with_capacity(namespaces.len());

        for device in namespaces {
            let result = self
                .invoke(commands::list_ns(device.device_path()))
                .and_then(Invocation::check);

            match result {
                Ok(output) => {
                    ids.insert(device.clone(), devices::parse_namespace_ids(&output.stdout_lossy()));
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => warn!("Skipping {device}: {e}"),
            }
        }

        Ok(ids)
    }

    fn namespace_identity(&self, device: &Path, nsid: Option<&str>) -> Result<NamespaceIdentity, Error> {
        let output = self.invoke(commands::id_ns(device, nsid))?.check()?;
        let identity = devices::parse_identity(&output.stdout_lossy());
        if !identity.is_complete() {
            debug!("Incomplete identity for {}: {identity:?}", device.display());
        }
        Ok(identity)
    }

    fn rescan(&self, device: &Path) -> Result<(), Error> {
        self.invoke(commands::ns_rescan(device))?.check()?;
        Ok(())
    }
}
