// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{env, time::Duration};

use fabrics::{CancelToken, Fabrics, Nvme, Options};
use log::{info, warn};

/// Upper bound for the whole report
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Prints what the local NVMe over Fabrics initiator sees:
/// - host NQNs and Fibre Channel adapters
/// - active controller paths
/// - namespace block devices and the namespace ids behind them
///
/// An optional argument names a root directory to run `nvme` in.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let mut options = Options::new();
    if let Some(root) = env::args().nth(1) {
        info!("Running nvme in {root}");
        options = options.with_chroot(root);
    }

    let nvme = Nvme::new(options).with_cancel(CancelToken::new().with_timeout(COMMAND_TIMEOUT));

    match nvme.initiators(None) {
        Ok(initiators) => initiators.iter().for_each(|nqn| info!("Host NQN: {nqn}")),
        Err(e) => warn!("No host NQN: {e}"),
    }

    for hba in nvme.fc_hosts()? {
        info!("FC adapter: {hba}");
    }

    info!("Sessions:");
    for session in nvme.sessions()? {
        info!("  {session}");
    }

    let devices = nvme.devices_and_namespaces()?;
    let ids = nvme.namespace_ids(&devices)?;
    info!("Namespaces:");
    for device in &devices {
        let listed = ids.get(device).map(|ids| ids.join(", ")).unwrap_or_default();
        info!("  {device}: [{listed}]");
    }

    Ok(())
}
