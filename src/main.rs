/*!
 * POSIX Kernel - Main Entry Point
 *
 * Boots the namespace and init from environment configuration and keeps
 * init reaping orphans until Ctrl+C.
 */

use std::error::Error;
use tracing::{error, info, warn};

use posix_kernel::{init_tracing, ErrorKind, Kernel, KernelConfig, INIT_PID};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize structured tracing
    init_tracing();

    info!("POSIX kernel starting...");
    let config = KernelConfig::from_env()?;
    info!(
        max_processes = config.max_processes,
        max_fds = config.max_fds,
        pipe_capacity = config.pipe_capacity,
        quantum_us = config.scheduler_quantum_us,
        "Configuration loaded"
    );

    let kernel = Kernel::builder().with_config(config).build()?;
    let root = kernel.vfs().root().clone();
    let top_level: Vec<String> = kernel
        .vfs()
        .read_dir(&root, "/")?
        .map(|entry| entry.name.to_string())
        .collect();
    info!(entries = ?top_level, "Namespace ready");
    info!(pid = INIT_PID, "Init running");

    let reaper = tokio::spawn(reap_orphans(kernel.clone()));

    tokio::signal::ctrl_c().await?;
    warn!("Shutdown requested");
    reaper.abort();
    info!("Kernel stopped");
    Ok(())
}

/// Init's main loop: collect every child that exits
async fn reap_orphans(kernel: Kernel) {
    loop {
        match kernel.waitpid(INIT_PID, -1, 0).await {
            Ok(Some((pid, status))) => info!(pid, ?status, "Init reaped orphan"),
            Ok(None) => {}
            Err(e) if e.kind() == ErrorKind::NoChild || e.kind() == ErrorKind::Interrupted => {
                if let Err(e) = kernel.deliver_signals(INIT_PID) {
                    error!(error = %e, "Init signal delivery failed");
                }
                kernel.suspend(INIT_PID).await;
            }
            Err(e) => {
                error!(error = %e, "Init wait failed");
                return;
            }
        }
    }
}
