// Canopy node: UDP broadcast-tree chat daemon.

use std::sync::Arc;

use anyhow::Context;
use canopy_core::Node;
use log::info;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};

mod config;
mod console;
mod dispatch;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("canopy-node {VERSION}");
            return Ok(());
        }
    }
    env_logger::init();
    let cfg = config::load();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg))
}

async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let socket = Arc::new(
        UdpSocket::bind(cfg.bind)
            .await
            .with_context(|| format!("failed to bind {}", cfg.bind))?,
    );
    let identity = socket.local_addr()?;
    let node = match cfg.parent {
        Some(parent) => {
            info!("canopy-node {VERSION} on {identity} as {:?}, attaching under {parent}", cfg.name);
            Node::with_parent(identity, cfg.name.clone(), parent)
        }
        None => {
            info!("canopy-node {VERSION} on {identity} as {:?}, starting a new tree", cfg.name);
            Node::new(identity, cfg.name.clone())
        }
    };

    let (display_tx, display_rx) = mpsc::channel(1);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(console::run_display(display_rx));
    tokio::spawn(console::run_input(outgoing_tx));
    let mut dispatch = tokio::spawn(dispatch::run_dispatch(
        socket,
        node,
        cfg.ping_secs,
        outgoing_rx,
        display_tx,
        shutdown_rx,
    ));

    tokio::select! {
        res = &mut dispatch => {
            // Dispatch never returns on its own except on a fatal
            // transport error; surface it.
            res.context("dispatch task panicked")?
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(std::time::Duration::from_secs(2), &mut dispatch).await {
                Ok(res) => res.context("dispatch task panicked")?,
                Err(_) => {
                    dispatch.abort();
                    Ok(())
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
