//! Receive-and-dispatch loop: the single owner of all node state.
//!
//! Every topology or liveness mutation happens on this task, so the core
//! needs no locks. The loop blocks in exactly three places: the socket
//! receive, the capacity-1 display hand-off, and nowhere else.

use std::sync::Arc;

use anyhow::Context;
use canopy_core::wire::MAX_DATAGRAM_LEN;
use canopy_core::{Action, Node};
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

pub async fn run_dispatch(
    socket: Arc<UdpSocket>,
    mut node: Node,
    ping_secs: u64,
    mut outgoing_rx: mpsc::Receiver<String>,
    display_tx: mpsc::Sender<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let period = Duration::from_secs(ping_secs.max(1));
    let mut ping = interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    let mut stdin_open = true;

    let joins = node.join_actions();
    perform_all(&socket, &display_tx, joins).await?;

    loop {
        tokio::select! {
            recv = socket.recv_from(&mut buf) => {
                let (len, sender) = recv.context("transport receive failed")?;
                match node.on_datagram(sender, &buf[..len]) {
                    Ok(actions) => perform_all(&socket, &display_tx, actions).await?,
                    Err(err) => debug!("dropping malformed datagram from {sender}: {err}"),
                }
                replay_pending(&mut node, &socket, &display_tx).await?;
            }
            _ = ping.tick() => {
                let actions = node.ping_tick();
                perform_all(&socket, &display_tx, actions).await?;
                for peer in node.unresponsive_peers() {
                    warn!("peer {peer} unresponsive");
                }
            }
            line = outgoing_rx.recv(), if stdin_open => {
                match line {
                    Some(body) => {
                        let actions = node.local_text(&body);
                        perform_all(&socket, &display_tx, actions).await?;
                    }
                    None => stdin_open = false,
                }
            }
            _ = &mut shutdown_rx => {
                info!("shutting down, notifying {} peer(s)", node.peers().len());
                let leaves = node.leave_actions();
                perform_all(&socket, &display_tx, leaves).await?;
                return Ok(());
            }
        }
    }
}

/// Execute core actions. Sends are fire-and-forget (a lost datagram is the
/// liveness layer's problem); a closed display queue means the node is
/// going away and surfaces as an error.
async fn perform_all(
    socket: &UdpSocket,
    display_tx: &mpsc::Sender<String>,
    actions: Vec<Action>,
) -> anyhow::Result<()> {
    for action in actions {
        match action {
            Action::Send(addr, bytes) => {
                if let Err(err) = socket.send_to(&bytes, addr).await {
                    warn!("send to {addr} failed: {err}");
                }
            }
            Action::Deliver(line) => {
                display_tx
                    .send(line)
                    .await
                    .context("display queue closed")?;
            }
        }
    }
    Ok(())
}

/// Retry driver: peers that came back available get their deferred
/// datagrams re-injected in arrival order. Each peer is drained once per
/// trigger; anything re-buffered waits for the next one.
async fn replay_pending(
    node: &mut Node,
    socket: &UdpSocket,
    display_tx: &mpsc::Sender<String>,
) -> anyhow::Result<()> {
    for peer in node.replayable_peers() {
        let pending = node.drain_pending(peer);
        debug!("replaying {} deferred datagram(s) from {peer}", pending.len());
        for raw in pending {
            match node.on_datagram(peer, &raw) {
                Ok(actions) => perform_all(socket, display_tx, actions).await?,
                Err(err) => debug!("dropping malformed deferred datagram from {peer}: {err}"),
            }
        }
    }
    Ok(())
}
