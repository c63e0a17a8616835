//! Node state machine: parentage, child set, and the six packet handlers.
//!
//! `Node` is sans-io. The host feeds it received datagrams, timer ticks and
//! local input; it returns the sends and display hand-offs to perform. All
//! state is owned by whichever single task drives it, so nothing here locks.

use std::net::SocketAddr;

use crate::liveness::{PeerRecord, PeerTable};
use crate::protocol::Packet;
use crate::wire::{self, PacketDecodeError};

/// Where this node hangs in the tree. Explicit `Root` replaces the
/// parent-equals-self encoding, so no handler compares an address against
/// the local identity to decide rootness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parentage {
    /// No parent: this node is the tree's origin.
    Root,
    /// Attached under the given parent address.
    Child(SocketAddr),
}

/// Host-visible effect of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send an encoded packet to the address, fire-and-forget.
    Send(SocketAddr, Vec<u8>),
    /// Hand a formatted line to the local display (blocking hand-off).
    Deliver(String),
}

/// One node of the broadcast tree.
pub struct Node {
    identity: SocketAddr,
    display_name: String,
    parentage: Parentage,
    /// Insertion order = join order. Grown only by CONNECT, shrunk only by
    /// DISCONNECT (and parent-redirect cleanup).
    children: Vec<SocketAddr>,
    peers: PeerTable,
}

/// Encode and queue a send. Encoding our own packets cannot realistically
/// fail; a failure is silently dropped like any other lost datagram.
fn push_send(actions: &mut Vec<Action>, to: SocketAddr, packet: &Packet) {
    if let Ok(bytes) = wire::encode_packet(packet) {
        actions.push(Action::Send(to, bytes));
    }
}

impl Node {
    /// Start as the root of a fresh single-node tree.
    pub fn new(identity: SocketAddr, display_name: impl Into<String>) -> Self {
        Self {
            identity,
            display_name: display_name.into(),
            parentage: Parentage::Root,
            children: Vec::new(),
            peers: PeerTable::new(),
        }
    }

    /// Start attached under `parent`. Call [`Node::join_actions`] to emit
    /// the initial CONNECT.
    pub fn with_parent(
        identity: SocketAddr,
        display_name: impl Into<String>,
        parent: SocketAddr,
    ) -> Self {
        let mut node = Self::new(identity, display_name);
        node.parentage = Parentage::Child(parent);
        node
    }

    pub fn identity(&self) -> SocketAddr {
        self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn parentage(&self) -> Parentage {
        self.parentage
    }

    pub fn is_root(&self) -> bool {
        self.parentage == Parentage::Root
    }

    pub fn parent(&self) -> Option<SocketAddr> {
        match self.parentage {
            Parentage::Root => None,
            Parentage::Child(parent) => Some(parent),
        }
    }

    pub fn children(&self) -> &[SocketAddr] {
        &self.children
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Tick hooks, exposed so a host can drive timeout policy directly
    /// (the bundled daemon goes through [`Node::ping_tick`] instead).
    pub fn note_missed_ping(&mut self, peer: SocketAddr) {
        self.peers.note_missed_ping(peer);
    }

    pub fn note_missed_ack(&mut self, peer: SocketAddr) {
        self.peers.note_missed_ack(peer);
    }

    /// Decode one received datagram and run the matching handler.
    /// Malformed datagrams surface as an error for the host to log; they
    /// never change state.
    pub fn on_datagram(
        &mut self,
        sender: SocketAddr,
        raw: &[u8],
    ) -> Result<Vec<Action>, PacketDecodeError> {
        let packet = wire::decode_packet(raw)?;
        let mut actions = Vec::new();
        match packet {
            Packet::Connect => self.handle_connect(sender, raw, &mut actions),
            Packet::Disconnect => self.handle_disconnect(sender, raw, &mut actions),
            Packet::Ack => self.handle_ack(sender),
            Packet::Text { name, body } => {
                self.handle_text(sender, raw, &name, &body, &mut actions)
            }
            Packet::Root => self.handle_root(sender, raw, &mut actions),
            Packet::Parent { new_parent } => {
                self.handle_parent(sender, raw, new_parent, &mut actions)
            }
        }
        Ok(actions)
    }

    /// CONNECT: relationship establishment plus liveness refresh. The only
    /// path that grows the child set.
    fn handle_connect(&mut self, sender: SocketAddr, raw: &[u8], actions: &mut Vec<Action>) {
        if !self.peers.is_available(sender) {
            self.peers.enqueue_pending(sender, raw.to_vec());
            return;
        }
        self.peers.observe_ping(sender);
        if !self.peers.contains(sender) {
            self.peers.insert(sender);
            if self.parentage != Parentage::Child(sender) {
                self.children.push(sender);
            }
        }
        push_send(actions, sender, &Packet::Ack);
    }

    /// DISCONNECT: buffered when the sender is unavailable, but still
    /// processed. Disconnection is honored even from a flaky peer, so there
    /// is deliberately no early return after buffering.
    fn handle_disconnect(&mut self, sender: SocketAddr, raw: &[u8], actions: &mut Vec<Action>) {
        if !self.peers.is_available(sender) {
            self.peers.enqueue_pending(sender, raw.to_vec());
        }
        if self.peers.remove(sender) {
            if self.parentage == Parentage::Child(sender) {
                // Ungraceful parent exit: self-heal by becoming a root.
                self.parentage = Parentage::Root;
            } else {
                self.children.retain(|&c| c != sender);
            }
            push_send(actions, sender, &Packet::Ack);
        }
    }

    /// ACK: pure refresh. Unknown senders are ignored.
    fn handle_ack(&mut self, sender: SocketAddr) {
        self.peers.observe_ping(sender);
        self.peers.observe_ack(sender);
    }

    /// TEXT: deliver locally, then flood along every tree edge except the
    /// one it arrived on. Unknown senders cannot inject into the tree.
    fn handle_text(
        &mut self,
        sender: SocketAddr,
        raw: &[u8],
        name: &str,
        body: &str,
        actions: &mut Vec<Action>,
    ) {
        if !self.peers.is_available(sender) {
            self.peers.enqueue_pending(sender, raw.to_vec());
            return;
        }
        if !self.peers.contains(sender) {
            return;
        }
        self.peers.observe_ping(sender);
        if !self.peers.is_available(sender) {
            // Liveness can degrade between receipt and processing; re-check
            // after the refresh, not just before.
            self.peers.enqueue_pending(sender, raw.to_vec());
            return;
        }

        actions.push(Action::Deliver(format!("{name}: {body}")));
        push_send(actions, sender, &Packet::Ack);

        let forward = Packet::Text {
            name: name.to_string(),
            body: body.to_string(),
        };
        for &child in &self.children {
            if child != sender {
                push_send(actions, child, &forward);
            }
        }
        if let Parentage::Child(parent) = self.parentage {
            if parent != sender {
                push_send(actions, parent, &forward);
            }
        }
    }

    /// ROOT: the sender tells this node to stop depending on its parent.
    /// The parent link is torn down gracefully when the parent can still
    /// hear us, then this node becomes a root.
    fn handle_root(&mut self, sender: SocketAddr, raw: &[u8], actions: &mut Vec<Action>) {
        if !self.peers.is_available(sender) {
            self.peers.enqueue_pending(sender, raw.to_vec());
            return;
        }
        if !self.peers.contains(sender) {
            return;
        }
        self.peers.observe_ping(sender);
        if let Parentage::Child(parent) = self.parentage {
            if self.peers.get(parent).is_some_and(PeerRecord::is_available) {
                push_send(actions, parent, &Packet::Disconnect);
            }
            // The parent is being replaced (by self); its record goes too.
            self.peers.remove(parent);
        }
        self.parentage = Parentage::Root;
        push_send(actions, sender, &Packet::Ack);
    }

    /// PARENT: redirect to a new point of attachment. Only meaningful from
    /// the current parent; no ACK by design (a redirect instruction, not a
    /// request needing confirmation).
    fn handle_parent(
        &mut self,
        sender: SocketAddr,
        raw: &[u8],
        new_parent: SocketAddr,
        actions: &mut Vec<Action>,
    ) {
        if self.parentage != Parentage::Child(sender) {
            return;
        }
        if !self.peers.is_available(sender) {
            self.peers.enqueue_pending(sender, raw.to_vec());
            return;
        }
        self.peers.observe_ping(sender);
        if new_parent == sender {
            // The parent re-announcing itself is a plain refresh; there is
            // nothing to re-attach.
            return;
        }
        self.peers.remove(sender);
        if new_parent == self.identity {
            // Redirected to ourselves: the old parent is handing us rootship.
            self.parentage = Parentage::Root;
        } else {
            self.parentage = Parentage::Child(new_parent);
            self.children.retain(|&c| c != new_parent);
            self.peers.insert(new_parent);
            push_send(actions, new_parent, &Packet::Connect);
        }
    }

    /// Initial attach: create the parent's record and emit the CONNECT.
    /// A root has nobody to join.
    pub fn join_actions(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Parentage::Child(parent) = self.parentage {
            self.peers.insert(parent);
            push_send(&mut actions, parent, &Packet::Connect);
        }
        actions
    }

    /// Periodic tick, driven by the host's timer: ping every known peer
    /// with a CONNECT. A peer whose previous ping went unanswered is
    /// charged one missed ping and one missed ack at this point; any
    /// answer resets the ping counter and an ACK resets both. A peer that
    /// keeps answering therefore never leaves the available state.
    pub fn ping_tick(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        for peer in self.peers.addresses() {
            self.peers.ping_sent(peer);
            push_send(&mut actions, peer, &Packet::Connect);
        }
        actions
    }

    /// Inject a line typed at this node: deliver locally and flood to all
    /// tree edges. There is no arrival edge to exclude.
    pub fn local_text(&self, body: &str) -> Vec<Action> {
        let mut actions = vec![Action::Deliver(format!("{}: {}", self.display_name, body))];
        let packet = Packet::Text {
            name: self.display_name.clone(),
            body: body.to_string(),
        };
        for &child in &self.children {
            push_send(&mut actions, child, &packet);
        }
        if let Parentage::Child(parent) = self.parentage {
            push_send(&mut actions, parent, &packet);
        }
        actions
    }

    /// Graceful exit. A child node detaches from its parent and redirects
    /// its children one level up. A departing root hands rootship to its
    /// eldest child and redirects the rest underneath it.
    pub fn leave_actions(&self) -> Vec<Action> {
        let mut actions = Vec::new();
        match self.parentage {
            Parentage::Child(parent) => {
                push_send(&mut actions, parent, &Packet::Disconnect);
                for &child in &self.children {
                    push_send(&mut actions, child, &Packet::Parent { new_parent: parent });
                }
            }
            Parentage::Root => {
                if let Some((&heir, rest)) = self.children.split_first() {
                    push_send(&mut actions, heir, &Packet::Root);
                    for &child in rest {
                        push_send(&mut actions, child, &Packet::Parent { new_parent: heir });
                    }
                }
            }
        }
        actions
    }

    /// Peers whose deferred datagrams are ready for replay. The host drains
    /// each with [`Node::drain_pending`] and re-injects via
    /// [`Node::on_datagram`] in the returned order.
    pub fn replayable_peers(&self) -> Vec<SocketAddr> {
        self.peers.replayable()
    }

    /// Take a peer's pending buffer, oldest first.
    pub fn drain_pending(&mut self, peer: SocketAddr) -> Vec<Vec<u8>> {
        self.peers.drain_pending(peer)
    }

    /// Peers past the miss threshold, for the host to report.
    pub fn unresponsive_peers(&self) -> Vec<SocketAddr> {
        self.peers.unresponsive()
    }
}
