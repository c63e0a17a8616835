//! Per-peer liveness: missed-ping/ack counters and pending-packet buffers.
//!
//! Counters instead of timestamps keep the core clock-free: the host's
//! periodic tick owns timeout policy and calls the `note_missed_*` hooks;
//! the core only compares counter state.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

/// Consecutive misses of one kind before a peer counts as unresponsive.
pub const MISS_THRESHOLD: u32 = 3;

/// Liveness state for one peer (parent or child).
#[derive(Debug, Default)]
pub struct PeerRecord {
    missed_pings: u32,
    missed_acks: u32,
    /// Set when a ping goes out, cleared by any answer. An outstanding
    /// ping at the next tick is what counts as a miss.
    ping_outstanding: bool,
    pending: VecDeque<Vec<u8>>,
}

impl PeerRecord {
    /// A peer is available only with a clean slate: no missed pings and no
    /// missed acks. Handlers gate on this before acting.
    pub fn is_available(&self) -> bool {
        self.missed_pings == 0 && self.missed_acks == 0
    }

    pub fn missed_pings(&self) -> u32 {
        self.missed_pings
    }

    pub fn missed_acks(&self) -> u32 {
        self.missed_acks
    }

    /// Below the miss threshold on the ping side.
    pub fn ping_healthy(&self) -> bool {
        self.missed_pings < MISS_THRESHOLD
    }

    /// Below the miss threshold on the ack side.
    pub fn ack_healthy(&self) -> bool {
        self.missed_acks < MISS_THRESHOLD
    }

    /// Number of datagrams deferred while this peer was unavailable.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// All known peers, keyed by transport address. Mutated only from the
/// dispatch task; single-threaded access means no locking.
#[derive(Debug, Default)]
pub struct PeerTable {
    records: HashMap<SocketAddr, PeerRecord>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for a newly observed peer. Existing records are kept
    /// as-is, so repeated CONNECTs stay idempotent.
    pub fn insert(&mut self, peer: SocketAddr) {
        self.records.entry(peer).or_default();
    }

    /// Drop a peer's record (and any pending datagrams with it). Returns
    /// whether a record existed.
    pub fn remove(&mut self, peer: SocketAddr) -> bool {
        self.records.remove(&peer).is_some()
    }

    pub fn contains(&self, peer: SocketAddr) -> bool {
        self.records.contains_key(&peer)
    }

    pub fn get(&self, peer: SocketAddr) -> Option<&PeerRecord> {
        self.records.get(&peer)
    }

    /// A packet arrived from the peer: reset the missed-ping counter and
    /// settle any outstanding ping. No-op for unknown peers.
    pub fn observe_ping(&mut self, peer: SocketAddr) {
        if let Some(record) = self.records.get_mut(&peer) {
            record.missed_pings = 0;
            record.ping_outstanding = false;
        }
    }

    /// An ACK arrived from the peer: reset the missed-ack counter and
    /// settle any outstanding ping. No-op for unknown peers.
    pub fn observe_ack(&mut self, peer: SocketAddr) {
        if let Some(record) = self.records.get_mut(&peer) {
            record.missed_acks = 0;
            record.ping_outstanding = false;
        }
    }

    /// Tick hook: the peer did not ping within the host's timeout window.
    pub fn note_missed_ping(&mut self, peer: SocketAddr) {
        if let Some(record) = self.records.get_mut(&peer) {
            record.missed_pings = record.missed_pings.saturating_add(1);
        }
    }

    /// Tick hook: a send to the peer is still awaiting its ACK.
    pub fn note_missed_ack(&mut self, peer: SocketAddr) {
        if let Some(record) = self.records.get_mut(&peer) {
            record.missed_acks = record.missed_acks.saturating_add(1);
        }
    }

    /// Tick hook: a new ping is going out to the peer. An answered
    /// previous ping costs nothing; an unanswered one is charged as one
    /// missed ping and one missed ack, so a peer that keeps answering
    /// never leaves the available state.
    pub fn ping_sent(&mut self, peer: SocketAddr) {
        if let Some(record) = self.records.get_mut(&peer) {
            if record.ping_outstanding {
                record.missed_pings = record.missed_pings.saturating_add(1);
                record.missed_acks = record.missed_acks.saturating_add(1);
            }
            record.ping_outstanding = true;
        }
    }

    /// Unknown peers are available: first contact must be able to get
    /// through before any record exists.
    pub fn is_available(&self, peer: SocketAddr) -> bool {
        self.records
            .get(&peer)
            .map_or(true, PeerRecord::is_available)
    }

    /// Defer a raw datagram from an unavailable peer for later replay.
    pub fn enqueue_pending(&mut self, peer: SocketAddr, raw: Vec<u8>) {
        self.records
            .entry(peer)
            .or_default()
            .pending
            .push_back(raw);
    }

    /// Take the peer's whole pending buffer, oldest first. The buffer is
    /// emptied in one step; replay order equals arrival order.
    pub fn drain_pending(&mut self, peer: SocketAddr) -> Vec<Vec<u8>> {
        match self.records.get_mut(&peer) {
            Some(record) => record.pending.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Peers that are available again but still hold deferred datagrams.
    /// The host's retry driver drains and re-injects these.
    pub fn replayable(&self) -> Vec<SocketAddr> {
        self.records
            .iter()
            .filter(|(_, r)| r.is_available() && !r.pending.is_empty())
            .map(|(&peer, _)| peer)
            .collect()
    }

    /// Peers past the miss threshold on either counter.
    pub fn unresponsive(&self) -> Vec<SocketAddr> {
        self.records
            .iter()
            .filter(|(_, r)| !r.ping_healthy() || !r.ack_healthy())
            .map(|(&peer, _)| peer)
            .collect()
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.records.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn unknown_peer_is_available() {
        let table = PeerTable::new();
        assert!(table.is_available(addr(1)));
    }

    #[test]
    fn available_iff_both_counters_zero() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        assert!(table.is_available(peer));

        table.note_missed_ping(peer);
        assert!(!table.is_available(peer));
        table.observe_ping(peer);
        assert!(table.is_available(peer));

        table.note_missed_ack(peer);
        assert!(!table.is_available(peer));
        table.observe_ack(peer);
        assert!(table.is_available(peer));
    }

    #[test]
    fn observe_resets_regardless_of_prior_value() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        for _ in 0..10 {
            table.note_missed_ping(peer);
            table.note_missed_ack(peer);
        }
        table.observe_ping(peer);
        table.observe_ack(peer);
        let record = table.get(peer).unwrap();
        assert_eq!(record.missed_pings(), 0);
        assert_eq!(record.missed_acks(), 0);
    }

    #[test]
    fn observe_on_unknown_peer_is_noop() {
        let mut table = PeerTable::new();
        table.observe_ping(addr(1));
        table.observe_ack(addr(1));
        table.note_missed_ping(addr(1));
        assert!(table.is_empty());
    }

    #[test]
    fn health_thresholds() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        for _ in 0..MISS_THRESHOLD - 1 {
            table.note_missed_ping(peer);
        }
        assert!(table.get(peer).unwrap().ping_healthy());
        assert!(table.unresponsive().is_empty());
        table.note_missed_ping(peer);
        assert!(!table.get(peer).unwrap().ping_healthy());
        assert_eq!(table.unresponsive(), vec![peer]);
    }

    #[test]
    fn answered_pings_cost_nothing() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        for _ in 0..5 {
            table.ping_sent(peer);
            assert!(table.is_available(peer));
            table.observe_ping(peer);
            table.observe_ack(peer);
        }
        assert!(table.is_available(peer));
    }

    #[test]
    fn unanswered_pings_charge_from_the_second_tick() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        table.ping_sent(peer);
        assert!(table.is_available(peer), "first ping is not a miss yet");
        for _ in 0..MISS_THRESHOLD {
            table.ping_sent(peer);
        }
        let record = table.get(peer).unwrap();
        assert_eq!(record.missed_pings(), MISS_THRESHOLD);
        assert_eq!(record.missed_acks(), MISS_THRESHOLD);
        assert!(!record.ping_healthy());
        assert!(!record.ack_healthy());
    }

    #[test]
    fn pending_drains_fifo_and_empties() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        table.enqueue_pending(peer, vec![1]);
        table.enqueue_pending(peer, vec![2]);
        table.enqueue_pending(peer, vec![3]);
        assert_eq!(table.get(peer).unwrap().pending_len(), 3);

        let drained = table.drain_pending(peer);
        assert_eq!(drained, vec![vec![1], vec![2], vec![3]]);
        assert_eq!(table.get(peer).unwrap().pending_len(), 0);
        assert!(table.drain_pending(peer).is_empty());
    }

    #[test]
    fn replayable_requires_available_and_pending() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        table.note_missed_ack(peer);
        table.enqueue_pending(peer, vec![9]);
        assert!(table.replayable().is_empty());

        table.observe_ack(peer);
        assert_eq!(table.replayable(), vec![peer]);

        table.drain_pending(peer);
        assert!(table.replayable().is_empty());
    }

    #[test]
    fn remove_drops_pending_too() {
        let mut table = PeerTable::new();
        let peer = addr(1);
        table.insert(peer);
        table.enqueue_pending(peer, vec![7]);
        assert!(table.remove(peer));
        assert!(!table.remove(peer));
        assert!(table.drain_pending(peer).is_empty());
    }
}
