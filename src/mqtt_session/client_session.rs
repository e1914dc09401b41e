//! Per-connection bookkeeping: packet identifiers, in-flight
//! acknowledgment state and the subscription table. No I/O, no timers.

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Stage of an outbound QoS 1/2 publish exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    /// QoS 1: PUBLISH sent, waiting for PUBACK.
    AwaitPubAck,
    /// QoS 2: PUBLISH sent, waiting for PUBREC.
    AwaitPubRec,
    /// QoS 2: PUBREL sent, waiting for PUBCOMP.
    AwaitPubComp,
}

/// One operation waiting on a broker acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    Publish { qos: u8, stage: PublishStage },
    Subscribe { filters: Vec<(String, u8)> },
    Unsubscribe { topics: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// All 65,535 packet identifiers have outstanding operations. The
    /// caller must stop issuing QoS 1/2 operations until some resolve.
    PacketIdsExhausted,
    /// The broker acknowledged an identifier with no pending operation.
    UnknownPacketId(u16),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PacketIdsExhausted => {
                write!(f, "all 65535 packet identifiers are outstanding")
            }
            SessionError::UnknownPacketId(id) => {
                write!(f, "no pending operation for packet identifier {}", id)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Session state owned exclusively by the protocol engine for the
/// lifetime of one logical connection.
#[derive(Debug, Default)]
pub struct ClientSession {
    // Next candidate identifier. Wraps at 65535 and skips 0.
    next_packet_id: u16,
    pending: HashMap<u16, PendingOp>,
    // Authoritative only after SUBACK; a pending SUBSCRIBE is not here.
    subscriptions: HashMap<String, u8>,
    // Inbound QoS 2 ids we have answered with PUBREC, awaiting PUBREL.
    inbound_qos2: HashSet<u16>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next unused non-zero 16-bit packet identifier.
    ///
    /// An identifier is never reused while an operation for it is
    /// outstanding.
    pub fn allocate_packet_id(&mut self) -> Result<u16, SessionError> {
        if self.pending.len() >= u16::MAX as usize {
            return Err(SessionError::PacketIdsExhausted);
        }
        loop {
            self.next_packet_id = self.next_packet_id.wrapping_add(1);
            if self.next_packet_id == 0 {
                self.next_packet_id = 1;
            }
            if !self.pending.contains_key(&self.next_packet_id) {
                return Ok(self.next_packet_id);
            }
        }
    }

    pub fn record_pending(&mut self, id: u16, op: PendingOp) {
        self.pending.insert(id, op);
    }

    /// Remove and return the operation an acknowledgment refers to.
    pub fn resolve_pending(&mut self, id: u16) -> Result<PendingOp, SessionError> {
        self.pending
            .remove(&id)
            .ok_or(SessionError::UnknownPacketId(id))
    }

    pub fn pending_op(&self, id: u16) -> Option<&PendingOp> {
        self.pending.get(&id)
    }

    pub fn pending_ids(&self) -> Vec<u16> {
        self.pending.keys().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn record_subscription(&mut self, filter: String, qos: u8) {
        self.subscriptions.insert(filter, qos);
    }

    pub fn remove_subscription(&mut self, filter: &str) {
        self.subscriptions.remove(filter);
    }

    pub fn subscriptions(&self) -> &HashMap<String, u8> {
        &self.subscriptions
    }

    /// Track an inbound QoS 2 id between our PUBREC and the broker's
    /// PUBREL. Returns false if the id was already tracked (DUP resend).
    pub fn record_inbound_qos2(&mut self, id: u16) -> bool {
        self.inbound_qos2.insert(id)
    }

    /// Release an inbound QoS 2 id on PUBREL. True if it was tracked.
    pub fn release_inbound_qos2(&mut self, id: u16) -> bool {
        self.inbound_qos2.remove(&id)
    }

    /// Drop every piece of bookkeeping. Called when the engine reaches
    /// its terminal state for this connection.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.subscriptions.clear();
        self.inbound_qos2.clear();
    }
}
