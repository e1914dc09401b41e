use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::{Duration, Instant};

use crate::mqtt_serde::control_packet::MqttPacket;
use crate::mqtt_serde::mqttv3::{
    MqttConnect, MqttDisconnect, MqttPingReq, MqttPubAck, MqttPubComp, MqttPubRec, MqttPubRel,
    MqttPublish, MqttSubscribe, MqttUnsubscribe, SUBACK_FAILURE,
};
use crate::mqtt_serde::MqttParser;
use crate::mqtt_session::{ClientSession, PendingOp, PublishStage};

use super::commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
use super::error::MqttClientError;
use super::opts::MqttClientOptions;

/// Connection lifecycle. Closed is terminal for one logical connection;
/// `connect()` on a Closed engine begins a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Closed,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Closed => "Closed",
        }
    }
}

/// Outcome of a successful CONNECT/CONNACK handshake.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub session_present: bool,
    pub return_code: u8,
}

/// Outcome of an acknowledged publish.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub message_id: Option<u16>,
    pub qos: u8,
}

/// Outcome of an acknowledged subscribe: one granted code per filter.
#[derive(Debug, Clone)]
pub struct SubscribeResult {
    pub message_id: u16,
    pub return_codes: Vec<u8>,
}

/// Outcome of an acknowledged unsubscribe.
#[derive(Debug, Clone)]
pub struct UnsubscribeResult {
    pub message_id: u16,
    pub topics: Vec<String>,
}

/// Events emitted by the engine for the I/O shell to act on.
#[derive(Debug)]
pub enum MqttEvent {
    /// CONNACK accepted the connection; state is now Connected.
    Connected(ConnectionResult),
    /// CONNACK refused the connection; state is now Closed.
    ConnectionRefused {
        return_code: u8,
        description: String,
    },
    Published(PublishResult),
    Subscribed(SubscribeResult),
    Unsubscribed(UnsubscribeResult),
    /// Inbound application message, in transport delivery order.
    MessageReceived(MqttPublish),
    PingResponse,
    /// Graceful shutdown completed; state is now Closed.
    Disconnected,
    /// The connection died. Every pending operation must be failed with
    /// this error, exactly once. State is now Closed.
    ConnectionClosed { error: MqttClientError },
}

/// Sans-I/O MQTT v3.1.1 client protocol engine.
///
/// The engine owns the protocol state of one connection and performs no
/// I/O. The shell around it:
/// 1. feeds bytes read from the transport into [`handle_incoming`],
/// 2. writes whatever [`take_outgoing`] yields to the transport,
/// 3. calls [`handle_tick`] at (or before) [`next_tick_at`],
/// 4. reports stream closure via [`handle_connection_closed`],
/// 5. reacts to the returned [`MqttEvent`]s.
///
/// Inbound frames are decoded by a single consumer in transport order;
/// the caller serializes command invocations (one writer), so outbound
/// frame bytes never interleave.
///
/// [`handle_incoming`]: MqttEngine::handle_incoming
/// [`take_outgoing`]: MqttEngine::take_outgoing
/// [`handle_tick`]: MqttEngine::handle_tick
/// [`next_tick_at`]: MqttEngine::next_tick_at
/// [`handle_connection_closed`]: MqttEngine::handle_connection_closed
pub struct MqttEngine {
    options: MqttClientOptions,
    state: ConnectionState,
    session: ClientSession,
    parser: MqttParser,
    outgoing_buffer: VecDeque<Vec<u8>>,
    events: Vec<MqttEvent>,

    // Timer state, all driven through handle_tick(now).
    last_outbound: Instant,
    connect_deadline: Option<Instant>,
    ping_deadline: Option<Instant>,
}

impl MqttEngine {
    pub fn new(options: MqttClientOptions) -> Self {
        Self {
            options,
            state: ConnectionState::Idle,
            session: ClientSession::new(),
            parser: MqttParser::default(),
            outgoing_buffer: VecDeque::new(),
            events: Vec::new(),
            last_outbound: Instant::now(),
            connect_deadline: None,
            ping_deadline: None,
        }
    }

    pub fn options(&self) -> &MqttClientOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Subscriptions the broker has acknowledged (filter → granted QoS).
    pub fn subscriptions(&self) -> HashMap<String, u8> {
        self.session.subscriptions().clone()
    }

    /// Drain all pending events.
    pub fn take_events(&mut self) -> Vec<MqttEvent> {
        std::mem::take(&mut self.events)
    }

    /// Take bytes ready to be written to the transport.
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        let mut all_bytes = Vec::new();
        while let Some(frame) = self.outgoing_buffer.pop_front() {
            all_bytes.extend(frame);
        }
        all_bytes
    }

    // --- Commands ---

    /// Begin the MQTT handshake: enqueue CONNECT and arm the CONNACK
    /// deadline. The transport must already be connected.
    pub fn connect(&mut self, now: Instant) -> Result<(), MqttClientError> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Closed => {}
            other => {
                return Err(MqttClientError::InvalidState {
                    expected: "Idle or Closed".to_string(),
                    actual: other.name().to_string(),
                });
            }
        }

        // A connect on a Closed engine starts a fresh logical connection.
        self.session = ClientSession::new();
        self.parser = MqttParser::default();
        self.outgoing_buffer.clear();
        self.ping_deadline = None;

        let mut packet = MqttConnect::new(
            self.options.client_id.clone(),
            self.options.keep_alive,
            self.options.clean_session,
        );
        packet.username = self.options.username.clone();
        packet.password = self.options.password.clone();

        self.state = ConnectionState::Connecting;
        self.connect_deadline = Some(now + Duration::from_millis(self.options.connect_timeout_ms));
        self.enqueue_packet(MqttPacket::Connect(packet), now)
    }

    /// Queue a PUBLISH. Returns the allocated packet identifier for
    /// QoS 1/2, `None` for QoS 0 (which has nothing to await).
    pub fn publish(
        &mut self,
        command: PublishCommand,
        now: Instant,
    ) -> Result<Option<u16>, MqttClientError> {
        self.require_connected()?;
        if command.qos > 2 {
            return Err(MqttClientError::ProtocolViolation {
                message: format!("invalid QoS {}", command.qos),
            });
        }

        let message_id = if command.qos > 0 {
            let id = self.session.allocate_packet_id()?;
            let stage = if command.qos == 1 {
                PublishStage::AwaitPubAck
            } else {
                PublishStage::AwaitPubRec
            };
            self.session.record_pending(
                id,
                PendingOp::Publish {
                    qos: command.qos,
                    stage,
                },
            );
            Some(id)
        } else {
            None
        };

        let packet = MqttPacket::Publish(command.into_publish(message_id));
        if let Err(e) = self.enqueue_packet(packet, now) {
            if let Some(id) = message_id {
                let _ = self.session.resolve_pending(id);
            }
            return Err(e);
        }
        Ok(message_id)
    }

    /// Queue a SUBSCRIBE. Resolves on the matching SUBACK.
    pub fn subscribe(
        &mut self,
        command: SubscribeCommand,
        now: Instant,
    ) -> Result<u16, MqttClientError> {
        self.require_connected()?;

        let id = self.session.allocate_packet_id()?;
        let filters: Vec<(String, u8)> = command
            .subscriptions
            .iter()
            .map(|s| (s.topic_filter.clone(), s.qos))
            .collect();
        self.session
            .record_pending(id, PendingOp::Subscribe { filters });

        let packet = MqttPacket::Subscribe(MqttSubscribe::new(id, command.subscriptions));
        if let Err(e) = self.enqueue_packet(packet, now) {
            let _ = self.session.resolve_pending(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Queue an UNSUBSCRIBE. Resolves on the matching UNSUBACK.
    pub fn unsubscribe(
        &mut self,
        command: UnsubscribeCommand,
        now: Instant,
    ) -> Result<u16, MqttClientError> {
        self.require_connected()?;

        let id = self.session.allocate_packet_id()?;
        self.session.record_pending(
            id,
            PendingOp::Unsubscribe {
                topics: command.topics.clone(),
            },
        );

        let packet = MqttPacket::Unsubscribe(MqttUnsubscribe::new(id, command.topics));
        if let Err(e) = self.enqueue_packet(packet, now) {
            let _ = self.session.resolve_pending(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Queue a DISCONNECT. The shell flushes outgoing bytes, closes the
    /// transport, then reports closure via `handle_connection_closed`.
    pub fn disconnect(&mut self, now: Instant) -> Result<(), MqttClientError> {
        self.require_connected()?;
        self.state = ConnectionState::Disconnecting;
        self.enqueue_packet(MqttPacket::Disconnect(MqttDisconnect::new()), now)
    }

    // --- Transport notifications ---

    /// Feed bytes read from the transport. Decodes as many complete
    /// frames as the buffer holds, strictly in order, and returns the
    /// resulting events. A malformed frame is fatal for the connection.
    pub fn handle_incoming(&mut self, data: &[u8], now: Instant) -> Vec<MqttEvent> {
        self.parser.feed(data);

        loop {
            if self.state == ConnectionState::Closed {
                break;
            }
            match self.parser.next_packet() {
                Ok(Some(packet)) => self.handle_packet(packet, now),
                Ok(None) => break,
                Err(e) => {
                    self.close_with_error(MqttClientError::from(e));
                    break;
                }
            }
        }

        self.take_events()
    }

    /// The transport closed or errored underneath us.
    ///
    /// `error = None` marks the voluntary closure that ends a
    /// `disconnect()`; anything else is an involuntary drop. Either way
    /// the engine lands in Closed, the session is destroyed, and every
    /// pending operation must be failed by the shell exactly once.
    pub fn handle_connection_closed(&mut self, error: Option<io::Error>) -> Vec<MqttEvent> {
        if self.state == ConnectionState::Closed {
            return self.take_events();
        }

        let voluntary = self.state == ConnectionState::Disconnecting && error.is_none();
        if voluntary {
            self.state = ConnectionState::Closed;
            self.session.clear();
            self.connect_deadline = None;
            self.ping_deadline = None;
            self.events.push(MqttEvent::Disconnected);
        } else {
            let err = match error {
                Some(e) => MqttClientError::from_io_error(e, "transport"),
                None => MqttClientError::ConnectionLost {
                    reason: "transport closed by peer".to_string(),
                },
            };
            self.close_with_error(err);
        }
        self.take_events()
    }

    /// Process time-dependent logic: the CONNACK deadline, keepalive
    /// PINGREQ emission, and the PINGRESP deadline.
    pub fn handle_tick(&mut self, now: Instant) -> Vec<MqttEvent> {
        match self.state {
            ConnectionState::Connecting => {
                if let Some(deadline) = self.connect_deadline {
                    if now >= deadline {
                        self.close_with_error(MqttClientError::ConnectTimeout {
                            timeout_ms: self.options.connect_timeout_ms,
                        });
                    }
                }
            }
            ConnectionState::Connected => {
                if let Some(deadline) = self.ping_deadline {
                    if now >= deadline {
                        self.close_with_error(MqttClientError::NetworkError {
                            kind: io::ErrorKind::TimedOut,
                            message: format!(
                                "no PINGRESP within {} ms",
                                self.options.ping_timeout_ms
                            ),
                        });
                        return self.take_events();
                    }
                }

                let keep_alive = Duration::from_secs(self.options.keep_alive as u64);
                if keep_alive > Duration::ZERO
                    && self.ping_deadline.is_none()
                    && now.duration_since(self.last_outbound) >= keep_alive
                {
                    let _ = self.enqueue_packet(MqttPacket::PingReq(MqttPingReq::new()), now);
                    self.ping_deadline =
                        Some(now + Duration::from_millis(self.options.ping_timeout_ms));
                }
            }
            _ => {}
        }

        self.take_events()
    }

    /// The earliest instant at which `handle_tick` has work to do.
    /// `None` when no timer is armed (sleep until I/O).
    pub fn next_tick_at(&self) -> Option<Instant> {
        match self.state {
            ConnectionState::Connecting => self.connect_deadline,
            ConnectionState::Connected => {
                if let Some(deadline) = self.ping_deadline {
                    return Some(deadline);
                }
                let keep_alive = Duration::from_secs(self.options.keep_alive as u64);
                if keep_alive > Duration::ZERO {
                    Some(self.last_outbound + keep_alive)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    // --- Internals ---

    fn require_connected(&self) -> Result<(), MqttClientError> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(MqttClientError::NotConnected)
        }
    }

    /// Transition to Closed on a connection-fatal fault. The shell fails
    /// every pending operation off the single ConnectionClosed event.
    fn close_with_error(&mut self, error: MqttClientError) {
        self.state = ConnectionState::Closed;
        self.session.clear();
        self.connect_deadline = None;
        self.ping_deadline = None;
        self.events.push(MqttEvent::ConnectionClosed { error });
    }

    fn protocol_violation(&mut self, message: String) {
        self.close_with_error(MqttClientError::ProtocolViolation { message });
    }

    fn enqueue_packet(&mut self, packet: MqttPacket, now: Instant) -> Result<(), MqttClientError> {
        let bytes = packet.to_bytes()?;
        self.outgoing_buffer.push_back(bytes);
        self.last_outbound = now;
        Ok(())
    }

    fn handle_packet(&mut self, packet: MqttPacket, now: Instant) {
        match packet {
            MqttPacket::ConnAck(ack) => {
                if self.state != ConnectionState::Connecting {
                    self.protocol_violation(format!(
                        "CONNACK received in state {}",
                        self.state.name()
                    ));
                    return;
                }
                self.connect_deadline = None;
                if ack.return_code == 0 {
                    self.state = ConnectionState::Connected;
                    self.events.push(MqttEvent::Connected(ConnectionResult {
                        session_present: ack.session_present,
                        return_code: ack.return_code,
                    }));
                } else {
                    let description = ack.reason().to_string();
                    self.state = ConnectionState::Closed;
                    self.session.clear();
                    self.events.push(MqttEvent::ConnectionRefused {
                        return_code: ack.return_code,
                        description,
                    });
                }
            }

            MqttPacket::Publish(publish) => self.handle_inbound_publish(publish, now),

            MqttPacket::PubAck(ack) => {
                match self.session.resolve_pending(ack.message_id) {
                    Ok(PendingOp::Publish {
                        qos: 1,
                        stage: PublishStage::AwaitPubAck,
                    }) => {
                        self.events.push(MqttEvent::Published(PublishResult {
                            message_id: Some(ack.message_id),
                            qos: 1,
                        }));
                    }
                    Ok(_) => self.protocol_violation(format!(
                        "PUBACK for packet id {} not awaiting PUBACK",
                        ack.message_id
                    )),
                    Err(e) => self.close_with_error(e.into()),
                }
            }

            MqttPacket::PubRec(rec) => {
                match self.session.resolve_pending(rec.message_id) {
                    Ok(PendingOp::Publish {
                        qos: 2,
                        stage: PublishStage::AwaitPubRec,
                    }) => {
                        self.session.record_pending(
                            rec.message_id,
                            PendingOp::Publish {
                                qos: 2,
                                stage: PublishStage::AwaitPubComp,
                            },
                        );
                        let _ = self.enqueue_packet(
                            MqttPacket::PubRel(MqttPubRel::new(rec.message_id)),
                            now,
                        );
                    }
                    Ok(_) => self.protocol_violation(format!(
                        "PUBREC for packet id {} not awaiting PUBREC",
                        rec.message_id
                    )),
                    Err(e) => self.close_with_error(e.into()),
                }
            }

            MqttPacket::PubComp(comp) => {
                match self.session.resolve_pending(comp.message_id) {
                    Ok(PendingOp::Publish {
                        qos: 2,
                        stage: PublishStage::AwaitPubComp,
                    }) => {
                        self.events.push(MqttEvent::Published(PublishResult {
                            message_id: Some(comp.message_id),
                            qos: 2,
                        }));
                    }
                    Ok(_) => self.protocol_violation(format!(
                        "PUBCOMP for packet id {} not awaiting PUBCOMP",
                        comp.message_id
                    )),
                    Err(e) => self.close_with_error(e.into()),
                }
            }

            MqttPacket::PubRel(rel) => {
                // Broker releasing an inbound QoS 2 exchange. A resent
                // PUBREL (our PUBCOMP was lost) is answered again.
                self.session.release_inbound_qos2(rel.message_id);
                let _ = self
                    .enqueue_packet(MqttPacket::PubComp(MqttPubComp::new(rel.message_id)), now);
            }

            MqttPacket::SubAck(ack) => {
                match self.session.resolve_pending(ack.message_id) {
                    Ok(PendingOp::Subscribe { filters }) => {
                        if filters.len() != ack.return_codes.len() {
                            self.protocol_violation(format!(
                                "SUBACK carries {} return codes for {} filters",
                                ack.return_codes.len(),
                                filters.len()
                            ));
                            return;
                        }
                        for ((filter, _requested), &code) in
                            filters.iter().zip(ack.return_codes.iter())
                        {
                            if code != SUBACK_FAILURE {
                                self.session.record_subscription(filter.clone(), code);
                            }
                        }
                        self.events.push(MqttEvent::Subscribed(SubscribeResult {
                            message_id: ack.message_id,
                            return_codes: ack.return_codes,
                        }));
                    }
                    Ok(_) => self.protocol_violation(format!(
                        "SUBACK for packet id {} that is not a subscribe",
                        ack.message_id
                    )),
                    Err(e) => self.close_with_error(e.into()),
                }
            }

            MqttPacket::UnsubAck(ack) => {
                match self.session.resolve_pending(ack.message_id) {
                    Ok(PendingOp::Unsubscribe { topics }) => {
                        for topic in &topics {
                            self.session.remove_subscription(topic);
                        }
                        self.events.push(MqttEvent::Unsubscribed(UnsubscribeResult {
                            message_id: ack.message_id,
                            topics,
                        }));
                    }
                    Ok(_) => self.protocol_violation(format!(
                        "UNSUBACK for packet id {} that is not an unsubscribe",
                        ack.message_id
                    )),
                    Err(e) => self.close_with_error(e.into()),
                }
            }

            MqttPacket::PingResp(_) => {
                self.ping_deadline = None;
                self.events.push(MqttEvent::PingResponse);
            }

            // The broker never sends these in v3.1.1.
            other @ (MqttPacket::Connect(_)
            | MqttPacket::Subscribe(_)
            | MqttPacket::Unsubscribe(_)
            | MqttPacket::PingReq(_)
            | MqttPacket::Disconnect(_)) => {
                self.protocol_violation(format!(
                    "{} is not a server-to-client packet",
                    other.name()
                ));
            }
        }
    }

    fn handle_inbound_publish(&mut self, publish: MqttPublish, now: Instant) {
        match publish.qos {
            0 => self.events.push(MqttEvent::MessageReceived(publish)),
            1 => {
                let Some(id) = publish.message_id else {
                    self.protocol_violation("QoS 1 PUBLISH without packet id".to_string());
                    return;
                };
                // Deliver first, then acknowledge. DUP retransmissions
                // are delivered again: the guarantee is at-least-once.
                self.events.push(MqttEvent::MessageReceived(publish));
                let _ = self.enqueue_packet(MqttPacket::PubAck(MqttPubAck::new(id)), now);
            }
            2 => {
                let Some(id) = publish.message_id else {
                    self.protocol_violation("QoS 2 PUBLISH without packet id".to_string());
                    return;
                };
                self.events.push(MqttEvent::MessageReceived(publish));
                // Track the exchange until PUBREL; a DUP resend does not
                // allocate new bookkeeping.
                self.session.record_inbound_qos2(id);
                let _ = self.enqueue_packet(MqttPacket::PubRec(MqttPubRec::new(id)), now);
            }
            _ => self.protocol_violation("PUBLISH with reserved QoS".to_string()),
        }
    }
}
