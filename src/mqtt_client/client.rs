//! High-level asynchronous MQTT client on the Tokio runtime.
//!
//! `DirectMqttClient` is a thin facade over [`MqttEngine`]: every public
//! operation enqueues a command carrying a oneshot responder onto a
//! single worker task, which owns the engine and the transport. The
//! worker is both the single writer (outbound frames never interleave
//! mid-frame) and the single decode consumer; the registered message
//! callback runs synchronously inside its dispatch loop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::mqtt_serde::mqttv3::publish::MqttPublish;

use super::commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
use super::engine::{
    ConnectionResult, ConnectionState, MqttEngine, MqttEvent, PublishResult, SubscribeResult,
    UnsubscribeResult,
};
use super::error::{MqttClientError, MqttClientResult};
use super::opts::MqttClientOptions;
use super::transport::{BoxedTransport, TcpTransport, Transport};

/// One inbound application message, as handed to the callback.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
    pub dup: bool,
}

impl From<MqttPublish> for ReceivedMessage {
    fn from(p: MqttPublish) -> Self {
        Self {
            topic: p.topic_name,
            payload: p.payload,
            qos: p.qos,
            retain: p.retain,
            dup: p.dup,
        }
    }
}

/// Callback invoked for every inbound PUBLISH, in delivery order.
pub type MessageCallback = Box<dyn Fn(ReceivedMessage) + Send + Sync>;

/// Snapshot answered by `status()`.
#[derive(Debug, Clone)]
pub struct ClientStatus {
    pub state: ConnectionState,
    /// Acknowledged subscriptions only (filter → granted QoS).
    pub subscriptions: HashMap<String, u8>,
}

/// Facade-level configuration: queue sizing and reconnect policy.
/// Reconnection is a facade concern; the engine never reconnects.
#[derive(Debug, Clone)]
pub struct DirectMqttClientConfig {
    /// Queue size for pending commands.
    pub command_queue_size: usize,
    /// Reconnect automatically after an involuntary connection loss.
    pub auto_reconnect: bool,
    /// Initial reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Maximum reconnect delay in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Maximum reconnect attempts (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Set TCP_NODELAY on the socket.
    pub tcp_nodelay: bool,
}

impl Default for DirectMqttClientConfig {
    fn default() -> Self {
        Self {
            command_queue_size: 64,
            auto_reconnect: false,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 0,
            tcp_nodelay: true,
        }
    }
}

enum ClientCommand {
    Connect {
        resp: oneshot::Sender<MqttClientResult<ConnectionResult>>,
    },
    Publish {
        cmd: PublishCommand,
        resp: oneshot::Sender<MqttClientResult<PublishResult>>,
    },
    Subscribe {
        cmd: SubscribeCommand,
        resp: oneshot::Sender<MqttClientResult<SubscribeResult>>,
    },
    Unsubscribe {
        cmd: UnsubscribeCommand,
        resp: oneshot::Sender<MqttClientResult<UnsubscribeResult>>,
    },
    Disconnect {
        resp: oneshot::Sender<MqttClientResult<()>>,
    },
    SetMessageCallback(MessageCallback),
    Status {
        resp: oneshot::Sender<ClientStatus>,
    },
    Shutdown,
}

/// Asynchronous MQTT v3.1.1 client with the direct-method wrapper
/// surface: connect / subscribe / publish / disconnect / on_message /
/// status. Operations suspend until the corresponding broker reply (or
/// timeout/transport failure); `publish` at QoS 0 resolves after the
/// local write.
pub struct DirectMqttClient {
    command_tx: mpsc::Sender<ClientCommand>,
}

impl DirectMqttClient {
    /// Spawn the worker for a validated set of options.
    pub fn new(options: MqttClientOptions) -> Self {
        Self::with_config(options, DirectMqttClientConfig::default())
    }

    pub fn with_config(options: MqttClientOptions, config: DirectMqttClientConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_size.max(1));
        let worker = ClientWorker::new(options, config, command_rx);
        tokio::spawn(worker.run());
        Self { command_tx }
    }

    /// Open the transport and perform the CONNECT/CONNACK handshake.
    /// Fails with `ConnectTimeout`, `ConnectionRefused` or
    /// `NetworkError` per the handshake outcome.
    pub async fn connect(&self) -> MqttClientResult<ConnectionResult> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Connect { resp: tx }).await?;
        Self::await_response(rx).await
    }

    /// Publish `payload` to `topic` at the given QoS.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
    ) -> MqttClientResult<PublishResult> {
        validate_topic("topic", topic)?;
        validate_qos(qos)?;
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Publish {
            cmd: PublishCommand::new(topic, payload.to_vec(), qos, false),
            resp: tx,
        })
        .await?;
        Self::await_response(rx).await
    }

    /// Subscribe to a topic filter. Resolves on SUBACK with the granted
    /// codes; only then does the filter count as subscribed.
    pub async fn subscribe(&self, filter: &str, qos: u8) -> MqttClientResult<SubscribeResult> {
        validate_topic("filter", filter)?;
        validate_qos(qos)?;
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Subscribe {
            cmd: SubscribeCommand::single(filter, qos),
            resp: tx,
        })
        .await?;
        Self::await_response(rx).await
    }

    /// Unsubscribe from topic filters. Resolves on UNSUBACK.
    pub async fn unsubscribe(&self, filters: Vec<String>) -> MqttClientResult<UnsubscribeResult> {
        if filters.is_empty() {
            return Err(MqttClientError::InvalidConfiguration {
                field: "filters".to_string(),
                reason: "at least one topic filter is required".to_string(),
            });
        }
        for filter in &filters {
            validate_topic("filter", filter)?;
        }
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Unsubscribe {
            cmd: UnsubscribeCommand::new(filters),
            resp: tx,
        })
        .await?;
        Self::await_response(rx).await
    }

    /// Send DISCONNECT and close the transport.
    pub async fn disconnect(&self) -> MqttClientResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Disconnect { resp: tx })
            .await?;
        Self::await_response(rx).await
    }

    /// Register the single message callback. The engine owns the
    /// reference and invokes it synchronously from its decode loop, so
    /// callback executions never race with each other.
    pub async fn on_message<F>(&self, callback: F) -> MqttClientResult<()>
    where
        F: Fn(ReceivedMessage) + Send + Sync + 'static,
    {
        self.send_command(ClientCommand::SetMessageCallback(Box::new(callback)))
            .await
    }

    /// Current connection state plus acknowledged subscriptions.
    pub async fn status(&self) -> MqttClientResult<ClientStatus> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ClientCommand::Status { resp: tx }).await?;
        rx.await.map_err(|_| MqttClientError::ChannelClosed {
            channel: "status response".to_string(),
        })
    }

    /// Stop the worker task.
    pub async fn shutdown(self) -> MqttClientResult<()> {
        self.send_command(ClientCommand::Shutdown).await
    }

    async fn send_command(&self, command: ClientCommand) -> MqttClientResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| MqttClientError::ChannelClosed {
                channel: "command".to_string(),
            })
    }

    async fn await_response<T>(
        rx: oneshot::Receiver<MqttClientResult<T>>,
    ) -> MqttClientResult<T> {
        rx.await
            .map_err(|_| MqttClientError::ChannelClosed {
                channel: "command response".to_string(),
            })
            .and_then(|r| r)
    }
}

fn validate_topic(field: &str, topic: &str) -> MqttClientResult<()> {
    if topic.trim().is_empty() {
        return Err(MqttClientError::InvalidConfiguration {
            field: field.to_string(),
            reason: "cannot be empty".to_string(),
        });
    }
    if topic.len() > u16::MAX as usize {
        return Err(MqttClientError::InvalidConfiguration {
            field: field.to_string(),
            reason: "exceeds 65535 bytes".to_string(),
        });
    }
    Ok(())
}

fn validate_qos(qos: u8) -> MqttClientResult<()> {
    if qos > 2 {
        return Err(MqttClientError::InvalidConfiguration {
            field: "qos".to_string(),
            reason: "must be 0, 1 or 2".to_string(),
        });
    }
    Ok(())
}

/// Worker task owning the engine, the transport, and all responders.
struct ClientWorker {
    engine: MqttEngine,
    config: DirectMqttClientConfig,
    command_rx: mpsc::Receiver<ClientCommand>,
    transport: Option<BoxedTransport>,

    connect_waiter: Option<oneshot::Sender<MqttClientResult<ConnectionResult>>>,
    disconnect_waiter: Option<oneshot::Sender<MqttClientResult<()>>>,
    publish_waiters: HashMap<u16, oneshot::Sender<MqttClientResult<PublishResult>>>,
    subscribe_waiters: HashMap<u16, oneshot::Sender<MqttClientResult<SubscribeResult>>>,
    unsubscribe_waiters: HashMap<u16, oneshot::Sender<MqttClientResult<UnsubscribeResult>>>,

    message_callback: Option<MessageCallback>,

    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
}

impl ClientWorker {
    fn new(
        options: MqttClientOptions,
        config: DirectMqttClientConfig,
        command_rx: mpsc::Receiver<ClientCommand>,
    ) -> Self {
        Self {
            engine: MqttEngine::new(options),
            config,
            command_rx,
            transport: None,
            connect_waiter: None,
            disconnect_waiter: None,
            publish_waiters: HashMap::new(),
            subscribe_waiters: HashMap::new(),
            unsubscribe_waiters: HashMap::new(),
            message_callback: None,
            reconnect_attempts: 0,
            reconnect_at: None,
        }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        // All client handles dropped.
                        None => break,
                    }
                }

                read_result = async {
                    match &mut self.transport {
                        Some(transport) => {
                            let mut buffer = vec![0u8; 4096];
                            match transport.read(&mut buffer).await {
                                Ok(0) => Ok(None),
                                Ok(n) => {
                                    buffer.truncate(n);
                                    Ok(Some(buffer))
                                }
                                Err(e) => Err(e),
                            }
                        }
                        None => std::future::pending::<std::io::Result<Option<Vec<u8>>>>().await,
                    }
                } => {
                    match read_result {
                        Ok(Some(bytes)) => {
                            let events = self.engine.handle_incoming(&bytes, Instant::now());
                            self.dispatch_events(events).await;
                        }
                        Ok(None) => {
                            debug!("transport reached EOF");
                            let events = self.engine.handle_connection_closed(None);
                            self.dispatch_events(events).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "transport read failed");
                            let events = self.engine.handle_connection_closed(Some(e));
                            self.dispatch_events(events).await;
                        }
                    }
                }

                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.handle_deadline().await;
                }
            }

            self.flush_outgoing().await;
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.engine.next_tick_at(), self.reconnect_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn handle_deadline(&mut self) {
        let now = Instant::now();

        if let Some(at) = self.reconnect_at {
            if now >= at {
                self.reconnect_at = None;
                self.try_reconnect().await;
                return;
            }
        }

        let events = self.engine.handle_tick(now);
        self.dispatch_events(events).await;
    }

    /// Returns false when the worker should stop.
    async fn handle_command(&mut self, command: ClientCommand) -> bool {
        match command {
            ClientCommand::Connect { resp } => {
                match self.open_and_handshake().await {
                    Ok(()) => self.connect_waiter = Some(resp),
                    Err(e) => {
                        let _ = resp.send(Err(e));
                    }
                }
            }
            ClientCommand::Publish { cmd, resp } => {
                let qos = cmd.qos;
                match self.engine.publish(cmd, Instant::now()) {
                    // QoS 0 has nothing to await beyond the local write.
                    Ok(None) => {
                        let _ = resp.send(Ok(PublishResult {
                            message_id: None,
                            qos,
                        }));
                    }
                    Ok(Some(id)) => {
                        self.publish_waiters.insert(id, resp);
                    }
                    Err(e) => {
                        let _ = resp.send(Err(e));
                    }
                }
            }
            ClientCommand::Subscribe { cmd, resp } => {
                match self.engine.subscribe(cmd, Instant::now()) {
                    Ok(id) => {
                        self.subscribe_waiters.insert(id, resp);
                    }
                    Err(e) => {
                        let _ = resp.send(Err(e));
                    }
                }
            }
            ClientCommand::Unsubscribe { cmd, resp } => {
                match self.engine.unsubscribe(cmd, Instant::now()) {
                    Ok(id) => {
                        self.unsubscribe_waiters.insert(id, resp);
                    }
                    Err(e) => {
                        let _ = resp.send(Err(e));
                    }
                }
            }
            ClientCommand::Disconnect { resp } => {
                match self.engine.disconnect(Instant::now()) {
                    Ok(()) => {
                        self.disconnect_waiter = Some(resp);
                        self.flush_outgoing().await;
                        if let Some(mut transport) = self.transport.take() {
                            let _ = transport.close().await;
                        }
                        let events = self.engine.handle_connection_closed(None);
                        self.dispatch_events(events).await;
                    }
                    Err(e) => {
                        let _ = resp.send(Err(e));
                    }
                }
            }
            ClientCommand::SetMessageCallback(callback) => {
                self.message_callback = Some(callback);
            }
            ClientCommand::Status { resp } => {
                let _ = resp.send(ClientStatus {
                    state: self.engine.state(),
                    subscriptions: self.engine.subscriptions(),
                });
            }
            ClientCommand::Shutdown => {
                if let Some(mut transport) = self.transport.take() {
                    let _ = transport.close().await;
                }
                return false;
            }
        }
        true
    }

    /// Open the transport and enqueue CONNECT. The CONNACK wait itself
    /// is supervised by the engine's connect deadline.
    async fn open_and_handshake(&mut self) -> MqttClientResult<()> {
        match self.engine.state() {
            ConnectionState::Idle | ConnectionState::Closed => {}
            other => {
                return Err(MqttClientError::InvalidState {
                    expected: "Idle or Closed".to_string(),
                    actual: other.name().to_string(),
                });
            }
        }

        let endpoint = self.engine.options().endpoint();
        let timeout = Duration::from_millis(self.engine.options().connect_timeout_ms);

        let transport = tokio::time::timeout(timeout, TcpTransport::connect(&endpoint))
            .await
            .map_err(|_| MqttClientError::ConnectTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| MqttClientError::NetworkError {
                kind: std::io::ErrorKind::ConnectionRefused,
                message: e.to_string(),
            })?;
        if self.config.tcp_nodelay {
            let _ = transport.set_nodelay(true);
        }

        debug!(%endpoint, "transport connected, starting MQTT handshake");
        self.transport = Some(Box::new(transport));
        self.engine.connect(Instant::now())?;
        Ok(())
    }

    async fn try_reconnect(&mut self) {
        debug!(attempt = self.reconnect_attempts, "reconnecting");
        match self.open_and_handshake().await {
            Ok(()) => {
                self.flush_outgoing().await;
            }
            Err(e) => {
                warn!(error = %e, "reconnect attempt failed");
                self.schedule_reconnect();
            }
        }
    }

    /// Exponential backoff: `delay = min(base * 2^attempts, max)`.
    /// Gives up after `max_reconnect_attempts` when that is non-zero.
    fn schedule_reconnect(&mut self) {
        if self.config.max_reconnect_attempts > 0
            && self.reconnect_attempts >= self.config.max_reconnect_attempts
        {
            warn!(
                attempts = self.reconnect_attempts,
                "reconnect attempts exhausted"
            );
            self.reconnect_at = None;
            return;
        }

        let exponent = self.reconnect_attempts.min(10);
        let delay_ms = self
            .config
            .reconnect_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.reconnect_max_delay_ms);
        self.reconnect_attempts += 1;
        self.reconnect_at = Some(Instant::now() + Duration::from_millis(delay_ms));
        debug!(delay_ms, attempt = self.reconnect_attempts, "reconnect scheduled");
    }

    async fn flush_outgoing(&mut self) {
        let bytes = self.engine.take_outgoing();
        if bytes.is_empty() {
            return;
        }
        let Some(transport) = &mut self.transport else {
            return;
        };
        let result = async {
            transport.write_all(&bytes).await?;
            transport.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!(error = %e, "transport write failed");
            let events = self.engine.handle_connection_closed(Some(e));
            self.dispatch_events(events).await;
        }
    }

    async fn dispatch_events(&mut self, events: Vec<MqttEvent>) {
        for event in events {
            match event {
                MqttEvent::Connected(result) => {
                    debug!(
                        session_present = result.session_present,
                        "connected to broker"
                    );
                    self.reconnect_attempts = 0;
                    self.reconnect_at = None;
                    if let Some(waiter) = self.connect_waiter.take() {
                        let _ = waiter.send(Ok(result));
                    }
                }
                MqttEvent::ConnectionRefused {
                    return_code,
                    description,
                } => {
                    self.drop_transport().await;
                    if let Some(waiter) = self.connect_waiter.take() {
                        let _ = waiter.send(Err(MqttClientError::ConnectionRefused {
                            return_code,
                            description,
                        }));
                    }
                }
                MqttEvent::Published(result) => {
                    if let Some(id) = result.message_id {
                        if let Some(waiter) = self.publish_waiters.remove(&id) {
                            let _ = waiter.send(Ok(result));
                        }
                    }
                }
                MqttEvent::Subscribed(result) => {
                    if let Some(waiter) = self.subscribe_waiters.remove(&result.message_id) {
                        let _ = waiter.send(Ok(result));
                    }
                }
                MqttEvent::Unsubscribed(result) => {
                    if let Some(waiter) = self.unsubscribe_waiters.remove(&result.message_id) {
                        let _ = waiter.send(Ok(result));
                    }
                }
                MqttEvent::MessageReceived(publish) => {
                    if let Some(callback) = &self.message_callback {
                        callback(publish.into());
                    }
                }
                MqttEvent::PingResponse => {
                    debug!("keepalive PINGRESP received");
                }
                MqttEvent::Disconnected => {
                    self.drop_transport().await;
                    if let Some(waiter) = self.disconnect_waiter.take() {
                        let _ = waiter.send(Ok(()));
                    }
                    self.fail_pending_waiters(MqttClientError::ConnectionLost {
                        reason: "client disconnected".to_string(),
                    });
                }
                MqttEvent::ConnectionClosed { error } => {
                    warn!(error = %error, "connection closed");
                    self.drop_transport().await;
                    // The connect waiter learns the precise cause; every
                    // other pending operation fails with ConnectionLost,
                    // each exactly once.
                    if let Some(waiter) = self.connect_waiter.take() {
                        let _ = waiter.send(Err(error.clone()));
                    }
                    if let Some(waiter) = self.disconnect_waiter.take() {
                        let _ = waiter.send(Err(error.clone()));
                    }
                    self.fail_pending_waiters(MqttClientError::ConnectionLost {
                        reason: error.to_string(),
                    });
                    if self.config.auto_reconnect {
                        self.schedule_reconnect();
                    }
                }
            }
        }
    }

    async fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
    }

    fn fail_pending_waiters(&mut self, error: MqttClientError) {
        for (_, waiter) in self.publish_waiters.drain() {
            let _ = waiter.send(Err(error.clone()));
        }
        for (_, waiter) in self.subscribe_waiters.drain() {
            let _ = waiter.send(Err(error.clone()));
        }
        for (_, waiter) in self.unsubscribe_waiters.drain() {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_validation() {
        assert!(validate_topic("topic", "devices/d1").is_ok());
        assert!(validate_topic("topic", "").is_err());
        assert!(validate_topic("topic", "   ").is_err());
    }

    #[test]
    fn test_qos_validation() {
        assert!(validate_qos(2).is_ok());
        assert!(matches!(
            validate_qos(3),
            Err(MqttClientError::InvalidConfiguration { field, .. }) if field == "qos"
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = DirectMqttClientConfig::default();
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_base_delay_ms, 1_000);
        assert_eq!(config.reconnect_max_delay_ms, 30_000);
    }
}
