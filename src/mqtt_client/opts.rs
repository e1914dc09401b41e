//! Connection configuration. Every option is enumerated with a stated
//! default; validation happens at build time, before any I/O.

use super::error::{MqttClientError, MqttClientResult};

/// Default keepalive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 60;
/// Default CONNACK wait before a connect attempt fails.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Default PINGRESP wait after a keepalive PINGREQ.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 10_000;

/// Immutable per-connection configuration.
#[derive(Debug, Clone)]
pub struct MqttClientOptions {
    /// Broker hostname or IP address. Must be non-empty.
    pub host: String,
    /// Broker port, 1–65535.
    pub port: u16,
    /// Client identifier. Defaults to a generated unique token.
    pub client_id: String,
    /// Keepalive interval in seconds. 0 disables keepalive supervision.
    pub keep_alive: u16,
    /// Ask the broker to discard any previous session state.
    pub clean_session: bool,
    /// How long connect() waits for CONNACK before failing.
    pub connect_timeout_ms: u64,
    /// How long a keepalive PINGREQ may go unanswered.
    pub ping_timeout_ms: u64,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl MqttClientOptions {
    pub fn builder() -> MqttClientOptionsBuilder {
        MqttClientOptionsBuilder::new()
    }

    /// `host:port` form used when opening the transport.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn generated_client_id() -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        format!("direct-method-client-{}", &token[..8])
    }

    fn validate(&self) -> MqttClientResult<()> {
        if self.host.trim().is_empty() {
            return Err(MqttClientError::InvalidConfiguration {
                field: "host".to_string(),
                reason: "broker host cannot be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(MqttClientError::InvalidConfiguration {
                field: "port".to_string(),
                reason: "broker port must be between 1 and 65535".to_string(),
            });
        }
        if self.client_id.is_empty() {
            return Err(MqttClientError::InvalidConfiguration {
                field: "client_id".to_string(),
                reason: "client identifier cannot be empty".to_string(),
            });
        }
        if self.client_id.len() > u16::MAX as usize {
            return Err(MqttClientError::InvalidConfiguration {
                field: "client_id".to_string(),
                reason: "client identifier exceeds 65535 bytes".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(MqttClientError::InvalidConfiguration {
                field: "connect_timeout_ms".to_string(),
                reason: "connect timeout must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for `MqttClientOptions`.
#[derive(Debug, Clone, Default)]
pub struct MqttClientOptionsBuilder {
    host: Option<String>,
    port: Option<u16>,
    client_id: Option<String>,
    keep_alive: Option<u16>,
    clean_session: Option<bool>,
    connect_timeout_ms: Option<u64>,
    ping_timeout_ms: Option<u64>,
    username: Option<String>,
    password: Option<Vec<u8>>,
}

impl MqttClientOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = Some(seconds);
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = Some(clean);
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    pub fn ping_timeout_ms(mut self, ms: u64) -> Self {
        self.ping_timeout_ms = Some(ms);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Validate and produce the immutable options.
    pub fn build(self) -> MqttClientResult<MqttClientOptions> {
        let options = MqttClientOptions {
            host: self.host.unwrap_or_default(),
            port: self.port.unwrap_or(1883),
            client_id: self
                .client_id
                .unwrap_or_else(MqttClientOptions::generated_client_id),
            keep_alive: self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
            clean_session: self.clean_session.unwrap_or(true),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ping_timeout_ms: self.ping_timeout_ms.unwrap_or(DEFAULT_PING_TIMEOUT_MS),
            username: self.username,
            password: self.password,
        };
        options.validate()?;
        Ok(options)
    }
}
