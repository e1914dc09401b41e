pub mod client;
pub mod commands;
pub mod engine;
pub mod error;
pub mod opts;
pub mod transport;

pub use client::{
    ClientStatus, DirectMqttClient, DirectMqttClientConfig, MessageCallback, ReceivedMessage,
};
pub use commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
pub use engine::{
    ConnectionResult, ConnectionState, MqttEngine, MqttEvent, PublishResult, SubscribeResult,
    UnsubscribeResult,
};
pub use error::{MqttClientError, MqttClientResult};
pub use opts::MqttClientOptions;
