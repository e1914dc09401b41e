// SPDX-License-Identifier: MPL-2.0

//! # dmqtt
//!
//! An owned MQTT v3.1.1 client protocol engine.
//!
//! The crate is layered leaf-first:
//!
//! - [`mqtt_serde`]: the frame codec: pure, stateless transformation
//!   between byte buffers and typed control packets, with stream
//!   reassembly over arbitrary chunk boundaries.
//! - [`mqtt_session`]: per-connection bookkeeping: packet identifier
//!   allocation, in-flight QoS 1/2 exchanges, the subscription table.
//! - [`mqtt_client`]: the sans-I/O protocol engine
//!   ([`mqtt_client::MqttEngine`]) driving the connection state machine,
//!   and the Tokio facade ([`mqtt_client::DirectMqttClient`]) exposing
//!   connect / subscribe / publish / disconnect / on_message / status.
//!
//! ```no_run
//! use dmqtt::mqtt_client::{DirectMqttClient, MqttClientOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = MqttClientOptions::builder()
//!     .host("localhost")
//!     .port(1883)
//!     .build()?;
//!
//! let client = DirectMqttClient::new(options);
//! client
//!     .on_message(|msg| println!("{}: {:?}", msg.topic, msg.payload))
//!     .await?;
//! client.connect().await?;
//! client.subscribe("devices/d1/methods", 1).await?;
//! client.publish("devices/d1/methods", b"{\"method\":\"ping\"}", 1).await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod mqtt_client;
pub mod mqtt_serde;
pub mod mqtt_session;
