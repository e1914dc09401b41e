// SPDX-License-Identifier: MPL-2.0

//! MQTT v3.1.1 control packet encoders/decoders.

pub mod ack;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod ping;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsubscribe;

pub use ack::{MqttPubAck, MqttPubComp, MqttPubRec, MqttPubRel, MqttUnsubAck};
pub use connack::MqttConnAck;
pub use connect::{MqttConnect, Will};
pub use disconnect::MqttDisconnect;
pub use ping::{MqttPingReq, MqttPingResp};
pub use publish::MqttPublish;
pub use suback::{MqttSubAck, SUBACK_FAILURE};
pub use subscribe::{MqttSubscribe, TopicSubscription};
pub use unsubscribe::MqttUnsubscribe;
