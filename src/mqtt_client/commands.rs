use serde::{Deserialize, Serialize};

use crate::mqtt_serde::mqttv3::publish::MqttPublish;
use crate::mqtt_serde::mqttv3::subscribe::TopicSubscription;

/// Outbound publish request handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishCommand {
    pub topic_name: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

impl PublishCommand {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, qos: u8, retain: bool) -> Self {
        Self {
            topic_name: topic.into(),
            payload,
            qos,
            retain,
        }
    }

    pub(crate) fn into_publish(self, message_id: Option<u16>) -> MqttPublish {
        MqttPublish::new(
            self.topic_name,
            self.qos,
            self.payload,
            message_id,
            self.retain,
            false,
        )
    }
}

/// Outbound subscribe request handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeCommand {
    pub subscriptions: Vec<TopicSubscription>,
}

impl SubscribeCommand {
    pub fn new(subscriptions: Vec<TopicSubscription>) -> Self {
        Self { subscriptions }
    }

    pub fn single(topic: impl Into<String>, qos: u8) -> Self {
        Self::new(vec![TopicSubscription::new(topic, qos)])
    }
}

/// Outbound unsubscribe request handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeCommand {
    pub topics: Vec<String>,
}

impl UnsubscribeCommand {
    pub fn new(topics: Vec<String>) -> Self {
        Self { topics }
    }
}
