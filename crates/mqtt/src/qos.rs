//! MQTT quality-of-service levels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;

/// Delivery guarantee requested for outbound publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum MqttQos {
    AtMostOnce = 0,
    #[default]
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl MqttQos {
    /// Wire ordinal of this level.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Parses a wire ordinal, rejecting anything outside 0..=2.
    pub fn from_value(value: i32) -> Result<Self, ConnectionError> {
        match value {
            0 => Ok(MqttQos::AtMostOnce),
            1 => Ok(MqttQos::AtLeastOnce),
            2 => Ok(MqttQos::ExactlyOnce),
            other => Err(ConnectionError::InvalidQos(other)),
        }
    }
}

impl TryFrom<i32> for MqttQos {
    type Error = ConnectionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<MqttQos> for i32 {
    fn from(qos: MqttQos) -> Self {
        qos.value()
    }
}

impl From<MqttQos> for rumqttc::QoS {
    fn from(qos: MqttQos) -> Self {
        match qos {
            MqttQos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            MqttQos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            MqttQos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl fmt::Display for MqttQos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}
