//! Immutable description of one broker connection attempt.

use std::fmt;

use crate::qos::MqttQos;

/// Everything needed to reach and authenticate against a broker.
///
/// Equality and hashing cover every field, so two values compare equal only
/// when they would produce an identical connection. The password is redacted
/// from `Debug` output.
///
/// # Examples
/// ```ignore
/// let info = ConnectionInfo::new("broker.local", 8883, true, "sensor-7")
///     .with_credentials("svc", "secret")
///     .with_topic_prefix("plant/line-3");
/// assert_eq!(info.broker_uri(), "ssl://broker.local:8883");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
    tls: bool,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    topic_prefix: String,
    qos: MqttQos,
}

impl ConnectionInfo {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        tls: bool,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            client_id: client_id.into(),
            username: None,
            password: None,
            topic_prefix: String::new(),
            qos: MqttQos::default(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets a username without a password.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_qos(mut self, qos: MqttQos) -> Self {
        self.qos = qos;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Prefix joined in front of every published topic; empty when unset.
    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn qos(&self) -> MqttQos {
        self.qos
    }

    /// Broker address as `ssl://host:port` or `tcp://host:port`.
    pub fn broker_uri(&self) -> String {
        let scheme = if self.tls { "ssl" } else { "tcp" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("topic_prefix", &self.topic_prefix)
            .field("qos", &self.qos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
    };

    use super::*;

    fn base() -> ConnectionInfo {
        ConnectionInfo::new("h", 1883, false, "c")
            .with_credentials("u", "p")
            .with_topic_prefix("t")
            .with_qos(MqttQos::AtLeastOnce)
    }

    fn hash_of(info: &ConnectionInfo) -> u64 {
        let mut hasher = DefaultHasher::new();
        info.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_identical_values_are_equal() {
        assert_eq!(base(), base());
        assert_eq!(hash_of(&base()), hash_of(&base()));
    }

    #[test]
    fn test_port_difference_breaks_equality() {
        let other = ConnectionInfo::new("h", 8883, false, "c")
            .with_credentials("u", "p")
            .with_topic_prefix("t")
            .with_qos(MqttQos::AtLeastOnce);
        assert_ne!(base(), other);
    }

    #[test]
    fn test_every_field_participates_in_equality() {
        let variants = [
            ConnectionInfo::new("other", 1883, false, "c")
                .with_credentials("u", "p")
                .with_topic_prefix("t"),
            ConnectionInfo::new("h", 1883, true, "c")
                .with_credentials("u", "p")
                .with_topic_prefix("t"),
            ConnectionInfo::new("h", 1883, false, "other")
                .with_credentials("u", "p")
                .with_topic_prefix("t"),
            ConnectionInfo::new("h", 1883, false, "c")
                .with_credentials("other", "p")
                .with_topic_prefix("t"),
            ConnectionInfo::new("h", 1883, false, "c")
                .with_credentials("u", "other")
                .with_topic_prefix("t"),
            ConnectionInfo::new("h", 1883, false, "c")
                .with_credentials("u", "p")
                .with_topic_prefix("other"),
            base().with_qos(MqttQos::ExactlyOnce),
            ConnectionInfo::new("h", 1883, false, "c")
                .with_username("u")
                .with_topic_prefix("t"),
        ];

        for variant in variants {
            assert_ne!(base(), variant, "{variant:?} should differ");
        }
    }

    #[test]
    fn test_defaults() {
        let info = ConnectionInfo::new("h", 1883, false, "c");
        assert_eq!(info.topic_prefix(), "");
        assert_eq!(info.qos(), MqttQos::AtLeastOnce);
        assert!(info.username().is_none());
        assert!(info.password().is_none());
    }

    #[test]
    fn test_broker_uri() {
        assert_eq!(base().broker_uri(), "tcp://h:1883");
        let secure = ConnectionInfo::new("broker.local", 8883, true, "c");
        assert_eq!(secure.broker_uri(), "ssl://broker.local:8883");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", base().with_credentials("user", "hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
        assert!(rendered.contains("user"));
    }
}
