use std::sync::Arc;
use std::time::Duration;

use crate::idle::IdleStrategy;
use crate::time::{MonotonicClockSource, TimeSource};
use crate::ws::FragmentsPolicy;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Websocket settings, used by both the client and the server side. Settings that only make
/// sense for one role (extra request headers, basic auth) are ignored by the other.
#[derive(Debug, Clone)]
pub struct Config {
    handshake_timeout: Duration,
    close_timeout: Duration,
    write_timeout: Duration,
    max_frame_size: Option<usize>,
    max_message_size: usize,
    fragments_policy: FragmentsPolicy,
    protocols: Vec<String>,
    headers: Vec<(String, String)>,
    basic_auth: Option<(String, String)>,
    idle_strategy: IdleStrategy,
    time_source: Arc<dyn TimeSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_size: None,
            max_message_size: usize::MAX,
            fragments_policy: FragmentsPolicy::default(),
            protocols: Vec::new(),
            headers: Vec::new(),
            basic_auth: None,
            idle_strategy: IdleStrategy::default(),
            time_source: Arc::new(MonotonicClockSource::default()),
        }
    }
}

impl Config {
    /// Upper bound for the whole opening handshake.
    pub fn with_handshake_timeout(self, handshake_timeout: Duration) -> Self {
        Self {
            handshake_timeout,
            ..self
        }
    }

    /// How long to wait for the peer to answer our close frame before giving up.
    pub fn with_close_timeout(self, close_timeout: Duration) -> Self {
        Self { close_timeout, ..self }
    }

    /// How long a write may stall (the peer not reading) before the connection is failed with a
    /// `TimedOut` io error.
    pub fn with_write_timeout(self, write_timeout: Duration) -> Self {
        Self { write_timeout, ..self }
    }

    /// Outgoing data messages larger than this are sent as several frames.
    pub fn with_max_frame_size(self, max_frame_size: usize) -> Self {
        Self {
            max_frame_size: Some(max_frame_size),
            ..self
        }
    }

    /// Incoming messages (and single frames) larger than this close the connection with 1009.
    pub fn with_max_message_size(self, max_message_size: usize) -> Self {
        Self {
            max_message_size,
            ..self
        }
    }

    pub fn with_fragments_policy(self, fragments_policy: FragmentsPolicy) -> Self {
        Self {
            fragments_policy,
            ..self
        }
    }

    /// Client: subprotocol to offer (in order of preference). Server: subprotocol it accepts.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Extra header sent with the client's upgrade request. Names and values that are not valid
    /// HTTP make the handshake fail before anything is sent.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Credentials for the `Authorization: Basic` header. Take precedence over the url userinfo.
    pub fn with_basic_auth(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            basic_auth: Some((user.into(), password.into())),
            ..self
        }
    }

    /// What to do while the handshake waits for the peer's bytes.
    pub fn with_idle_strategy(self, idle_strategy: IdleStrategy) -> Self {
        Self { idle_strategy, ..self }
    }

    pub fn with_time_source(self, time_source: Arc<dyn TimeSource>) -> Self {
        Self { time_source, ..self }
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn max_frame_size(&self) -> Option<usize> {
        self.max_frame_size
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn fragments_policy(&self) -> FragmentsPolicy {
        self.fragments_policy
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        self.basic_auth
            .as_ref()
            .map(|(user, password)| (user.as_str(), password.as_str()))
    }

    pub fn idle_strategy(&self) -> IdleStrategy {
        self.idle_strategy
    }

    pub fn time_source(&self) -> &dyn TimeSource {
        self.time_source.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Deadline;

    #[test]
    fn should_use_defaults() {
        let config = Config::default();
        assert_eq!(Duration::from_secs(5), config.handshake_timeout());
        assert_eq!(Duration::from_secs(1), config.close_timeout());
        assert_eq!(Duration::from_secs(5), config.write_timeout());
        assert_eq!(None, config.max_frame_size());
        assert_eq!(usize::MAX, config.max_message_size());
        assert_eq!(FragmentsPolicy::Aggregate, config.fragments_policy());
        assert!(config.protocols().is_empty());
        assert!(config.basic_auth().is_none());
    }

    #[test]
    fn should_measure_deadlines_on_monotonic_clock() {
        let config = Config::default();
        assert!(format!("{config:?}").contains("MonotonicClockSource"));

        let started = config.time_source().current_time_nanos();
        let deadline = Deadline::after(config.time_source(), Duration::from_millis(20));
        assert!(!deadline.expired(config.time_source()));
        std::thread::sleep(Duration::from_millis(25));
        assert!(deadline.expired(config.time_source()));
        assert!(config.time_source().current_time_nanos() >= started + 20_000_000);
    }

    #[test]
    fn should_accumulate_protocols_and_headers() {
        let config = Config::default()
            .with_protocol("a")
            .with_protocol("b")
            .with_header("X-One", "1")
            .with_basic_auth("user", "pass")
            .with_max_frame_size(512);
        assert_eq!(&["a".to_owned(), "b".to_owned()], config.protocols());
        assert_eq!(&[("X-One".to_owned(), "1".to_owned())], config.headers());
        assert_eq!(Some(("user", "pass")), config.basic_auth());
        assert_eq!(Some(512), config.max_frame_size());
    }
}
