use std::io;
use std::io::ErrorKind::{Interrupted, TimedOut, WouldBlock, WriteZero};
use std::io::Write;

use url::Url;

use crate::stream::ConnectionInfo;
use crate::time::Deadline;
use crate::ws::Error;
use crate::ws::config::Config;

/// Parses a `ws://` url into the endpoint to connect to. `wss://` is rejected, secure transport
/// is left to the socket implementation.
pub(crate) fn parse_url(url: &str) -> Result<(ConnectionInfo, Url), Error> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "ws" => {}
        scheme => return Err(Error::UnsupportedScheme(scheme.to_owned())),
    }
    let connection_info = ConnectionInfo::try_from(&url)?;
    Ok((connection_info, url))
}

/// Writes all of `buf` to a non-blocking stream and flushes it. While the stream refuses bytes
/// the configured idle strategy is applied; if it accepts nothing for the configured write
/// timeout the write fails with [`io::ErrorKind::TimedOut`].
pub(crate) fn write_all<W: Write + ?Sized>(stream: &mut W, mut buf: &[u8], config: &Config) -> io::Result<()> {
    let mut stalled_since: Option<Deadline> = None;
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => return Err(io::Error::from(WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                stalled_since = None;
            }
            Err(err) if err.kind() == Interrupted => {}
            Err(err) if err.kind() == WouldBlock => {
                let deadline = *stalled_since
                    .get_or_insert_with(|| Deadline::after(config.time_source(), config.write_timeout()));
                if deadline.expired(config.time_source()) {
                    return Err(io::Error::new(TimedOut, "peer stopped reading"));
                }
                config.idle_strategy().idle(0);
            }
            Err(err) => return Err(err),
        }
    }
    stream.flush()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::idle::IdleStrategy;
    use crate::time::tests::ManualClock;

    /// Accepts `accept` bytes per write, then blocks. Every blocked write moves the clock by
    /// `tick`.
    struct StallingWriter {
        written: Vec<u8>,
        accept: usize,
        budget: usize,
        clock: ManualClock,
        tick: Duration,
    }

    impl Write for StallingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                self.clock.advance(self.tick);
                return Err(io::Error::from(WouldBlock));
            }
            let len = buf.len().min(self.accept).min(self.budget);
            self.budget -= len;
            self.written.extend_from_slice(&buf[..len]);
            Ok(len)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn stalling_config(clock: &ManualClock) -> Config {
        Config::default()
            .with_write_timeout(Duration::from_millis(100))
            .with_idle_strategy(IdleStrategy::NoOp)
            .with_time_source(Arc::new(clock.clone()))
    }

    #[test]
    fn should_write_in_partial_chunks() {
        let clock = ManualClock::default();
        let mut writer = StallingWriter {
            written: Vec::new(),
            accept: 3,
            budget: usize::MAX,
            clock: clock.clone(),
            tick: Duration::from_millis(10),
        };
        write_all(&mut writer, b"hello world", &stalling_config(&clock)).unwrap();
        assert_eq!(b"hello world", &writer.written[..]);
    }

    #[test]
    fn should_time_out_when_stream_stops_accepting_bytes() {
        let clock = ManualClock::default();
        let mut writer = StallingWriter {
            written: Vec::new(),
            accept: 4,
            budget: 8,
            clock: clock.clone(),
            tick: Duration::from_millis(10),
        };
        let err = write_all(&mut writer, &[7u8; 64], &stalling_config(&clock)).unwrap_err();
        assert_eq!(TimedOut, err.kind());
        assert_eq!(8, writer.written.len());
    }

    #[test]
    fn should_parse_ws_url() {
        let (connection_info, url) = parse_url("ws://127.0.0.1:9001/feed?id=7").unwrap();
        assert_eq!("127.0.0.1", connection_info.host());
        assert_eq!(9001, connection_info.port());
        assert_eq!("/feed", url.path());
        assert_eq!(Some("id=7"), url.query());
    }

    #[test]
    fn should_default_to_port_80() {
        let (connection_info, _) = parse_url("ws://example.com").unwrap();
        assert_eq!(80, connection_info.port());
    }

    #[test]
    fn should_reject_secure_and_unknown_schemes() {
        assert!(matches!(parse_url("wss://example.com/"), Err(Error::UnsupportedScheme(scheme)) if scheme == "wss"));
        assert!(matches!(parse_url("http://example.com/"), Err(Error::UnsupportedScheme(_))));
        assert!(matches!(parse_url("::"), Err(Error::InvalidUrl(_))));
    }
}
