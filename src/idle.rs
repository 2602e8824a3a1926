//! Collection of idle strategies.

use std::hint;
use std::time::Duration;

/// What to do when a poll cycle found nothing to do. The handshake uses it while it waits for
/// the peer's response lines; poll loops in applications can use it between iterations.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IdleStrategy {
    NoOp,
    BusySpin,
    Sleep(Duration),
}

impl Default for IdleStrategy {
    fn default() -> Self {
        IdleStrategy::Sleep(Duration::from_millis(1))
    }
}

impl IdleStrategy {
    /// Idles only if `work_count` is zero.
    #[inline]
    pub fn idle(&self, work_count: usize) {
        if work_count > 0 {
            return;
        }
        match *self {
            IdleStrategy::NoOp => {}
            IdleStrategy::BusySpin => hint::spin_loop(),
            IdleStrategy::Sleep(duration) => std::thread::sleep(duration),
        }
    }
}
