//! Transfer watchdog
//!
//! Decides when a single file transfer should be abandoned: after the grace
//! delay, a transfer whose average speed is below the minimum, or one still
//! queued by the peer when remote queuing is unacceptable, is cancelled.
//! Without a grace delay the watchdog never fires.

use crate::network::Transfer;
use seekr_common::config::WatchdogConfig;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchdogPolicy {
    /// Grace delay after the transfer starts
    pub delay: Option<Duration>,
    /// Minimum average speed, bytes per second
    pub minimum_speed: Option<u64>,
    pub cancel_when_queued_remotely: bool,
}

impl From<&WatchdogConfig> for WatchdogPolicy {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            delay: config.delay(),
            minimum_speed: config.minimum_speed_bytes,
            cancel_when_queued_remotely: config.cancel_when_queued_remotely,
        }
    }
}

/// Why the watchdog cancelled a transfer
#[derive(Debug, Clone, PartialEq)]
pub enum WatchdogReason {
    TooSlow { average_speed: f64, minimum: u64 },
    QueuedRemotely,
}

impl fmt::Display for WatchdogReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchdogReason::TooSlow {
                average_speed,
                minimum,
            } => write!(
                f,
                "average speed {:.0} B/s below minimum {} B/s",
                average_speed, minimum
            ),
            WatchdogReason::QueuedRemotely => write!(f, "still queued by peer"),
        }
    }
}

impl WatchdogPolicy {
    pub fn is_enabled(&self) -> bool {
        self.delay.is_some() && (self.minimum_speed.is_some() || self.cancel_when_queued_remotely)
    }

    /// Check a transfer snapshot taken `elapsed` after the transfer started
    pub fn should_cancel(&self, transfer: &Transfer, elapsed: Duration) -> Option<WatchdogReason> {
        let delay = self.delay?;
        if elapsed < delay || transfer.state.is_terminal() {
            return None;
        }

        if let Some(minimum) = self.minimum_speed {
            if transfer.average_speed < minimum as f64 {
                return Some(WatchdogReason::TooSlow {
                    average_speed: transfer.average_speed,
                    minimum,
                });
            }
        }

        if self.cancel_when_queued_remotely && transfer.state.is_queued_remotely() {
            return Some(WatchdogReason::QueuedRemotely);
        }

        None
    }
}
