use std::time::{Duration, Instant};

use crate::loop_markers::LoopMarkers;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(33);

/// What a poller tick should do with a freshly sampled position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickAction {
    /// Publish the position unchanged.
    Publish(f64),
    /// The loop end was reached; seek back to the loop start.
    WrapTo(f64),
    /// Playback ran past the end of the asset.
    EndOfTrack,
}

/// Decide the tick outcome for `current_time`. Loop wrap wins over end of
/// track so a loop ending exactly at the file end keeps looping.
pub fn evaluate_tick(current_time: f64, markers: &LoopMarkers, duration: f64) -> TickAction {
    if let Some((start, end)) = markers.region() {
        if current_time >= end {
            return TickAction::WrapTo(start);
        }
    }
    if current_time >= duration {
        return TickAction::EndOfTrack;
    }
    TickAction::Publish(current_time)
}

/// Fixed-period cadence gate for position polling.
///
/// Ticks are never queued: after a late poll the next tick is due one full
/// interval later, and a stopped poller restarts from a fresh clock sample.
#[derive(Debug, Clone)]
pub struct PositionPoller {
    interval: Duration,
    next_due: Option<Instant>,
}

impl PositionPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// True when a tick should run at `now`; reschedules the next one.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// Time left until the next tick, if running.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }
}

impl Default for PositionPoller {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}
