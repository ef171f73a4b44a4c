use chrono::{DateTime, TimeDelta, TimeZone, Timelike, Utc};
use tracing::debug;

/// Local hours in which the daily poll may fire.
const POLL_HOURS: [u32; 2] = [22, 23];
/// Local hour in which the daily gate re-arms.
const REARM_HOUR: u32 = 21;
/// Minimum spacing of polls in accelerated (debug) mode.
const DEBUG_POLL_INTERVAL_SECS: i64 = 60;

/// Decides per tick whether the forecast must be fetched.
#[derive(Debug, Clone, Default)]
pub struct PollScheduler {
    polled_today: bool,
    last_poll: Option<DateTime<Utc>>,
    debug_mode: bool,
}

impl PollScheduler {
    pub fn new(debug_mode: bool) -> Self {
        Self { polled_today: false, last_poll: None, debug_mode }
    }

    pub fn polled_today(&self) -> bool {
        self.polled_today
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.last_poll
    }

    /// Evaluates one tick at local time `now`. Returns true when a poll must
    /// run now; the state is already updated as if it ran.
    pub fn tick<T: TimeZone>(&mut self, now: &DateTime<T>) -> bool {
        let hour = now.hour();
        let now_utc = now.with_timezone(&Utc);

        let poll = if POLL_HOURS.contains(&hour) && !self.polled_today {
            self.polled_today = true;
            true
        } else if self.debug_mode {
            self.last_poll
                .map_or(true, |last| now_utc - last >= TimeDelta::seconds(DEBUG_POLL_INTERVAL_SECS))
        } else {
            false
        };

        if poll {
            self.last_poll = Some(now_utc);
        }

        if hour == REARM_HOUR && self.polled_today {
            debug!("[SCHED] re-arming daily poll");
            self.polled_today = false;
        }

        poll
    }

    /// Re-opens the daily gate after a failed poll so that the next tick in
    /// the polling window tries again.
    pub fn poll_failed(&mut self) {
        self.polled_today = false;
    }

    /// Records a poll that ran outside `tick`, e.g. the startup fetch.
    pub fn mark_polled(&mut self, now: DateTime<Utc>) {
        self.last_poll = Some(now);
    }
}
