use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::DowntimeConfig;

/// Feed health as reported to clients. The strings are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Unknown,
    Down,
    Recovering,
    Up,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Unknown => "UNKNOWN",
            SystemStatus::Down => "DOWN",
            SystemStatus::Recovering => "RECOVERING",
            SystemStatus::Up => "UP",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status object served on the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub down_since: Option<DateTime<Utc>>,
    pub recovering_since: Option<DateTime<Utc>>,
}

/// Downtime detector over a sliding window of cumulative message counts.
///
/// The lifecycle task appends the message counter once per minute; once the
/// window is full, the difference between tail and head is the number of
/// messages received over the window. The feed is silent at night, so a
/// short gap must not poison clients immediately, and after a sustained
/// outage the status stays RECOVERING long enough for consumers to flush
/// their stale state.
#[derive(Debug)]
pub struct HealthDetector {
    window: usize,
    threshold: u64,
    recovery_time: Duration,
    samples: VecDeque<u64>,
    status: SystemStatus,
    down_since: Option<DateTime<Utc>>,
    recovering_since: Option<DateTime<Utc>>,
}

impl HealthDetector {
    pub fn new(config: &DowntimeConfig) -> Self {
        Self {
            window: config.count_time_window,
            threshold: config.count_threshold,
            recovery_time: Duration::minutes(config.recovery_time),
            samples: VecDeque::with_capacity(config.count_time_window + 1),
            status: SystemStatus::Unknown,
            down_since: None,
            recovering_since: None,
        }
    }

    /// Record the current value of the message counter and advance the
    /// state machine. Called once per minute.
    pub fn sample(&mut self, messages: u64, now: DateTime<Utc>) {
        self.samples.push_back(messages);

        if self.samples.len() < self.window {
            // still warming up
            if self.down_since.is_none() {
                self.down_since = Some(now);
            }
            return;
        }

        let received = match (self.samples.front(), self.samples.back()) {
            (Some(head), Some(tail)) => tail.saturating_sub(*head),
            _ => 0,
        };
        self.samples.pop_front();

        if received < self.threshold {
            if self.status != SystemStatus::Down {
                log::warn!("no feed traffic over the last window, status DOWN");
            }
            self.status = SystemStatus::Down;
            if self.down_since.is_none() {
                self.down_since = Some(now);
            }
            self.recovering_since = None;
            return;
        }

        match self.status {
            SystemStatus::Unknown | SystemStatus::Down => {
                log::info!("feed traffic detected, status RECOVERING");
                self.status = SystemStatus::Recovering;
                self.recovering_since = Some(now);
            }
            SystemStatus::Recovering => {
                if let Some(since) = self.recovering_since {
                    if now - since >= self.recovery_time {
                        log::info!("feed stable since {}, status UP", since);
                        self.status = SystemStatus::Up;
                        self.down_since = None;
                        self.recovering_since = None;
                    }
                }
            }
            SystemStatus::Up => {}
        }
    }

    pub fn status(&self) -> SystemStatus {
        self.status
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: self.status.as_str().to_owned(),
            down_since: self.down_since,
            recovering_since: self.recovering_since,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn detector() -> HealthDetector {
        HealthDetector::new(&DowntimeConfig {
            count_time_window: 10,
            count_threshold: 1,
            recovery_time: 70,
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 4, 12, 3, 0, 0).unwrap()
    }

    fn minute(i: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(i)
    }

    #[test]
    fn unknown_until_window_fills_then_recovering_then_up() {
        let mut health = detector();

        // healthy stream: the counter grows every minute
        for i in 0..9 {
            health.sample(i as u64 * 50, minute(i));
            assert_eq!(health.status(), SystemStatus::Unknown);
        }
        assert_eq!(health.report().down_since, Some(t0()));

        health.sample(450, minute(9));
        assert_eq!(health.status(), SystemStatus::Recovering);
        assert_eq!(health.report().recovering_since, Some(minute(9)));

        // not yet past the recovery time
        for i in 10..79 {
            health.sample(i as u64 * 50, minute(i));
            assert_eq!(health.status(), SystemStatus::Recovering);
        }

        health.sample(4000, minute(79));
        assert_eq!(health.status(), SystemStatus::Up);
        assert_eq!(health.report().down_since, None);
        assert_eq!(health.report().recovering_since, None);
    }

    #[test]
    fn outage_and_recovery_cycle() {
        let mut health = detector();

        // reach UP
        let mut counter = 0u64;
        let mut tick = 0i64;
        while health.status() != SystemStatus::Up {
            counter += 10;
            health.sample(counter, minute(tick));
            tick += 1;
        }

        // ten silent minutes: the window empties out and the status drops
        for _ in 0..10 {
            health.sample(counter, minute(tick));
            tick += 1;
        }
        assert_eq!(health.status(), SystemStatus::Down);
        let down_since = health.report().down_since;
        assert!(down_since.is_some());

        // feed resumes
        counter += 10;
        health.sample(counter, minute(tick));
        assert_eq!(health.status(), SystemStatus::Recovering);
        // down_since is kept until the system is UP again
        assert_eq!(health.report().down_since, down_since);

        let resumed = tick;
        loop {
            tick += 1;
            counter += 10;
            health.sample(counter, minute(tick));
            if health.status() == SystemStatus::Up {
                break;
            }
        }
        assert!(tick - resumed >= 70);
        assert_eq!(health.report().down_since, None);
    }

    #[test]
    fn relapse_during_recovery_goes_back_down() {
        let mut health = detector();
        let mut counter = 0u64;
        for i in 0..10 {
            counter += 5;
            health.sample(counter, minute(i));
        }
        assert_eq!(health.status(), SystemStatus::Recovering);

        // silence again: the last increment slides out of the window
        for i in 10..25 {
            health.sample(counter, minute(i));
        }
        assert_eq!(health.status(), SystemStatus::Down);
        assert_eq!(health.report().recovering_since, None);
    }
}
