//! Log-based idle detection
//!
//! Compares the most recent non-administrative audit log entry against
//! the server's own clock and uptime. Needs no persisted state: the
//! audit log itself is the record of activity.

use crate::models::{Decision, LogSample};

/// Decides idleness from an audit-log sample.
#[derive(Debug, Clone)]
pub struct LogDecision {
    /// Hours without client activity before an instance counts as idle
    pub idle_after_hours: i64,
}

impl LogDecision {
    pub fn new(idle_after_hours: i64) -> Self {
        Self { idle_after_hours }
    }

    pub fn decide(&self, sample: &LogSample) -> Decision {
        let Some(last_activity) = sample.last_activity else {
            // The log may be disabled or freshly rotated; silence alone is
            // never grounds for a shutdown.
            return Decision::not_idle("no audit log data");
        };

        let elapsed_hours = (sample.server_now - last_activity).num_hours();
        if elapsed_hours < self.idle_after_hours {
            return Decision::not_idle(format!(
                "processed a client command {}h ago, at {}",
                elapsed_hours, last_activity
            ));
        }

        if sample.uptime.hours < 1 {
            // No logged activity, but the server only just came up. Give a
            // deliberate restart time to receive traffic before calling it
            // idle.
            return Decision::not_idle(format!(
                "online for only {}h {}m, within the post-restart grace period",
                sample.uptime.hours, sample.uptime.minutes
            ));
        }

        Decision::idle(format!(
            "no client commands for {}h, up {}h {}m, last command at {}",
            elapsed_hours, sample.uptime.hours, sample.uptime.minutes, last_activity
        ))
    }
}

impl Default for LogDecision {
    fn default() -> Self {
        Self { idle_after_hours: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Uptime;
    use chrono::{Duration, Utc};

    fn sample(age: Option<Duration>, uptime_hours: u64) -> LogSample {
        let now = Utc::now();
        LogSample {
            last_activity: age.map(|d| now - d),
            server_now: now,
            uptime: Uptime {
                hours: uptime_hours,
                minutes: 10,
            },
        }
    }

    #[test]
    fn test_recent_activity_is_not_idle() {
        let decision = LogDecision::default().decide(&sample(Some(Duration::minutes(30)), 5));
        assert!(!decision.is_idle());
    }

    #[test]
    fn test_stale_activity_is_idle() {
        let decision = LogDecision::default().decide(&sample(Some(Duration::hours(2)), 3));
        assert!(decision.is_idle());
    }

    #[test]
    fn test_recent_restart_gets_grace() {
        // Last command two hours ago, but the server has been up for
        // less than one: not idle yet.
        let decision = LogDecision::default().decide(&sample(Some(Duration::hours(2)), 0));
        assert!(!decision.is_idle());
    }

    #[test]
    fn test_missing_log_data_is_not_idle() {
        let decision = LogDecision::default().decide(&sample(None, 12));
        assert!(!decision.is_idle());
        assert_eq!(decision.reason, "no audit log data");
    }

    #[test]
    fn test_exact_threshold_boundary() {
        // 59 minutes floors to 0 elapsed hours.
        let decision = LogDecision::default().decide(&sample(Some(Duration::minutes(59)), 4));
        assert!(!decision.is_idle());

        // 61 minutes floors to 1 elapsed hour, meeting the default
        // threshold.
        let decision = LogDecision::default().decide(&sample(Some(Duration::minutes(61)), 4));
        assert!(decision.is_idle());
    }

    #[test]
    fn test_custom_threshold() {
        let engine = LogDecision::new(4);
        assert!(!engine.decide(&sample(Some(Duration::hours(2)), 6)).is_idle());
        assert!(engine.decide(&sample(Some(Duration::hours(5)), 6)).is_idle());
    }
}
