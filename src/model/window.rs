use chrono::{DateTime, Duration, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The interval during which votes are accepted, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionWindow {
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
}

impl ElectionWindow {
    /// A window opening at `start` and lasting `duration_secs` seconds.
    pub fn starting_at(start: DateTime<Utc>, duration_secs: u64) -> Result<Self> {
        if duration_secs == 0 {
            return Err(Error::bad_request("Voting duration must be positive"));
        }
        let duration = i64::try_from(duration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| Error::bad_request("Voting duration is too long"))?;
        let end_time = start
            .checked_add_signed(duration)
            .ok_or_else(|| Error::bad_request("Voting duration is too long"))?;
        Ok(Self {
            start_time: start,
            end_time,
        })
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }
}

/// Is `window` configured and open at `now`?
pub fn is_open(window: Option<&ElectionWindow>, now: DateTime<Utc>) -> bool {
    window.map_or(false, |w| w.contains(now))
}

/// How `vote` treats the election window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicy {
    /// Votes are accepted only inside a configured window.
    Strict,
    /// No configured window means voting is open; a configured one is enforced.
    #[default]
    Lenient,
    /// The window is never consulted.
    Disabled,
}

impl WindowPolicy {
    /// Does this policy accept a vote at `now` given the current window?
    pub fn permits_vote(&self, window: Option<&ElectionWindow>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Strict => is_open(window, now),
            Self::Lenient => window.map_or(true, |w| w.contains(now)),
            Self::Disabled => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> (ElectionWindow, DateTime<Utc>) {
        let start = Utc::now();
        (ElectionWindow::starting_at(start, 60).unwrap(), start)
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let (window, start) = window();
        assert!(window.contains(start));
        assert!(window.contains(start + Duration::seconds(60)));
        assert!(!window.contains(start - Duration::milliseconds(1)));
        assert!(!window.contains(start + Duration::seconds(61)));
    }

    #[test]
    fn zero_duration_rejected() {
        assert!(matches!(
            ElectionWindow::starting_at(Utc::now(), 0),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            ElectionWindow::starting_at(Utc::now(), u64::MAX),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn strict_policy() {
        let (window, start) = window();
        let policy = WindowPolicy::Strict;
        assert!(!policy.permits_vote(None, start));
        assert!(policy.permits_vote(Some(&window), start));
        assert!(!policy.permits_vote(Some(&window), start + Duration::hours(1)));
    }

    #[test]
    fn lenient_policy() {
        let (window, start) = window();
        let policy = WindowPolicy::Lenient;
        assert!(policy.permits_vote(None, start));
        assert!(policy.permits_vote(Some(&window), start));
        assert!(!policy.permits_vote(Some(&window), start + Duration::hours(1)));
    }

    #[test]
    fn disabled_policy() {
        let (window, start) = window();
        let policy = WindowPolicy::Disabled;
        assert!(policy.permits_vote(None, start));
        assert!(policy.permits_vote(Some(&window), start + Duration::hours(1)));
    }

    #[test]
    fn policy_names() {
        use rocket::serde::json::serde_json;

        let policy: WindowPolicy = serde_json::from_str("\"lenient\"").unwrap();
        assert_eq!(policy, WindowPolicy::Lenient);
        assert_eq!(WindowPolicy::default(), WindowPolicy::Lenient);
    }
}
