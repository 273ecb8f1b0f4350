//! Decides whether a service is due to fetch at a given time

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use thiserror::Error;
use tracing::{debug, error};

use crate::core::hours::{IntervalError, parse_hour_ranges};
use crate::core::model::{ExchangeRateService, IntervalType};

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("invalid 'every' interval: expected single number, got '{0}'")]
    InvalidEvery(String),
    #[error("invalid hour list '{interval}': {source}")]
    InvalidHours {
        interval: String,
        #[source]
        source: IntervalError,
    },
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}

fn hour_set(service: &ExchangeRateService) -> Result<std::collections::BTreeSet<u32>, ScheduleError> {
    parse_hour_ranges(&service.fetch_interval).map_err(|source| ScheduleError::InvalidHours {
        interval: service.fetch_interval.clone(),
        source,
    })
}

/// Evaluates the schedule of `service` without side effects.
///
/// `current_hour` drives the `on`/`not_on` modes, `now` the `every` mode.
pub fn evaluate(
    service: &ExchangeRateService,
    current_hour: u32,
    now: DateTime<Utc>,
) -> Result<bool, ScheduleError> {
    match service.interval_type {
        IntervalType::NotOn => Ok(!hour_set(service)?.contains(&current_hour)),
        IntervalType::On => Ok(hour_set(service)?.contains(&current_hour)),
        IntervalType::Every => {
            let interval = service.fetch_interval.trim();
            let interval_hours: i64 = interval
                .parse()
                .ok()
                .filter(|h: &i64| *h >= 0)
                .ok_or_else(|| ScheduleError::InvalidEvery(interval.to_string()))?;

            let Some(last_fetch) = service.last_fetch else {
                return Ok(true);
            };

            let elapsed = truncate_to_hour(now) - truncate_to_hour(last_fetch);
            Ok(elapsed.num_hours() >= interval_hours)
        }
    }
}

/// Like [`evaluate`], but a broken schedule is reported and treated as not due.
pub fn is_due(service: &ExchangeRateService, current_hour: u32, now: DateTime<Utc>) -> bool {
    match evaluate(service, current_hour, now) {
        Ok(due) => {
            debug!(
                service = %service.name,
                interval_type = %service.interval_type,
                fetch_interval = %service.fetch_interval,
                current_hour,
                last_fetch = ?service.last_fetch,
                due,
                "Evaluated fetch schedule"
            );
            due
        }
        Err(e) => {
            error!(service = %service.name, error = %e, "Error parsing fetch_interval");
            false
        }
    }
}
