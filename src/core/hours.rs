//! Parsing of hour lists such as `"1-5,8,10-12"`

use std::collections::BTreeSet;
use thiserror::Error;

pub const MAX_HOUR: u32 = 23;

#[derive(Debug, Error, PartialEq)]
pub enum IntervalError {
    #[error("hours must be between 0 and {MAX_HOUR}, got {0}")]
    OutOfRange(u32),
    #[error("invalid range: {0}-{1}")]
    InvertedRange(u32, u32),
    #[error("invalid hour token: '{0}'")]
    InvalidToken(String),
    #[error("expected a whole number of hours, got '{0}'")]
    NotAnInteger(String),
    #[error("'every' interval must be between 1 and 24, got {0}")]
    EveryOutOfRange(u32),
}

fn parse_hour(token: &str, source: &str) -> Result<u32, IntervalError> {
    let hour: u32 = token
        .trim()
        .parse()
        .map_err(|_| IntervalError::InvalidToken(source.to_string()))?;
    if hour > MAX_HOUR {
        return Err(IntervalError::OutOfRange(hour));
    }
    Ok(hour)
}

/// Parses comma separated hours and inclusive `start-end` ranges into a set.
pub fn parse_hour_ranges(interval: &str) -> Result<BTreeSet<u32>, IntervalError> {
    let mut hours = BTreeSet::new();

    for part in interval.trim().split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_hour(start, part)?;
                let end = parse_hour(end, part)?;
                if start > end {
                    return Err(IntervalError::InvertedRange(start, end));
                }
                hours.extend(start..=end);
            }
            None => {
                hours.insert(parse_hour(part, part)?);
            }
        }
    }

    Ok(hours)
}
