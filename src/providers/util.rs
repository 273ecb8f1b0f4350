use anyhow::{Result, anyhow};
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

const USER_AGENT: &str = concat!("ratefetch/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by a provider instance.
pub fn http_client(headers: HeaderMap) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?)
}

/// Converts a JSON number or numeric string into a `Decimal` without going
/// through binary floating point.
pub fn decimal_from_json(value: &Value) -> Result<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(anyhow!("Expected a number, got {other}")),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| anyhow!("Invalid rate '{text}': {e}"))
}
