use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    pub booking_queue_size: usize,
    pub event_buffer_size: usize,
    pub accept_window: Duration,
    pub handshake_window: Duration,
    pub wait_grace: Duration,
    pub heartbeat_interval: Duration,
    pub platform_fee_percent: i64,
    pub cancel_fine_percent: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            booking_queue_size: parse_or_default("BOOKING_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            accept_window: Duration::from_secs(parse_or_default("ACCEPT_WINDOW_SECS", 120)?),
            handshake_window: Duration::from_secs(parse_or_default("HANDSHAKE_WINDOW_SECS", 60)?),
            wait_grace: Duration::from_secs(parse_or_default("WAIT_GRACE_SECS", 60)?),
            heartbeat_interval: Duration::from_secs(parse_or_default(
                "HEARTBEAT_INTERVAL_SECS",
                10,
            )?),
            platform_fee_percent: parse_or_default("PLATFORM_FEE_PERCENT", 10)?,
            cancel_fine_percent: parse_or_default("CANCEL_FINE_PERCENT", 10)?,
        })
    }

    /// Config with test-friendly defaults, no env lookups.
    pub fn for_tests() -> Self {
        Self {
            http_port: 0,
            log_level: "debug".to_string(),
            jwt_secret: "test-secret".to_string(),
            booking_queue_size: 64,
            event_buffer_size: 64,
            accept_window: Duration::from_secs(120),
            handshake_window: Duration::from_secs(60),
            wait_grace: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(10),
            platform_fee_percent: 10,
            cancel_fine_percent: 10,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
