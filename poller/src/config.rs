//! Configuración del poller, leída de variables de entorno.

use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_TRACKER_URL: &str = "http://localhost:8080";
pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_WAIT_SECS: u64 = 60;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_MS: u64 = 500;
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// URL base del tracker.
/// - En Docker: TRACKER_URL=http://tracker:8080
/// - Local: default http://localhost:8080
pub fn tracker_base_url() -> String {
    env::var("TRACKER_URL").unwrap_or_else(|_| DEFAULT_TRACKER_URL.to_string())
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Máximo de ids por consulta al tracker.
    pub chunk_size: usize,
    /// Límite de cada consulta individual.
    pub query_timeout: Duration,
    /// Intentos por consulta ante errores transitorios (incluye el primero).
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Espera entre dos chequeos de una etapa en curso.
    pub wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            max_backoff: MAX_BACKOFF,
            wait: Duration::from_secs(DEFAULT_WAIT_SECS),
        }
    }
}

impl PollConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Arma la config leyendo cada variable con `lookup`; las que faltan o no
    /// parsean toman el default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: u64| parse_or(lookup(key), default);
        Self {
            chunk_size: parse_or(lookup("POLL_CHUNK_SIZE"), DEFAULT_CHUNK_SIZE).max(1),
            query_timeout: Duration::from_secs(get(
                "STATUS_QUERY_TIMEOUT_SECS",
                DEFAULT_QUERY_TIMEOUT_SECS,
            )),
            max_attempts: parse_or(lookup("STATUS_QUERY_MAX_ATTEMPTS"), DEFAULT_MAX_ATTEMPTS)
                .max(1),
            initial_backoff: Duration::from_millis(get(
                "STATUS_QUERY_BACKOFF_MS",
                DEFAULT_BACKOFF_MS,
            )),
            max_backoff: MAX_BACKOFF,
            wait: Duration::from_secs(get("POLL_WAIT_SECS", DEFAULT_WAIT_SECS)),
        }
    }

    /// backoff = min(initial * 2^(attempt-1), max_backoff)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
