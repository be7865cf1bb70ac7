//! Per-mirror circuit breakers and endpoint selection.
//!
//! ```text
//! ┌────────┐  N consecutive errors  ┌──────┐  recovery timeout  ┌──────────┐
//! │ Closed │ ─────────────────────→ │ Open │ ─────────────────→ │ HalfOpen │
//! └────────┘                        └──────┘   (on select)      └──────────┘
//!     ↑                                ↑                             │
//!     │        M successful probes     │          any error          │
//!     └────────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! The whole health table lives behind one mutex owned by
//! [`EndpointManager`]. The lock is never held across an await point.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ApiError;

/// Health state of one mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation. Consecutive errors are counted.
    Closed,
    /// Tripped. Not selected until the recovery timeout elapses.
    Open,
    /// Probing. Selected again, but a single error re-opens it.
    HalfOpen,
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive errors that open a closed circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before it may be probed.
    pub recovery_timeout: Duration,
    /// Probes a half-open circuit needs before a success closes it.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// One configured mirror. Lower priority numbers are preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub priority: u32,
}

/// A selectable mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: usize,
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub priority: u32,
}

/// Read-only snapshot of a mirror's health.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub id: usize,
    pub url: String,
    pub priority: u32,
    pub state: CircuitState,
    pub consecutive_errors: u32,
    pub probe_count: u32,
    /// Seconds since the circuit last opened, while it is not closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_secs_ago: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct EndpointHealth {
    endpoint: Endpoint,
    state: CircuitState,
    consecutive_errors: u32,
    probe_count: u32,
    opened_at: Option<Instant>,
    last_error_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
}

impl EndpointHealth {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: CircuitState::Closed,
            consecutive_errors: 0,
            probe_count: 0,
            opened_at: None,
            last_error_at: None,
            last_success_at: None,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_count = 0;
    }
}

/// Owner of all mirror health state.
#[derive(Debug)]
pub struct EndpointManager {
    config: BreakerConfig,
    /// Sorted by priority; ties keep configuration order.
    table: Mutex<Vec<EndpointHealth>>,
}

impl EndpointManager {
    pub fn new(mirrors: Vec<EndpointConfig>, config: BreakerConfig) -> Result<Self, ApiError> {
        if mirrors.is_empty() {
            return Err(ApiError::NoEndpoints);
        }

        let mut table: Vec<EndpointHealth> = mirrors
            .into_iter()
            .enumerate()
            .map(|(id, mirror)| {
                EndpointHealth::new(Endpoint {
                    id,
                    base_url: normalize_base(&mirror.url),
                    priority: mirror.priority,
                })
            })
            .collect();
        table.sort_by_key(|health| health.endpoint.priority);

        tracing::debug!(count = table.len(), "Endpoint table initialized");

        Ok(Self {
            config,
            table: Mutex::new(table),
        })
    }

    /// Single-mirror convenience constructor.
    pub fn single(url: &str, config: BreakerConfig) -> Result<Self, ApiError> {
        Self::new(
            vec![EndpointConfig {
                url: url.to_string(),
                priority: 0,
            }],
            config,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EndpointHealth>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pick the best eligible mirror.
    ///
    /// Open circuits whose recovery timeout has elapsed become half-open
    /// here. Selecting a half-open mirror counts as a probe. When every
    /// circuit is open the highest-priority mirror is returned anyway.
    pub fn select(&self) -> Endpoint {
        let now = Instant::now();
        let mut table = self.lock();

        for health in table.iter_mut() {
            if health.state != CircuitState::Open {
                continue;
            }
            let recovered = health
                .opened_at
                .is_some_and(|at| now.duration_since(at) >= self.config.recovery_timeout);
            if recovered {
                health.state = CircuitState::HalfOpen;
                health.probe_count = 0;
                tracing::info!(endpoint = %health.endpoint.base_url, "Circuit half-open");
            }
        }

        if let Some(health) = table.iter_mut().find(|h| h.state != CircuitState::Open) {
            if health.state == CircuitState::HalfOpen {
                health.probe_count += 1;
                tracing::debug!(
                    endpoint = %health.endpoint.base_url,
                    probe = health.probe_count,
                    "Probing half-open endpoint"
                );
            }
            return health.endpoint.clone();
        }

        let primary = &table[0].endpoint;
        tracing::warn!(endpoint = %primary.base_url, "All circuits open, forcing primary endpoint");
        primary.clone()
    }

    /// Record a successful response from `url`.
    pub fn report_success(&self, url: &str) {
        let url = normalize_base(url);
        let mut table = self.lock();
        let Some(health) = table.iter_mut().find(|h| h.endpoint.base_url == url) else {
            return;
        };

        health.consecutive_errors = 0;
        health.last_success_at = Some(Utc::now());

        if health.state == CircuitState::HalfOpen
            && health.probe_count >= self.config.success_threshold
        {
            health.state = CircuitState::Closed;
            health.probe_count = 0;
            health.opened_at = None;
            tracing::info!(endpoint = %url, "Circuit closed");
        }
    }

    /// Record a failed request (5xx or transport failure) against `url`.
    pub fn report_error(&self, url: &str) {
        let url = normalize_base(url);
        let now = Instant::now();
        let mut table = self.lock();
        let Some(health) = table.iter_mut().find(|h| h.endpoint.base_url == url) else {
            return;
        };

        health.consecutive_errors += 1;
        health.last_error_at = Some(Utc::now());

        match health.state {
            CircuitState::Closed if health.consecutive_errors >= self.config.failure_threshold => {
                health.open(now);
                tracing::warn!(
                    endpoint = %url,
                    errors = health.consecutive_errors,
                    "Circuit opened"
                );
            }
            CircuitState::HalfOpen => {
                health.open(now);
                tracing::warn!(endpoint = %url, "Probe failed, circuit re-opened");
            }
            _ => {}
        }
    }

    /// Snapshot of every mirror, in priority order.
    pub fn status(&self) -> Vec<EndpointStatus> {
        let now = Instant::now();
        self.lock()
            .iter()
            .map(|health| EndpointStatus {
                id: health.endpoint.id,
                url: health.endpoint.base_url.clone(),
                priority: health.endpoint.priority,
                state: health.state,
                consecutive_errors: health.consecutive_errors,
                probe_count: health.probe_count,
                opened_secs_ago: health
                    .opened_at
                    .map(|at| now.duration_since(at).as_secs()),
                last_error_at: health.last_error_at,
                last_success_at: health.last_success_at,
            })
            .collect()
    }

    /// Close every circuit and clear all counters.
    pub fn reset_all(&self) {
        for health in self.lock().iter_mut() {
            health.state = CircuitState::Closed;
            health.consecutive_errors = 0;
            health.probe_count = 0;
            health.opened_at = None;
        }
        tracing::info!("All circuits reset");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARY: &str = "https://a.example";
    const BACKUP: &str = "https://b.example";

    fn manager() -> EndpointManager {
        EndpointManager::new(
            vec![
                EndpointConfig {
                    url: format!("{BACKUP}/"),
                    priority: 1,
                },
                EndpointConfig {
                    url: PRIMARY.into(),
                    priority: 0,
                },
            ],
            BreakerConfig::default(),
        )
        .unwrap()
    }

    fn state_of(manager: &EndpointManager, url: &str) -> EndpointStatus {
        manager
            .status()
            .into_iter()
            .find(|s| s.url == url)
            .unwrap()
    }

    #[test]
    fn test_empty_mirror_list_is_rejected() {
        assert!(matches!(
            EndpointManager::new(Vec::new(), BreakerConfig::default()),
            Err(ApiError::NoEndpoints)
        ));
    }

    #[tokio::test]
    async fn test_selects_lowest_priority() {
        let manager = manager();
        assert_eq!(manager.select().base_url, PRIMARY);
        assert_eq!(manager.status()[1].url, BACKUP);
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let manager = manager();
        manager.report_error(PRIMARY);
        manager.report_error(PRIMARY);
        assert_eq!(state_of(&manager, PRIMARY).state, CircuitState::Closed);
        assert_eq!(manager.select().base_url, PRIMARY);

        manager.report_error(PRIMARY);
        assert_eq!(state_of(&manager, PRIMARY).state, CircuitState::Open);
        for _ in 0..5 {
            assert_eq!(manager.select().base_url, BACKUP);
        }
    }

    #[tokio::test]
    async fn test_success_resets_error_count() {
        let manager = manager();
        manager.report_error(PRIMARY);
        manager.report_error(PRIMARY);
        manager.report_success(PRIMARY);
        assert_eq!(state_of(&manager, PRIMARY).consecutive_errors, 0);

        manager.report_error(PRIMARY);
        manager.report_error(PRIMARY);
        assert_eq!(state_of(&manager, PRIMARY).state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_recovery_timeout() {
        let manager = manager();
        for _ in 0..3 {
            manager.report_error(PRIMARY);
        }
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(manager.select().base_url, BACKUP);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(manager.select().base_url, PRIMARY);
        let status = state_of(&manager, PRIMARY);
        assert_eq!(status.state, CircuitState::HalfOpen);
        assert_eq!(status.probe_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_probes() {
        let manager = manager();
        for _ in 0..3 {
            manager.report_error(PRIMARY);
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        manager.select();
        manager.report_success(PRIMARY);
        assert_eq!(state_of(&manager, PRIMARY).state, CircuitState::HalfOpen);

        manager.select();
        manager.report_success(PRIMARY);
        let status = state_of(&manager, PRIMARY);
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.opened_secs_ago, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let manager = manager();
        for _ in 0..3 {
            manager.report_error(PRIMARY);
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        manager.select();
        manager.report_error(PRIMARY);

        let status = state_of(&manager, PRIMARY);
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.opened_secs_ago, Some(0));
        assert_eq!(manager.select().base_url, BACKUP);
    }

    #[tokio::test]
    async fn test_all_open_forces_primary() {
        let manager = manager();
        for _ in 0..3 {
            manager.report_error(PRIMARY);
            manager.report_error(BACKUP);
        }
        assert_eq!(manager.select().base_url, PRIMARY);
        assert_eq!(state_of(&manager, PRIMARY).state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset_all() {
        let manager = manager();
        for _ in 0..3 {
            manager.report_error(PRIMARY);
        }
        manager.reset_all();
        let status = state_of(&manager, PRIMARY);
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_errors, 0);
        assert_eq!(manager.select().base_url, PRIMARY);
    }

    #[tokio::test]
    async fn test_unknown_url_is_ignored() {
        let manager = manager();
        manager.report_error("https://unknown.example");
        manager.report_success("https://unknown.example");
        assert!(manager.status().iter().all(|s| s.consecutive_errors == 0));
    }
}
