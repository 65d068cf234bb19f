//! Rate/abuse guard in front of grant issuance.
//!
//! Two checks run in order: automated-traffic detection on the request headers,
//! then a fixed-window request counter keyed by caller identity. The counter map
//! is process-wide state owned by the guard: each identity's window resets once
//! its length has elapsed, and the map lives for the lifetime of the process
//! (expired windows are swept periodically).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use thiserror::Error;

use crate::config::GuardConfig;

pub const RATE_LIMIT_MESSAGE: &str = "You have been blocked due to rate limiting.";
pub const BOT_MESSAGE: &str = "You are a bot, if false contact our support.";

/// Substrings of a lowercased User-Agent that mark automated clients.
const AUTOMATION_MARKERS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "headless",
    "phantomjs",
    "selenium",
    "puppeteer",
    "playwright",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Denials are enforced.
    Live,
    /// Denials are logged and the request is allowed.
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    DenyBot,
    DenyRateLimit { retry_after: Duration },
}

impl Decision {
    pub fn is_denied(&self) -> bool {
        !matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Rate limiter unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Bot detection
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct BotDetector;

impl BotDetector {
    /// A request without a User-Agent, or with an automation marker in it, is a bot.
    pub fn is_automated(&self, headers: &HeaderMap) -> bool {
        let agent = match headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        {
            Some(agent) if !agent.trim().is_empty() => agent.to_ascii_lowercase(),
            _ => return true,
        };

        AUTOMATION_MARKERS
            .iter()
            .any(|marker| agent.contains(marker))
    }
}

// ============================================================================
// Fixed-window counter
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by identity.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `identity` at `now`.
    /// Returns `None` when allowed, or the time until the window resets.
    pub fn hit(&self, identity: &str, now: Instant) -> Result<Option<Duration>, GuardError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| GuardError::Unavailable(e.to_string()))?;

        let entry = windows.entry(identity.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.started_at) >= self.window {
            *entry = Window {
                started_at: now,
                count: 0,
            };
        }

        if entry.count >= self.max {
            let elapsed = now.saturating_duration_since(entry.started_at);
            return Ok(Some(self.window.saturating_sub(elapsed)));
        }

        entry.count += 1;
        Ok(None)
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> Result<usize, GuardError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| GuardError::Unavailable(e.to_string()))?;
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started_at) < self.window);
        Ok(before - windows.len())
    }

    pub fn tracked_identities(&self) -> Result<usize, GuardError> {
        Ok(self
            .windows
            .lock()
            .map_err(|e| GuardError::Unavailable(e.to_string()))?
            .len())
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Policy filter deciding whether a caller may proceed. Never touches upload data.
#[derive(Debug)]
pub struct UploadGuard {
    mode: GuardMode,
    bots: BotDetector,
    limiter: FixedWindowLimiter,
}

impl UploadGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            mode: config.mode,
            bots: BotDetector,
            limiter: FixedWindowLimiter::new(
                config.max_requests,
                Duration::from_secs(config.window_seconds),
            ),
        }
    }

    pub fn limiter(&self) -> &FixedWindowLimiter {
        &self.limiter
    }

    pub fn check(&self, identity: &str, headers: &HeaderMap) -> Result<Decision, GuardError> {
        self.check_at(identity, headers, Instant::now())
    }

    /// Classify a request at `now`. A bot denial does not consume rate budget.
    pub fn check_at(
        &self,
        identity: &str,
        headers: &HeaderMap,
        now: Instant,
    ) -> Result<Decision, GuardError> {
        let decision = if self.bots.is_automated(headers) {
            Decision::DenyBot
        } else {
            match self.limiter.hit(identity, now)? {
                None => Decision::Allow,
                Some(retry_after) => Decision::DenyRateLimit { retry_after },
            }
        };

        if decision.is_denied() {
            match self.mode {
                GuardMode::Live => {
                    tracing::info!(identity, ?decision, "Guard denied request");
                }
                GuardMode::DryRun => {
                    tracing::warn!(identity, ?decision, "Guard would deny request (dry run)");
                    return Ok(Decision::Allow);
                }
            }
        }

        Ok(decision)
    }
}
