//! Per-client request rate limiting.
//!
//! Each client identity (the peer IP) keeps the timestamps of its admitted
//! requests inside a trailing window. State is process-local and is lost on
//! restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Length of the accounting window.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Clients {
    calls: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl Clients {
    /// Drop identities whose newest admitted request has left the window.
    /// Runs at most once per window.
    fn sweep(&mut self, now: Instant, window: Duration) {
        let last = *self.last_sweep.get_or_insert(now);
        if now.saturating_duration_since(last) < window {
            return;
        }
        self.calls.retain(|_, calls| {
            calls
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < window)
        });
        self.last_sweep = Some(now);
    }
}

pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clients: Mutex<Clients>,
}

impl RateLimiter {
    /// Admit at most `limit` requests per identity in any `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            clients: Mutex::new(Clients::default()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, WINDOW)
    }

    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Admission check against an explicit clock reading.
    ///
    /// Rejected attempts are not recorded, so they don't extend the wait.
    /// Identities with nothing left in the window are forgotten.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.sweep(now, self.window);

        let calls = clients.calls.entry(identity.to_string()).or_default();
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.limit {
            if calls.is_empty() {
                clients.calls.remove(identity);
            }
            return false;
        }

        calls.push_back(now);
        true
    }

    /// Number of admitted requests currently counted for `identity`.
    pub fn in_window(&self, identity: &str) -> usize {
        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.calls.get(identity).map(VecDeque::len).unwrap_or(0)
    }

    /// Number of identities with tracked state.
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .len()
    }
}
