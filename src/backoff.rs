// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Adaptive backoff on hostile status codes. Counters reset on any
//! 2xx/3xx; sleeps scale with consecutive 429s and fire periodically for
//! 403s and other failures.

use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Counters {
    c429: u32,
    c403: u32,
    c_err: u32,
}

pub struct BackoffController {
    counters: Mutex<Counters>,
}

impl BackoffController {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Records a status code and returns the sleep to impose on the
    /// request-completion task, if any.
    pub fn record(&self, status: u16) -> Option<Duration> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());

        if (200..400).contains(&status) {
            counters.c429 = 0;
            counters.c403 = 0;
            counters.c_err = 0;
            return None;
        }

        match status {
            429 => {
                counters.c429 += 1;
                Some(Duration::from_secs(counters.c429.min(5) as u64))
            }
            403 => {
                counters.c403 += 1;
                if counters.c403 % 3 == 0 {
                    Some(Duration::from_secs(2))
                } else {
                    None
                }
            }
            _ => {
                counters.c_err += 1;
                if counters.c_err % 5 == 0 {
                    Some(Duration::from_secs(2))
                } else {
                    None
                }
            }
        }
    }

    /// Records the status and awaits the imposed sleep.
    pub async fn observe(&self, status: u16) {
        if let Some(sleep) = self.record(status) {
            tokio::time::sleep(sleep).await;
        }
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_all_counters() {
        let backoff = BackoffController::new();
        backoff.record(429);
        backoff.record(403);
        backoff.record(500);
        backoff.record(204);
        assert_eq!(backoff.record(429), Some(Duration::from_secs(1)));
    }

    #[test]
    fn rate_limit_sleep_scales_and_caps() {
        let backoff = BackoffController::new();
        for expected in [1u64, 2, 3, 4, 5, 5, 5] {
            assert_eq!(backoff.record(429), Some(Duration::from_secs(expected)));
        }
    }

    #[test]
    fn forbidden_sleeps_every_third() {
        let backoff = BackoffController::new();
        assert_eq!(backoff.record(403), None);
        assert_eq!(backoff.record(403), None);
        assert_eq!(backoff.record(403), Some(Duration::from_secs(2)));
        assert_eq!(backoff.record(403), None);
    }

    #[test]
    fn other_errors_sleep_every_fifth() {
        let backoff = BackoffController::new();
        for _ in 0..4 {
            assert_eq!(backoff.record(500), None);
        }
        assert_eq!(backoff.record(502), Some(Duration::from_secs(2)));
    }
}
