// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window send limiter for channels and providers.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::NotificationError;
use crate::types::RateLimits;

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Tracks admitted sends and rejects those that would exceed any window.
#[derive(Debug)]
pub struct RateLimiter {
    scope: String,
    limits: RateLimits,
    admitted: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(scope: impl Into<String>, limits: RateLimits) -> Self {
        Self {
            scope: scope.into(),
            limits,
            admitted: VecDeque::new(),
        }
    }

    /// Admits one send at `now`, or returns `RateLimitExceeded` naming the
    /// first window that is full.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), NotificationError> {
        if self.limits.is_unlimited() {
            return Ok(());
        }

        let horizon = self.horizon();
        while let Some(front) = self.admitted.front() {
            if now.duration_since(*front) >= horizon {
                self.admitted.pop_front();
            } else {
                break;
            }
        }

        let windows = [
            (self.limits.per_second, SECOND, "second"),
            (self.limits.per_minute, MINUTE, "minute"),
            (self.limits.per_hour, HOUR, "hour"),
        ];
        for (limit, window, label) in windows {
            let Some(limit) = limit else { continue };
            let in_window = self
                .admitted
                .iter()
                .rev()
                .take_while(|t| now.duration_since(**t) < window)
                .count();
            if in_window >= limit as usize {
                return Err(NotificationError::RateLimitExceeded {
                    scope: self.scope.clone(),
                    limit,
                    window: label,
                });
            }
        }

        self.admitted.push_back(now);
        Ok(())
    }

    fn horizon(&self) -> Duration {
        if self.limits.per_hour.is_some() {
            HOUR
        } else if self.limits.per_minute.is_some() {
            MINUTE
        } else {
            SECOND
        }
    }
}
