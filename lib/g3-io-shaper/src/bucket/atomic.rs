/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use super::{TokenAcquireAction, TokenBucket, TokenBucketConfig};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Lock-free token bucket.
///
/// The bucket state is kept as a single theoretical arrival time (in nanoseconds
/// since creation): the point in time at which all granted tokens would have been
/// replenished. The bucket is full when that time is not later than now.
pub struct AtomicTokenBucket {
    started: Instant,
    rate: u64,
    tolerance_nanos: u64,
    tat_nanos: AtomicU64,
}

impl AtomicTokenBucket {
    pub fn new(config: TokenBucketConfig) -> Self {
        let rate = config.rate().max(1);
        let max_burst = if config.max_burst() == 0 {
            rate
        } else {
            config.max_burst()
        };
        AtomicTokenBucket {
            started: Instant::now(),
            rate,
            tolerance_nanos: nanos_for(max_burst, rate),
            tat_nanos: AtomicU64::new(0),
        }
    }

    pub fn per_second(rate: u64) -> Self {
        AtomicTokenBucket::new(TokenBucketConfig::per_second(rate))
    }

    #[inline]
    pub fn rate(&self) -> u64 {
        self.rate
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

fn nanos_for(tokens: u64, rate: u64) -> u64 {
    let nanos = u128::from(tokens) * NANOS_PER_SEC / u128::from(rate);
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

impl TokenBucket for AtomicTokenBucket {
    fn try_acquire(&self, tokens: u64) -> TokenAcquireAction {
        if tokens == 0 {
            return TokenAcquireAction::Acquired;
        }

        let cost = nanos_for(tokens, self.rate);
        let now = self.elapsed_nanos();
        let mut tat = self.tat_nanos.load(Ordering::Acquire);

        loop {
            let full = tat <= now;
            let next_tat = tat.max(now).saturating_add(cost);
            // an oversized request is granted on a full bucket and leaves it in debt
            if !full && next_tat - now > self.tolerance_nanos {
                let ready_at = if cost > self.tolerance_nanos {
                    tat
                } else {
                    tat.saturating_add(cost) - self.tolerance_nanos
                };
                return TokenAcquireAction::DelayUntil(
                    self.started + Duration::from_nanos(ready_at),
                );
            }

            match self.tat_nanos.compare_exchange(
                tat,
                next_tat,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return TokenAcquireAction::Acquired,
                Err(actual) => tat = actual,
            }
        }
    }
}
