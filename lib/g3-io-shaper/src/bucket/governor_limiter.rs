/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::num::NonZeroU32;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, InsufficientCapacity};
use tokio::time::Instant;

use super::{TokenAcquireAction, TokenBucket};

fn check_n(limiter: &DefaultDirectRateLimiter, n: NonZeroU32) -> Result<TokenAcquireAction, u32> {
    match limiter.check_n(n) {
        Ok(Ok(_)) => Ok(TokenAcquireAction::Acquired),
        Ok(Err(not_until)) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            Ok(TokenAcquireAction::DelayUntil(Instant::now() + wait))
        }
        Err(InsufficientCapacity(max)) => Err(max),
    }
}

impl TokenBucket for DefaultDirectRateLimiter {
    fn try_acquire(&self, tokens: u64) -> TokenAcquireAction {
        let n = u32::try_from(tokens).unwrap_or(u32::MAX);
        let Some(n) = NonZeroU32::new(n) else {
            return TokenAcquireAction::Acquired;
        };

        match check_n(self, n) {
            Ok(action) => action,
            Err(max) => {
                // the quota can never hold this many tokens, charge a full burst instead
                let Some(max) = NonZeroU32::new(max) else {
                    return TokenAcquireAction::Acquired;
                };
                check_n(self, max).unwrap_or(TokenAcquireAction::Acquired)
            }
        }
    }
}
