/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use tokio::time::Instant;

mod config;
pub use config::TokenBucketConfig;

mod atomic;
pub use atomic::AtomicTokenBucket;

mod governor_limiter;

#[derive(Debug, Eq, PartialEq)]
pub enum TokenAcquireAction {
    Acquired,
    /// Not enough tokens, check again after this instant
    DelayUntil(Instant),
}

/// A rate budget shared by any number of connections.
///
/// Implementations must be safe to call concurrently. A `DelayUntil` result
/// means nothing has been taken from the bucket, the caller is expected to
/// wait and then ask for the same amount again.
pub trait TokenBucket {
    fn try_acquire(&self, tokens: u64) -> TokenAcquireAction;
}

pub type ArcTokenBucket = Arc<dyn TokenBucket + Send + Sync>;
