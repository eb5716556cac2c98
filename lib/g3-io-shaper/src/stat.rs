/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, trace};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_STAT_INTERVAL: Duration = Duration::from_secs(1);

/// Per-interval traffic, in bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BandwidthSnapshot {
    pub rx: u64,
    pub tx: u64,
}

impl BandwidthSnapshot {
    /// Scale the per-interval delta to bits per second.
    pub fn per_second(&self, interval: Duration) -> BandwidthSnapshot {
        let nanos = interval.as_nanos();
        if nanos == 0 {
            return BandwidthSnapshot::default();
        }
        let scale = |v: u64| {
            let bps = u128::from(v) * 1_000_000_000 / nanos;
            u64::try_from(bps).unwrap_or(u64::MAX)
        };
        BandwidthSnapshot {
            rx: scale(self.rx),
            tx: scale(self.tx),
        }
    }
}

#[derive(Default)]
struct Bandwidth {
    last_rx: AtomicU64,
    last_tx: AtomicU64,
    rx: AtomicU64,
    tx: AtomicU64,
}

impl Bandwidth {
    fn reset(&self) {
        self.last_rx.store(0, Ordering::Relaxed);
        self.last_tx.store(0, Ordering::Relaxed);
        self.rx.store(0, Ordering::Relaxed);
        self.tx.store(0, Ordering::Relaxed);
    }
}

/// Traffic counters shared by any number of shaped connections.
///
/// Both counters are in bits. A background task started on creation turns the
/// cumulative counters into a per-interval bandwidth snapshot, until the stat is
/// closed, its parent cancellation token is cancelled, or the last reference to
/// it is dropped.
pub struct ConnStat {
    rx: AtomicU64,
    tx: AtomicU64,
    bw: Bandwidth,
    interval: Duration,
    cancel: CancellationToken,
}

impl ConnStat {
    fn new(interval: Duration, cancel: CancellationToken) -> Self {
        ConnStat {
            rx: AtomicU64::new(0),
            tx: AtomicU64::new(0),
            bw: Bandwidth::default(),
            interval,
            cancel,
        }
    }

    /// Create a stat sampled every second, stopped only by [`ConnStat::close`].
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn() -> Arc<Self> {
        ConnStat::spawn_with_interval(&CancellationToken::new(), DEFAULT_STAT_INTERVAL)
    }

    /// Create a stat sampled every `interval`, also stopped when `parent` is cancelled.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn_with_interval(parent: &CancellationToken, interval: Duration) -> Arc<Self> {
        let interval = if interval.is_zero() {
            DEFAULT_STAT_INTERVAL
        } else {
            interval
        };
        let stat = Arc::new(ConnStat::new(interval, parent.child_token()));
        stat.spawn_sampler();
        stat
    }

    fn spawn_sampler(self: &Arc<Self>) {
        let stat = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            debug!("bandwidth sampler started with interval {interval:?}");
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(stat) = Weak::upgrade(&stat) else {
                            break;
                        };
                        stat.sample();
                    }
                }
            }
            debug!("bandwidth sampler stopped");
        });
    }

    fn sample(&self) {
        let rx = self.rx.load(Ordering::Relaxed);
        let tx = self.tx.load(Ordering::Relaxed);
        let last_rx = self.bw.last_rx.swap(rx, Ordering::Relaxed);
        let last_tx = self.bw.last_tx.swap(tx, Ordering::Relaxed);
        let bw_rx = rx.saturating_sub(last_rx);
        let bw_tx = tx.saturating_sub(last_tx);
        self.bw.rx.store(bw_rx, Ordering::Relaxed);
        self.bw.tx.store(bw_tx, Ordering::Relaxed);
        trace!("bandwidth in last {:?}: rx {bw_rx} bits, tx {bw_tx} bits", self.interval);
    }

    pub fn add_rx(&self, bits: u64) {
        self.rx.fetch_add(bits, Ordering::Relaxed);
    }

    pub fn add_tx(&self, bits: u64) {
        self.tx.fetch_add(bits, Ordering::Relaxed);
    }

    pub fn rx(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    pub fn tx(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }

    pub fn bandwidth(&self) -> BandwidthSnapshot {
        BandwidthSnapshot {
            rx: self.bw.rx.load(Ordering::Relaxed),
            tx: self.bw.tx.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Zero all counters and the bandwidth snapshot, the sampler keeps running.
    pub fn reset(&self) {
        self.rx.store(0, Ordering::Relaxed);
        self.tx.store(0, Ordering::Relaxed);
        self.bw.reset();
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
