/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures_util::FutureExt;
use log::debug;
use tokio::time::Sleep;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use super::ShapeConfig;
use crate::{ArcTokenBucket, ThrottleError, TokenAcquireAction};

#[inline]
fn bytes_to_bits(size: usize) -> u64 {
    (size as u64).saturating_mul(8)
}

/// Waiting for tokens in one traffic direction.
///
/// Each direction has its own timer, so that a read half and a write half
/// polled from different tasks do not steal each other's wakeups.
struct ThrottleWait {
    delay: Pin<Box<Sleep>>,
    armed: bool,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
}

impl ThrottleWait {
    fn new() -> Self {
        ThrottleWait {
            delay: Box::pin(tokio::time::sleep(Duration::from_millis(0))),
            armed: false,
            cancelled: None,
        }
    }

    fn poll_acquire(
        &mut self,
        cx: &mut Context<'_>,
        bucket: &ArcTokenBucket,
        tokens: u64,
        cancel: Option<&CancellationToken>,
    ) -> Poll<Result<(), ThrottleError>> {
        loop {
            if let Some(token) = cancel
                && token.is_cancelled()
            {
                self.armed = false;
                debug!("throttle wait for {tokens} tokens cancelled");
                return Poll::Ready(Err(ThrottleError::Cancelled));
            }

            if self.armed {
                if self.delay.poll_unpin(cx).is_pending() {
                    if let Some(token) = cancel {
                        let cancelled = self
                            .cancelled
                            .get_or_insert_with(|| Box::pin(token.clone().cancelled_owned()));
                        if cancelled.poll_unpin(cx).is_ready() {
                            continue;
                        }
                    }
                    return Poll::Pending;
                }
                self.armed = false;
            }

            match bucket.try_acquire(tokens) {
                TokenAcquireAction::Acquired => return Poll::Ready(Ok(())),
                TokenAcquireAction::DelayUntil(t) => {
                    self.delay.as_mut().reset(t);
                    self.armed = true;
                }
            }
        }
    }
}

/// Per connection throttle and accounting state.
///
/// Receive tokens are charged after the data has been read. If the budget can not
/// cover them at once, they are kept as debt and paid before the next read.
/// Transmit tokens are charged before the data is written, bytes paid for but
/// not yet accepted by the transport are kept as credit for the next write.
pub(crate) struct ShapeState {
    config: ShapeConfig,
    rx_wait: ThrottleWait,
    tx_wait: ThrottleWait,
    rx_debt: u64,
    tx_credit: usize,
}

impl ShapeState {
    pub(crate) fn new(config: ShapeConfig) -> Self {
        ShapeState {
            config,
            rx_wait: ThrottleWait::new(),
            tx_wait: ThrottleWait::new(),
            rx_debt: 0,
            tx_credit: 0,
        }
    }

    #[inline]
    pub(crate) fn config(&self) -> &ShapeConfig {
        &self.config
    }

    pub(crate) fn poll_rx_ready(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.rx_debt == 0 {
            return Poll::Ready(Ok(()));
        }
        let Some(bucket) = self.config.rx_limit() else {
            self.rx_debt = 0;
            return Poll::Ready(Ok(()));
        };

        ready!(
            self.rx_wait
                .poll_acquire(cx, bucket, self.rx_debt, self.config.cancellation())
        )?;
        self.rx_debt = 0;
        Poll::Ready(Ok(()))
    }

    pub(crate) fn record_read(&mut self, size: usize) {
        let bits = bytes_to_bits(size);
        if bits == 0 {
            return;
        }

        if let Some(bucket) = self.config.rx_limit()
            && let TokenAcquireAction::DelayUntil(_) = bucket.try_acquire(bits)
        {
            self.rx_debt = bits;
        }
        if let Some(stat) = self.config.stat() {
            stat.add_rx(bits);
        }
    }

    pub(crate) fn poll_tx_ready(
        &mut self,
        cx: &mut Context<'_>,
        size: usize,
    ) -> Poll<io::Result<()>> {
        if size <= self.tx_credit {
            return Poll::Ready(Ok(()));
        }
        let Some(bucket) = self.config.tx_limit() else {
            return Poll::Ready(Ok(()));
        };

        let tokens = bytes_to_bits(size - self.tx_credit);
        ready!(
            self.tx_wait
                .poll_acquire(cx, bucket, tokens, self.config.cancellation())
        )?;
        self.tx_credit = size;
        Poll::Ready(Ok(()))
    }

    pub(crate) fn record_write(&mut self, size: usize) {
        self.tx_credit = self.tx_credit.saturating_sub(size);
        if let Some(stat) = self.config.stat() {
            stat.add_tx(bytes_to_bits(size));
        }
    }
}
