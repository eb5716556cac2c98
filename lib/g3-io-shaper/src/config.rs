/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;

use crate::{ArcTokenBucket, AtomicTokenBucket, ConnStat, ShapeConfig, TokenBucketConfig};

/// Loadable shaper settings, all rates in bits per second.
///
/// Upload maps to the transmit budget, download to the receive budget. A stat
/// is only created when a stat interval is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaperConfig {
    upload: Option<TokenBucketConfig>,
    download: Option<TokenBucketConfig>,
    stat_interval: Option<Duration>,
}

impl ShaperConfig {
    #[inline]
    pub fn upload(&self) -> Option<TokenBucketConfig> {
        self.upload
    }

    pub fn set_upload(&mut self, config: TokenBucketConfig) {
        self.upload = Some(config);
    }

    #[inline]
    pub fn download(&self) -> Option<TokenBucketConfig> {
        self.download
    }

    pub fn set_download(&mut self, config: TokenBucketConfig) {
        self.download = Some(config);
    }

    #[inline]
    pub fn stat_interval(&self) -> Option<Duration> {
        self.stat_interval
    }

    pub fn set_stat_interval(&mut self, interval: Duration) {
        self.stat_interval = Some(interval);
    }

    pub fn check(&mut self) -> anyhow::Result<()> {
        if let Some(upload) = &mut self.upload {
            upload.check().context("invalid upload limit")?;
        }
        if let Some(download) = &mut self.download {
            download.check().context("invalid download limit")?;
        }
        if let Some(interval) = self.stat_interval
            && interval.is_zero()
        {
            return Err(anyhow!("stat interval should not be zero"));
        }
        Ok(())
    }

    /// Create fresh buckets and stat, and bind them to a new [`ShapeConfig`].
    ///
    /// The stat sampler stops when `cancel` is cancelled, throttle waits of
    /// connections using the returned config are aborted at the same time.
    /// Must be called inside a tokio runtime if a stat interval is set.
    pub fn build(&self, cancel: &CancellationToken) -> ShapeConfig {
        let mut builder = ShapeConfig::builder();

        let tx = self.upload.map(new_bucket);
        let rx = self.download.map(new_bucket);
        if tx.is_some() || rx.is_some() {
            builder = builder.with_limit(tx, rx);
        }
        if let Some(interval) = self.stat_interval {
            builder = builder.with_stat(Some(ConnStat::spawn_with_interval(cancel, interval)));
        }
        builder.with_cancellation(cancel.clone()).build()
    }
}

fn new_bucket(config: TokenBucketConfig) -> ArcTokenBucket {
    Arc::new(AtomicTokenBucket::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShapeFeatures;

    #[test]
    fn check() {
        let mut config = ShaperConfig::default();
        config.check().unwrap();

        config.set_upload(TokenBucketConfig::default());
        assert!(config.check().is_err());

        let mut upload = TokenBucketConfig::default();
        upload.set_rate(1000);
        config.set_upload(upload);
        config.check().unwrap();
        assert_eq!(config.upload().unwrap().max_burst(), 1000);

        config.set_stat_interval(Duration::ZERO);
        assert!(config.check().is_err());
    }

    #[test]
    fn build_empty() {
        let cancel = CancellationToken::new();
        let shape = ShaperConfig::default().build(&cancel);
        assert!(shape.features().is_empty());
        assert!(shape.cancellation().is_some());
    }

    #[tokio::test]
    async fn build_full() {
        let mut config = ShaperConfig::default();
        config.set_download(TokenBucketConfig::per_second(8000));
        config.set_stat_interval(Duration::from_millis(200));
        config.check().unwrap();

        let cancel = CancellationToken::new();
        let shape = config.build(&cancel);
        assert_eq!(
            shape.features(),
            ShapeFeatures::RATE_LIMIT | ShapeFeatures::STAT
        );
        assert!(shape.tx_limit().is_none());
        assert!(shape.rx_limit().is_some());

        let stat = shape.stat().unwrap();
        assert_eq!(stat.interval(), Duration::from_millis(200));
        cancel.cancel();
        assert!(stat.is_closed());
    }
}
