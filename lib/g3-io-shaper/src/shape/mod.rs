/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use bitflags::bitflags;
use tokio_util::sync::CancellationToken;

use crate::{ArcTokenBucket, ConnStat};

mod state;
pub(crate) use state::ShapeState;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ShapeFeatures: u8 {
        const RATE_LIMIT = 1 << 0;
        const STAT = 1 << 1;
    }
}

/// Settings attached to a shaped connection.
///
/// A feature is only in effect when its bit is set and the resource it needs is
/// present, see [`ShapeConfig::tx_limit`], [`ShapeConfig::rx_limit`] and
/// [`ShapeConfig::stat`]. Clone it to apply the same settings to another
/// connection, the buckets and the stat stay shared.
#[derive(Clone, Default)]
pub struct ShapeConfig {
    features: ShapeFeatures,
    tx_bucket: Option<ArcTokenBucket>,
    rx_bucket: Option<ArcTokenBucket>,
    stat: Option<Arc<ConnStat>>,
    cancel: Option<CancellationToken>,
}

pub enum ShapeOption {
    Limit {
        tx: Option<ArcTokenBucket>,
        rx: Option<ArcTokenBucket>,
    },
    Stat(Option<Arc<ConnStat>>),
    Cancellation(CancellationToken),
}

impl ShapeConfig {
    pub fn builder() -> ShapeConfigBuilder {
        ShapeConfigBuilder::default()
    }

    /// Apply the options in order, later ones override earlier ones.
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = ShapeOption>,
    {
        let mut config = ShapeConfig::default();
        for option in options {
            config.apply(option);
        }
        config
    }

    fn apply(&mut self, option: ShapeOption) {
        match option {
            ShapeOption::Limit { tx, rx } => {
                self.tx_bucket = tx;
                self.rx_bucket = rx;
                self.features |= ShapeFeatures::RATE_LIMIT;
            }
            ShapeOption::Stat(stat) => {
                if let Some(stat) = stat {
                    self.stat = Some(stat);
                    self.features |= ShapeFeatures::STAT;
                }
            }
            ShapeOption::Cancellation(token) => self.cancel = Some(token),
        }
    }

    #[inline]
    pub fn features(&self) -> ShapeFeatures {
        self.features
    }

    pub fn tx_bucket(&self) -> Option<&ArcTokenBucket> {
        self.tx_bucket.as_ref()
    }

    pub fn rx_bucket(&self) -> Option<&ArcTokenBucket> {
        self.rx_bucket.as_ref()
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// The transmit budget, if rate limiting is in effect for this direction.
    pub fn tx_limit(&self) -> Option<&ArcTokenBucket> {
        if self.features.contains(ShapeFeatures::RATE_LIMIT) {
            self.tx_bucket.as_ref()
        } else {
            None
        }
    }

    /// The receive budget, if rate limiting is in effect for this direction.
    pub fn rx_limit(&self) -> Option<&ArcTokenBucket> {
        if self.features.contains(ShapeFeatures::RATE_LIMIT) {
            self.rx_bucket.as_ref()
        } else {
            None
        }
    }

    /// The stat sink, if accounting is in effect.
    pub fn stat(&self) -> Option<&Arc<ConnStat>> {
        if self.features.contains(ShapeFeatures::STAT) {
            self.stat.as_ref()
        } else {
            None
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.tx_limit().is_some() || self.rx_limit().is_some()
    }

    pub fn is_stat_enabled(&self) -> bool {
        self.stat().is_some()
    }
}

#[derive(Default)]
pub struct ShapeConfigBuilder {
    config: ShapeConfig,
}

impl ShapeConfigBuilder {
    pub fn with_limit(mut self, tx: Option<ArcTokenBucket>, rx: Option<ArcTokenBucket>) -> Self {
        self.config.apply(ShapeOption::Limit { tx, rx });
        self
    }

    pub fn with_stat(mut self, stat: Option<Arc<ConnStat>>) -> Self {
        self.config.apply(ShapeOption::Stat(stat));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.config.apply(ShapeOption::Cancellation(token));
        self
    }

    pub fn build(self) -> ShapeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AtomicTokenBucket;

    fn bucket() -> ArcTokenBucket {
        Arc::new(AtomicTokenBucket::per_second(1000))
    }

    #[test]
    fn empty() {
        let config = ShapeConfig::default();
        assert!(config.features().is_empty());
        assert!(!config.is_rate_limited());
        assert!(!config.is_stat_enabled());
        assert!(config.cancellation().is_none());
    }

    #[test]
    fn limit_only() {
        let config = ShapeConfig::builder()
            .with_limit(Some(bucket()), None)
            .build();
        assert_eq!(config.features(), ShapeFeatures::RATE_LIMIT);
        assert!(config.tx_limit().is_some());
        assert!(config.rx_limit().is_none());
        assert!(config.is_rate_limited());
        assert!(!config.is_stat_enabled());
    }

    #[test]
    fn limit_without_bucket() {
        let config = ShapeConfig::builder().with_limit(None, None).build();
        assert!(config.features().contains(ShapeFeatures::RATE_LIMIT));
        assert!(!config.is_rate_limited());
    }

    #[tokio::test]
    async fn stat_only() {
        let stat = ConnStat::spawn();
        let config = ShapeConfig::builder().with_stat(Some(stat.clone())).build();
        assert_eq!(config.features(), ShapeFeatures::STAT);
        assert!(!config.is_rate_limited());
        assert!(Arc::ptr_eq(config.stat().unwrap(), &stat));
        stat.close();
    }

    #[test]
    fn null_stat() {
        let config = ShapeConfig::builder().with_stat(None).build();
        assert!(config.features().is_empty());
        assert!(!config.is_stat_enabled());
    }

    #[tokio::test]
    async fn last_write_wins() {
        let tx1 = bucket();
        let tx2 = bucket();
        let stat1 = ConnStat::spawn();
        let stat2 = ConnStat::spawn();

        let config = ShapeConfig::from_options([
            ShapeOption::Limit {
                tx: Some(tx1),
                rx: Some(bucket()),
            },
            ShapeOption::Stat(Some(stat1.clone())),
            ShapeOption::Limit {
                tx: Some(tx2.clone()),
                rx: None,
            },
            ShapeOption::Stat(Some(stat2.clone())),
            ShapeOption::Stat(None),
        ]);

        assert_eq!(
            config.features(),
            ShapeFeatures::RATE_LIMIT | ShapeFeatures::STAT
        );
        assert!(Arc::ptr_eq(config.tx_limit().unwrap(), &tx2));
        assert!(config.rx_limit().is_none());
        assert!(Arc::ptr_eq(config.stat().unwrap(), &stat2));

        stat1.close();
        stat2.close();
    }
}
