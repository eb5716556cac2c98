/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenBucketConfig {
    rate: u64,
    max_burst: u64,
}

impl TokenBucketConfig {
    /// `rate` tokens per second, with the burst equal to one second worth of tokens
    pub fn per_second(rate: u64) -> Self {
        TokenBucketConfig {
            rate,
            max_burst: rate,
        }
    }

    #[inline]
    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: u64) {
        self.rate = rate;
    }

    #[inline]
    pub fn max_burst(&self) -> u64 {
        self.max_burst
    }

    pub fn set_max_burst(&mut self, size: u64) {
        self.max_burst = size;
    }

    pub fn check(&mut self) -> anyhow::Result<()> {
        if self.rate == 0 {
            return Err(anyhow!("no token rate set"));
        }
        if self.max_burst == 0 {
            self.max_burst = self.rate;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check() {
        let mut config = TokenBucketConfig::default();
        assert!(config.check().is_err());

        config.set_rate(8000);
        config.check().unwrap();
        assert_eq!(config.max_burst(), 8000);

        config.set_max_burst(100);
        config.check().unwrap();
        assert_eq!(config.max_burst(), 100);
    }
}
