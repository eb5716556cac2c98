/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use humanize_rs::ParseError;
use humanize_rs::bytes::Bytes;
use yaml_rust::{Yaml, yaml};

use crate::{ShaperConfig, TokenBucketConfig};

/// Walk a map with normalized keys, lower case and `-` replaced by `_`.
///
/// Errors returned by `f` get the original key attached.
fn foreach_setting<F>(table: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table.iter() {
        let Yaml::String(raw) = k else {
            return Err(anyhow!("setting name should be a string"));
        };
        let key = raw.to_lowercase().replace('-', "_");
        f(&key, v).context(format!("invalid value for setting {raw}"))?;
    }
    Ok(())
}

/// A token amount, as a plain integer or a humanized size like `10M`.
fn as_tokens(v: &Yaml) -> anyhow::Result<u64> {
    match v {
        Yaml::Integer(n) => u64::try_from(*n).map_err(|_| anyhow!("negative token amount {n}")),
        Yaml::String(s) => s
            .parse::<Bytes<u64>>()
            .map(|b| b.size())
            .map_err(|e| anyhow!("invalid token amount {s}: {e}")),
        _ => Err(anyhow!("token amount should be an integer or a string")),
    }
}

/// A sampling interval, in seconds if no unit is given.
fn as_interval(v: &Yaml) -> anyhow::Result<Duration> {
    let secs = match v {
        Yaml::String(s) => match humanize_rs::duration::parse(s) {
            Ok(d) => return Ok(d),
            Err(ParseError::MissingUnit) => s.as_str(),
            Err(e) => return Err(anyhow!("invalid interval {s}: {e}")),
        },
        Yaml::Integer(n) => {
            let n = u64::try_from(*n).map_err(|_| anyhow!("negative interval {n}"))?;
            return Ok(Duration::from_secs(n));
        }
        Yaml::Real(s) => s.as_str(),
        _ => return Err(anyhow!("interval should be a number or a string")),
    };
    let f = f64::from_str(secs).map_err(|e| anyhow!("invalid interval {secs}: {e}"))?;
    Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
}

/// Parse a token bucket, either as a single rate or as a map with `rate` and `max_burst`.
pub fn as_token_bucket_config(v: &Yaml) -> anyhow::Result<TokenBucketConfig> {
    let mut config = match v {
        Yaml::String(_) | Yaml::Integer(_) => TokenBucketConfig::per_second(as_tokens(v)?),
        Yaml::Hash(map) => {
            let mut config = TokenBucketConfig::default();
            foreach_setting(map, |k, v| match k {
                "rate" | "rate_bits" => {
                    config.set_rate(as_tokens(v)?);
                    Ok(())
                }
                "max_burst" | "burst" | "max_burst_bits" => {
                    config.set_max_burst(as_tokens(v)?);
                    Ok(())
                }
                _ => Err(anyhow!("unknown setting")),
            })?;
            config
        }
        _ => return Err(anyhow!("invalid yaml value type")),
    };
    config.check()?;
    Ok(config)
}

pub fn as_shaper_config(v: &Yaml) -> anyhow::Result<ShaperConfig> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!("yaml value type for shaper config should be 'map'"));
    };

    let mut config = ShaperConfig::default();
    foreach_setting(map, |k, v| match k {
        "upload" | "tx" => {
            config.set_upload(as_token_bucket_config(v)?);
            Ok(())
        }
        "download" | "rx" => {
            config.set_download(as_token_bucket_config(v)?);
            Ok(())
        }
        "stat_interval" => {
            config.set_stat_interval(as_interval(v)?);
            Ok(())
        }
        _ => Err(anyhow!("unknown setting")),
    })?;
    config.check()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaml_rust::YamlLoader;

    fn load(s: &str) -> Yaml {
        YamlLoader::load_from_str(s).unwrap().remove(0)
    }

    #[test]
    fn bucket_shorthand() {
        let config = as_token_bucket_config(&Yaml::Integer(8000)).unwrap();
        assert_eq!(config, TokenBucketConfig::per_second(8000));

        let config = as_token_bucket_config(&Yaml::String("10M".to_string())).unwrap();
        assert_eq!(config.rate(), 10_000_000);
        assert_eq!(config.max_burst(), 10_000_000);

        let config = as_token_bucket_config(&Yaml::String("1KiB".to_string())).unwrap();
        assert_eq!(config.rate(), 1024);

        assert!(as_token_bucket_config(&Yaml::Integer(0)).is_err());
        assert!(as_token_bucket_config(&Yaml::Integer(-1)).is_err());
        assert!(as_token_bucket_config(&Yaml::Boolean(true)).is_err());
    }

    #[test]
    fn bucket_map() {
        let v = load("rate: 20M\nmax-burst: 40M");
        let config = as_token_bucket_config(&v).unwrap();
        assert_eq!(config.rate(), 20_000_000);
        assert_eq!(config.max_burst(), 40_000_000);

        let v = load("rate: 1000");
        let config = as_token_bucket_config(&v).unwrap();
        assert_eq!(config.max_burst(), 1000);

        let v = load("max_burst: 1000");
        assert!(as_token_bucket_config(&v).is_err());

        let v = load("rate: 1000\nshift: 10");
        assert!(as_token_bucket_config(&v).is_err());
    }

    #[test]
    fn shaper() {
        let v = load(
            "upload: 10M\n\
             download:\n  rate: 20M\n  max_burst: 40M\n\
             stat_interval: 500ms\n",
        );
        let config = as_shaper_config(&v).unwrap();
        assert_eq!(
            config.upload(),
            Some(TokenBucketConfig::per_second(10_000_000))
        );
        let download = config.download().unwrap();
        assert_eq!(download.rate(), 20_000_000);
        assert_eq!(download.max_burst(), 40_000_000);
        assert_eq!(config.stat_interval(), Some(Duration::from_millis(500)));

        let v = load("Stat-Interval: 2");
        let config = as_shaper_config(&v).unwrap();
        assert_eq!(config.stat_interval(), Some(Duration::from_secs(2)));
        assert!(config.upload().is_none());
        assert!(config.download().is_none());
    }

    #[test]
    fn shaper_err() {
        assert!(as_shaper_config(&Yaml::Integer(1)).is_err());
        assert!(as_shaper_config(&load("upload: 0")).is_err());
        assert!(as_shaper_config(&load("stat_interval: 0")).is_err());
        assert!(as_shaper_config(&load("stat_interval: 1x")).is_err());
        assert!(as_shaper_config(&load("unknown: 1")).is_err());
        assert!(as_shaper_config(&load("1: 1")).is_err());
        assert!(as_shaper_config(&load("stat_interval: -1")).is_err());
    }

    #[test]
    fn interval_forms() {
        assert_eq!(
            as_interval(&Yaml::String("1m30s".to_string())).unwrap(),
            Duration::from_secs(90)
        );
        assert_eq!(
            as_interval(&Yaml::String("5".to_string())).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            as_interval(&Yaml::Real("0.5".to_string())).unwrap(),
            Duration::from_millis(500)
        );
        assert!(as_interval(&Yaml::String("abc".to_string())).is_err());
        assert!(as_interval(&Yaml::Boolean(false)).is_err());
    }

    #[test]
    fn error_names_setting() {
        let e = as_shaper_config(&load("Upload: -5")).unwrap_err();
        assert!(format!("{e:#}").contains("Upload"));
    }
}
