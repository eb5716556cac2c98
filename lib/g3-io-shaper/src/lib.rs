/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod bucket;
mod config;
mod datagram;
mod error;
mod shape;
mod stat;
mod stream;

pub use bucket::{
    ArcTokenBucket, AtomicTokenBucket, TokenAcquireAction, TokenBucket, TokenBucketConfig,
};
pub use config::ShaperConfig;
pub use datagram::{AsyncDatagramRecv, AsyncDatagramSend, ShapedDatagram};
pub use error::ThrottleError;
pub use shape::{ShapeConfig, ShapeConfigBuilder, ShapeFeatures, ShapeOption};
pub use stat::{BandwidthSnapshot, ConnStat, DEFAULT_STAT_INTERVAL};
pub use stream::ShapedStream;

pub mod yaml;
