/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("throttle wait cancelled")]
    Cancelled,
}

impl From<ThrottleError> for io::Error {
    fn from(e: ThrottleError) -> Self {
        io::Error::other(e)
    }
}

impl ThrottleError {
    /// Find the throttle error carried by an io error returned from a shaped connection.
    pub fn from_io_error(e: &io::Error) -> Option<ThrottleError> {
        e.get_ref()
            .and_then(|inner| inner.downcast_ref::<ThrottleError>())
            .copied()
    }
}
