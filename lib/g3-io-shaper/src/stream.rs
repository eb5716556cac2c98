/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, IoSlice};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::ShapeConfig;
use crate::shape::ShapeState;

pin_project! {
    /// A stream connection with rate limiting and traffic accounting.
    ///
    /// Every method other than read, write and shutdown is passed to the inner stream.
    pub struct ShapedStream<S> {
        #[pin]
        inner: S,
        state: ShapeState,
    }
}

impl<S> ShapedStream<S> {
    pub fn new(inner: S, config: ShapeConfig) -> Self {
        ShapedStream {
            inner,
            state: ShapeState::new(config),
        }
    }

    pub fn config(&self) -> &ShapeConfig {
        self.state.config()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> AsyncRead for ShapedStream<S>
where
    S: AsyncRead,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        ready!(this.state.poll_rx_ready(cx))?;

        let old_filled_len = buf.filled().len();
        ready!(this.inner.poll_read(cx, buf))?;
        let nr = buf.filled().len() - old_filled_len;
        this.state.record_read(nr);
        Poll::Ready(Ok(()))
    }
}

impl<S> AsyncWrite for ShapedStream<S>
where
    S: AsyncWrite,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        ready!(this.state.poll_tx_ready(cx, buf.len()))?;

        let nw = ready!(this.inner.poll_write(cx, buf))?;
        this.state.record_write(nw);
        Poll::Ready(Ok(nw))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        ready!(this.state.poll_tx_ready(cx, total))?;

        let nw = ready!(this.inner.poll_write_vectored(cx, bufs))?;
        this.state.record_write(nw);
        Poll::Ready(Ok(nw))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
