/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::future::poll_fn;
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;

use crate::ShapeConfig;
use crate::shape::ShapeState;

pub trait AsyncDatagramRecv {
    fn poll_recv_from(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<(usize, SocketAddr)>>;

    fn poll_recv(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>>;
}

pub trait AsyncDatagramSend {
    fn poll_send_to(
        &mut self,
        cx: &mut Context<'_>,
        buf: &[u8],
        target: SocketAddr,
    ) -> Poll<io::Result<usize>>;

    fn poll_send(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>>;
}

fn udp_poll_recv_from(
    socket: &UdpSocket,
    cx: &mut Context<'_>,
    buf: &mut [u8],
) -> Poll<io::Result<(usize, SocketAddr)>> {
    let mut buf = ReadBuf::new(buf);
    let addr = ready!(socket.poll_recv_from(cx, &mut buf))?;
    Poll::Ready(Ok((buf.filled().len(), addr)))
}

fn udp_poll_recv(
    socket: &UdpSocket,
    cx: &mut Context<'_>,
    buf: &mut [u8],
) -> Poll<io::Result<usize>> {
    let mut buf = ReadBuf::new(buf);
    ready!(socket.poll_recv(cx, &mut buf))?;
    Poll::Ready(Ok(buf.filled().len()))
}

impl AsyncDatagramRecv for UdpSocket {
    fn poll_recv_from(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<(usize, SocketAddr)>> {
        udp_poll_recv_from(self, cx, buf)
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        udp_poll_recv(self, cx, buf)
    }
}

impl AsyncDatagramRecv for Arc<UdpSocket> {
    fn poll_recv_from(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<(usize, SocketAddr)>> {
        udp_poll_recv_from(self, cx, buf)
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        udp_poll_recv(self, cx, buf)
    }
}

impl AsyncDatagramSend for UdpSocket {
    fn poll_send_to(
        &mut self,
        cx: &mut Context<'_>,
        buf: &[u8],
        target: SocketAddr,
    ) -> Poll<io::Result<usize>> {
        UdpSocket::poll_send_to(self, cx, buf, target)
    }

    fn poll_send(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        UdpSocket::poll_send(self, cx, buf)
    }
}

impl AsyncDatagramSend for Arc<UdpSocket> {
    fn poll_send_to(
        &mut self,
        cx: &mut Context<'_>,
        buf: &[u8],
        target: SocketAddr,
    ) -> Poll<io::Result<usize>> {
        UdpSocket::poll_send_to(self, cx, buf, target)
    }

    fn poll_send(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        UdpSocket::poll_send(self, cx, buf)
    }
}

/// A datagram socket with rate limiting and traffic accounting.
///
/// All peers share the same budgets and counters, the peer address is passed
/// through as is.
pub struct ShapedDatagram<T> {
    inner: T,
    state: ShapeState,
}

impl<T> ShapedDatagram<T> {
    pub fn new(inner: T, config: ShapeConfig) -> Self {
        ShapedDatagram {
            inner,
            state: ShapeState::new(config),
        }
    }

    pub fn config(&self) -> &ShapeConfig {
        self.state.config()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncDatagramRecv> ShapedDatagram<T> {
    pub async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        poll_fn(|cx| self.poll_recv_from(cx, buf)).await
    }

    pub async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        poll_fn(|cx| self.poll_recv(cx, buf)).await
    }
}

impl<T: AsyncDatagramSend> ShapedDatagram<T> {
    pub async fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        poll_fn(|cx| self.poll_send_to(cx, buf, target)).await
    }

    pub async fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        poll_fn(|cx| self.poll_send(cx, buf)).await
    }
}

impl<T: AsyncDatagramRecv> AsyncDatagramRecv for ShapedDatagram<T> {
    fn poll_recv_from(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<(usize, SocketAddr)>> {
        ready!(self.state.poll_rx_ready(cx))?;
        let (nr, addr) = ready!(self.inner.poll_recv_from(cx, buf))?;
        self.state.record_read(nr);
        Poll::Ready(Ok((nr, addr)))
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        ready!(self.state.poll_rx_ready(cx))?;
        let nr = ready!(self.inner.poll_recv(cx, buf))?;
        self.state.record_read(nr);
        Poll::Ready(Ok(nr))
    }
}

impl<T: AsyncDatagramSend> AsyncDatagramSend for ShapedDatagram<T> {
    fn poll_send_to(
        &mut self,
        cx: &mut Context<'_>,
        buf: &[u8],
        target: SocketAddr,
    ) -> Poll<io::Result<usize>> {
        ready!(self.state.poll_tx_ready(cx, buf.len()))?;
        let nw = ready!(self.inner.poll_send_to(cx, buf, target))?;
        self.state.record_write(nw);
        Poll::Ready(Ok(nw))
    }

    fn poll_send(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        ready!(self.state.poll_tx_ready(cx, buf.len()))?;
        let nw = ready!(self.inner.poll_send(cx, buf))?;
        self.state.record_write(nw);
        Poll::Ready(Ok(nw))
    }
}
