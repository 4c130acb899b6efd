// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte channels that carry Modbus frames.

use std::{fmt, io, time::Duration};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

use crate::{bytes::BytesMut, error::TransportError};

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

/// The framing used on top of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Serial line framing: slave address, PDU, CRC-16.
    Rtu,
    /// MBAP framing: transaction id, protocol id, length, unit id, PDU.
    Tcp,
}

/// A byte channel between a master and a slave.
///
/// Implementations only move bytes; framing, validation and timeouts
/// between frames are handled by the session on top.
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// The framing expected on this channel.
    fn backend(&self) -> Backend;

    /// Establish the channel.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Release the channel. Closing a closed channel does nothing.
    async fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Discard all bytes that are pending in the receive direction.
    ///
    /// Returns the number of discarded bytes if the backend can tell.
    async fn flush(&mut self) -> Result<usize, TransportError>;

    /// Write a complete frame.
    async fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError>;

    /// Append at least one byte to `buf`, waiting no longer than `timeout`.
    async fn receive(
        &mut self,
        buf: &mut BytesMut,
        timeout: Duration,
    ) -> Result<usize, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn backend(&self) -> Backend {
        (**self).backend()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect().await
    }

    async fn close(&mut self) {
        (**self).close().await;
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn flush(&mut self) -> Result<usize, TransportError> {
        (**self).flush().await
    }

    async fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        (**self).send(frame).await
    }

    async fn receive(
        &mut self,
        buf: &mut BytesMut,
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).receive(buf, timeout).await
    }
}

/// Write `frame` to `stream` and flush it.
///
/// Helper for implementing [`Transport::send`] on top of any async stream.
pub async fn write_frame<S>(stream: &mut S, frame: &[u8]) -> Result<usize, TransportError>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    stream
        .write_all(frame)
        .await
        .map_err(TransportError::io("send"))?;
    stream.flush().await.map_err(TransportError::io("send"))?;
    Ok(frame.len())
}

/// Read whatever `stream` delivers within `timeout` into `buf`.
///
/// Helper for implementing [`Transport::receive`] on top of any async
/// stream. A stream that has been closed by the peer is reported as an
/// I/O error.
pub async fn read_some<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    timeout: Duration,
) -> Result<usize, TransportError>
where
    S: AsyncRead + Unpin + ?Sized,
{
    match tokio::time::timeout(timeout, stream.read_buf(buf)).await {
        Err(_elapsed) => Err(TransportError::Timeout(timeout)),
        Ok(Ok(0)) => Err(TransportError::Io {
            context: "receive",
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer"),
        }),
        Ok(Ok(n)) => Ok(n),
        Ok(Err(err)) => Err(TransportError::io("receive")(err)),
    }
}
