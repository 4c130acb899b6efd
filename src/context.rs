// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport handle shared by master and slave sessions.

use std::{fmt::Write as _, time::Duration};

use tokio::time::Instant;
use tokio_util::codec::{Decoder as _, Encoder as _};

use crate::{
    bytes::BytesMut,
    codec::{AduCodec, FrameKind},
    error::{Error, ProtocolError, TransportError},
    frame::{rtu, tcp, Header, RawAdu},
    recovery::ErrorRecoveryMode,
    slave::{Slave, SlaveId},
    transport::{Backend, Transport},
    Result,
};

/// Time to wait for the first byte of a frame.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Time to wait between two bytes of the same frame.
pub const DEFAULT_BYTE_TIMEOUT: Duration = Duration::from_millis(500);

const MICROS_PER_SEC: u32 = 1_000_000;

/// A transport together with the addressing, timing and recovery
/// settings of one Modbus channel.
#[derive(Debug)]
pub struct Context<T> {
    transport: T,
    read_buf: BytesMut,
    slave: Option<Slave>,
    transaction_id: tcp::TransactionId,
    response_timeout: Duration,
    byte_timeout: Option<Duration>,
    error_recovery: ErrorRecoveryMode,
    debug: bool,
}

fn timeout_from_parts(sec: u32, usec: u32) -> Result<Duration> {
    if usec >= MICROS_PER_SEC {
        return Err(Error::InvalidArgument(format!(
            "microseconds out of range: {usec}"
        )));
    }
    Ok(Duration::new(sec.into(), usec * 1_000))
}

fn timeout_into_parts(timeout: Duration) -> (u32, u32) {
    (
        u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX),
        timeout.subsec_micros(),
    )
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut dump = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            dump.push(' ');
        }
        let _ = write!(dump, "{byte:02X}");
    }
    dump
}

impl<T: Transport> Context<T> {
    /// Create a handle for `transport` with default settings.
    ///
    /// TCP handles address the unit identifier 255 until [`Self::set_slave`]
    /// is called. RTU handles have no slave assigned.
    pub fn new(transport: T) -> Self {
        let slave = match transport.backend() {
            Backend::Rtu => None,
            Backend::Tcp => Some(Slave::tcp_device()),
        };
        Self {
            transport,
            read_buf: BytesMut::new(),
            slave,
            transaction_id: 0,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            byte_timeout: Some(DEFAULT_BYTE_TIMEOUT),
            error_recovery: ErrorRecoveryMode::NONE,
            debug: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn backend(&self) -> Backend {
        self.transport.backend()
    }

    /// Length of the ADU header: 1 for RTU, 7 for TCP.
    pub fn header_length(&self) -> usize {
        match self.backend() {
            Backend::Rtu => rtu::HEADER_LEN,
            Backend::Tcp => tcp::HEADER_LEN,
        }
    }

    pub fn slave(&self) -> Option<Slave> {
        self.slave
    }

    /// Select the slave that is addressed by the master or that is
    /// served by the slave.
    ///
    /// # Errors
    ///
    /// RTU accepts the broadcast address and single devices (0 to 247),
    /// TCP additionally accepts 255.
    pub fn set_slave(&mut self, slave: Slave) -> Result<()> {
        let valid = match self.backend() {
            Backend::Rtu => !slave.is_reserved(),
            Backend::Tcp => !slave.is_reserved() || slave == Slave::tcp_device(),
        };
        if !valid {
            return Err(Error::InvalidArgument(format!(
                "invalid slave {slave} for {:?}",
                self.backend()
            )));
        }
        self.slave = Some(slave);
        Ok(())
    }

    pub(crate) fn required_slave(&self) -> Result<Slave> {
        self.slave
            .ok_or_else(|| Error::InvalidArgument("no slave selected".to_owned()))
    }

    /// Response timeout as `(seconds, microseconds)`.
    pub fn response_timeout(&self) -> (u32, u32) {
        timeout_into_parts(self.response_timeout)
    }

    /// # Errors
    ///
    /// Fails if `usec` is not below 1 000 000 or the timeout is zero.
    pub fn set_response_timeout(&mut self, sec: u32, usec: u32) -> Result<()> {
        let timeout = timeout_from_parts(sec, usec)?;
        if timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "response timeout must not be zero".to_owned(),
            ));
        }
        self.response_timeout = timeout;
        Ok(())
    }

    /// Byte timeout as `(seconds, microseconds)`, `(0, 0)` if disabled.
    pub fn byte_timeout(&self) -> (u32, u32) {
        self.byte_timeout.map_or((0, 0), timeout_into_parts)
    }

    /// Silence allowed between the bytes of a frame that has started.
    ///
    /// While enabled, the response timeout only bounds the wait for the
    /// first byte. A peer that keeps trickling bytes within the byte timeout
    /// can stretch a single frame up to its maximum length times the byte
    /// timeout. A zero timeout disables the inter-byte timeout: the
    /// response timeout then bounds the whole frame.
    ///
    /// # Errors
    ///
    /// Fails if `usec` is not below 1 000 000.
    pub fn set_byte_timeout(&mut self, sec: u32, usec: u32) -> Result<()> {
        let timeout = timeout_from_parts(sec, usec)?;
        self.byte_timeout = (!timeout.is_zero()).then_some(timeout);
        Ok(())
    }

    pub fn error_recovery(&self) -> ErrorRecoveryMode {
        self.error_recovery
    }

    pub fn set_error_recovery(&mut self, mode: ErrorRecoveryMode) {
        self.error_recovery = mode;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Log every frame that is sent or received at debug level.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Establish the channel, bounded by the response timeout.
    ///
    /// # Errors
    ///
    /// Fails if the transport cannot be opened in time.
    pub async fn connect(&mut self) -> Result<()> {
        self.read_buf.clear();
        let timeout = self.response_timeout;
        match tokio::time::timeout(timeout, self.transport.connect()).await {
            Ok(res) => res.map_err(Into::into),
            Err(_elapsed) => Err(TransportError::Timeout(timeout).into()),
        }
    }

    pub async fn close(&mut self) {
        self.read_buf.clear();
        self.transport.close().await;
    }

    /// Discard all pending input.
    ///
    /// # Errors
    ///
    /// Fails if the transport cannot be flushed.
    pub async fn flush(&mut self) -> Result<usize> {
        let buffered = self.read_buf.len();
        self.read_buf.clear();
        let discarded = self.transport.flush().await?;
        if self.debug {
            log::debug!("Flushed {} bytes", buffered + discarded);
        }
        Ok(buffered + discarded)
    }

    pub(crate) async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        self.connect().await
    }

    pub(crate) fn deadline(&self) -> Instant {
        Instant::now() + self.response_timeout
    }

    /// Drop input that is still buffered from an earlier exchange.
    pub(crate) fn discard_input(&mut self) {
        if !self.read_buf.is_empty() {
            log::debug!("Discarding {} stale bytes", self.read_buf.len());
            self.read_buf.clear();
        }
    }

    /// Header for the next request to `slave`.
    pub(crate) fn next_header(&mut self, slave: SlaveId) -> Header {
        match self.backend() {
            Backend::Rtu => Header::Rtu(rtu::Header { slave }),
            Backend::Tcp => {
                let transaction_id = self.transaction_id;
                self.transaction_id = self.transaction_id.wrapping_add(1);
                Header::Tcp(tcp::Header {
                    transaction_id,
                    unit_id: slave,
                })
            }
        }
    }

    fn codec(&self, kind: FrameKind) -> AduCodec {
        match self.backend() {
            Backend::Rtu => AduCodec::rtu(kind),
            Backend::Tcp => AduCodec::tcp(),
        }
    }

    /// Frame and send `adu`. Returns the number of bytes written.
    pub(crate) async fn send_adu(&mut self, adu: RawAdu) -> Result<usize> {
        let mut frame = BytesMut::new();
        self.codec(FrameKind::Request)
            .encode(adu, &mut frame)
            .map_err(|err| Error::InvalidArgument(err.to_string()))?;
        if self.debug {
            log::debug!("-> [{}]", hex_dump(&frame));
        }
        Ok(self.transport.send(&frame).await?)
    }

    /// Receive the next complete frame before `deadline`.
    ///
    /// The deadline bounds the wait for the first byte. Once a frame has
    /// started, the byte timeout applies between chunks, if enabled.
    pub(crate) async fn receive_adu(
        &mut self,
        kind: FrameKind,
        deadline: Instant,
    ) -> Result<RawAdu> {
        let mut codec = self.codec(kind);
        loop {
            match codec.decode(&mut self.read_buf) {
                Ok(Some(adu)) => {
                    if self.debug {
                        log::debug!("<- {:?} [{}]", adu.hdr, hex_dump(&adu.pdu));
                    }
                    return Ok(adu);
                }
                Ok(None) => {}
                Err(err) => {
                    if self.debug {
                        log::debug!("<- invalid frame [{}]: {err}", hex_dump(&self.read_buf));
                    }
                    self.read_buf.clear();
                    return Err(ProtocolError::InvalidFrame(err).into());
                }
            }
            let timeout = match self.byte_timeout {
                Some(byte_timeout) if !self.read_buf.is_empty() => byte_timeout,
                _ => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(TransportError::Timeout(self.response_timeout).into());
                    }
                    remaining
                }
            };
            self.transport.receive(&mut self.read_buf, timeout).await?;
        }
    }
}
