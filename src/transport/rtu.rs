// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line transport

use std::{io, time::Duration};

use async_trait::async_trait;
use tokio_serial::{ClearBuffer, SerialPort as _, SerialStream};

pub use tokio_serial::{DataBits, Parity, StopBits};

use super::{read_some, write_frame, Backend, Transport};
use crate::{bytes::BytesMut, error::TransportError, Error, Result};

/// Electrical interface of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialMode {
    #[default]
    Rs232,
    Rs485,
}

/// Level of the RTS line while a frame is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rts {
    /// RTS is not touched.
    #[default]
    None,
    /// RTS is raised while sending.
    Up,
    /// RTS is lowered while sending.
    Down,
}

/// A Modbus RTU serial line.
#[derive(Debug)]
pub struct RtuTransport {
    path: String,
    baud_rate: u32,
    parity: Parity,
    data_bits: DataBits,
    stop_bits: StopBits,
    serial_mode: SerialMode,
    rts: Rts,
    rts_delay: Duration,
    port: Option<SerialStream>,
}

impl RtuTransport {
    /// Configure a serial line that is opened by [`Transport::connect`].
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        baud_rate: u32,
        parity: Parity,
        data_bits: DataBits,
        stop_bits: StopBits,
    ) -> Self {
        let mut transport = Self {
            path: path.into(),
            baud_rate,
            parity,
            data_bits,
            stop_bits,
            serial_mode: SerialMode::default(),
            rts: Rts::default(),
            rts_delay: Duration::ZERO,
            port: None,
        };
        transport.rts_delay = transport.char_time();
        transport
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    #[must_use]
    pub const fn serial_mode(&self) -> SerialMode {
        self.serial_mode
    }

    /// Only affects the handling of RTS, the line driver itself is
    /// configured by the operating system.
    pub fn set_serial_mode(&mut self, mode: SerialMode) {
        self.serial_mode = mode;
    }

    #[must_use]
    pub const fn rts(&self) -> Rts {
        self.rts
    }

    /// # Errors
    ///
    /// RTS can only be controlled in RS-485 mode.
    pub fn set_rts(&mut self, rts: Rts) -> Result<()> {
        if self.serial_mode != SerialMode::Rs485 {
            return Err(Error::InvalidArgument(
                "RTS can only be controlled in RS-485 mode".to_owned(),
            ));
        }
        self.rts = rts;
        Ok(())
    }

    #[must_use]
    pub const fn rts_delay(&self) -> Duration {
        self.rts_delay
    }

    /// # Errors
    ///
    /// RTS can only be controlled in RS-485 mode.
    pub fn set_rts_delay(&mut self, delay: Duration) -> Result<()> {
        if self.serial_mode != SerialMode::Rs485 {
            return Err(Error::InvalidArgument(
                "RTS delay can only be set in RS-485 mode".to_owned(),
            ));
        }
        self.rts_delay = delay;
        Ok(())
    }

    /// Time needed to transmit a single character at the configured speed.
    #[must_use]
    pub fn char_time(&self) -> Duration {
        let data_bits = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity_bits = match self.parity {
            Parity::None => 0,
            Parity::Odd | Parity::Even => 1,
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        let bits_per_char = 1 + data_bits + parity_bits + stop_bits;
        Duration::from_micros(1_000_000 * bits_per_char / u64::from(self.baud_rate.max(1)))
    }

    fn rts_enabled(&self) -> bool {
        self.serial_mode == SerialMode::Rs485 && self.rts != Rts::None
    }
}

fn serial_error(context: &'static str) -> impl FnOnce(tokio_serial::Error) -> TransportError {
    move |err| TransportError::Io {
        context,
        source: io::Error::from(err),
    }
}

#[async_trait]
impl Transport for RtuTransport {
    fn backend(&self) -> Backend {
        Backend::Rtu
    }

    async fn connect(&mut self) -> std::result::Result<(), TransportError> {
        self.port = None;
        log::debug!(
            "Opening {} at {} baud ({:?}, {:?}, {:?})",
            self.path,
            self.baud_rate,
            self.parity,
            self.data_bits,
            self.stop_bits
        );
        let builder = tokio_serial::new(&self.path, self.baud_rate)
            .parity(self.parity)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits);
        let mut port = SerialStream::open(&builder).map_err(serial_error("open"))?;
        if self.rts_enabled() {
            port.write_request_to_send(self.rts == Rts::Down)
                .map_err(serial_error("set RTS"))?;
        }
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("Closed {}", self.path);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn flush(&mut self) -> std::result::Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        let pending = port.bytes_to_read().map_err(serial_error("flush"))?;
        port.clear(ClearBuffer::Input)
            .map_err(serial_error("flush"))?;
        Ok(usize::try_from(pending).unwrap_or(usize::MAX))
    }

    async fn send(&mut self, frame: &[u8]) -> std::result::Result<usize, TransportError> {
        let rts_enabled = self.rts_enabled();
        let rts_up = self.rts == Rts::Up;
        let rts_delay = self.rts_delay;
        let char_time = self.char_time();
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        if !rts_enabled {
            return write_frame(port, frame).await;
        }
        port.write_request_to_send(rts_up)
            .map_err(serial_error("set RTS"))?;
        tokio::time::sleep(rts_delay).await;
        let res = write_frame(port, frame).await;
        // Keep RTS until the last character has left the line.
        let frame_chars = u32::try_from(frame.len()).unwrap_or(u32::MAX);
        tokio::time::sleep(char_time.saturating_mul(frame_chars) + rts_delay).await;
        port.write_request_to_send(!rts_up)
            .map_err(serial_error("reset RTS"))?;
        res
    }

    async fn receive(
        &mut self,
        buf: &mut BytesMut,
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        read_some(port, buf, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> RtuTransport {
        RtuTransport::new(
            "/dev/ttyUSB0",
            19200,
            Parity::Even,
            DataBits::Eight,
            StopBits::One,
        )
    }

    #[test]
    fn character_time() {
        // 11 bits at 19200 baud
        assert_eq!(transport().char_time(), Duration::from_micros(572));
        assert_eq!(transport().rts_delay(), Duration::from_micros(572));
    }

    #[test]
    fn rts_requires_rs485() {
        let mut transport = transport();
        assert_eq!(transport.serial_mode(), SerialMode::Rs232);
        assert!(transport.set_rts(Rts::Up).is_err());
        assert!(transport.set_rts_delay(Duration::ZERO).is_err());
        assert_eq!(transport.rts(), Rts::None);

        transport.set_serial_mode(SerialMode::Rs485);
        transport.set_rts(Rts::Down).unwrap();
        transport.set_rts_delay(Duration::from_micros(100)).unwrap();
        assert_eq!(transport.rts(), Rts::Down);
        assert_eq!(transport.rts_delay(), Duration::from_micros(100));
    }

    #[tokio::test]
    async fn operations_require_an_open_port() {
        let mut transport = transport();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.flush().await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.send(&[0x01]).await,
            Err(TransportError::NotConnected)
        ));
    }
}
