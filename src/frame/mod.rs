// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Requests, responses and exceptions exchanged between the sessions.

pub(crate) mod rtu;
pub(crate) mod tcp;

use std::{borrow::Cow, fmt};

use thiserror::Error;

use crate::{bytes::Bytes, slave::SlaveId};

/// Coils or discrete inputs per read request (0x01, 0x02).
pub const MAX_READ_BITS: Quantity = 2000;

/// Coils per write request (0x0F).
pub const MAX_WRITE_BITS: Quantity = 1968;

/// Registers per read request (0x03, 0x04).
pub const MAX_READ_REGISTERS: Quantity = 125;

/// Registers per write request (0x10).
pub const MAX_WRITE_REGISTERS: Quantity = 123;

/// Registers written by a write-and-read request (0x17).
pub const MAX_WR_WRITE_REGISTERS: Quantity = 121;

/// Registers read back by a write-and-read request (0x17).
pub const MAX_WR_READ_REGISTERS: Quantity = 125;

/// Zero-based protocol address.
///
/// Device documentation often counts registers from 1, in which case 1 has
/// to be subtracted to obtain the address on the wire.
pub type Address = u16;

/// A single bit: `true` is sent as `0xFF00`, `false` as `0x0000`.
pub type Coil = bool;

/// A 16-bit register, big-endian on the wire.
pub type Word = u16;

/// Number of coils or registers.
pub type Quantity = u16;

/// The function code in the first byte of every PDU.
///
/// Only the functions served by [`SlaveSession`](crate::SlaveSession) have
/// their own variant. Everything else travels as [`FunctionCode::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
    /// Report slave id (0x11).
    ReportServerId,
    /// Write, then read holding registers in one transaction (0x17).
    ReadWriteMultipleRegisters,
    Custom(u8),
}

/// Wire value and variant of every function with a variant of its own.
const KNOWN_FUNCTIONS: [(u8, FunctionCode); 10] = [
    (0x01, FunctionCode::ReadCoils),
    (0x02, FunctionCode::ReadDiscreteInputs),
    (0x03, FunctionCode::ReadHoldingRegisters),
    (0x04, FunctionCode::ReadInputRegisters),
    (0x05, FunctionCode::WriteSingleCoil),
    (0x06, FunctionCode::WriteSingleRegister),
    (0x0F, FunctionCode::WriteMultipleCoils),
    (0x10, FunctionCode::WriteMultipleRegisters),
    (0x11, FunctionCode::ReportServerId),
    (0x17, FunctionCode::ReadWriteMultipleRegisters),
];

impl FunctionCode {
    /// The variant for `value`, [`FunctionCode::Custom`] if it has none.
    #[must_use]
    pub fn new(value: u8) -> Self {
        KNOWN_FUNCTIONS
            .iter()
            .find(|(code, _)| *code == value)
            .map_or(Self::Custom(value), |(_, function)| *function)
    }

    /// The byte sent on the wire.
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            Self::Custom(code) => code,
            known => KNOWN_FUNCTIONS
                .iter()
                .find(|(_, function)| *function == known)
                .map_or(0, |(code, _)| *code),
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.value())
    }
}

/// A request sent by a [`MasterSession`](crate::MasterSession).
///
/// The typed master operations build these internally; a
/// [`SlaveSession`](crate::SlaveSession) hands them out from
/// [`receive`](crate::SlaveSession::receive) until they are answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// Start address and number of coils.
    ReadCoils(Address, Quantity),

    /// Start address and number of discrete inputs.
    ReadDiscreteInputs(Address, Quantity),

    WriteSingleCoil(Address, Coil),

    /// Start address and the coils to write.
    WriteMultipleCoils(Address, Cow<'a, [Coil]>),

    /// Start address and number of input registers.
    ReadInputRegisters(Address, Quantity),

    /// Start address and number of holding registers.
    ReadHoldingRegisters(Address, Quantity),

    WriteSingleRegister(Address, Word),

    /// Start address and the registers to write.
    WriteMultipleRegisters(Address, Cow<'a, [Word]>),

    ReportServerId,

    /// Read address, read quantity, write address and the registers to
    /// write. The write is executed first, so an overlapping read returns
    /// the new values.
    ReadWriteMultipleRegisters(Address, Quantity, Address, Cow<'a, [Word]>),

    /// Any other function code with its undecoded payload.
    ///
    /// A slave also presents requests in this shape that carry illegal
    /// values and are answered with
    /// [`ExceptionCode::IllegalDataValue`].
    Custom(u8, Cow<'a, [u8]>),
}

impl Request<'_> {
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(..) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(..) => FunctionCode::ReadDiscreteInputs,
            Self::WriteSingleCoil(..) => FunctionCode::WriteSingleCoil,
            Self::WriteMultipleCoils(..) => FunctionCode::WriteMultipleCoils,
            Self::ReadInputRegisters(..) => FunctionCode::ReadInputRegisters,
            Self::ReadHoldingRegisters(..) => FunctionCode::ReadHoldingRegisters,
            Self::WriteSingleRegister(..) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleRegisters(..) => FunctionCode::WriteMultipleRegisters,
            Self::ReportServerId => FunctionCode::ReportServerId,
            Self::ReadWriteMultipleRegisters(..) => FunctionCode::ReadWriteMultipleRegisters,
            Self::Custom(code, _) => FunctionCode::new(*code),
        }
    }
}

/// A regular (non-exception) answer of a slave.
///
/// Bit reads carry whole bytes worth of bits as they were received;
/// [`MasterSession`](crate::MasterSession) truncates them to the requested
/// quantity. Writes echo the address together with the value or the
/// number of items written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<Coil>),
    ReadDiscreteInputs(Vec<Coil>),
    WriteSingleCoil(Address, Coil),
    WriteMultipleCoils(Address, Quantity),
    ReadInputRegisters(Vec<Word>),
    ReadHoldingRegisters(Vec<Word>),
    WriteSingleRegister(Address, Word),
    WriteMultipleRegisters(Address, Quantity),

    /// Slave id, run indicator and additional device data.
    ReportServerId(u8, bool, Vec<u8>),

    /// The registers read after the write.
    ReadWriteMultipleRegisters(Vec<Word>),

    /// Function code and the payload following it.
    Custom(u8, Bytes),
}

impl Response {
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::WriteSingleCoil(..) => FunctionCode::WriteSingleCoil,
            Self::WriteMultipleCoils(..) => FunctionCode::WriteMultipleCoils,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::WriteSingleRegister(..) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleRegisters(..) => FunctionCode::WriteMultipleRegisters,
            Self::ReportServerId(..) => FunctionCode::ReportServerId,
            Self::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
            Self::Custom(code, _) => FunctionCode::new(*code),
        }
    }
}

/// Reason reported by a slave in an exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExceptionCode {
    #[error("Illegal function")]
    IllegalFunction,
    #[error("Illegal data address")]
    IllegalDataAddress,
    #[error("Illegal data value")]
    IllegalDataValue,
    #[error("Server device failure")]
    ServerDeviceFailure,
    #[error("Acknowledge")]
    Acknowledge,
    #[error("Server device busy")]
    ServerDeviceBusy,
    #[error("Memory parity error")]
    MemoryParityError,
    #[error("Gateway path unavailable")]
    GatewayPathUnavailable,
    #[error("Gateway target device failed to respond")]
    GatewayTargetDevice,
    /// A code without a variant of its own. [`ExceptionCode::new`] never
    /// produces it for the codes above.
    #[error("Exception 0x{0:02X}")]
    Custom(u8),
}

impl ExceptionCode {
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDevice,
            code => Self::Custom(code),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(code: ExceptionCode) -> Self {
        match code {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetDevice => 0x0B,
            ExceptionCode::Custom(code) => code,
        }
    }
}

/// An exception response: the failed function and the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Modbus function {function}: {exception}")]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: ExceptionCode,
}

/// The header of an application data unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Header {
    Rtu(rtu::Header),
    Tcp(tcp::Header),
}

impl Header {
    pub(crate) const fn slave(&self) -> SlaveId {
        match self {
            Self::Rtu(hdr) => hdr.slave,
            Self::Tcp(hdr) => hdr.unit_id,
        }
    }
}

/// A complete frame as it travels over the wire, with an undecoded PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawAdu {
    pub(crate) hdr: Header,
    pub(crate) pdu: Bytes,
}

/// A response belongs to a request if both carry the same header.
pub(crate) fn verify_response_header<H: Eq + fmt::Debug>(
    req_hdr: &H,
    rsp_hdr: &H,
) -> Result<(), String> {
    if req_hdr != rsp_hdr {
        return Err(format!("request = {req_hdr:?}, response = {rsp_hdr:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_function_codes_stay_custom() {
        for value in 0..=u8::MAX {
            let function = FunctionCode::new(value);
            assert_eq!(function.value(), value);
            let known = KNOWN_FUNCTIONS.iter().any(|(code, _)| *code == value);
            assert_eq!(!known, function == FunctionCode::Custom(value));
        }
        // Served by no session
        assert_eq!(FunctionCode::new(0x16), FunctionCode::Custom(0x16));
    }

    #[test]
    fn custom_request_with_a_known_code() {
        assert_eq!(
            Request::Custom(0x03, Cow::Borrowed(&[])).function_code(),
            FunctionCode::ReadHoldingRegisters
        );
        assert_eq!(
            Response::Custom(0x2B, Bytes::new()).function_code(),
            FunctionCode::Custom(0x2B)
        );
    }

    #[test]
    fn exception_codes_keep_their_value() {
        for value in 0..=u8::MAX {
            assert_eq!(u8::from(ExceptionCode::new(value)), value);
        }
        assert_eq!(ExceptionCode::new(0x07), ExceptionCode::Custom(0x07));
    }

    #[test]
    fn display_exception_response() {
        let rsp = ExceptionResponse {
            function: FunctionCode::ReadHoldingRegisters,
            exception: ExceptionCode::IllegalDataAddress,
        };
        assert_eq!(rsp.to_string(), "Modbus function 0x03: Illegal data address");

        let rsp = ExceptionResponse {
            function: FunctionCode::Custom(0x41),
            exception: ExceptionCode::Custom(0x20),
        };
        assert_eq!(rsp.to_string(), "Modbus function 0x41: Exception 0x20");
    }

    #[test]
    fn mismatching_headers_are_described() {
        assert!(verify_response_header(&1, &1).is_ok());
        assert_eq!(
            verify_response_header(&1, &2).unwrap_err(),
            "request = 1, response = 2"
        );
    }
}
