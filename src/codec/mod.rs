// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PDU layouts and ADU framing.
//!
//! [`AduCodec`] only splits the byte stream into frames. PDUs stay
//! undecoded until the session knows whether it expects a request or a
//! response.

use std::io::{self, Cursor, Error, ErrorKind, Read as _};

use byteorder::{BigEndian, ReadBytesExt as _};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    convert::pack_bits,
    frame::{Coil, RawAdu, Word},
    ExceptionCode, ExceptionResponse, FunctionCode, Request, Response,
};

pub(crate) mod rtu;
pub(crate) mod tcp;

/// Maximum request/response PDU size.
///
/// Identical for both RTU and TCP.
pub(crate) const MAX_PDU_SIZE: usize = 253;

/// Which side of an exchange a frame originates from.
///
/// RTU frames carry no length field, so the decoder has to know whether it
/// parses a request or a response to find the end of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Request,
    Response,
}

/// ADU framing for one of the supported backends.
#[derive(Debug)]
pub(crate) enum AduCodec {
    Rtu(rtu::Codec),
    Tcp(tcp::Codec),
}

impl AduCodec {
    pub(crate) fn rtu(kind: FrameKind) -> Self {
        Self::Rtu(rtu::Codec::new(kind))
    }

    pub(crate) fn tcp() -> Self {
        Self::Tcp(tcp::Codec)
    }
}

impl Decoder for AduCodec {
    type Item = RawAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<RawAdu>> {
        match self {
            Self::Rtu(codec) => codec.decode(buf),
            Self::Tcp(codec) => codec.decode(buf),
        }
    }
}

impl Encoder<RawAdu> for AduCodec {
    type Error = Error;

    fn encode(&mut self, adu: RawAdu, buf: &mut BytesMut) -> io::Result<()> {
        match self {
            Self::Rtu(codec) => codec.encode(adu, buf),
            Self::Tcp(codec) => codec.encode(adu, buf),
        }
    }
}

// Length fields saturate. A PDU that needs more is rejected as oversized
// after it has been written.
pub(crate) fn u16_len(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

fn u8_len(len: usize) -> u8 {
    u8::try_from(len).unwrap_or(u8::MAX)
}

fn invalid_data(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidData, message.into())
}

const fn coil_to_u16(coil: Coil) -> u16 {
    if coil {
        0xFF00
    } else {
        0x0000
    }
}

const fn coil_from_u16(value: u16) -> Option<Coil> {
    match value {
        0xFF00 => Some(true),
        0x0000 => Some(false),
        _ => None,
    }
}

const fn packed_len(coil_count: usize) -> usize {
    (coil_count + 7) / 8
}

fn unpack_coils(packed: &[u8], count: usize) -> Vec<Coil> {
    packed.iter().flat_map(|byte| pack_bits(*byte)).take(count).collect()
}

/// Byte count followed by the coils, LSB first.
fn put_coils(buf: &mut BytesMut, coils: &[Coil]) {
    buf.put_u8(u8_len(packed_len(coils.len())));
    for chunk in coils.chunks(8) {
        let byte = chunk
            .iter()
            .rev()
            .fold(0, |byte, coil| (byte << 1) | u8::from(*coil));
        buf.put_u8(byte);
    }
}

/// Byte count followed by the big-endian words.
fn put_words(buf: &mut BytesMut, words: &[Word]) {
    buf.put_u8(u8_len(words.len() * 2));
    for word in words {
        buf.put_u16(*word);
    }
}

fn check_pdu_size(buf: &mut BytesMut, start: usize, what: &str) -> io::Result<()> {
    let len = buf.len() - start;
    if len > MAX_PDU_SIZE {
        buf.truncate(start);
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("{what} PDU of {len} bytes exceeds {MAX_PDU_SIZE} bytes"),
        ));
    }
    Ok(())
}

/// Append the PDU of `request` to `buf`.
///
/// Fails with [`ErrorKind::InvalidInput`] and leaves `buf` untouched if
/// the PDU would exceed [`MAX_PDU_SIZE`].
pub(crate) fn encode_request_pdu(buf: &mut BytesMut, request: &Request<'_>) -> io::Result<()> {
    let start = buf.len();
    buf.put_u8(request.function_code().value());
    match request {
        Request::ReadCoils(addr, cnt)
        | Request::ReadDiscreteInputs(addr, cnt)
        | Request::ReadHoldingRegisters(addr, cnt)
        | Request::ReadInputRegisters(addr, cnt) => {
            buf.put_u16(*addr);
            buf.put_u16(*cnt);
        }
        Request::WriteSingleCoil(addr, coil) => {
            buf.put_u16(*addr);
            buf.put_u16(coil_to_u16(*coil));
        }
        Request::WriteSingleRegister(addr, word) => {
            buf.put_u16(*addr);
            buf.put_u16(*word);
        }
        Request::WriteMultipleCoils(addr, coils) => {
            buf.put_u16(*addr);
            buf.put_u16(u16_len(coils.len()));
            put_coils(buf, coils);
        }
        Request::WriteMultipleRegisters(addr, words) => {
            buf.put_u16(*addr);
            buf.put_u16(u16_len(words.len()));
            put_words(buf, words);
        }
        Request::ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, words) => {
            buf.put_u16(*read_addr);
            buf.put_u16(*read_cnt);
            buf.put_u16(*write_addr);
            buf.put_u16(u16_len(words.len()));
            put_words(buf, words);
        }
        Request::ReportServerId => {}
        Request::Custom(_, data) => buf.put_slice(data),
    }
    check_pdu_size(buf, start, "request")
}

/// Append the PDU of `response` to `buf`.
///
/// Fails with [`ErrorKind::InvalidInput`] and leaves `buf` untouched if
/// the PDU would exceed [`MAX_PDU_SIZE`].
pub(crate) fn encode_response_pdu(buf: &mut BytesMut, response: &Response) -> io::Result<()> {
    let start = buf.len();
    buf.put_u8(response.function_code().value());
    match response {
        Response::ReadCoils(coils) | Response::ReadDiscreteInputs(coils) => {
            put_coils(buf, coils);
        }
        Response::ReadHoldingRegisters(words)
        | Response::ReadInputRegisters(words)
        | Response::ReadWriteMultipleRegisters(words) => put_words(buf, words),
        Response::WriteSingleCoil(addr, coil) => {
            buf.put_u16(*addr);
            buf.put_u16(coil_to_u16(*coil));
        }
        Response::WriteSingleRegister(addr, value)
        | Response::WriteMultipleCoils(addr, value)
        | Response::WriteMultipleRegisters(addr, value) => {
            buf.put_u16(*addr);
            buf.put_u16(*value);
        }
        Response::ReportServerId(id, running, data) => {
            buf.put_u8(u8_len(2 + data.len()));
            buf.put_u8(*id);
            buf.put_u8(if *running { 0xFF } else { 0x00 });
            buf.put_slice(data);
        }
        Response::Custom(_, data) => buf.put_slice(data),
    }
    check_pdu_size(buf, start, "response")
}

fn encode_exception_pdu(buf: &mut BytesMut, rsp: ExceptionResponse) {
    buf.put_u8(rsp.function.value() | 0x80);
    buf.put_u8(rsp.exception.into());
}

pub(crate) fn encode_response_result_pdu(
    buf: &mut BytesMut,
    res: &Result<Response, ExceptionResponse>,
) -> io::Result<()> {
    match res {
        Ok(rsp) => encode_response_pdu(buf, rsp),
        Err(rsp) => {
            encode_exception_pdu(buf, *rsp);
            Ok(())
        }
    }
}

/// Sequential big-endian reads over a single PDU.
struct PduReader {
    rdr: Cursor<Bytes>,
}

impl PduReader {
    fn new(pdu: Bytes, what: &str) -> io::Result<Self> {
        if pdu.len() > MAX_PDU_SIZE {
            return Err(invalid_data(format!(
                "{what} PDU of {} bytes exceeds {MAX_PDU_SIZE} bytes",
                pdu.len()
            )));
        }
        Ok(Self {
            rdr: Cursor::new(pdu),
        })
    }

    fn u8(&mut self) -> io::Result<u8> {
        self.rdr.read_u8()
    }

    fn u16(&mut self) -> io::Result<u16> {
        self.rdr.read_u16::<BigEndian>()
    }

    fn words(&mut self, count: usize) -> io::Result<Vec<Word>> {
        (0..count).map(|_| self.u16()).collect()
    }

    fn bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut data = vec![0; len];
        self.rdr.read_exact(&mut data)?;
        Ok(data)
    }

    fn offset(&self) -> usize {
        let len = self.rdr.get_ref().len();
        usize::try_from(self.rdr.position()).map_or(len, |pos| pos.min(len))
    }

    /// All bytes that have not been read yet.
    fn rest(self) -> Bytes {
        let offset = self.offset();
        self.rdr.into_inner().slice(offset..)
    }

    /// Yield `value` if the whole PDU has been consumed.
    fn finish<T>(self, value: T, what: &str) -> io::Result<T> {
        let trailing = self.rdr.get_ref().len() - self.offset();
        if trailing > 0 {
            return Err(invalid_data(format!(
                "{trailing} trailing bytes in {what} PDU"
            )));
        }
        Ok(value)
    }
}

/// Why a request PDU could not be turned into a [`Request`].
#[derive(Debug)]
pub(crate) enum RequestError {
    /// The bytes do not form a request at all.
    Malformed(Error),
    /// The request is complete but carries values the protocol forbids.
    IllegalValue {
        function: FunctionCode,
        reason: String,
    },
}

impl From<Error> for RequestError {
    fn from(err: Error) -> Self {
        Self::Malformed(err)
    }
}

/// Decode a request PDU received by a slave.
pub(crate) fn decode_request_pdu(pdu: Bytes) -> Result<Request<'static>, RequestError> {
    let mut rdr = PduReader::new(pdu, "request")?;
    let function = FunctionCode::new(rdr.u8()?);
    let illegal = |reason: String| RequestError::IllegalValue { function, reason };
    let request = match function {
        FunctionCode::ReadCoils => Request::ReadCoils(rdr.u16()?, rdr.u16()?),
        FunctionCode::ReadDiscreteInputs => Request::ReadDiscreteInputs(rdr.u16()?, rdr.u16()?),
        FunctionCode::ReadHoldingRegisters => Request::ReadHoldingRegisters(rdr.u16()?, rdr.u16()?),
        FunctionCode::ReadInputRegisters => Request::ReadInputRegisters(rdr.u16()?, rdr.u16()?),
        FunctionCode::WriteSingleCoil => {
            let addr = rdr.u16()?;
            let value = rdr.u16()?;
            let coil = coil_from_u16(value)
                .ok_or_else(|| illegal(format!("invalid coil value 0x{value:04X}")))?;
            Request::WriteSingleCoil(addr, coil)
        }
        FunctionCode::WriteSingleRegister => Request::WriteSingleRegister(rdr.u16()?, rdr.u16()?),
        FunctionCode::WriteMultipleCoils => {
            let addr = rdr.u16()?;
            let cnt = usize::from(rdr.u16()?);
            let byte_count = usize::from(rdr.u8()?);
            if byte_count != packed_len(cnt) {
                return Err(illegal(format!("{cnt} coils in {byte_count} bytes")));
            }
            let packed = rdr.bytes(byte_count)?;
            Request::WriteMultipleCoils(addr, unpack_coils(&packed, cnt).into())
        }
        FunctionCode::WriteMultipleRegisters => {
            let addr = rdr.u16()?;
            let cnt = usize::from(rdr.u16()?);
            let byte_count = usize::from(rdr.u8()?);
            if byte_count != cnt * 2 {
                return Err(illegal(format!("{cnt} registers in {byte_count} bytes")));
            }
            Request::WriteMultipleRegisters(addr, rdr.words(cnt)?.into())
        }
        FunctionCode::ReportServerId => Request::ReportServerId,
        FunctionCode::ReadWriteMultipleRegisters => {
            let read_addr = rdr.u16()?;
            let read_cnt = rdr.u16()?;
            let write_addr = rdr.u16()?;
            let write_cnt = usize::from(rdr.u16()?);
            let byte_count = usize::from(rdr.u8()?);
            if byte_count != write_cnt * 2 {
                return Err(illegal(format!(
                    "{write_cnt} registers in {byte_count} bytes"
                )));
            }
            let words = rdr.words(write_cnt)?;
            Request::ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, words.into())
        }
        FunctionCode::Custom(code) if code < 0x80 => {
            return Ok(Request::Custom(code, rdr.rest().to_vec().into()));
        }
        FunctionCode::Custom(code) => {
            return Err(invalid_data(format!("invalid request function code 0x{code:02X}")).into());
        }
    };
    Ok(rdr.finish(request, "request")?)
}

/// Decode the PDU of a regular response.
pub(crate) fn decode_response_pdu(pdu: Bytes) -> io::Result<Response> {
    let mut rdr = PduReader::new(pdu, "response")?;
    let function = FunctionCode::new(rdr.u8()?);
    let response = match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let byte_count = usize::from(rdr.u8()?);
            let packed = rdr.bytes(byte_count)?;
            // The requested quantity is unknown here, so all bits are unpacked.
            let coils = unpack_coils(&packed, byte_count * 8);
            if function == FunctionCode::ReadCoils {
                Response::ReadCoils(coils)
            } else {
                Response::ReadDiscreteInputs(coils)
            }
        }
        FunctionCode::ReadHoldingRegisters
        | FunctionCode::ReadInputRegisters
        | FunctionCode::ReadWriteMultipleRegisters => {
            let byte_count = usize::from(rdr.u8()?);
            if byte_count % 2 != 0 {
                return Err(invalid_data(format!(
                    "odd byte count {byte_count} for registers"
                )));
            }
            let words = rdr.words(byte_count / 2)?;
            match function {
                FunctionCode::ReadHoldingRegisters => Response::ReadHoldingRegisters(words),
                FunctionCode::ReadInputRegisters => Response::ReadInputRegisters(words),
                _ => Response::ReadWriteMultipleRegisters(words),
            }
        }
        FunctionCode::WriteSingleCoil => {
            let addr = rdr.u16()?;
            let value = rdr.u16()?;
            let coil = coil_from_u16(value)
                .ok_or_else(|| invalid_data(format!("invalid coil value 0x{value:04X}")))?;
            Response::WriteSingleCoil(addr, coil)
        }
        FunctionCode::WriteSingleRegister => Response::WriteSingleRegister(rdr.u16()?, rdr.u16()?),
        FunctionCode::WriteMultipleCoils => Response::WriteMultipleCoils(rdr.u16()?, rdr.u16()?),
        FunctionCode::WriteMultipleRegisters => {
            Response::WriteMultipleRegisters(rdr.u16()?, rdr.u16()?)
        }
        FunctionCode::ReportServerId => {
            let byte_count = usize::from(rdr.u8()?);
            let data_len = byte_count
                .checked_sub(2)
                .ok_or_else(|| invalid_data(format!("report slave id of {byte_count} bytes")))?;
            let id = rdr.u8()?;
            let running = match rdr.u8()? {
                0x00 => false,
                0xFF => true,
                status => {
                    return Err(invalid_data(format!(
                        "invalid run indicator 0x{status:02X}"
                    )));
                }
            };
            Response::ReportServerId(id, running, rdr.bytes(data_len)?)
        }
        FunctionCode::Custom(code) => return Ok(Response::Custom(code, rdr.rest())),
    };
    rdr.finish(response, "response")
}

/// Decode the PDU of an exception response.
pub(crate) fn decode_exception_pdu(pdu: Bytes) -> io::Result<ExceptionResponse> {
    let mut rdr = PduReader::new(pdu, "exception")?;
    let code = rdr.u8()?;
    if code < 0x80 {
        return Err(invalid_data(format!(
            "function code 0x{code:02X} is no exception"
        )));
    }
    let rsp = ExceptionResponse {
        function: FunctionCode::new(code & 0x7F),
        exception: ExceptionCode::new(rdr.u8()?),
    };
    rdr.finish(rsp, "exception")
}

/// Decode a response PDU that may also be an exception response.
pub(crate) fn decode_response_result_pdu(
    pdu: Bytes,
) -> io::Result<Result<Response, ExceptionResponse>> {
    match pdu.first() {
        None => Err(Error::new(ErrorKind::UnexpectedEof, "empty response PDU")),
        Some(code) if *code >= 0x80 => decode_exception_pdu(pdu).map(Err),
        Some(_) => decode_response_pdu(pdu).map(Ok),
    }
}
