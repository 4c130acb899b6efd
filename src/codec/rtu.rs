// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{self, Error, ErrorKind};

use tokio_util::codec::{Decoder, Encoder};

use crate::{
    bytes::{BufMut as _, BytesMut},
    frame::{
        rtu::{Header, CRC_LEN, HEADER_LEN},
        Header as AduHeader, RawAdu,
    },
};

use super::{FrameKind, MAX_PDU_SIZE};

/// Maximum RTU ADU size: slave address, PDU and CRC.
const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PDU_SIZE + CRC_LEN;

/// Number of bytes following the function code of a request.
///
/// Unknown function codes are assumed to carry no data, so that the
/// frame can still be answered with an illegal function exception.
fn get_request_payload_len(buf: &[u8]) -> Option<usize> {
    let fn_code = *buf.get(1)?;
    let len = match fn_code {
        0x01..=0x06 => 4,
        0x0F | 0x10 => 5 + usize::from(*buf.get(6)?),
        0x16 => 6,
        0x17 => 9 + usize::from(*buf.get(10)?),
        _ => 0,
    };
    Some(len)
}

/// Number of bytes following the function code of a response.
fn get_response_payload_len(buf: &[u8]) -> Option<usize> {
    let fn_code = *buf.get(1)?;
    let len = match fn_code {
        0x01..=0x04 | 0x11 | 0x17 => 1 + usize::from(*buf.get(2)?),
        0x05 | 0x06 | 0x0F | 0x10 => 4,
        0x16 => 6,
        // Exception responses and unknown functions carry a single byte.
        _ => 1,
    };
    Some(len)
}

/// CRC-16/MODBUS of `data`. It is transmitted low byte first.
pub(crate) fn calc_crc(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn check_crc(adu_data: &[u8], expected_crc: u16) -> io::Result<()> {
    let actual_crc = calc_crc(adu_data);
    if expected_crc != actual_crc {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!(
                "Invalid CRC: expected = 0x{expected_crc:0>4X}, actual = 0x{actual_crc:0>4X}"
            ),
        ));
    }
    Ok(())
}

#[derive(Debug)]
pub(crate) struct Codec {
    kind: FrameKind,
}

impl Codec {
    pub(crate) const fn new(kind: FrameKind) -> Self {
        Self { kind }
    }
}

impl Decoder for Codec {
    type Item = RawAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<RawAdu>> {
        let payload_len = match self.kind {
            FrameKind::Request => get_request_payload_len(buf),
            FrameKind::Response => get_response_payload_len(buf),
        };
        let Some(payload_len) = payload_len else {
            // Incomplete frame
            return Ok(None);
        };
        let adu_len = HEADER_LEN + 1 + payload_len + CRC_LEN;
        if adu_len > MAX_FRAME_LEN {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("RTU frame too long: {adu_len} bytes"),
            ));
        }
        if buf.len() < adu_len {
            // Incomplete frame
            return Ok(None);
        }
        let mut adu_buf = buf.split_to(adu_len);
        let crc_buf = adu_buf.split_off(adu_len - CRC_LEN);
        let crc = u16::from_le_bytes([crc_buf[0], crc_buf[1]]);
        check_crc(&adu_buf, crc)?;
        let slave = adu_buf.split_to(HEADER_LEN)[0];
        Ok(Some(RawAdu {
            hdr: AduHeader::Rtu(Header { slave }),
            pdu: adu_buf.freeze(),
        }))
    }
}

impl Encoder<RawAdu> for Codec {
    type Error = Error;

    fn encode(&mut self, adu: RawAdu, buf: &mut BytesMut) -> io::Result<()> {
        let RawAdu { hdr, pdu } = adu;
        let AduHeader::Rtu(Header { slave }) = hdr else {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "RTU codec cannot encode a TCP header",
            ));
        };
        let start = buf.len();
        buf.reserve(HEADER_LEN + pdu.len() + CRC_LEN);
        buf.put_u8(slave);
        buf.put_slice(&pdu);
        let crc = calc_crc(&buf[start..]);
        buf.put_u16_le(crc);
        Ok(())
    }
}
