// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{self, Error, ErrorKind};

use tokio_util::codec::{Decoder, Encoder};

use crate::{
    bytes::{BufMut as _, BytesMut},
    frame::{
        tcp::{Header, HEADER_LEN, PROTOCOL_ID},
        Header as AduHeader, RawAdu,
    },
};

use super::{u16_len, MAX_PDU_SIZE};

/// The MBAP length field counts the unit identifier and the PDU.
const MIN_LENGTH_FIELD: usize = 2;
const MAX_LENGTH_FIELD: usize = 1 + MAX_PDU_SIZE;

/// MBAP framing, identical for requests and responses.
#[derive(Debug, Default)]
pub(crate) struct Codec;

impl Decoder for Codec {
    type Item = RawAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<RawAdu>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let transaction_id = u16::from_be_bytes([buf[0], buf[1]]);
        let protocol_id = u16::from_be_bytes([buf[2], buf[3]]);
        let len = usize::from(u16::from_be_bytes([buf[4], buf[5]]));
        if protocol_id != PROTOCOL_ID {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Invalid protocol identifier: 0x{protocol_id:04X}"),
            ));
        }
        if !(MIN_LENGTH_FIELD..=MAX_LENGTH_FIELD).contains(&len) {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Invalid MBAP length field: {len}"),
            ));
        }
        // The length field includes the unit identifier
        // that is part of the header.
        let adu_len = HEADER_LEN - 1 + len;
        if buf.len() < adu_len {
            return Ok(None);
        }
        let mut adu_buf = buf.split_to(adu_len);
        let header = adu_buf.split_to(HEADER_LEN);
        let unit_id = header[HEADER_LEN - 1];
        Ok(Some(RawAdu {
            hdr: AduHeader::Tcp(Header {
                transaction_id,
                unit_id,
            }),
            pdu: adu_buf.freeze(),
        }))
    }
}

impl Encoder<RawAdu> for Codec {
    type Error = Error;

    fn encode(&mut self, adu: RawAdu, buf: &mut BytesMut) -> io::Result<()> {
        let RawAdu { hdr, pdu } = adu;
        let AduHeader::Tcp(Header {
            transaction_id,
            unit_id,
        }) = hdr
        else {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "TCP codec cannot encode an RTU header",
            ));
        };
        if pdu.is_empty() || pdu.len() > MAX_PDU_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid PDU size: {}", pdu.len()),
            ));
        }
        buf.reserve(HEADER_LEN + pdu.len());
        buf.put_u16(transaction_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16(u16_len(pdu.len() + 1));
        buf.put_u8(unit_id);
        buf.put_slice(&pdu);
        Ok(())
    }
}
