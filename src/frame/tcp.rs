// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

pub(crate) type TransactionId = u16;
pub(crate) type UnitId = u8;

/// Length of the MBAP header including the unit identifier.
pub(crate) const HEADER_LEN: usize = 7;

/// The protocol identifier of Modbus in the MBAP header.
pub(crate) const PROTOCOL_ID: u16 = 0x0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) transaction_id: TransactionId,
    pub(crate) unit_id: UnitId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::verify_response_header;

    #[test]
    fn transaction_id_is_part_of_header_check() {
        let req_hdr = Header {
            transaction_id: 7,
            unit_id: 1,
        };
        let rsp_hdr = Header {
            transaction_id: 8,
            unit_id: 1,
        };
        let message = verify_response_header(&req_hdr, &rsp_hdr).unwrap_err();
        assert!(message.contains("transaction_id: 7"));
        assert!(message.contains("transaction_id: 8"));
    }
}
