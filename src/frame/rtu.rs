// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::slave::SlaveId;

/// Length of the RTU ADU header: the slave address.
pub(crate) const HEADER_LEN: usize = 1;

/// Length of the RTU ADU trailer: the CRC-16.
pub(crate) const CRC_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Header {
    pub(crate) slave: SlaveId,
}
