// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous Modbus master access

use std::{
    io,
    ops::{Deref, DerefMut},
};

use super::MasterSession;
use crate::{context::Context, frame::*, transport::Transport, Result};

/// A blocking Modbus master.
///
/// Drives a [`MasterSession`] on a private single threaded runtime. Must
/// not be used from within an async context.
#[derive(Debug)]
pub struct Master<T> {
    core: tokio::runtime::Runtime,
    async_session: MasterSession<T>,
}

impl<T> Deref for Master<T> {
    type Target = Context<T>;

    fn deref(&self) -> &Context<T> {
        &self.async_session
    }
}

impl<T> DerefMut for Master<T> {
    fn deref_mut(&mut self) -> &mut Context<T> {
        &mut self.async_session
    }
}

impl<T: Transport> Master<T> {
    /// # Errors
    ///
    /// Fails if the runtime cannot be created.
    pub fn new(transport: T) -> io::Result<Self> {
        Self::from_session(MasterSession::new(transport))
    }

    /// # Errors
    ///
    /// Fails if the runtime cannot be created.
    pub fn from_session(async_session: MasterSession<T>) -> io::Result<Self> {
        let core = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            core,
            async_session,
        })
    }

    pub fn into_session(self) -> MasterSession<T> {
        self.async_session
    }

    pub fn connect(&mut self) -> Result<()> {
        self.core.block_on(self.async_session.connect())
    }

    pub fn close(&mut self) {
        self.core.block_on(self.async_session.close());
    }

    pub fn flush(&mut self) -> Result<usize> {
        self.core.block_on(self.async_session.flush())
    }

    pub fn call(&mut self, request: Request<'_>) -> Result<Option<Response>> {
        self.core.block_on(self.async_session.call(request))
    }

    pub fn read_bits(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        self.core.block_on(self.async_session.read_bits(addr, cnt))
    }

    pub fn read_input_bits(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        self.core
            .block_on(self.async_session.read_input_bits(addr, cnt))
    }

    pub fn read_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        self.core
            .block_on(self.async_session.read_registers(addr, cnt))
    }

    pub fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        self.core
            .block_on(self.async_session.read_input_registers(addr, cnt))
    }

    pub fn write_bit(&mut self, addr: Address, coil: Coil) -> Result<usize> {
        self.core.block_on(self.async_session.write_bit(addr, coil))
    }

    pub fn write_register(&mut self, addr: Address, word: Word) -> Result<usize> {
        self.core
            .block_on(self.async_session.write_register(addr, word))
    }

    pub fn write_bits(&mut self, addr: Address, coils: &[Coil]) -> Result<usize> {
        self.core.block_on(self.async_session.write_bits(addr, coils))
    }

    pub fn write_registers(&mut self, addr: Address, words: &[Word]) -> Result<usize> {
        self.core
            .block_on(self.async_session.write_registers(addr, words))
    }

    pub fn write_and_read_registers(
        &mut self,
        write_addr: Address,
        write_words: &[Word],
        read_addr: Address,
        read_cnt: Quantity,
    ) -> Result<Vec<Word>> {
        self.core.block_on(self.async_session.write_and_read_registers(
            write_addr,
            write_words,
            read_addr,
            read_cnt,
        ))
    }

    pub fn report_slave_id(&mut self, max_len: usize) -> Result<Vec<u8>> {
        self.core
            .block_on(self.async_session.report_slave_id(max_len))
    }

    pub fn send_raw_request(&mut self, raw: &[u8]) -> Result<usize> {
        self.core.block_on(self.async_session.send_raw_request(raw))
    }

    pub fn receive_confirmation(&mut self) -> Result<Vec<u8>> {
        self.core
            .block_on(self.async_session.receive_confirmation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{mock::MockTransport, Backend};

    #[test]
    fn blocking_write_and_read() {
        let mut transport = MockTransport::new(Backend::Tcp);
        transport.push_bytes([
            0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0xFF, 0x06, 0x00, 0x01, 0x00, 0x2A,
        ]);
        transport.push_bytes([
            0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0xFF, 0x03, 0x02, 0x00, 0x2A,
        ]);
        let mut master = Master::new(transport).unwrap();
        assert_eq!(master.write_register(1, 42).unwrap(), 1);
        assert_eq!(master.read_registers(1, 1).unwrap(), vec![42]);
        assert_eq!(master.transport().sent.len(), 2);
    }
}
