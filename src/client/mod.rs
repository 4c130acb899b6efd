// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus master

use std::{
    borrow::Cow,
    ops::{Deref, DerefMut},
};

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    codec::{decode_response_result_pdu, encode_request_pdu, FrameKind, MAX_PDU_SIZE},
    context::Context,
    error::{Error, ProtocolError},
    frame::*,
    recovery::{self, Recovery},
    slave::Slave,
    transport::{Backend, Transport},
    Result,
};

#[cfg(feature = "sync")]
pub mod sync;

fn check_quantity(what: &str, count: usize, max: Quantity) -> Result<()> {
    if count == 0 || count > usize::from(max) {
        return Err(Error::InvalidArgument(format!(
            "{what}: quantity {count} not in 1..={max}"
        )));
    }
    Ok(())
}

fn check_address_range(addr: Address, count: usize) -> Result<()> {
    if usize::from(addr) + count > usize::from(u16::MAX) + 1 {
        return Err(Error::InvalidArgument(format!(
            "address range {addr}+{count} exceeds the address space"
        )));
    }
    Ok(())
}

fn unexpected_response(request: &Request<'_>, response: &Response) -> Error {
    ProtocolError::UnexpectedResponse(format!(
        "request = {request:?}, response = {response:?}"
    ))
    .into()
}

fn check_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ProtocolError::CountMismatch { expected, actual }.into());
    }
    Ok(())
}

/// A Modbus master issuing requests to a single slave at a time.
///
/// Settings like the addressed slave, timeouts and error recovery are
/// available through [`Context`] which this type dereferences to.
#[derive(Debug)]
pub struct MasterSession<T> {
    ctx: Context<T>,
}

impl<T> Deref for MasterSession<T> {
    type Target = Context<T>;

    fn deref(&self) -> &Context<T> {
        &self.ctx
    }
}

impl<T> DerefMut for MasterSession<T> {
    fn deref_mut(&mut self) -> &mut Context<T> {
        &mut self.ctx
    }
}

impl<T: Transport> From<Context<T>> for MasterSession<T> {
    fn from(ctx: Context<T>) -> Self {
        Self { ctx }
    }
}

impl<T: Transport> MasterSession<T> {
    pub fn new(transport: T) -> Self {
        Context::new(transport).into()
    }

    pub fn into_context(self) -> Context<T> {
        self.ctx
    }

    fn is_rtu_broadcast(&self, slave: Slave) -> bool {
        self.backend() == Backend::Rtu && slave.is_broadcast()
    }

    fn check_readable(&self) -> Result<()> {
        let slave = self.required_slave()?;
        if self.is_rtu_broadcast(slave) {
            return Err(Error::InvalidArgument(
                "read requests cannot be broadcast".to_owned(),
            ));
        }
        Ok(())
    }

    /// Invoke a Modbus function on the selected slave.
    ///
    /// Returns `None` for requests that are broadcast on a serial line
    /// and thus never answered.
    ///
    /// # Errors
    ///
    /// Transport failures and invalid responses are subject to the error
    /// recovery mode. Exception responses are returned as
    /// [`ProtocolError::Exception`].
    pub async fn call(&mut self, request: Request<'_>) -> Result<Option<Response>> {
        let slave = self.required_slave()?;
        let broadcast = self.is_rtu_broadcast(slave);
        let function = request.function_code();
        let mut pdu = BytesMut::new();
        encode_request_pdu(&mut pdu, &request)
            .map_err(|err| Error::InvalidArgument(err.to_string()))?;
        let pdu = pdu.freeze();
        log::debug!("Calling function {function} on slave {slave}");
        let mut attempt = 0;
        loop {
            let err = match self.exchange(slave, pdu.clone(), function, broadcast).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            match recovery::decide(&err, self.error_recovery(), attempt) {
                Recovery::Surface => return Err(err),
                Recovery::ReconnectAndRetry => {
                    log::warn!("Reconnecting after error: {err}");
                    self.reconnect().await?;
                }
                Recovery::FlushAndRetry => {
                    log::warn!("Flushing input after error: {err}");
                    let discarded = self.flush().await?;
                    log::debug!("Discarded {discarded} bytes");
                }
            }
            attempt += 1;
        }
    }

    async fn exchange(
        &mut self,
        slave: Slave,
        pdu: Bytes,
        function: FunctionCode,
        broadcast: bool,
    ) -> Result<Option<Response>> {
        self.discard_input();
        let req_hdr = self.next_header(slave.into());
        self.send_adu(RawAdu { hdr: req_hdr, pdu }).await?;
        if broadcast {
            return Ok(None);
        }
        let deadline = self.deadline();
        let RawAdu { hdr: rsp_hdr, pdu } = self.receive_adu(FrameKind::Response, deadline).await?;
        verify_response_header(&req_hdr, &rsp_hdr)
            .map_err(|message| ProtocolError::HeaderMismatch { message })?;
        let result = decode_response_result_pdu(pdu).map_err(ProtocolError::InvalidFrame)?;
        let rsp_function = match &result {
            Ok(response) => response.function_code(),
            Err(ExceptionResponse { function, .. }) => *function,
        };
        if rsp_function != function {
            return Err(ProtocolError::FunctionCodeMismatch {
                request: function,
                response: rsp_function,
            }
            .into());
        }
        result
            .map(Some)
            .map_err(|rsp| ProtocolError::Exception(rsp).into())
    }

    async fn call_for_response(&mut self, request: Request<'_>) -> Result<Response> {
        self.call(request).await?.ok_or_else(|| {
            Error::InvalidArgument("no response to a broadcast request".to_owned())
        })
    }

    async fn read_bits_with(&mut self, request: Request<'_>, cnt: Quantity) -> Result<Vec<Coil>> {
        let response = self.call_for_response(request.clone()).await?;
        match response {
            Response::ReadCoils(mut coils) | Response::ReadDiscreteInputs(mut coils) => {
                // Bits are transmitted in whole bytes.
                let expected = (usize::from(cnt) + 7) / 8 * 8;
                if coils.len() != expected {
                    return Err(ProtocolError::CountMismatch {
                        expected: cnt.into(),
                        actual: coils.len(),
                    }
                    .into());
                }
                coils.truncate(cnt.into());
                Ok(coils)
            }
            response => Err(unexpected_response(&request, &response)),
        }
    }

    async fn read_words_with(&mut self, request: Request<'_>, cnt: Quantity) -> Result<Vec<Word>> {
        let response = self.call_for_response(request.clone()).await?;
        match response {
            Response::ReadHoldingRegisters(words)
            | Response::ReadInputRegisters(words)
            | Response::ReadWriteMultipleRegisters(words) => {
                check_count(cnt.into(), words.len())?;
                Ok(words)
            }
            response => Err(unexpected_response(&request, &response)),
        }
    }

    /// Read `cnt` coils starting at `addr` (0x01).
    pub async fn read_bits(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        check_quantity("read bits", cnt.into(), MAX_READ_BITS)?;
        check_address_range(addr, cnt.into())?;
        self.check_readable()?;
        self.read_bits_with(Request::ReadCoils(addr, cnt), cnt).await
    }

    /// Read `cnt` discrete inputs starting at `addr` (0x02).
    pub async fn read_input_bits(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        check_quantity("read input bits", cnt.into(), MAX_READ_BITS)?;
        check_address_range(addr, cnt.into())?;
        self.check_readable()?;
        self.read_bits_with(Request::ReadDiscreteInputs(addr, cnt), cnt)
            .await
    }

    /// Read `cnt` holding registers starting at `addr` (0x03).
    pub async fn read_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        check_quantity("read registers", cnt.into(), MAX_READ_REGISTERS)?;
        check_address_range(addr, cnt.into())?;
        self.check_readable()?;
        self.read_words_with(Request::ReadHoldingRegisters(addr, cnt), cnt)
            .await
    }

    /// Read `cnt` input registers starting at `addr` (0x04).
    pub async fn read_input_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>> {
        check_quantity("read input registers", cnt.into(), MAX_READ_REGISTERS)?;
        check_address_range(addr, cnt.into())?;
        self.check_readable()?;
        self.read_words_with(Request::ReadInputRegisters(addr, cnt), cnt)
            .await
    }

    /// Write a single coil (0x05). Returns the number of written coils.
    pub async fn write_bit(&mut self, addr: Address, coil: Coil) -> Result<usize> {
        let request = Request::WriteSingleCoil(addr, coil);
        match self.call(request.clone()).await? {
            None => Ok(1),
            Some(Response::WriteSingleCoil(rsp_addr, rsp_coil))
                if rsp_addr == addr && rsp_coil == coil =>
            {
                Ok(1)
            }
            Some(response) => Err(unexpected_response(&request, &response)),
        }
    }

    /// Write a single holding register (0x06). Returns the number of
    /// written registers.
    pub async fn write_register(&mut self, addr: Address, word: Word) -> Result<usize> {
        let request = Request::WriteSingleRegister(addr, word);
        match self.call(request.clone()).await? {
            None => Ok(1),
            Some(Response::WriteSingleRegister(rsp_addr, rsp_word))
                if rsp_addr == addr && rsp_word == word =>
            {
                Ok(1)
            }
            Some(response) => Err(unexpected_response(&request, &response)),
        }
    }

    /// Write multiple coils (0x0F). Returns the quantity confirmed by the slave.
    pub async fn write_bits(&mut self, addr: Address, coils: &[Coil]) -> Result<usize> {
        check_quantity("write bits", coils.len(), MAX_WRITE_BITS)?;
        check_address_range(addr, coils.len())?;
        let request = Request::WriteMultipleCoils(addr, Cow::Borrowed(coils));
        match self.call(request.clone()).await? {
            None => Ok(coils.len()),
            Some(Response::WriteMultipleCoils(rsp_addr, rsp_cnt)) if rsp_addr == addr => {
                check_count(coils.len(), rsp_cnt.into())?;
                Ok(rsp_cnt.into())
            }
            Some(response) => Err(unexpected_response(&request, &response)),
        }
    }

    /// Write multiple holding registers (0x10). Returns the quantity
    /// confirmed by the slave.
    pub async fn write_registers(&mut self, addr: Address, words: &[Word]) -> Result<usize> {
        check_quantity("write registers", words.len(), MAX_WRITE_REGISTERS)?;
        check_address_range(addr, words.len())?;
        let request = Request::WriteMultipleRegisters(addr, Cow::Borrowed(words));
        match self.call(request.clone()).await? {
            None => Ok(words.len()),
            Some(Response::WriteMultipleRegisters(rsp_addr, rsp_cnt)) if rsp_addr == addr => {
                check_count(words.len(), rsp_cnt.into())?;
                Ok(rsp_cnt.into())
            }
            Some(response) => Err(unexpected_response(&request, &response)),
        }
    }

    /// Write `write_words` starting at `write_addr`, then read `read_cnt`
    /// holding registers starting at `read_addr` in a single exchange (0x17).
    pub async fn write_and_read_registers(
        &mut self,
        write_addr: Address,
        write_words: &[Word],
        read_addr: Address,
        read_cnt: Quantity,
    ) -> Result<Vec<Word>> {
        check_quantity(
            "write and read registers",
            write_words.len(),
            MAX_WR_WRITE_REGISTERS,
        )?;
        check_quantity(
            "write and read registers",
            read_cnt.into(),
            MAX_WR_READ_REGISTERS,
        )?;
        check_address_range(write_addr, write_words.len())?;
        check_address_range(read_addr, read_cnt.into())?;
        self.check_readable()?;
        let request = Request::ReadWriteMultipleRegisters(
            read_addr,
            read_cnt,
            write_addr,
            Cow::Borrowed(write_words),
        );
        self.read_words_with(request, read_cnt).await
    }

    /// Ask the slave for its identification (0x11).
    ///
    /// Returns the slave id, the run indicator and the additional data as
    /// sent by the slave, truncated to `max_len` bytes.
    pub async fn report_slave_id(&mut self, max_len: usize) -> Result<Vec<u8>> {
        self.check_readable()?;
        let request = Request::ReportServerId;
        match self.call_for_response(request.clone()).await? {
            Response::ReportServerId(id, run, data) => {
                let mut bytes = Vec::with_capacity(2 + data.len());
                bytes.push(id);
                bytes.push(if run { 0xFF } else { 0x00 });
                bytes.extend_from_slice(&data);
                bytes.truncate(max_len);
                Ok(bytes)
            }
            response => Err(unexpected_response(&request, &response)),
        }
    }

    /// Send `raw` as `[slave, function code, data...]` framed for the
    /// transport. Returns the number of bytes written.
    ///
    /// The reply, if any, can be fetched with [`Self::receive_confirmation`].
    pub async fn send_raw_request(&mut self, raw: &[u8]) -> Result<usize> {
        let [slave, pdu @ ..] = raw else {
            return Err(Error::InvalidArgument("empty raw request".to_owned()));
        };
        if pdu.is_empty() || pdu.len() > MAX_PDU_SIZE {
            return Err(Error::InvalidArgument(format!(
                "raw request PDU size {} not in 1..={MAX_PDU_SIZE}",
                pdu.len()
            )));
        }
        self.discard_input();
        let hdr = self.next_header(*slave);
        self.send_adu(RawAdu {
            hdr,
            pdu: Bytes::copy_from_slice(pdu),
        })
        .await
    }

    /// Receive the next reply frame as `[slave, function code, data...]`.
    pub async fn receive_confirmation(&mut self) -> Result<Vec<u8>> {
        let deadline = self.deadline();
        let RawAdu { hdr, pdu } = self.receive_adu(FrameKind::Response, deadline).await?;
        let mut bytes = BytesMut::with_capacity(1 + pdu.len());
        bytes.put_u8(hdr.slave());
        bytes.put_slice(&pdu);
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::rtu::calc_crc,
        error::TransportError,
        recovery::ErrorRecoveryMode,
        transport::mock::{Incoming, MockTransport},
    };

    fn rtu_frame(slave: u8, pdu: &[u8]) -> Vec<u8> {
        let mut frame = vec![slave];
        frame.extend_from_slice(pdu);
        let crc = calc_crc(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    fn tcp_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        let mut frame = transaction_id.to_be_bytes().to_vec();
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&u16::try_from(pdu.len() + 1).unwrap().to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(pdu);
        frame
    }

    fn rtu_master(slave: u8) -> MasterSession<MockTransport> {
        let mut master = MasterSession::new(MockTransport::new(Backend::Rtu));
        master.set_slave(Slave(slave)).unwrap();
        master
    }

    fn tcp_master() -> MasterSession<MockTransport> {
        MasterSession::new(MockTransport::new(Backend::Tcp))
    }

    #[tokio::test]
    async fn read_some_coils() {
        let mut master = rtu_master(0x12);
        master
            .transport_mut()
            .push_bytes(rtu_frame(0x12, &[0x01, 0x01, 0b_0000_1001]));
        let coils = master.read_bits(0x10, 4).await.unwrap();
        assert_eq!(coils, vec![true, false, false, true]);
        assert_eq!(
            master.transport().sent,
            vec![rtu_frame(0x12, &[0x01, 0x00, 0x10, 0x00, 0x04])]
        );
    }

    #[tokio::test]
    async fn read_some_input_registers_over_tcp() {
        let mut master = tcp_master();
        master
            .transport_mut()
            .push_bytes(tcp_frame(0, 0xFF, &[0x04, 0x04, 0x00, 0x01, 0x00, 0x02]));
        let words = master.read_input_registers(0, 2).await.unwrap();
        assert_eq!(words, vec![1, 2]);
        assert_eq!(
            master.transport().sent,
            vec![tcp_frame(0, 0xFF, &[0x04, 0x00, 0x00, 0x00, 0x02])]
        );
    }

    #[tokio::test]
    async fn quantity_limits_are_checked_before_io() {
        let mut master = rtu_master(1);
        for (cnt, ok) in [(0, false), (1, true), (2000, true), (2001, false)] {
            let res = master.read_bits(0, cnt).await;
            assert_eq!(
                matches!(res, Err(Error::InvalidArgument(_))),
                !ok,
                "read_bits({cnt})"
            );
        }
        assert!(matches!(
            master.read_registers(0, 126).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            master.write_registers(0, &[0; 124]).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            master.write_bits(0, &[true; 1969]).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            master.write_and_read_registers(0, &[0; 122], 0, 1).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            master.write_and_read_registers(0, &[0; 1], 0, 126).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            master.read_registers(0xFFFF, 2).await,
            Err(Error::InvalidArgument(_))
        ));
        // Only the accepted read has hit the transport
        assert_eq!(master.transport().sent.len(), 2);
    }

    #[tokio::test]
    async fn reads_from_broadcast_are_rejected() {
        let mut master = rtu_master(0);
        assert!(matches!(
            master.read_registers(0, 1).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(master.transport().sent.is_empty());
    }

    #[tokio::test]
    async fn broadcast_writes_do_not_wait() {
        let mut master = rtu_master(0);
        assert_eq!(master.write_registers(3, &[1, 2, 3]).await.unwrap(), 3);
        assert_eq!(master.write_bit(7, true).await.unwrap(), 1);
        assert_eq!(master.transport().sent.len(), 2);
    }

    #[tokio::test]
    async fn rtu_requires_a_slave() {
        let mut master = MasterSession::new(MockTransport::new(Backend::Rtu));
        assert!(matches!(
            master.write_register(0, 0).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn exception_response() {
        let mut master = rtu_master(0x66);
        master
            .transport_mut()
            .push_bytes(rtu_frame(0x66, &[0x83, 0x02]));
        let err = master.read_registers(10, 1).await.unwrap_err();
        let rsp = err.exception().unwrap();
        assert_eq!(rsp.function, FunctionCode::ReadHoldingRegisters);
        assert_eq!(rsp.exception, ExceptionCode::IllegalDataAddress);
    }

    #[tokio::test]
    async fn count_mismatch() {
        let mut master = rtu_master(1);
        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x03, 0x02, 0x00, 0x01]));
        let err = master.read_registers(0, 2).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::CountMismatch {
                expected: 2,
                actual: 1
            })
        ));

        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x10, 0x00, 0x00, 0x00, 0x02]));
        let err = master.write_registers(0, &[1, 2, 3]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::CountMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn unexpected_echo() {
        let mut master = rtu_master(1);
        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x06, 0x00, 0x03, 0x00, 0x01]));
        let err = master.write_register(3, 2).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn mismatching_slave_and_function() {
        let mut master = rtu_master(1);
        master
            .transport_mut()
            .push_bytes(rtu_frame(2, &[0x06, 0x00, 0x03, 0x00, 0x01]));
        let err = master.write_register(3, 1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::HeaderMismatch { .. })
        ));

        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x05, 0x00, 0x03, 0xFF, 0x00]));
        let err = master.write_register(3, 1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::FunctionCodeMismatch {
                request: FunctionCode::WriteSingleRegister,
                response: FunctionCode::WriteSingleCoil,
            })
        ));
    }

    #[tokio::test]
    async fn mismatching_transaction_id() {
        let mut master = tcp_master();
        master
            .transport_mut()
            .push_bytes(tcp_frame(5, 0xFF, &[0x06, 0x00, 0x03, 0x00, 0x01]));
        let err = master.write_register(3, 1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::HeaderMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn report_slave_id_is_truncated() {
        let mut master = rtu_master(1);
        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x11, 0x05, 0x01, 0xFF, b'L', b'M', b'B']));
        assert_eq!(
            master.report_slave_id(256).await.unwrap(),
            vec![0x01, 0xFF, b'L', b'M', b'B']
        );

        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x11, 0x05, 0x01, 0xFF, b'L', b'M', b'B']));
        assert_eq!(master.report_slave_id(2).await.unwrap(), vec![0x01, 0xFF]);
    }

    #[tokio::test]
    async fn write_and_read_in_one_exchange() {
        let mut master = rtu_master(1);
        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x17, 0x04, 0x00, 0x07, 0x00, 0x08]));
        let words = master
            .write_and_read_registers(2, &[7, 8], 2, 2)
            .await
            .unwrap();
        assert_eq!(words, vec![7, 8]);
        assert_eq!(
            master.transport().sent,
            vec![rtu_frame(
                1,
                &[
                    0x17, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02, 0x04, 0x00, 0x07, 0x00,
                    0x08
                ]
            )]
        );
    }

    #[tokio::test]
    async fn raw_request_and_confirmation() {
        let mut master = rtu_master(1);
        let sent = master
            .send_raw_request(&[0x22, 0x03, 0x00, 0x01, 0x00, 0x01])
            .await
            .unwrap();
        assert_eq!(sent, 8);
        assert_eq!(
            master.transport().sent,
            vec![rtu_frame(0x22, &[0x03, 0x00, 0x01, 0x00, 0x01])]
        );
        master
            .transport_mut()
            .push_bytes(rtu_frame(0x22, &[0x03, 0x02, 0x12, 0x34]));
        assert_eq!(
            master.receive_confirmation().await.unwrap(),
            vec![0x22, 0x03, 0x02, 0x12, 0x34]
        );

        assert!(master.send_raw_request(&[]).await.is_err());
        assert!(master.send_raw_request(&[0x01]).await.is_err());
    }

    #[tokio::test]
    async fn timeout_without_recovery() {
        let mut master = rtu_master(1);
        let err = master.read_registers(0, 1).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(master.transport().flushes, 0);
    }

    #[tokio::test]
    async fn timeout_with_link_recovery_flushes_and_retries_once() {
        let mut master = rtu_master(1);
        master.set_error_recovery(ErrorRecoveryMode::LINK);
        let err = master.read_registers(0, 1).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(master.transport().flushes, 1);
        assert_eq!(master.transport().sent.len(), 2);
    }

    #[tokio::test]
    async fn broken_link_is_reconnected() {
        let mut master = rtu_master(1);
        master.set_error_recovery(ErrorRecoveryMode::LINK);
        master.transport_mut().failing_sends = 1;
        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x06, 0x00, 0x03, 0x00, 0x01]));
        assert_eq!(master.write_register(3, 1).await.unwrap(), 1);
        assert_eq!(master.transport().connects, 1);
    }

    #[tokio::test]
    async fn broken_link_without_recovery() {
        let mut master = rtu_master(1);
        master.transport_mut().incoming.push_back(Incoming::BrokenPipe);
        let err = master.read_registers(0, 1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Io { .. })
        ));
        assert_eq!(master.transport().connects, 0);
    }

    #[tokio::test]
    async fn corrupted_reply_with_protocol_recovery() {
        let mut master = rtu_master(1);
        master.set_error_recovery(ErrorRecoveryMode::PROTOCOL);
        let mut corrupted = rtu_frame(1, &[0x06, 0x00, 0x03, 0x00, 0x01]);
        *corrupted.last_mut().unwrap() ^= 0xFF;
        master.transport_mut().push_bytes(corrupted);
        master
            .transport_mut()
            .push_bytes(rtu_frame(1, &[0x06, 0x00, 0x03, 0x00, 0x01]));
        assert_eq!(master.write_register(3, 1).await.unwrap(), 1);
        assert_eq!(master.transport().flushes, 1);
        assert_eq!(master.transport().sent.len(), 2);
    }
}
