// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus slave

mod mapping;

pub use self::mapping::Mapping;

use std::ops::{Deref, DerefMut};

use crate::{
    bytes::BytesMut,
    codec::{
        decode_request_pdu, encode_response_result_pdu, FrameKind, RequestError, MAX_PDU_SIZE,
    },
    context::Context,
    error::{Error, ProtocolError},
    frame::*,
    slave::Slave,
    transport::{Backend, Transport},
    Result,
};

/// Additional data of a report slave id response: function code, byte
/// count, slave id and run indicator occupy the rest of the PDU.
const MAX_REPORT_DATA_LEN: usize = MAX_PDU_SIZE - 4;

/// Lifecycle of a [`SlaveSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No request is pending.
    Idle,
    /// A request has been received and awaits its reply.
    Serving,
}

#[derive(Debug)]
struct Pending {
    hdr: Header,
    request: Request<'static>,
    /// Decoded, but carries values that are answered with an exception.
    illegal: bool,
}

/// A Modbus slave answering requests from its own [`Mapping`].
///
/// ```no_run
/// # #[cfg(feature = "tcp")]
/// # async fn serve() -> modbus_session::Result<()> {
/// use modbus_session::{prelude::*, transport::tcp::TcpTransport};
///
/// let listener = TcpTransport::listen("127.0.0.1:5502".parse().unwrap(), 1).unwrap();
/// let transport = TcpTransport::accept(&listener).await.unwrap();
/// let mut session = SlaveSession::new(transport, Mapping::new(0, 0, 10, 0));
/// loop {
///     match session.receive().await {
///         Ok(_) => {
///             session.reply().await?;
///         }
///         Err(err) if err.is_timeout() => continue,
///         Err(err) => return Err(err),
///     }
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct SlaveSession<T> {
    ctx: Context<T>,
    mapping: Mapping,
    pending: Option<Pending>,
    report_data: Vec<u8>,
}

impl<T> Deref for SlaveSession<T> {
    type Target = Context<T>;

    fn deref(&self) -> &Context<T> {
        &self.ctx
    }
}

impl<T> DerefMut for SlaveSession<T> {
    fn deref_mut(&mut self) -> &mut Context<T> {
        &mut self.ctx
    }
}

fn check_quantity(cnt: usize, max: Quantity) -> std::result::Result<Quantity, ExceptionCode> {
    match Quantity::try_from(cnt) {
        Ok(cnt) if (1..=max).contains(&cnt) => Ok(cnt),
        _ => Err(ExceptionCode::IllegalDataValue),
    }
}

fn idle_error() -> Error {
    Error::InvalidArgument("no pending request to reply to".to_owned())
}

impl<T: Transport> SlaveSession<T> {
    pub fn new(transport: T, mapping: Mapping) -> Self {
        Self::from_context(Context::new(transport), mapping)
    }

    pub fn from_context(ctx: Context<T>, mapping: Mapping) -> Self {
        Self {
            ctx,
            mapping,
            pending: None,
            report_data: format!("{}-{}", env!("CARGO_PKG_NAME"), crate::VERSION).into_bytes(),
        }
    }

    pub fn into_parts(self) -> (Context<T>, Mapping) {
        (self.ctx, self.mapping)
    }

    pub fn state(&self) -> State {
        if self.pending.is_some() {
            State::Serving
        } else {
            State::Idle
        }
    }

    /// The request that awaits its reply.
    pub fn request(&self) -> Option<&Request<'static>> {
        self.pending.as_ref().map(|pending| &pending.request)
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn mapping_mut(&mut self) -> &mut Mapping {
        &mut self.mapping
    }

    pub fn report_data(&self) -> &[u8] {
        &self.report_data
    }

    /// Identification that is sent in reply to a report slave id request.
    ///
    /// # Errors
    ///
    /// Fails if the data does not fit into a single response.
    pub fn set_report_data(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        let data = data.into();
        if data.len() > MAX_REPORT_DATA_LEN {
            return Err(Error::InvalidArgument(format!(
                "report data exceeds {MAX_REPORT_DATA_LEN} bytes"
            )));
        }
        self.report_data = data;
        Ok(())
    }

    fn accepts(&self, own: Option<Slave>, hdr: &Header) -> bool {
        match self.backend() {
            Backend::Tcp => true,
            Backend::Rtu => {
                let slave = Slave(hdr.slave());
                slave.is_broadcast() || Some(slave) == own
            }
        }
    }

    /// Wait for the next request.
    ///
    /// On a serial line requests to other slaves are skipped. A request
    /// that has not been answered yet is dropped.
    ///
    /// A request that is complete but carries illegal values, like a coil
    /// value other than ON or OFF or a byte count that disagrees with the
    /// quantity, is returned as [`Request::Custom`] with its raw payload.
    /// [`reply`](Self::reply) answers it with
    /// [`ExceptionCode::IllegalDataValue`].
    ///
    /// # Errors
    ///
    /// Returns a timeout error if no request arrives within the response
    /// timeout and [`ProtocolError::InvalidFrame`] for requests that cannot
    /// be decoded at all.
    pub async fn receive(&mut self) -> Result<&Request<'static>> {
        if let Some(Pending { request, .. }) = self.pending.take() {
            log::debug!("Dropping unanswered request {request:?}");
        }
        let own = match self.backend() {
            Backend::Rtu => Some(self.required_slave()?),
            Backend::Tcp => self.slave(),
        };
        let deadline = self.deadline();
        loop {
            let RawAdu { hdr, pdu } = self.ctx.receive_adu(FrameKind::Request, deadline).await?;
            if !self.accepts(own, &hdr) {
                log::info!("Skipping request for slave {}", Slave(hdr.slave()));
                continue;
            }
            let (request, illegal) = match decode_request_pdu(pdu.clone()) {
                Ok(request) => (request, false),
                Err(RequestError::IllegalValue { function, reason }) => {
                    log::debug!("Illegal value in function {function} with {hdr:?}: {reason}");
                    let payload = pdu.slice(1..).to_vec();
                    (Request::Custom(function.value(), payload.into()), true)
                }
                Err(RequestError::Malformed(err)) => {
                    return Err(ProtocolError::InvalidFrame(err).into());
                }
            };
            log::debug!("Received {request:?} with {hdr:?}");
            let pending = self.pending.insert(Pending {
                hdr,
                request,
                illegal,
            });
            return Ok(&pending.request);
        }
    }

    /// Answer the pending request from the mapping.
    ///
    /// Returns the number of bytes sent, 0 for broadcast requests on a
    /// serial line which are executed without a reply.
    ///
    /// # Errors
    ///
    /// Fails if no request is pending or the reply cannot be sent. Requests
    /// that cannot be served are answered with an exception response.
    pub async fn reply(&mut self) -> Result<usize> {
        let Pending {
            hdr,
            request,
            illegal,
        } = self.pending.take().ok_or_else(idle_error)?;
        let function = request.function_code();
        let result = if illegal {
            Err(ExceptionCode::IllegalDataValue)
        } else {
            self.process(request)
        };
        let result = result.map_err(|exception| ExceptionResponse {
            function,
            exception,
        });
        if let Err(rsp) = &result {
            log::debug!("Answering with exception: {rsp}");
        }
        self.send_reply(hdr, &result).await
    }

    /// Answer the pending request with `exception` without touching the
    /// mapping.
    ///
    /// # Errors
    ///
    /// Fails if no request is pending or the reply cannot be sent.
    pub async fn reply_exception(&mut self, exception: ExceptionCode) -> Result<usize> {
        let Pending { hdr, request, .. } = self.pending.take().ok_or_else(idle_error)?;
        let rsp = ExceptionResponse {
            function: request.function_code(),
            exception,
        };
        self.send_reply(hdr, &Err(rsp)).await
    }

    async fn send_reply(
        &mut self,
        hdr: Header,
        result: &std::result::Result<Response, ExceptionResponse>,
    ) -> Result<usize> {
        if self.backend() == Backend::Rtu && Slave(hdr.slave()).is_broadcast() {
            return Ok(0);
        }
        let mut pdu = BytesMut::new();
        encode_response_result_pdu(&mut pdu, result)
            .map_err(|err| Error::InvalidArgument(err.to_string()))?;
        self.send_adu(RawAdu {
            hdr,
            pdu: pdu.freeze(),
        })
        .await
    }

    fn process(
        &mut self,
        request: Request<'static>,
    ) -> std::result::Result<Response, ExceptionCode> {
        use Request::*;
        let rsp = match request {
            ReadCoils(addr, cnt) => {
                check_quantity(cnt.into(), MAX_READ_BITS)?;
                Response::ReadCoils(self.mapping.read_coils(addr, cnt)?)
            }
            ReadDiscreteInputs(addr, cnt) => {
                check_quantity(cnt.into(), MAX_READ_BITS)?;
                Response::ReadDiscreteInputs(self.mapping.read_discrete_inputs(addr, cnt)?)
            }
            WriteSingleCoil(addr, coil) => {
                self.mapping.write_coils(addr, &[coil])?;
                Response::WriteSingleCoil(addr, coil)
            }
            WriteMultipleCoils(addr, coils) => {
                let cnt = check_quantity(coils.len(), MAX_WRITE_BITS)?;
                self.mapping.write_coils(addr, &coils)?;
                Response::WriteMultipleCoils(addr, cnt)
            }
            ReadInputRegisters(addr, cnt) => {
                check_quantity(cnt.into(), MAX_READ_REGISTERS)?;
                Response::ReadInputRegisters(self.mapping.read_input_registers(addr, cnt)?)
            }
            ReadHoldingRegisters(addr, cnt) => {
                check_quantity(cnt.into(), MAX_READ_REGISTERS)?;
                Response::ReadHoldingRegisters(self.mapping.read_holding_registers(addr, cnt)?)
            }
            WriteSingleRegister(addr, word) => {
                self.mapping.write_holding_registers(addr, &[word])?;
                Response::WriteSingleRegister(addr, word)
            }
            WriteMultipleRegisters(addr, words) => {
                let cnt = check_quantity(words.len(), MAX_WRITE_REGISTERS)?;
                self.mapping.write_holding_registers(addr, &words)?;
                Response::WriteMultipleRegisters(addr, cnt)
            }
            ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, words) => {
                check_quantity(words.len(), MAX_WR_WRITE_REGISTERS)?;
                check_quantity(read_cnt.into(), MAX_WR_READ_REGISTERS)?;
                // Both ranges are valid before anything is written.
                self.mapping.read_holding_registers(read_addr, read_cnt)?;
                self.mapping.write_holding_registers(write_addr, &words)?;
                Response::ReadWriteMultipleRegisters(
                    self.mapping.read_holding_registers(read_addr, read_cnt)?,
                )
            }
            ReportServerId => Response::ReportServerId(
                self.slave().map_or(0, Into::into),
                true,
                self.report_data.clone(),
            ),
            Custom(code, _) => {
                log::debug!("Unsupported function code 0x{code:02X}");
                return Err(ExceptionCode::IllegalFunction);
            }
        };
        Ok(rsp)
    }
}
