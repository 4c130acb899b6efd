// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted in-memory transport for unit tests.

use std::{collections::VecDeque, io, time::Duration};

use async_trait::async_trait;

use super::{Backend, Transport};
use crate::{bytes::BytesMut, error::TransportError};

/// One scripted outcome of [`Transport::receive`].
#[derive(Debug)]
pub(crate) enum Incoming {
    Bytes(Vec<u8>),
    BrokenPipe,
}

#[derive(Debug)]
pub(crate) struct MockTransport {
    pub(crate) backend: Backend,
    pub(crate) connected: bool,
    pub(crate) incoming: VecDeque<Incoming>,
    pub(crate) sent: Vec<Vec<u8>>,
    pub(crate) connects: usize,
    pub(crate) flushes: usize,
    /// Fail that many sends with a broken pipe before accepting frames.
    pub(crate) failing_sends: usize,
}

impl MockTransport {
    pub(crate) fn new(backend: Backend) -> Self {
        Self {
            backend,
            connected: true,
            incoming: VecDeque::new(),
            sent: Vec::new(),
            connects: 0,
            flushes: 0,
            failing_sends: 0,
        }
    }

    pub(crate) fn push_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
        self.incoming.push_back(Incoming::Bytes(bytes.into()));
    }
}

fn broken_pipe(context: &'static str) -> TransportError {
    TransportError::Io {
        context,
        source: io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connects += 1;
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn flush(&mut self) -> Result<usize, TransportError> {
        self.flushes += 1;
        Ok(0)
    }

    async fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.failing_sends > 0 {
            self.failing_sends -= 1;
            return Err(broken_pipe("send"));
        }
        self.sent.push(frame.to_vec());
        Ok(frame.len())
    }

    async fn receive(
        &mut self,
        buf: &mut BytesMut,
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.incoming.pop_front() {
            Some(Incoming::Bytes(bytes)) => {
                buf.extend_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(Incoming::BrokenPipe) => Err(broken_pipe("receive")),
            None => Err(TransportError::Timeout(timeout)),
        }
    }
}
