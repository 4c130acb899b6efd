// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{ExceptionResponse, FunctionCode};

/// Top-level error of all session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller violated a documented constraint. No I/O has been attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The byte channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer sent something that violates the protocol or the request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl Error {
    /// Whether waiting for data timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout(_)))
    }

    /// The exception returned by the slave, if any.
    #[must_use]
    pub const fn exception(&self) -> Option<&ExceptionResponse> {
        match self {
            Self::Protocol(ProtocolError::Exception(rsp)) => Some(rsp),
            _ => None,
        }
    }
}

/// Failures of the underlying byte channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not connected")]
    NotConnected,

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { context, source }
    }
}

/// Protocol violations and rejected requests.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The slave answered with an exception response.
    #[error("exception: {0}")]
    Exception(ExceptionResponse),

    /// The slave confirmed a different number of items than requested.
    #[error("count mismatch: expected {expected}, actual {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// The received bytes could not be decoded into a frame.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[source] io::Error),

    /// The header of the response does not match the request.
    #[error("mismatching headers: {message}")]
    HeaderMismatch { message: String },

    /// The function code of the response does not match the request.
    #[error("mismatching function codes: request = {request}, response = {response}")]
    FunctionCodeMismatch {
        request: FunctionCode,
        response: FunctionCode,
    },

    /// The response echoes something that has not been requested.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
