// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error recovery policy of the master.

use std::{fmt, ops::BitOr};

use crate::error::{Error, ProtocolError, TransportError};

/// Set of recovery behaviours that are enabled for a session.
///
/// ```
/// use modbus_session::ErrorRecoveryMode;
///
/// let mode = ErrorRecoveryMode::LINK | ErrorRecoveryMode::PROTOCOL;
/// assert!(mode.contains(ErrorRecoveryMode::LINK));
/// assert!(!ErrorRecoveryMode::NONE.contains(ErrorRecoveryMode::PROTOCOL));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorRecoveryMode(u8);

impl ErrorRecoveryMode {
    /// Surface every error.
    pub const NONE: Self = Self(0);

    /// Reconnect after a broken link, flush after a timeout.
    pub const LINK: Self = Self(1 << 1);

    /// Flush the input after receiving a corrupted frame.
    pub const PROTOCOL: Self = Self(1 << 2);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ErrorRecoveryMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ErrorRecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::LINK) {
            set.entry(&format_args!("LINK"));
        }
        if self.contains(Self::PROTOCOL) {
            set.entry(&format_args!("PROTOCOL"));
        }
        set.finish()
    }
}

/// What to do after a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Close and re-open the transport, then repeat the exchange.
    ReconnectAndRetry,
    /// Discard pending input, then repeat the exchange.
    FlushAndRetry,
    /// Return the error to the caller.
    Surface,
}

/// Decide how to react on `err` after `attempt` retries have already been made.
#[must_use]
pub fn decide(err: &Error, mode: ErrorRecoveryMode, attempt: usize) -> Recovery {
    if attempt >= 1 {
        return Recovery::Surface;
    }
    match err {
        Error::Transport(TransportError::Io { .. } | TransportError::NotConnected)
            if mode.contains(ErrorRecoveryMode::LINK) =>
        {
            Recovery::ReconnectAndRetry
        }
        Error::Transport(TransportError::Timeout(_)) if mode.contains(ErrorRecoveryMode::LINK) => {
            Recovery::FlushAndRetry
        }
        Error::Protocol(ProtocolError::InvalidFrame(_) | ProtocolError::HeaderMismatch { .. })
            if mode.contains(ErrorRecoveryMode::PROTOCOL) =>
        {
            Recovery::FlushAndRetry
        }
        _ => Recovery::Surface,
    }
}

#[cfg(test)]
mod tests {
    use std::{io, time::Duration};

    use super::*;
    use crate::{ExceptionCode, ExceptionResponse, FunctionCode};

    fn broken_link() -> Error {
        TransportError::io("send")(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")).into()
    }

    fn timeout() -> Error {
        TransportError::Timeout(Duration::from_millis(500)).into()
    }

    fn invalid_frame() -> Error {
        ProtocolError::InvalidFrame(io::Error::new(io::ErrorKind::InvalidData, "Invalid CRC"))
            .into()
    }

    #[test]
    fn nothing_is_recovered_without_flags() {
        for err in [broken_link(), timeout(), invalid_frame()] {
            assert_eq!(decide(&err, ErrorRecoveryMode::NONE, 0), Recovery::Surface);
        }
    }

    #[test]
    fn link_recovery() {
        let mode = ErrorRecoveryMode::LINK;
        assert_eq!(decide(&broken_link(), mode, 0), Recovery::ReconnectAndRetry);
        assert_eq!(
            decide(&TransportError::NotConnected.into(), mode, 0),
            Recovery::ReconnectAndRetry
        );
        assert_eq!(decide(&timeout(), mode, 0), Recovery::FlushAndRetry);
        assert_eq!(decide(&invalid_frame(), mode, 0), Recovery::Surface);
    }

    #[test]
    fn protocol_recovery() {
        let mode = ErrorRecoveryMode::PROTOCOL;
        assert_eq!(decide(&invalid_frame(), mode, 0), Recovery::FlushAndRetry);
        assert_eq!(
            decide(
                &ProtocolError::HeaderMismatch {
                    message: String::new()
                }
                .into(),
                mode,
                0
            ),
            Recovery::FlushAndRetry
        );
        assert_eq!(decide(&broken_link(), mode, 0), Recovery::Surface);
    }

    #[test]
    fn retry_at_most_once() {
        let mode = ErrorRecoveryMode::LINK | ErrorRecoveryMode::PROTOCOL;
        for err in [broken_link(), timeout(), invalid_frame()] {
            assert_eq!(decide(&err, mode, 1), Recovery::Surface);
        }
    }

    #[test]
    fn application_errors_are_never_retried() {
        let mode = ErrorRecoveryMode::LINK | ErrorRecoveryMode::PROTOCOL;
        let exception = ProtocolError::Exception(ExceptionResponse {
            function: FunctionCode::ReadCoils,
            exception: ExceptionCode::IllegalDataAddress,
        });
        assert_eq!(decide(&exception.into(), mode, 0), Recovery::Surface);
        assert_eq!(
            decide(&Error::InvalidArgument("count".into()), mode, 0),
            Recovery::Surface
        );
        assert_eq!(
            decide(
                &ProtocolError::CountMismatch {
                    expected: 3,
                    actual: 2
                }
                .into(),
                mode,
                0
            ),
            Recovery::Surface
        );
    }

    #[test]
    fn debug_lists_flags() {
        assert_eq!(format!("{:?}", ErrorRecoveryMode::NONE), "{}");
        assert_eq!(
            format!("{:?}", ErrorRecoveryMode::LINK | ErrorRecoveryMode::PROTOCOL),
            "{LINK, PROTOCOL}"
        );
    }
}
