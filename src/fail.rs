// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Canonical error taxonomy shared by every component in the runtime. Each
//! variant maps deterministically to an HTTP status code so the router can
//! turn a handler failure directly into a wire response.

use custom_error::custom_error;
use std::io;

custom_error! {
    /// Canonical failure kinds raised anywhere in the runtime.
    pub Fail
    InvalidArgument{message: String}    = "invalid argument: {message}",
    FailedPrecondition{message: String} = "failed precondition: {message}",
    NotFound{message: String}          = "not found: {message}",
    AlreadyExists{message: String}     = "already exists: {message}",
    PermissionDenied{message: String}  = "permission denied: {message}",
    Unauthenticated{message: String}   = "unauthenticated: {message}",
    OutOfRange{message: String}        = "out of range: {message}",
    ResourceExhausted{message: String} = "resource exhausted: {message}",
    Aborted{message: String}           = "aborted: {message}",
    Cancelled{message: String}         = "cancelled: {message}",
    DeadlineExceeded{message: String}  = "deadline exceeded: {message}",
    Unavailable{message: String}       = "unavailable: {message}",
    Unimplemented{message: String}     = "unimplemented: {message}",
    Internal{message: String}          = "internal error: {message}",
}

impl Fail {
    /// The HTTP status code a request handler failing with this kind should
    /// be reported as. Total over every variant.
    pub fn http_status(&self) -> u16 {
        match self {
            Fail::InvalidArgument { .. } => 400,
            Fail::FailedPrecondition { .. } => 400,
            Fail::NotFound { .. } => 404,
            Fail::AlreadyExists { .. } => 409,
            Fail::PermissionDenied { .. } => 403,
            Fail::Unauthenticated { .. } => 401,
            Fail::OutOfRange { .. } => 416,
            Fail::ResourceExhausted { .. } => 429,
            Fail::Aborted { .. } => 503,
            Fail::Cancelled { .. } => 499,
            Fail::DeadlineExceeded { .. } => 504,
            Fail::Unavailable { .. } => 503,
            Fail::Unimplemented { .. } => 501,
            Fail::Internal { .. } => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Fail::InvalidArgument { message }
            | Fail::FailedPrecondition { message }
            | Fail::NotFound { message }
            | Fail::AlreadyExists { message }
            | Fail::PermissionDenied { message }
            | Fail::Unauthenticated { message }
            | Fail::OutOfRange { message }
            | Fail::ResourceExhausted { message }
            | Fail::Aborted { message }
            | Fail::Cancelled { message }
            | Fail::DeadlineExceeded { message }
            | Fail::Unavailable { message }
            | Fail::Unimplemented { message }
            | Fail::Internal { message } => message,
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Fail::Internal { message: message.into() }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Fail::InvalidArgument { message: message.into() }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Fail::NotFound { message: message.into() }
    }
}

/// Maps raw OS errors onto the canonical kinds by `errno`, matching the fixed
/// table in the error handling design.
impl From<io::Error> for Fail {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind::*;
        let message = err.to_string();
        match err.kind() {
            WouldBlock => Fail::Aborted { message },
            TimedOut => Fail::DeadlineExceeded { message },
            PermissionDenied => Fail::PermissionDenied { message },
            NotFound => Fail::NotFound { message },
            InvalidInput | InvalidData => Fail::InvalidArgument { message },
            AlreadyExists => Fail::AlreadyExists { message },
            ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof => {
                Fail::Unavailable { message }
            }
            _ => match err.raw_os_error() {
                Some(libc::EAGAIN) => Fail::Aborted { message },
                Some(libc::ENOMEM) => Fail::ResourceExhausted { message },
                Some(libc::EINVAL) => Fail::InvalidArgument { message },
                _ => Fail::Internal { message },
            },
        }
    }
}

impl From<nix::Error> for Fail {
    fn from(err: nix::Error) -> Self {
        Fail::from(io::Error::from(err))
    }
}

impl From<std::num::ParseIntError> for Fail {
    fn from(err: std::num::ParseIntError) -> Self {
        Fail::InvalidArgument { message: err.to_string() }
    }
}

impl From<regex::Error> for Fail {
    fn from(err: regex::Error) -> Self {
        Fail::InvalidArgument { message: err.to_string() }
    }
}

impl From<rustls::Error> for Fail {
    fn from(err: rustls::Error) -> Self {
        Fail::Aborted { message: format!("TLS error: {}", err) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_total() {
        assert_eq!(Fail::not_found("x").http_status(), 404);
        assert_eq!(Fail::Cancelled { message: "x".into() }.http_status(), 499);
        assert_eq!(Fail::internal("x").http_status(), 500);
    }

    #[test]
    fn io_error_maps_would_block_to_aborted() {
        let err = io::Error::from(io::ErrorKind::WouldBlock);
        assert!(matches!(Fail::from(err), Fail::Aborted { .. }));
    }
}
