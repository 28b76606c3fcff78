//! `BankID` relying-party API client.
//!
//! Talks to the remote authentication authority (`/rp/v6.0`) over mutually
//! authenticated TLS and turns its answers into [`AuthOrder`] transitions.
//!
//! # Architecture
//!
//! - [`transport`] - one `reqwest::Client` carrying the PKCS#12 client identity,
//!   built once per process. No retries.
//! - [`client`] - the three remote operations (`auth`, `collect`, `cancel`) with
//!   fixed request/response contracts.
//! - [`qr`] - animated QR payloads and autostart links. The only consumer of
//!   the order's start secret.
//! - [`verify`] - pluggable checks on completion payloads.
//!
//! [`AuthOrder`]: bankid_gateway_core::AuthOrder

pub mod client;
pub mod qr;
pub mod transport;
pub mod types;
pub mod verify;

pub use client::BankIdClient;
pub use transport::{HttpTransport, RemoteError, Transport, TransportError};
pub use verify::{CompletionVerifier, TrustAuthority, VerificationError};

use bankid_gateway_core::HintCode;
use thiserror::Error;

/// Errors from the order protocol layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request never produced a usable answer.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The authority answered with a shape we do not accept.
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A `complete` answer without a usable completion payload.
    #[error("completion payload missing or incomplete")]
    IncompleteCompletion,

    /// The answer was about a different order than the one asked for.
    #[error("response was for order {received}, expected {expected}")]
    OrderMismatch {
        /// The order we asked about.
        expected: String,
        /// The order the authority answered for.
        received: String,
    },

    /// The completion payload failed verification.
    #[error("completion verification failed: {0}")]
    Verification(#[from] VerificationError),
}

impl ProtocolError {
    /// The hint code a failed `collect` is reported with.
    ///
    /// Transport trouble is the only transient case; everything else means
    /// the authority told us something we cannot act on.
    #[must_use]
    pub fn hint_code(&self) -> HintCode {
        match self {
            Self::Transport(err) if err.is_unknown_order() => HintCode::UnknownOrder,
            Self::Transport(TransportError::Decode(_))
            | Self::Malformed(_)
            | Self::IncompleteCompletion
            | Self::OrderMismatch { .. }
            | Self::Verification(_) => HintCode::MalformedResponse,
            Self::Transport(_) => HintCode::NetworkError,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_order_hint() {
        let err = ProtocolError::Transport(TransportError::Status {
            status: 400,
            error: Some(RemoteError {
                error_code: "invalidParameters".to_owned(),
                details: "No such order".to_owned(),
            }),
        });
        assert_eq!(err.hint_code(), HintCode::UnknownOrder);
    }

    #[test]
    fn test_server_errors_are_network_errors() {
        let err = ProtocolError::Transport(TransportError::Status {
            status: 503,
            error: Some(RemoteError {
                error_code: "maintenance".to_owned(),
                details: String::new(),
            }),
        });
        assert_eq!(err.hint_code(), HintCode::NetworkError);
    }

    #[test]
    fn test_shape_errors_are_malformed() {
        assert_eq!(
            ProtocolError::IncompleteCompletion.hint_code(),
            HintCode::MalformedResponse
        );
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            ProtocolError::Malformed(parse).hint_code(),
            HintCode::MalformedResponse
        );
    }
}
