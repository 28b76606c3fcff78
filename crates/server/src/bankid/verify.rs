//! Completion payload verification.
//!
//! The authority signs every completion and attaches an OCSP response for the
//! user's certificate. By default those blobs are trusted as delivered over
//! the mutually authenticated channel; deployments that need independent
//! assurance plug in their own [`CompletionVerifier`].

use chrono::{DateTime, Utc};

use bankid_gateway_core::CompletionData;

/// Reasons a completion payload is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The user's certificate was not valid when the order completed.
    #[error("certificate not valid at {at}")]
    CertificateOutsideValidity {
        /// When the check was made.
        at: DateTime<Utc>,
    },
    /// The signature or OCSP proof did not check out.
    #[error("proof rejected: {0}")]
    ProofRejected(String),
}

/// A check applied to every `complete` payload before it is accepted.
pub trait CompletionVerifier: Send + Sync + 'static {
    /// Accept or refuse a completion.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError` if the payload must not be trusted.
    fn verify(&self, completion: &CompletionData) -> Result<(), VerificationError>;
}

/// Trusts the authority's payload, checking only the certificate window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAuthority;

impl CompletionVerifier for TrustAuthority {
    fn verify(&self, completion: &CompletionData) -> Result<(), VerificationError> {
        let now = Utc::now();
        if now < completion.cert.not_before || now > completion.cert.not_after {
            return Err(VerificationError::CertificateOutsideValidity { at: now });
        }
        Ok(())
    }
}
