//! Hint codes accompanying non-complete order statuses.
//!
//! Remote codes use the authority's `camelCase` spelling. Codes raised locally
//! (transport trouble, malformed payloads, expiry) use kebab-case. Codes
//! read off the authority's responses go through [`HintCode::from_remote`],
//! which never yields a local variant, so the two cannot be confused.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic reason code for a `Pending` or `Failed` order.
///
/// Hint codes are for logs and for choosing user guidance; they are never
/// shown verbatim to end users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HintCode {
    // Pending
    OutstandingTransaction,
    NoClient,
    Started,
    UserMobileSign,
    UserSign,
    UserCallConfirm,

    // Failed (remote)
    ExpiredTransaction,
    CertificateErr,
    UserCancel,
    Cancelled,
    StartFailed,
    UserDeclinedCall,
    NotSupportedByUserApp,
    TransactionRiskBlocked,

    // Failed (local)
    /// The authority could not be reached during a poll.
    NetworkError,
    /// The authority answered with a body we could not accept.
    MalformedResponse,
    /// The authority does not know the order reference.
    UnknownOrder,
    /// The order outlived its absolute expiry while still pending.
    Expired,
    /// The order completed but no local user could be resolved for it.
    ResolutionFailed,

    /// Any code this build does not know about yet.
    Other(String),
}

impl HintCode {
    /// The wire spelling of this code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::OutstandingTransaction => "outstandingTransaction",
            Self::NoClient => "noClient",
            Self::Started => "started",
            Self::UserMobileSign => "userMobileSign",
            Self::UserSign => "userSign",
            Self::UserCallConfirm => "userCallConfirm",
            Self::ExpiredTransaction => "expiredTransaction",
            Self::CertificateErr => "certificateErr",
            Self::UserCancel => "userCancel",
            Self::Cancelled => "cancelled",
            Self::StartFailed => "startFailed",
            Self::UserDeclinedCall => "userDeclinedCall",
            Self::NotSupportedByUserApp => "notSupportedByUserApp",
            Self::TransactionRiskBlocked => "transactionRiskBlocked",
            Self::NetworkError => "network-error",
            Self::MalformedResponse => "malformed-response",
            Self::UnknownOrder => "unknown-order",
            Self::Expired => "expired",
            Self::ResolutionFailed => "resolution-failed",
            Self::Other(code) => code,
        }
    }

    /// Whether this code was produced locally rather than by the authority.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::NetworkError
                | Self::MalformedResponse
                | Self::UnknownOrder
                | Self::Expired
                | Self::ResolutionFailed
        )
    }

    /// Parse a code reported by the authority.
    ///
    /// Local spellings are kept verbatim as [`HintCode::Other`]: only this
    /// process raises local codes.
    #[must_use]
    pub fn from_remote(s: &str) -> Self {
        match Self::from(s) {
            code if code.is_local() => Self::Other(s.to_owned()),
            code => code,
        }
    }

    /// Whether this code describes a failure worth retrying on the next tick.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError)
    }
}

impl From<&str> for HintCode {
    fn from(s: &str) -> Self {
        match s {
            "outstandingTransaction" => Self::OutstandingTransaction,
            "noClient" => Self::NoClient,
            "started" => Self::Started,
            "userMobileSign" => Self::UserMobileSign,
            "userSign" => Self::UserSign,
            "userCallConfirm" => Self::UserCallConfirm,
            "expiredTransaction" => Self::ExpiredTransaction,
            "certificateErr" => Self::CertificateErr,
            "userCancel" => Self::UserCancel,
            "cancelled" => Self::Cancelled,
            "startFailed" => Self::StartFailed,
            "userDeclinedCall" => Self::UserDeclinedCall,
            "notSupportedByUserApp" => Self::NotSupportedByUserApp,
            "transactionRiskBlocked" => Self::TransactionRiskBlocked,
            "network-error" => Self::NetworkError,
            "malformed-response" => Self::MalformedResponse,
            "unknown-order" => Self::UnknownOrder,
            "expired" => Self::Expired,
            "resolution-failed" => Self::ResolutionFailed,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for HintCode {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<HintCode> for String {
    fn from(code: HintCode) -> Self {
        code.as_str().to_owned()
    }
}

impl fmt::Display for HintCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_survive_the_wire() {
        for code in [
            HintCode::OutstandingTransaction,
            HintCode::UserSign,
            HintCode::ExpiredTransaction,
            HintCode::UserCancel,
            HintCode::NetworkError,
            HintCode::UnknownOrder,
        ] {
            assert_eq!(HintCode::from(code.as_str()), code);
        }
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let code: HintCode = serde_json::from_str("\"somethingNew\"").unwrap();
        assert_eq!(code, HintCode::Other("somethingNew".to_owned()));
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"somethingNew\"");
    }

    #[test]
    fn test_remote_parse_never_yields_local_codes() {
        for spelling in [
            "network-error",
            "malformed-response",
            "unknown-order",
            "expired",
        ] {
            let code = HintCode::from_remote(spelling);
            assert_eq!(code, HintCode::Other(spelling.to_owned()));
            assert!(!code.is_local());
        }
        assert_eq!(HintCode::from_remote("userCancel"), HintCode::UserCancel);
        assert_eq!(
            HintCode::from_remote("resolution-failed").as_str(),
            "resolution-failed"
        );
    }

    #[test]
    fn test_local_codes() {
        assert!(HintCode::Expired.is_local());
        assert!(HintCode::MalformedResponse.is_local());
        assert!(!HintCode::UserCancel.is_local());
        assert!(HintCode::NetworkError.is_transient());
        assert!(!HintCode::UnknownOrder.is_transient());
    }
}
