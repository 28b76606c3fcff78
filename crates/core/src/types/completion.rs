//! Completion payload of a successful order.
//!
//! The signature and OCSP response are opaque base64 blobs; this crate only
//! carries them. Verifying them is a pluggable capability of the protocol
//! client.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::personal_number::PersonalNumber;

/// The authority's proof that an order finished successfully.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionData {
    /// The verified individual.
    pub user: VerifiedUser,
    /// The device the individual used.
    pub device: Device,
    /// Validity window of the individual's certificate.
    pub cert: CertValidity,
    /// Base64 XML signature.
    pub signature: String,
    /// Base64 OCSP response proving the certificate was not revoked.
    pub ocsp_response: String,
}

impl CompletionData {
    /// Checks the parts serde cannot: non-empty names and proof material.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.user.name.trim().is_empty()
            && !self.signature.is_empty()
            && !self.ocsp_response.is_empty()
            && self.cert.not_before <= self.cert.not_after
    }
}

impl fmt::Debug for CompletionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionData")
            .field("user", &self.user)
            .field("device", &self.device)
            .field("cert", &self.cert)
            .field("signature", &format_args!("[{} bytes]", self.signature.len()))
            .field(
                "ocsp_response",
                &format_args!("[{} bytes]", self.ocsp_response.len()),
            )
            .finish()
    }
}

/// Identity of the verified individual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedUser {
    /// Stable identity key.
    pub personal_number: PersonalNumber,
    /// Full display name.
    pub name: String,
    pub given_name: String,
    pub surname: String,
}

/// Network origin of the device that completed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub ip_address: String,
    /// Unique hardware identifier, when the authority reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uhi: Option<String>,
}

/// Certificate validity window. The authority sends both bounds as strings
/// of Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertValidity {
    #[serde(with = "epoch_millis_string")]
    pub not_before: DateTime<Utc>,
    #[serde(with = "epoch_millis_string")]
    pub not_after: DateTime<Utc>,
}

mod epoch_millis_string {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.timestamp_millis().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        let millis: i64 = raw
            .parse()
            .map_err(|_| D::Error::custom(format!("not epoch milliseconds: {raw}")))?;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {millis}")))
    }
}
