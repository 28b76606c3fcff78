//! Animated QR codes and autostart links.
//!
//! The QR payload changes every second:
//!
//! ```text
//! bankid.{qrStartToken}.{seconds since order start}.{hex(HMAC-SHA256(qrStartSecret, seconds))}
//! ```
//!
//! Rendering happens server-side so the start secret never leaves the process.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

/// Error computing a QR payload.
#[derive(Debug, thiserror::Error)]
#[error("invalid QR secret: {0}")]
pub struct QrError(String);

/// Compute the QR payload for `elapsed_secs` seconds after the order started.
///
/// # Errors
///
/// Returns `QrError` if the HMAC cannot be keyed with the secret.
pub fn animated_qr_data(
    start_token: &str,
    start_secret: &SecretString,
    elapsed_secs: u64,
) -> Result<String, QrError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(start_secret.expose_secret().as_bytes())
        .map_err(|e| QrError(e.to_string()))?;
    let time = elapsed_secs.to_string();
    mac.update(time.as_bytes());
    let auth_code = hex::encode(mac.finalize().into_bytes());
    Ok(format!("bankid.{start_token}.{time}.{auth_code}"))
}

/// Link that launches the counterpart app on the same device.
#[must_use]
pub fn autostart_url(auto_start_token: &str) -> String {
    format!("bankid:///?autostarttoken={auto_start_token}&redirect=null")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOKEN: &str = "67df3917-fa0d-44e5-b327-edcc928297f8";
    const SECRET: &str = "d28db9a7-4cde-429e-a983-359be676944c";

    #[test]
    fn test_reference_vectors() {
        let secret = SecretString::from(SECRET);
        assert_eq!(
            animated_qr_data(TOKEN, &secret, 0).unwrap(),
            format!(
                "bankid.{TOKEN}.0.dc69358e712458a66a7525beef148ae8526b1c71610eff2c16cdffb4cdac9bf8"
            )
        );
        assert_eq!(
            animated_qr_data(TOKEN, &secret, 1).unwrap(),
            format!(
                "bankid.{TOKEN}.1.949d559bf23403952a94d103e67743126381eda00f0b3cbddbf7c96b1adcbce2"
            )
        );
        assert_eq!(
            animated_qr_data(TOKEN, &secret, 2).unwrap(),
            format!(
                "bankid.{TOKEN}.2.a9e5ec59cb4eee4ef4117150abc58fad7a85439a6a96ccbecc3668b41795b3f3"
            )
        );
    }

    #[test]
    fn test_autostart_url() {
        assert_eq!(
            autostart_url("auto1"),
            "bankid:///?autostarttoken=auto1&redirect=null"
        );
    }
}
