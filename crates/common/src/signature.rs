// Push-notification signatures: `sha256=<hex HMAC-SHA256 of the raw body>`.
//
// Verification decodes the caller's digest and hands it to the MAC, whose
// `verify_slice` compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature token.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Scheme prefix of the signature token.
pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature token is missing")]
    Missing,

    #[error("signature token does not start with `{SIGNATURE_PREFIX}`")]
    UnsupportedScheme,

    #[error("signature digest is not valid hex")]
    MalformedDigest,

    #[error("signature does not match request body")]
    Mismatch,
}

/// Compute the signature token for `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let digest = keyed(secret, body).finalize().into_bytes();
    format!("{SIGNATURE_PREFIX}{}", hex_encode(&digest))
}

/// Check a caller-supplied token against the body.
///
/// `token` is `None` when the header was absent.
pub fn verify(secret: &[u8], body: &[u8], token: Option<&str>) -> Result<(), SignatureError> {
    let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(SignatureError::Missing)?;
    let digest = token.strip_prefix(SIGNATURE_PREFIX).ok_or(SignatureError::UnsupportedScheme)?;
    let claimed = hex_decode(digest).ok_or(SignatureError::MalformedDigest)?;

    keyed(secret, body).verify_slice(&claimed).map_err(|_| SignatureError::Mismatch)
}

fn keyed(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac accepts keys of any size"),
    };
    mac.update(body);
    mac
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn hex_decode(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    input
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}
