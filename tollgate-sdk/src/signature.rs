//! Webhook body signatures.
//!
//! Every settlement webhook carries an HMAC-SHA256 signature over the exact
//! JSON body that was sent:
//!
//! ```text
//! Tollgate-Signature: {unix_timestamp}.{base64_signature}
//! signature = HMAC-SHA256("{timestamp}.{json_body}", merchant_secret)
//! ```

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Tollgate-Signature";

/// Maximum allowed age of a signature (in seconds) when verifying.
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for payloads that can be carried by a [`SignedBody`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A signed webhook body: the typed payload, the exact JSON that was signed,
/// the signing timestamp and the raw HMAC bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBody<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedBody<T> {
    /// Serialize `body` and sign it with the current timestamp.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        Self::new_at(body, key, now)
    }

    /// Serialize `body` and sign it with an explicit timestamp.
    pub fn new_at(body: T, key: &[u8], timestamp: i64) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&body)?;
        let signature = hmac(key, &format!("{timestamp}.{json}"));
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    /// Rebuild a [`SignedBody`] from a received header value and raw body.
    ///
    /// Does **not** check the HMAC; call [`verify`](Self::verify) for that.
    pub fn from_header_and_body(header_value: &str, json: String) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&json)?;
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    /// Verify the HMAC and the timestamp freshness, returning the payload.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        let data = format!("{}.{}", self.timestamp, self.json);
        ring::hmac::verify(
            &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
            data.as_bytes(),
            self.signature.as_ref(),
        )?;
        check_timestamp(self.timestamp)?;
        Ok(self.body)
    }

    /// Format the full `Tollgate-Signature` header value.
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

fn hmac(key: &[u8], data: &str) -> Box<[u8]> {
    let tag = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        data.as_bytes(),
    );
    tag.as_ref().to_owned().into_boxed_slice()
}

/// Parse a `{timestamp}.{base64}` header value.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Chain, ORDER_SETTLED_EVENT, OrderSettledPayload, OrderStatus};

    fn payload() -> OrderSettledPayload {
        OrderSettledPayload {
            event_type: ORDER_SETTLED_EVENT.to_string(),
            trade_id: "T1".to_string(),
            order_id: "O1".to_string(),
            chain: Chain::Tron,
            wallet_address: "TXYZ".to_string(),
            amount: "10".to_string(),
            actual_amount: "1.42".to_string(),
            block_transaction_id: "abc".to_string(),
            status: OrderStatus::Paid,
            settled_at: 0,
        }
    }

    #[test]
    fn header_round_trip_verifies() {
        let signed = SignedBody::new(payload(), b"merchant-secret").unwrap();
        let header = signed.to_header();
        let received =
            SignedBody::<OrderSettledPayload>::from_header_and_body(&header, signed.json.clone())
                .unwrap();
        assert_eq!(received.verify(b"merchant-secret").unwrap(), payload());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let signed = SignedBody::new(payload(), b"merchant-secret").unwrap();
        assert!(matches!(
            signed.verify(b"other-secret"),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let old = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 10;
        let signed = SignedBody::new_at(payload(), b"k", old).unwrap();
        assert!(matches!(signed.verify(b"k"), Err(SignatureError::Expired)));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(matches!(
            parse_signature_header("no-dot-here"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("123.!!!"),
            Err(SignatureError::InvalidBase64)
        ));
    }
}
