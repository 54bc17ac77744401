// src/api/signature.rs
//
// Stripe signs each delivery with `Stripe-Signature: t=<unix>,v1=<hex>`,
// where v1 is HMAC-SHA256 over "<t>.<raw body>" keyed with the endpoint
// secret. Verification happens on the raw bytes, before any JSON parsing.

use std::fmt;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

/// Deliveries whose signature timestamp is further than this from now are
/// rejected (replay guard).
const TOLERANCE_SECS: i64 = 300;

#[derive(Debug)]
pub enum SignatureError {
    Header(String),
    Expired,
    Mismatch,
    Payload(String),
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::Header(e) => write!(f, "invalid signature header: {e}"),
            SignatureError::Expired => write!(f, "signature timestamp outside tolerance"),
            SignatureError::Mismatch => write!(f, "signature mismatch"),
            SignatureError::Payload(e) => write!(f, "invalid event payload: {e}"),
        }
    }
}

/// A verified billing event. `data.object` keeps the provider shape as raw
/// JSON; handlers pull out the fields they need.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Provider-side creation time, unix seconds. Used to order events.
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EventData {
    #[schema(value_type = Object)]
    pub object: Value,
}

struct SignatureParts {
    timestamp: i64,
    signature: String,
}

fn parse_signature_header(header: &str) -> Result<SignatureParts, SignatureError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(SignatureError::Header("expected key=value pairs".to_string()));
        };
        match key.trim() {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signature = Some(value.to_string()),
            _ => {} // other signature schemes are ignored
        }
    }

    Ok(SignatureParts {
        timestamp: timestamp
            .ok_or_else(|| SignatureError::Header("missing timestamp".to_string()))?,
        signature: signature
            .ok_or_else(|| SignatureError::Header("missing v1 signature".to_string()))?,
    })
}

fn compute_signature(secret: &str, timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Hex signature for a timestamped payload. Counterpart of [`verify_event`];
/// tests use it to produce valid `Stripe-Signature` headers.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    hex::encode(compute_signature(secret, timestamp, body))
}

/// Verify the signature header against the raw body and parse the event.
/// Nothing downstream runs unless this succeeds.
pub fn verify_event(
    body: &[u8],
    header: &str,
    secret: &str,
) -> Result<StripeEvent, SignatureError> {
    let parts = parse_signature_header(header)?;

    let now = Utc::now().timestamp();
    if (now - parts.timestamp).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let provided = hex::decode(&parts.signature)
        .map_err(|_| SignatureError::Header("signature is not hex".to_string()))?;
    let expected = compute_signature(secret, parts.timestamp, body);

    if expected.ct_eq(&provided).unwrap_u8() != 1 {
        return Err(SignatureError::Mismatch);
    }

    serde_json::from_slice(body).map_err(|e| SignatureError::Payload(e.to_string()))
}
