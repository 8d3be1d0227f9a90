//! Codec for encoding and decoding rendezvous frames.
//!
//! A frame is the literal character sequence `<method>:<base64>`,
//! where `<base64>` is the standard base-64 encoding of the UTF-8 JSON
//! serialization of the payload. The same encoding is used on the
//! reliable stream and the datagram channel. Note that the empty
//! payload object `{}` still encodes to a present, non-empty base-64
//! token.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame has no `:` separator
    #[error("missing method separator")]
    MissingSeparator,

    /// Payload is not valid base-64
    #[error("invalid base64 payload")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Decoded payload is not valid UTF-8
    #[error("payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Payload is not valid JSON, or does not match the expected shape
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Encode a frame from a method name and a serializable payload.
///
/// # Errors
///
/// Returns an error if the payload fails JSON serialization.
pub fn encode<T: Serialize>(method: &str, payload: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(payload)?;
    Ok(format!("{method}:{}", STANDARD.encode(json)))
}

/// Decode a frame into its method name and raw JSON payload.
///
/// Splits once on `:`; everything left of the separator is the method,
/// everything right of it is base-64-decoded and parsed as JSON.
///
/// # Errors
///
/// Returns an error for a missing separator, bad base-64, non-UTF-8
/// payload bytes, or invalid JSON. Callers drop such input silently.
pub fn decode(input: &str) -> Result<(&str, Value), CodecError> {
    let (method, body) = input.split_once(':').ok_or(CodecError::MissingSeparator)?;
    let bytes = STANDARD.decode(body)?;
    let text = String::from_utf8(bytes)?;
    let payload = serde_json::from_str(&text)?;
    Ok((method, payload))
}

/// Interpret a decoded payload as a typed struct.
///
/// # Errors
///
/// Returns an error if the JSON does not match the expected shape.
pub fn payload<T: DeserializeOwned>(value: Value) -> Result<T, CodecError> {
    Ok(serde_json::from_value(value)?)
}
