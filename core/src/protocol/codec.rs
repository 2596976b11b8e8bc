// Payload codec — binary-to-text transform for payload bytes carried in envelopes

use data_encoding::BASE64;

pub use data_encoding::DecodeError;

/// Encode payload bytes as standard base64 (padded alphabet).
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64 text back into payload bytes.
///
/// Malformed input is an error, never a truncated result. A payload that
/// fails here is dropped whole by the caller.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64.decode(text.as_bytes())
}

// ============================================================================
// TESTS
// ============================================================================
