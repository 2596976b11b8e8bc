// Envelope schema — typed application messages and their wire validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::codec;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Everything that can go wrong turning a frame body into an [`Envelope`],
/// plus the (practically unreachable) outbound serialization failure.
///
/// All inbound variants are recoverable at the session level: the frame
/// boundary was already honored, so the connection drops the message and
/// keeps reading.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Body is not valid envelope text.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The `type` field names no known envelope kind.
    #[error("unknown envelope type: {0:?}")]
    UnknownType(String),

    /// A field the envelope kind requires is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The payload text is not valid codec output.
    #[error("payload is not valid base64: {0}")]
    InvalidPayload(#[from] codec::DecodeError),

    /// Outbound envelope could not be serialized.
    #[error("envelope serialization failed: {0}")]
    Serialize(String),
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// One fully-validated application message.
///
/// A value of this type either carries every field its kind requires or was
/// never constructed; there is no partially-populated state to check for at
/// the point of use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Claim a display name for the sending connection.
    Register { name: String },

    /// Payload routed to another registered client. `data` is codec-encoded
    /// and travels through the relay untouched.
    Text {
        sender: String,
        receiver: String,
        data: String,
    },

    /// File payload stored by the relay under a sanitized `filename`.
    File {
        sender: String,
        receiver: String,
        filename: String,
        data: String,
    },
}

/// Raw JSON shape of an envelope as it appears inside a frame.
///
/// Every field except `type` is optional here; [`Envelope::parse`] decides
/// which ones a given kind actually requires.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

impl Envelope {
    /// Parse and validate one frame body.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope =
            serde_json::from_slice(body).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match wire.kind.as_str() {
            // The claimed name rides in the sender field.
            "REGISTER" => Ok(Envelope::Register {
                name: wire.sender.ok_or(ProtocolError::MissingField("sender"))?,
            }),
            "TEXT" => Ok(Envelope::Text {
                sender: wire.sender.ok_or(ProtocolError::MissingField("sender"))?,
                receiver: wire.receiver.ok_or(ProtocolError::MissingField("receiver"))?,
                data: wire.data.ok_or(ProtocolError::MissingField("data"))?,
            }),
            "FILE" => Ok(Envelope::File {
                sender: wire.sender.ok_or(ProtocolError::MissingField("sender"))?,
                receiver: wire.receiver.ok_or(ProtocolError::MissingField("receiver"))?,
                filename: wire.filename.ok_or(ProtocolError::MissingField("filename"))?,
                data: wire.data.ok_or(ProtocolError::MissingField("data"))?,
            }),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    /// Serialize to the JSON wire shape.
    ///
    /// Only clients build frames this way; the relay forwards received frame
    /// bytes verbatim and never re-encodes.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let wire = match self {
            Envelope::Register { name } => WireEnvelope {
                kind: "REGISTER".to_string(),
                sender: Some(name.clone()),
                receiver: None,
                filename: None,
                data: None,
            },
            Envelope::Text {
                sender,
                receiver,
                data,
            } => WireEnvelope {
                kind: "TEXT".to_string(),
                sender: Some(sender.clone()),
                receiver: Some(receiver.clone()),
                filename: None,
                data: Some(data.clone()),
            },
            Envelope::File {
                sender,
                receiver,
                filename,
                data,
            } => WireEnvelope {
                kind: "FILE".to_string(),
                sender: Some(sender.clone()),
                receiver: Some(receiver.clone()),
                filename: Some(filename.clone()),
                data: Some(data.clone()),
            },
        };
        serde_json::to_vec(&wire).map_err(|e| ProtocolError::Serialize(e.to_string()))
    }

    /// Wire tag of this envelope's kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Register { .. } => "REGISTER",
            Envelope::Text { .. } => "TEXT",
            Envelope::File { .. } => "FILE",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
