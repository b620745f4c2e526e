//! Payload helpers for the raw byte-stream protocol.
//!
//! NearLink imposes no framing: an outbound payload is written to the stream
//! as-is, and whatever one blocking read returns is surfaced as one inbound
//! notification unit.  Message boundaries are therefore NOT preserved by the
//! link layer; a chunk may contain a partial message or several coalesced
//! ones.  The presentation layer treats each chunk as one displayable unit,
//! which is a documented limitation of the protocol, not something this
//! module attempts to repair.

/// Decodes one received chunk as text, best effort.
///
/// Invalid UTF-8 sequences are replaced with U+FFFD so a corrupt or split
/// multi-byte character never fails the whole chunk.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Encodes a text message as payload bytes.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
