//! Syslog stream framing (RFC 6587)

use serde::{Deserialize, Serialize};

/// How messages are delimited on a stream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageTransfer {
    /// `<decimal length><space><message>`
    #[default]
    OctetCounting,
    /// `<message>\n`
    ///
    /// Messages containing newlines cannot be delimited by the receiver;
    /// pair this with a compact or newline-escaping formatter.
    NonTransparentFraming,
}

impl MessageTransfer {
    /// Frame one message for the wire
    pub fn frame(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::OctetCounting => {
                let prefix = format!("{} ", message.len());
                let mut framed = Vec::with_capacity(prefix.len() + message.len());
                framed.extend_from_slice(prefix.as_bytes());
                framed.extend_from_slice(message);
                framed
            }
            Self::NonTransparentFraming => {
                let mut framed = Vec::with_capacity(message.len() + 1);
                framed.extend_from_slice(message);
                framed.push(b'\n');
                framed
            }
        }
    }
}
