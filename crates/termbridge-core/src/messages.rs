//! Wire envelopes for the bridge protocol.
//!
//! Every frame is one JSON object discriminated by a `type` field. Inbound
//! envelopes with an unrecognized `type` deserialize to
//! [`ClientMessage::Unknown`] so that a misbehaving client can never
//! terminate its own session.

use serde::{Deserialize, Serialize};

/// Client → server envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Raw keystrokes destined for the shell's input.
    Input { data: String },
    /// Terminal window size change.
    Resize { cols: u16, rows: u16 },
    /// Any envelope whose `type` the server does not recognize.
    #[serde(other)]
    Unknown,
}

/// Server → client envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// First envelope of every session: the shell is up and running.
    Connected {
        #[serde(rename = "terminalId")]
        terminal_id: String,
        shell: String,
        pid: u32,
    },
    /// Shell output, lossily decoded to UTF-8.
    Output { data: String },
    /// The shell ended; at most one of `code`/`signal` is set.
    Exit {
        code: Option<i32>,
        signal: Option<String>,
    },
    /// Terminal failure for this session (spawn error, capacity).
    Error { message: String },
}
