//! termbridge-core: shared protocol library for the terminal session bridge.
//!
//! Provides the JSON wire envelopes, the text-frame codec, the error
//! taxonomy, and session identifier generation.

pub mod codec;
pub mod error;
pub mod id;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_client, encode_server};
pub use error::{BridgeError, BridgeResult};
pub use id::generate_session_id;
pub use messages::{ClientMessage, ServerMessage};
