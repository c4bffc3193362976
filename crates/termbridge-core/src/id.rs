//! Session identifier generation.

/// Generate a random session id (hex-encoded, 16 bytes = 32 hex chars).
///
/// `thread_rng` is a CSPRNG, so ids are not guessable and never reused in
/// practice for the lifetime of one server process.
pub fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}
