//! The byte-level serialization contract.
//!
//! `raft-core` depends only on the round-trip property a codec must satisfy
//! (`decode(encode(x)) == x`); it never picks a wire format itself. `memstore` supplies the
//! concrete implementation via `serde_json`, matching this crate's existing use of `serde_json`
//! for its own log/snapshot representations.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A byte-oriented encoder/decoder for log entries and RPC messages.
///
/// Implementations are free to choose any wire format; callers only rely on
/// `decode(encode(x)) == x` for every `T` they use. A conformance test exercising this
/// property for a concrete codec belongs next to that codec (see `memstore`'s test module for
/// the `serde_json` implementation).
pub trait RaftCodec {
    type Error: std::error::Error + Send + Sync + 'static;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Self::Error>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}
