use minicbor::{CborLen, Decode, Encode};

use crate::error::TransportError;

/// Tag byte preceding a CBOR-encoded [`ControlMessage`].
pub const CONTROL: u8 = 0x01;
/// Tag byte preceding a raw stream body.
pub const STREAM: u8 = 0x02;

/// Bound on a single CONTROL frame read by the default decoder.
pub const MAX_CONTROL_FRAME: usize = 1024;

/// The set of control messages exchanged between peers. Always sent behind a
/// [`CONTROL`] tag byte.
#[derive(Encode, Decode, CborLen, Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    #[n(0)]
    StoreFile {
        #[n(0)]
        owner_id: String,
        #[n(1)]
        hashed_key: String,
        #[n(2)]
        size: u64,
    },
    #[n(1)]
    GetFile {
        #[n(0)]
        owner_id: String,
        #[n(1)]
        hashed_key: String,
    },
    #[n(2)]
    DeleteKey {
        #[n(0)]
        owner_id: String,
        #[n(1)]
        hashed_key: String,
    },
}

impl ControlMessage {
    /// Encoding a `ControlMessage` to an in-memory buffer cannot fail: the
    /// sink is infallible and every field type here has a derived `Encode`.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        minicbor::to_vec(self).expect("encoding a ControlMessage to Vec<u8> is infallible")
    }

    pub fn decode(buf: &[u8]) -> Result<Self, TransportError> {
        minicbor::decode(buf).map_err(TransportError::from)
    }
}
