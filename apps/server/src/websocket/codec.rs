//! Binary frame codec
//!
//! Frames are MessagePack maps with named fields. Inbound frames go through
//! two gates: structural decoding into a typed packet, then the semantic
//! [`Validate`] pass. A frame that fails either gate is rejected whole.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use super::messages::ClientPacket;
use crate::validation::{Validate, ValidationError};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("failed to encode packet: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("invalid packet: {0}")]
    Invalid(#[from] ValidationError),
}

/// Encode a packet once; the result is cheap to clone per socket
pub fn encode<T: Serialize>(packet: &T) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(rmp_serde::to_vec_named(packet)?))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, ProtocolError> {
    Ok(rmp_serde::from_slice(frame)?)
}

/// Decode and validate one inbound frame
pub fn decode_client_packet(frame: &[u8]) -> Result<ClientPacket, ProtocolError> {
    let packet: ClientPacket = decode(frame)?;
    packet.validate()?;
    Ok(packet)
}
