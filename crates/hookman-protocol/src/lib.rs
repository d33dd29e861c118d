//! Wire protocol for the Hookman client.
//!
//! This crate defines what the client and the service say to each other:
//!
//! - **Types** ([`Command`], [`OutboundEnvelope`], [`Envelope`],
//!   [`Inbound`], etc.): the frames that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those frames are
//!   converted to and from text.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! ```text
//! Transport (text frames) → Protocol (Envelope) → Client (dispatch)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    AuthOutcome, Command, Envelope, EnvelopeType, Inbound, OutboundEnvelope,
    RequestId, RequestIds,
};
