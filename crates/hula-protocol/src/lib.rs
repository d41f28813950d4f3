//! # hula-protocol
//!
//! Wire protocol for the hula request/response channel.
//!
//! A browser (or any client) invokes server-side routes over one shared
//! duplex connection and receives results matched back to the call that
//! produced them.
//!
//! ## Frame Types
//!
//! - `Hello` - Connection handshake carrying the reconnect ordinal
//! - `Call` - Invoke a route with a query
//! - `Response` - Result or error for a call, correlated by id
//! - `Reload` - Ask the client to discard its state
//!
//! ## Example
//!
//! ```rust
//! use hula_protocol::{codec, Frame, Query};
//!
//! let frame = Frame::call(1, "/todo/list", Query::new(), true);
//!
//! let text = codec::encode_text(&frame).unwrap();
//! let decoded = codec::decode_text(&text).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, decode_text, encode, encode_text, Encoding, ProtocolError};
pub use frames::{Call, Frame, FrameType, Hello, Outcome, Query, Response};
