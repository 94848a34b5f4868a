//! Real-time chat coordination.
//!
//! A socket is authenticated once at handshake and becomes a [`Connection`].
//! The [`SessionRegistry`] maps each connection to at most one live
//! conversational handle bound to a chat; the [`EventRouter`] turns inbound
//! events into store writes, model calls and outbound events.

pub mod events;
pub mod registry;
pub mod router;

pub use events::{ClientEvent, EventSink, FrameError, SendMessagePayload, ServerEvent};
pub use registry::{ConnectionId, LiveSession, RegistryError, SessionRegistry};
pub use router::{Connection, EventRouter};
