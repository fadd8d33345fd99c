//! Protocol module containing the control-protocol message type and the
//! typed event decoder.

pub mod events;
pub mod message;

pub use events::SupplicantEvent;
pub use message::{Argument, MessageKind, SupplicantMessage, Token, TokenReader};
