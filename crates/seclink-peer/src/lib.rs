//! Encrypted instruction links.
//!
//! This is the "just works" layer. A [`Link`] carries typed
//! [`Instruction`]s over any duplex byte channel, reassembling them
//! with the frame layer and enforcing the transmission policy: nothing
//! but handshake instructions leaves a link until the RSA-mediated key
//! exchange has installed a shared session key. The [`Handshake`]
//! interceptor drives that exchange and is invisible to application
//! handlers.

pub mod error;
pub mod handshake;
pub mod instruction;
pub mod link;

pub use error::{LinkError, Result};
pub use handshake::{Handshake, HandshakeConfig};
pub use instruction::Instruction;
pub use link::{Link, LinkHandler, Receiver};
