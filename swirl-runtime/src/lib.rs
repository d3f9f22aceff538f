//! The distributed runtime linked into every generated per-location binary.
//!
//! Layered bottom-up: [`codec`] frames bytes on the wire, [`mux`] matches
//! inbound connections to the `(peer, port)` that is waiting for them,
//! [`port_store`] is the single-assignment dataflow store local to one
//! location, [`executor`] runs shell steps against it, [`transport`] and
//! [`broadcast`] move values between locations, and [`communicator`] is
//! the façade the compiled task graph calls into.

pub mod broadcast;
pub mod codec;
pub mod communicator;
pub mod error;
pub mod executor;
pub mod mux;
pub mod port_store;
pub mod transport;

pub use communicator::Communicator;
pub use error::{Result, RuntimeError};
