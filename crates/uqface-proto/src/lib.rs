//! Wire protocol for the uqface detect/replace service.
//!
//! This crate owns only the framing: [`Frame`], the magic constant, and
//! sequential encode/decode over any `tokio::io` reader/writer. It knows
//! nothing about sockets, detectors, or statistics — those live in
//! `uqface-core` and the `uqface-server`/`uqface-client` binaries.

mod frame;
pub mod io;

pub use frame::{
    read_replacement_payload, read_request, read_response, Frame, RequestError, RequestHead,
    ResponseError, MAGIC,
};
