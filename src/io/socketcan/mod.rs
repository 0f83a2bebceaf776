// src/io/socketcan/mod.rs
//
// SocketCAN driver. One frame per write, one frame per read.
// Only functional on Linux; elsewhere opening an interface fails.

pub mod codec;
mod socket;

pub use codec::parse_filter;
pub use socket::CanTransport;
