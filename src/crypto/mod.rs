//! Cryptographic primitives and helpers (§4.2, §4.3).
//!
//! Everything here is a pure function: no session state, no I/O. The
//! session-state choreography built on top of these lives in
//! `secure_messaging`.

pub mod block;
pub mod cmac;
pub mod crc;
pub mod random;
pub mod session_key;
