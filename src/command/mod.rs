//! `DesfireCommand`: the state-machine trait every DESFire command
//! implements (§4.8), plus the command family modules.
//!
//! Grounded on `examples/original_source/Include/Nfc/Desfire/IDesfireCommand.h`'s
//! five-method interface. This shape (rather than the teacher's serde
//! `Command`/`Response` traits in `get_pseudo_random.rs`/`put_opaque.rs`)
//! is the right fit here: DESFire commands are stateful multi-frame
//! dialogues, not one-shot request/response pairs over a generic
//! serialization format.

pub mod application;
pub mod authenticate;
pub mod change_key;
pub mod create_file;
pub mod data_file;
pub mod file_management;
pub mod get_application_ids;
pub mod get_version;
pub mod management;
pub mod record_file;
pub mod value;

use crate::context::DesfireContext;
use crate::error::Result;
use crate::request::DesfireRequest;
use crate::result::DesfireResult;

/// Status byte meaning "additional frame follows" (§3, §4.8.11).
pub const ADDITIONAL_FRAME_STATUS: u8 = 0xAF;
/// Command code used to request the next chained frame.
pub const ADDITIONAL_FRAME_COMMAND_CODE: u8 = 0xAF;

/// A DESFire command's state machine (§4.8, design notes "Command polymorphism").
pub trait DesfireCommand {
    /// Human-readable command name, for logging.
    fn name(&self) -> &'static str;

    /// Build the next request to send. Errors if called out of sequence
    /// (e.g. after `is_complete()` is already `true`).
    fn build_request(&mut self, ctx: &DesfireContext) -> Result<DesfireRequest>;

    /// Parse the card's reply to the most recent request, advancing the
    /// state machine. May mutate `ctx` (IV progression, session install).
    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult>;

    /// `true` once the command has reached its terminal state.
    fn is_complete(&self) -> bool;

    /// Reset to the initial state, discarding any accumulated data.
    fn reset(&mut self);
}

/// Build the continuation request sent while the card keeps returning
/// `AdditionalFrame` (§4.8.11): `[0xAF]` with no data.
pub fn continuation_request() -> DesfireRequest {
    DesfireRequest::new(ADDITIONAL_FRAME_COMMAND_CODE, Vec::new(), 0)
}
