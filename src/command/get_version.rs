//! `GetVersion` (INS=0x60, §4.8.1).

use super::{continuation_request, DesfireCommand};
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::request::DesfireRequest;
use crate::result::DesfireResult;

const GET_VERSION_COMMAND_CODE: u8 = 0x60;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Stage {
    Initial,
    AdditionalFrame,
    Complete,
}

/// Accumulates the EV1 version layout: two 7-byte blocks (hardware,
/// software) plus a 14-byte production block, across up to three frames.
pub struct GetVersionCommand {
    stage: Stage,
    version_data: Vec<u8>,
}

impl GetVersionCommand {
    /// A fresh `GetVersion` command.
    pub fn new() -> Self {
        GetVersionCommand {
            stage: Stage::Initial,
            version_data: Vec::new(),
        }
    }

    /// The accumulated raw version bytes once complete.
    pub fn version_data(&self) -> &[u8] {
        &self.version_data
    }
}

impl Default for GetVersionCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl DesfireCommand for GetVersionCommand {
    fn name(&self) -> &'static str {
        "GetVersion"
    }

    fn build_request(&mut self, _ctx: &DesfireContext) -> Result<DesfireRequest> {
        match self.stage {
            Stage::Initial => Ok(DesfireRequest::new(GET_VERSION_COMMAND_CODE, Vec::new(), 0)),
            Stage::AdditionalFrame => Ok(continuation_request()),
            Stage::Complete => Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState)),
        }
    }

    fn parse_response(&mut self, raw: &[u8], _ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;

        if !result.is_success() && !result.is_additional_frame() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }

        self.version_data.extend_from_slice(&result.data);
        self.stage = if result.is_additional_frame() {
            Stage::AdditionalFrame
        } else {
            Stage::Complete
        };

        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    fn reset(&mut self) {
        self.stage = Stage::Initial;
        self.version_data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_through_two_additional_frames_then_completes() {
        let mut cmd = GetVersionCommand::new();
        let ctx = DesfireContext::new();

        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, GET_VERSION_COMMAND_CODE);

        let mut ctx_mut = DesfireContext::new();
        cmd.parse_response(&[0xAF, 1, 2, 3, 4, 5, 6, 7], &mut ctx_mut).unwrap();
        assert!(!cmd.is_complete());

        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, 0xAF);
        cmd.parse_response(&[0xAF, 8, 9, 10, 11, 12, 13, 14], &mut ctx_mut)
            .unwrap();
        assert!(!cmd.is_complete());

        cmd.parse_response(&[0x00, 15, 16], &mut ctx_mut).unwrap();
        assert!(cmd.is_complete());
        assert_eq!(cmd.version_data().len(), 16);
    }

    #[test]
    fn propagates_card_error_status() {
        let mut cmd = GetVersionCommand::new();
        let mut ctx = DesfireContext::new();
        let err = cmd.parse_response(&[0xAE], &mut ctx).unwrap_err();
        assert!(matches!(err, DesfireError::Desfire(_)));
    }
}
