//! `GetApplicationIDs` (INS=0x6A, §4.8.2).

use super::{continuation_request, DesfireCommand};
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::request::DesfireRequest;
use crate::result::DesfireResult;
use crate::secure_messaging::{derive_plain_request_iv, verify_authenticated_plain_payload_and_update_context_iv};

const GET_APPLICATION_IDS_COMMAND_CODE: u8 = 0x6A;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Stage {
    Initial,
    AdditionalFrame,
    Complete,
}

/// Accumulates up to 84 AIDs (28 per frame, up to 3 chained frames), with
/// CMAC `AutoMac` verification on the final frame when authenticated.
pub struct GetApplicationIdsCommand {
    stage: Stage,
    raw_payload: Vec<u8>,
    request_iv: Vec<u8>,
    aids: Vec<[u8; 3]>,
}

impl GetApplicationIdsCommand {
    /// A fresh `GetApplicationIDs` command.
    pub fn new() -> Self {
        GetApplicationIdsCommand {
            stage: Stage::Initial,
            raw_payload: Vec::new(),
            request_iv: Vec::new(),
            aids: Vec::new(),
        }
    }

    /// The parsed AID triplets once complete.
    pub fn aids(&self) -> &[[u8; 3]] {
        &self.aids
    }

    fn try_auto_mac(
        &self,
        ctx: &mut DesfireContext,
        status: u8,
    ) -> Result<usize> {
        for &mac_len in &[8usize, 4, 0] {
            if self.raw_payload.len() < mac_len {
                continue;
            }
            let payload_len = self.raw_payload.len() - mac_len;
            if payload_len % 3 != 0 {
                continue;
            }
            if verify_authenticated_plain_payload_and_update_context_iv(
                ctx,
                &self.raw_payload,
                status,
                &self.request_iv,
                payload_len,
                mac_len,
            )
            .is_ok()
            {
                return Ok(payload_len);
            }
        }
        Err(DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))
    }
}

impl Default for GetApplicationIdsCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl DesfireCommand for GetApplicationIdsCommand {
    fn name(&self) -> &'static str {
        "GetApplicationIDs"
    }

    fn build_request(&mut self, ctx: &DesfireContext) -> Result<DesfireRequest> {
        match self.stage {
            Stage::Initial => {
                if ctx.authenticated {
                    self.request_iv = derive_plain_request_iv(ctx, &[GET_APPLICATION_IDS_COMMAND_CODE], true)?;
                }
                Ok(DesfireRequest::new(GET_APPLICATION_IDS_COMMAND_CODE, Vec::new(), 0))
            }
            Stage::AdditionalFrame => Ok(continuation_request()),
            Stage::Complete => Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState)),
        }
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;

        if !result.is_success() && !result.is_additional_frame() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }

        self.raw_payload.extend_from_slice(&result.data);

        if result.is_additional_frame() {
            self.stage = Stage::AdditionalFrame;
            return Ok(result);
        }

        let payload_len = if ctx.authenticated && !self.request_iv.is_empty() {
            self.try_auto_mac(ctx, result.status_code)?
        } else {
            if self.raw_payload.len() % 3 != 0 {
                return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidResponse));
            }
            self.raw_payload.len()
        };

        self.aids = self.raw_payload[..payload_len]
            .chunks(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        self.stage = Stage::Complete;
        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    fn reset(&mut self) {
        self.stage = Stage::Initial;
        self.raw_payload.clear();
        self.request_iv.clear();
        self.aids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_parses_plain_aid_triplets() {
        let mut cmd = GetApplicationIdsCommand::new();
        let ctx = DesfireContext::new();
        cmd.build_request(&ctx).unwrap();

        let mut ctx_mut = DesfireContext::new();
        cmd.parse_response(&[0x00, 0x01, 0x02, 0x03], &mut ctx_mut).unwrap();
        assert!(cmd.is_complete());
        assert_eq!(cmd.aids(), &[[0x01, 0x02, 0x03]]);
    }

    #[test]
    fn rejects_non_triplet_aligned_plain_payload() {
        let mut cmd = GetApplicationIdsCommand::new();
        let mut ctx = DesfireContext::new();
        assert!(cmd.parse_response(&[0x00, 0x01, 0x02], &mut ctx).is_err());
    }
}
