//! `CreateApplication` (INS=0xCA) / `DeleteApplication` (INS=0xDA) /
//! `SelectApplication` (INS=0x5A), §4.8.3.

use super::DesfireCommand;
use crate::access::KeySettings2;
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::request::DesfireRequest;
use crate::result::DesfireResult;

const CREATE_APPLICATION_COMMAND_CODE: u8 = 0xCA;
const DELETE_APPLICATION_COMMAND_CODE: u8 = 0xDA;
const SELECT_APPLICATION_COMMAND_CODE: u8 = 0x5A;

/// `CreateApplication` request parameters.
pub struct CreateApplicationOptions {
    /// 3-byte application identifier, LSB-first on the wire.
    pub aid: [u8; 3],
    /// Raw `KeySettings1` byte (behaviour flags + master-key access nibble).
    pub key_settings1: u8,
    /// Key count and cipher family for the new application.
    pub key_settings2: KeySettings2,
}

/// `CreateApplication`: one-shot, no chaining.
pub struct CreateApplicationCommand {
    options: CreateApplicationOptions,
    complete: bool,
}

impl CreateApplicationCommand {
    /// A fresh `CreateApplication` command for the given options.
    pub fn new(options: CreateApplicationOptions) -> Self {
        CreateApplicationCommand {
            options,
            complete: false,
        }
    }
}

impl DesfireCommand for CreateApplicationCommand {
    fn name(&self) -> &'static str {
        "CreateApplication"
    }

    fn build_request(&mut self, _ctx: &DesfireContext) -> Result<DesfireRequest> {
        if self.complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }

        let key_settings2_byte = self.options.key_settings2.to_byte()?;

        let mut data = Vec::with_capacity(5);
        data.extend_from_slice(&self.options.aid);
        data.push(self.options.key_settings1);
        data.push(key_settings2_byte);

        Ok(DesfireRequest::new(CREATE_APPLICATION_COMMAND_CODE, data, 0))
    }

    fn parse_response(&mut self, raw: &[u8], _ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;
        if !result.is_success() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }
        self.complete = true;
        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn reset(&mut self) {
        self.complete = false;
    }
}

/// `DeleteApplication`: one-shot, no chaining.
pub struct DeleteApplicationCommand {
    aid: [u8; 3],
    complete: bool,
}

impl DeleteApplicationCommand {
    /// A fresh `DeleteApplication` command targeting `aid`.
    pub fn new(aid: [u8; 3]) -> Self {
        DeleteApplicationCommand { aid, complete: false }
    }
}

impl DesfireCommand for DeleteApplicationCommand {
    fn name(&self) -> &'static str {
        "DeleteApplication"
    }

    fn build_request(&mut self, _ctx: &DesfireContext) -> Result<DesfireRequest> {
        if self.complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        Ok(DesfireRequest::new(
            DELETE_APPLICATION_COMMAND_CODE,
            self.aid.to_vec(),
            0,
        ))
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;
        if !result.is_success() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }
        if ctx.selected_aid == self.aid {
            ctx.invalidate_session();
        }
        self.complete = true;
        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn reset(&mut self) {
        self.complete = false;
    }
}

/// `SelectApplication`: one-shot, `[aid:3]`. On success, updates
/// `selectedAid` and clears authentication (§3: a new application requires
/// re-authenticating under one of its own keys).
pub struct SelectApplicationCommand {
    aid: [u8; 3],
    complete: bool,
}

impl SelectApplicationCommand {
    /// A fresh `SelectApplication` command targeting `aid`.
    pub fn new(aid: [u8; 3]) -> Self {
        SelectApplicationCommand { aid, complete: false }
    }
}

impl DesfireCommand for SelectApplicationCommand {
    fn name(&self) -> &'static str {
        "SelectApplication"
    }

    fn build_request(&mut self, _ctx: &DesfireContext) -> Result<DesfireRequest> {
        if self.complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        Ok(DesfireRequest::new(
            SELECT_APPLICATION_COMMAND_CODE,
            self.aid.to_vec(),
            0,
        ))
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;
        if !result.is_success() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }
        ctx.select_application(self.aid);
        self.complete = true;
        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn reset(&mut self) {
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::KeyFamily;

    #[test]
    fn create_application_encodes_key_settings2() {
        let mut cmd = CreateApplicationCommand::new(CreateApplicationOptions {
            aid: [0x01, 0x02, 0x03],
            key_settings1: 0x0F,
            key_settings2: KeySettings2 {
                key_count: 2,
                key_family: KeyFamily::Aes,
            },
        });
        let ctx = DesfireContext::new();
        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.data, vec![0x01, 0x02, 0x03, 0x0F, 0x82]);
    }

    #[test]
    fn create_application_rejects_zero_key_count() {
        let mut cmd = CreateApplicationCommand::new(CreateApplicationOptions {
            aid: [0, 0, 0],
            key_settings1: 0,
            key_settings2: KeySettings2 {
                key_count: 0,
                key_family: KeyFamily::Des2k3Des,
            },
        });
        let ctx = DesfireContext::new();
        assert!(cmd.build_request(&ctx).is_err());
    }

    #[test]
    fn delete_application_sends_aid_lsb_first() {
        let mut cmd = DeleteApplicationCommand::new([0xAA, 0xBB, 0xCC]);
        let ctx = DesfireContext::new();
        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, 0xDA);
        assert_eq!(req.data, vec![0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn delete_application_resets_selected_aid_when_currently_selected() {
        let mut cmd = DeleteApplicationCommand::new([0xAA, 0xBB, 0xCC]);
        let mut ctx = DesfireContext::new();
        ctx.selected_aid = [0xAA, 0xBB, 0xCC];
        ctx.authenticated = true;
        cmd.build_request(&ctx).unwrap();
        cmd.parse_response(&[0x00], &mut ctx).unwrap();
        assert_eq!(ctx.selected_aid, [0, 0, 0]);
        assert!(!ctx.authenticated);
    }

    #[test]
    fn delete_application_leaves_unrelated_selected_aid_untouched() {
        let mut cmd = DeleteApplicationCommand::new([0xAA, 0xBB, 0xCC]);
        let mut ctx = DesfireContext::new();
        ctx.selected_aid = [0x01, 0x02, 0x03];
        cmd.build_request(&ctx).unwrap();
        cmd.parse_response(&[0x00], &mut ctx).unwrap();
        assert_eq!(ctx.selected_aid, [0x01, 0x02, 0x03]);
    }

    #[test]
    fn select_application_updates_context_and_clears_auth() {
        let mut cmd = SelectApplicationCommand::new([0x01, 0x02, 0x03]);
        let mut ctx = DesfireContext::new();
        ctx.authenticated = true;
        cmd.build_request(&ctx).unwrap();
        cmd.parse_response(&[0x00], &mut ctx).unwrap();
        assert_eq!(ctx.selected_aid, [0x01, 0x02, 0x03]);
        assert!(!ctx.authenticated);
    }

    #[test]
    fn select_application_propagates_card_error() {
        let mut cmd = SelectApplicationCommand::new([0x00, 0x00, 0x00]);
        let ctx = DesfireContext::new();
        cmd.build_request(&ctx).unwrap();
        let mut ctx2 = DesfireContext::new();
        assert!(cmd.parse_response(&[0xA0], &mut ctx2).is_err());
    }
}
