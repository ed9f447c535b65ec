//! `GetValue` (INS=0x6C) / `Credit` (0x0C) / `Debit` (0xDC) / `LimitedCredit`
//! (0x1C), §4.8.6.

use super::DesfireCommand;
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::request::DesfireRequest;
use crate::result::DesfireResult;
use crate::secure_messaging::{
    decrypt_trimmed_ciphertext_and_verify_crc, protect_value_operation_request,
    update_context_iv_for_value_operation_response,
};

const CREDIT_COMMAND_CODE: u8 = 0x0C;
const DEBIT_COMMAND_CODE: u8 = 0xDC;
const LIMITED_CREDIT_COMMAND_CODE: u8 = 0x1C;
const GET_VALUE_COMMAND_CODE: u8 = 0x6C;

/// Which value-mutation command to issue; the request/response protection
/// pipeline is identical across all three (§4.7 `protectValueOperationRequest`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ValueMutationKind {
    /// `Credit` (0x0C): add to the value file.
    Credit,
    /// `Debit` (0xDC): subtract from the value file.
    Debit,
    /// `LimitedCredit` (0x1C): credit without requiring the full credit key.
    LimitedCredit,
}

impl ValueMutationKind {
    fn command_code(self) -> u8 {
        match self {
            ValueMutationKind::Credit => CREDIT_COMMAND_CODE,
            ValueMutationKind::Debit => DEBIT_COMMAND_CODE,
            ValueMutationKind::LimitedCredit => LIMITED_CREDIT_COMMAND_CODE,
        }
    }
}

/// `Credit`/`Debit`/`LimitedCredit`: one-shot, enciphered.
pub struct ValueMutationCommand {
    kind: ValueMutationKind,
    file_no: u8,
    value: i32,
    complete: bool,
    request_state: Vec<u8>,
}

impl ValueMutationCommand {
    /// A fresh value-mutation command. `value` must be non-negative (§8
    /// "validate value >= 0").
    pub fn new(kind: ValueMutationKind, file_no: u8, value: i32) -> Self {
        ValueMutationCommand {
            kind,
            file_no,
            value,
            complete: false,
            request_state: Vec::new(),
        }
    }
}

impl DesfireCommand for ValueMutationCommand {
    fn name(&self) -> &'static str {
        match self.kind {
            ValueMutationKind::Credit => "Credit",
            ValueMutationKind::Debit => "Debit",
            ValueMutationKind::LimitedCredit => "LimitedCredit",
        }
    }

    fn build_request(&mut self, ctx: &DesfireContext) -> Result<DesfireRequest> {
        if self.complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        if self.value < 0 {
            return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
        }

        let command_code = self.kind.command_code();
        let protection = protect_value_operation_request(ctx, command_code, self.file_no, self.value)?;
        self.request_state = protection.request_state;

        let mut data = Vec::with_capacity(1 + protection.encrypted_payload.len());
        data.push(self.file_no);
        data.extend_from_slice(&protection.encrypted_payload);

        Ok(DesfireRequest::new(command_code, data, 0))
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;
        if !result.is_success() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }
        update_context_iv_for_value_operation_response(ctx, raw, &self.request_state)?;
        self.complete = true;
        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn reset(&mut self) {
        self.complete = false;
        self.request_state.clear();
    }
}

/// `GetValue`: one-shot, decrypts an encrypted value + CRC trailer.
pub struct GetValueCommand {
    file_no: u8,
    complete: bool,
    value: i32,
}

impl GetValueCommand {
    /// A fresh `GetValue` command for `file_no`.
    pub fn new(file_no: u8) -> Self {
        GetValueCommand {
            file_no,
            complete: false,
            value: 0,
        }
    }

    /// The decoded 32-bit signed value once complete.
    pub fn value(&self) -> i32 {
        self.value
    }
}

impl DesfireCommand for GetValueCommand {
    fn name(&self) -> &'static str {
        "GetValue"
    }

    fn build_request(&mut self, _ctx: &DesfireContext) -> Result<DesfireRequest> {
        if self.complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        Ok(DesfireRequest::new(GET_VALUE_COMMAND_CODE, vec![self.file_no], 0))
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;
        if !result.is_success() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }

        if !ctx.authenticated {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }

        let plaintext = decrypt_trimmed_ciphertext_and_verify_crc(ctx, &result.data, 4, Some(0x00))?;
        self.value = i32::from_le_bytes([plaintext[0], plaintext[1], plaintext[2], plaintext[3]]);
        self.complete = true;
        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn reset(&mut self) {
        self.complete = false;
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_mutation_rejects_negative_value() {
        let mut cmd = ValueMutationCommand::new(ValueMutationKind::Credit, 1, -5);
        let ctx = DesfireContext::new();
        assert!(cmd.build_request(&ctx).is_err());
    }

    #[test]
    fn credit_command_name() {
        let cmd = ValueMutationCommand::new(ValueMutationKind::Credit, 1, 10);
        assert_eq!(cmd.name(), "Credit");
    }
}
