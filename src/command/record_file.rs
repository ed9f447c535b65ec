//! `ReadRecords` (INS=0xBB) / `WriteRecord` (INS=0x3B), §4.8.5.

use super::{continuation_request, DesfireCommand};
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::request::DesfireRequest;
use crate::result::DesfireResult;
use crate::secure_messaging::{
    decrypt_trimmed_ciphertext_and_verify_crc, derive_plain_request_iv, protect_encrypted_payload,
    update_context_iv_for_encrypted_command_response,
    verify_authenticated_plain_payload_auto_mac_and_update_context_iv, EncryptedPayloadProtection,
    LegacySendIvSeedMode,
};

const READ_RECORDS_COMMAND_CODE: u8 = 0xBB;
const WRITE_RECORD_COMMAND_CODE: u8 = 0x3B;

fn append_le24(out: &mut Vec<u8>, value: u32) {
    out.push((value & 0xFF) as u8);
    out.push(((value >> 8) & 0xFF) as u8);
    out.push(((value >> 16) & 0xFF) as u8);
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Stage {
    Initial,
    AdditionalFrame,
    Writing,
    Complete,
}

/// `ReadRecords`: a single request (`fileNo ∥ recordOffset(3) ∥
/// recordCount(3)`), chained via 0xAF, with the same plain/enciphered
/// response handling as `ReadData`. `expected_data_length` must equal
/// `record_count * record_size` (§8 "record file size validation").
pub struct ReadRecordsCommand {
    file_no: u8,
    record_offset: u32,
    record_count: u32,
    record_size: u32,
    expected_data_length: u32,
    communication_settings: u8,
    stage: Stage,
    raw_payload: Vec<u8>,
    request_iv: Vec<u8>,
    data: Vec<u8>,
}

impl ReadRecordsCommand {
    /// A fresh `ReadRecords` command. `expected_data_length` must equal
    /// `record_count * record_size`.
    pub fn new(
        file_no: u8,
        record_offset: u32,
        record_count: u32,
        record_size: u32,
        communication_settings: u8,
    ) -> Result<Self> {
        if record_size == 0 {
            return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
        }
        let expected_data_length = record_count
            .checked_mul(record_size)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::ParameterError))?;
        if expected_data_length == 0 {
            return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
        }
        Ok(ReadRecordsCommand {
            file_no,
            record_offset,
            record_count,
            record_size,
            expected_data_length,
            communication_settings,
            stage: Stage::Initial,
            raw_payload: Vec::new(),
            request_iv: Vec::new(),
            data: Vec::new(),
        })
    }

    /// The decoded record bytes once complete.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl DesfireCommand for ReadRecordsCommand {
    fn name(&self) -> &'static str {
        "ReadRecords"
    }

    fn build_request(&mut self, ctx: &DesfireContext) -> Result<DesfireRequest> {
        match self.stage {
            Stage::Complete => Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState)),
            Stage::AdditionalFrame => Ok(continuation_request()),
            Stage::Initial | Stage::Writing => {
                if self.communication_settings == 0x01 {
                    return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
                }
                if self.communication_settings == 0x03 && (!ctx.authenticated || ctx.session_key_enc.is_empty()) {
                    return Err(DesfireError::from_desfire(DesfireErrorKind::AuthenticationError));
                }

                self.raw_payload.clear();
                self.request_iv.clear();

                if ctx.authenticated && self.communication_settings != 0x03 {
                    let mut message = vec![READ_RECORDS_COMMAND_CODE, self.file_no];
                    append_le24(&mut message, self.record_offset);
                    append_le24(&mut message, self.record_count);
                    self.request_iv = derive_plain_request_iv(ctx, &message, true)?;
                }

                let mut data = Vec::with_capacity(7);
                data.push(self.file_no);
                append_le24(&mut data, self.record_offset);
                append_le24(&mut data, self.record_count);
                self.stage = Stage::Writing;
                Ok(DesfireRequest::new(
                    READ_RECORDS_COMMAND_CODE,
                    data,
                    self.expected_data_length as usize,
                ))
            }
        }
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        if self.stage != Stage::Writing && self.stage != Stage::AdditionalFrame {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
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

        let expected = self.expected_data_length as usize;
        self.data = if self.communication_settings == 0x03 {
            decrypt_trimmed_ciphertext_and_verify_crc(ctx, &self.raw_payload, expected, Some(0x00))?
        } else if ctx.authenticated && !self.request_iv.is_empty() {
            verify_authenticated_plain_payload_auto_mac_and_update_context_iv(
                ctx,
                &self.raw_payload,
                result.status_code,
                &self.request_iv,
                expected,
            )?;
            self.raw_payload[..expected].to_vec()
        } else {
            if self.raw_payload.len() != expected {
                return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidResponse));
            }
            self.raw_payload.clone()
        };

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
        self.data.clear();
    }
}

/// Per-request data budget: `252 - (fileNo + offset(3) + length(3))`.
const WRITE_RECORD_HEADER_LENGTH: usize = 7;
const MAX_DESFIRE_REQUEST_DATA: usize = 252;

/// `WriteRecord`: chunks `data` into `MAX_DESFIRE_REQUEST_DATA -
/// WRITE_RECORD_HEADER_LENGTH`-sized writes, one request per chunk.
pub struct WriteRecordCommand {
    file_no: u8,
    offset: u32,
    payload: Vec<u8>,
    communication_settings: u8,
    cursor: usize,
    last_chunk_len: usize,
    stage: Stage,
    protection_state: Vec<u8>,
    legacy_des_crypto_mode: bool,
}

impl WriteRecordCommand {
    /// A fresh `WriteRecord` writing `payload` to `file_no` at `offset`.
    pub fn new(file_no: u8, offset: u32, payload: Vec<u8>, communication_settings: u8) -> Self {
        WriteRecordCommand {
            file_no,
            offset,
            payload,
            communication_settings,
            cursor: 0,
            last_chunk_len: 0,
            stage: Stage::Initial,
            protection_state: Vec::new(),
            legacy_des_crypto_mode: false,
        }
    }

    fn plain_chunk_budget(&self) -> usize {
        MAX_DESFIRE_REQUEST_DATA - WRITE_RECORD_HEADER_LENGTH
    }
}

impl DesfireCommand for WriteRecordCommand {
    fn name(&self) -> &'static str {
        "WriteRecord"
    }

    fn build_request(&mut self, ctx: &DesfireContext) -> Result<DesfireRequest> {
        if self.stage == Stage::Complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        if self.communication_settings == 0x01 {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }

        if self.stage == Stage::AdditionalFrame {
            return Ok(continuation_request());
        }

        if self.stage == Stage::Initial {
            if self.communication_settings == 0x03 && (!ctx.authenticated || ctx.session_key_enc.is_empty()) {
                return Err(DesfireError::from_desfire(DesfireErrorKind::AuthenticationError));
            }
            self.legacy_des_crypto_mode = ctx.uses_legacy_des_crypto_mode();
            self.stage = Stage::Writing;
        }

        if !self.payload.is_empty() && self.cursor >= self.payload.len() {
            self.stage = Stage::Complete;
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }

        let remaining = self.payload.len() - self.cursor;
        let budget = self.plain_chunk_budget();
        let chunk_len = remaining.min(budget);
        let chunk = &self.payload[self.cursor..self.cursor + chunk_len];
        let current_offset = self.offset + self.cursor as u32;

        let mut data = Vec::with_capacity(7 + chunk_len + 8);
        data.push(self.file_no);
        append_le24(&mut data, current_offset);
        append_le24(&mut data, chunk_len as u32);

        if self.communication_settings == 0x03 {
            let mut plaintext = chunk.to_vec();
            let crc = crate::crypto::crc::crc32_desfire(&plaintext);
            plaintext.extend_from_slice(&crc.to_le_bytes());
            let block_size = ctx.session_cipher().block_size();
            while plaintext.len() % block_size != 0 {
                plaintext.push(0);
            }
            let protection = protect_encrypted_payload(
                ctx,
                &plaintext,
                self.legacy_des_crypto_mode,
                LegacySendIvSeedMode::Zero,
            )?;
            self.protection_state = protection.request_state;
            data.extend_from_slice(&protection.encrypted_payload);
        } else {
            data.extend_from_slice(chunk);
        }

        self.last_chunk_len = chunk_len;
        Ok(DesfireRequest::new(WRITE_RECORD_COMMAND_CODE, data, 0))
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;

        if result.is_additional_frame() {
            self.stage = Stage::AdditionalFrame;
            return Ok(result);
        }
        if !result.is_success() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }

        if self.communication_settings == 0x03 {
            let protection = EncryptedPayloadProtection {
                encrypted_payload: Vec::new(),
                request_state: self.protection_state.clone(),
                update_context_iv: !self.legacy_des_crypto_mode,
            };
            update_context_iv_for_encrypted_command_response(ctx, raw, &protection)?;
        }

        self.cursor += self.last_chunk_len;
        self.stage = if self.cursor >= self.payload.len() {
            Stage::Complete
        } else {
            Stage::Writing
        };

        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.stage == Stage::Complete || self.payload.is_empty()
    }

    fn reset(&mut self) {
        self.stage = Stage::Initial;
        self.cursor = 0;
        self.last_chunk_len = 0;
        self.protection_state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_records_rejects_mismatched_expected_length() {
        assert!(ReadRecordsCommand::new(1, 0, 2, 3, 0x00).is_ok());
        let cmd = ReadRecordsCommand::new(1, 0, 0, 3, 0x00);
        assert!(cmd.is_err());
    }

    #[test]
    fn read_records_builds_offset_count_header() {
        let mut cmd = ReadRecordsCommand::new(2, 1, 3, 4, 0x00).unwrap();
        let ctx = DesfireContext::new();
        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, READ_RECORDS_COMMAND_CODE);
        assert_eq!(req.data, vec![2, 1, 0, 0, 3, 0, 0]);
    }

    #[test]
    fn write_record_completes_empty_payload() {
        let cmd = WriteRecordCommand::new(1, 0, Vec::new(), 0x00);
        assert!(cmd.is_complete());
    }
}
