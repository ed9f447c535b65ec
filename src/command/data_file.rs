//! `ReadData` (INS=0xBD) / `WriteData` (INS=0x3D), §4.8.4.

use super::{continuation_request, DesfireCommand};
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::request::DesfireRequest;
use crate::result::DesfireResult;
use crate::secure_messaging::{
    decrypt_trimmed_ciphertext_and_verify_crc, derive_plain_request_iv, protect_encrypted_payload,
    update_context_iv_for_encrypted_command_response,
    verify_authenticated_plain_payload_auto_mac_and_update_context_iv, LegacySendIvSeedMode,
};

const READ_DATA_COMMAND_CODE: u8 = 0xBD;
const WRITE_DATA_COMMAND_CODE: u8 = 0x3D;

/// Default and maximum per-request chunk size (§4.8.4): a single `ReadData`
/// or `WriteData` request never carries more than this many data bytes,
/// regardless of how large the caller's requested window is.
pub const DEFAULT_CHUNK_SIZE: usize = 240;
pub const MAX_CHUNK_SIZE: usize = 240;

fn append_le24(out: &mut Vec<u8>, value: u32) {
    out.push((value & 0xFF) as u8);
    out.push(((value >> 8) & 0xFF) as u8);
    out.push(((value >> 16) & 0xFF) as u8);
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Stage {
    Initial,
    AdditionalFrame,
    ReadChunk,
    Complete,
}

/// `ReadData`: one command instance walks the full requested window,
/// issuing one `ReadData` request per chunk (capped at [`MAX_CHUNK_SIZE`])
/// and chaining 0xAF frames within each chunk's response.
pub struct ReadDataCommand {
    file_no: u8,
    communication_settings: u8,
    current_offset: u32,
    remaining_length: u32,
    chunk_size: usize,
    stage: Stage,
    frame_data: Vec<u8>,
    last_requested_chunk_length: u32,
    request_iv: Vec<u8>,
    data: Vec<u8>,
}

impl ReadDataCommand {
    /// A fresh `ReadData` reading `length` bytes from `file_no` starting at
    /// `offset`. `communication_settings` is `0x00` (plain), `0x01`
    /// (MAC-only, unsupported), or `0x03` (enciphered).
    pub fn new(file_no: u8, offset: u32, length: u32, communication_settings: u8) -> Self {
        ReadDataCommand {
            file_no,
            communication_settings,
            current_offset: offset,
            remaining_length: length,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stage: Stage::Initial,
            frame_data: Vec::new(),
            last_requested_chunk_length: 0,
            request_iv: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Override the per-request chunk size (still capped at
    /// [`MAX_CHUNK_SIZE`]).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// The bytes accumulated so far (complete once [`is_complete`] is true).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn effective_chunk_size(&self) -> usize {
        let requested = if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        };
        requested.min(MAX_CHUNK_SIZE)
    }
}

impl DesfireCommand for ReadDataCommand {
    fn name(&self) -> &'static str {
        "ReadData"
    }

    fn build_request(&mut self, ctx: &DesfireContext) -> Result<DesfireRequest> {
        if self.stage == Stage::Complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        if self.communication_settings == 0x01 {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        if self.communication_settings == 0x03 && (!ctx.authenticated || ctx.session_key_enc.is_empty()) {
            return Err(DesfireError::from_desfire(DesfireErrorKind::AuthenticationError));
        }

        if self.stage == Stage::AdditionalFrame {
            return Ok(continuation_request());
        }

        if self.remaining_length == 0 {
            self.stage = Stage::Complete;
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }

        let chunk_cap = self.effective_chunk_size() as u32;
        let chunk_length = self.remaining_length.min(chunk_cap);

        let mut data = Vec::with_capacity(7);
        data.push(self.file_no);
        append_le24(&mut data, self.current_offset);
        append_le24(&mut data, chunk_length);

        self.request_iv.clear();
        if ctx.authenticated && self.communication_settings != 0x03 {
            let mut message = vec![READ_DATA_COMMAND_CODE, self.file_no];
            append_le24(&mut message, self.current_offset);
            append_le24(&mut message, chunk_length);
            self.request_iv = derive_plain_request_iv(ctx, &message, true)?;
        }

        self.last_requested_chunk_length = chunk_length;
        self.frame_data.clear();
        self.stage = Stage::ReadChunk;
        Ok(DesfireRequest::new(
            READ_DATA_COMMAND_CODE,
            data,
            chunk_length as usize,
        ))
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        if self.stage != Stage::ReadChunk && self.stage != Stage::AdditionalFrame {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;
        if !result.is_success() && !result.is_additional_frame() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }

        self.frame_data.extend_from_slice(&result.data);

        if result.is_additional_frame() {
            self.stage = Stage::AdditionalFrame;
            return Ok(result);
        }

        let chunk_data: Vec<u8> = if self.communication_settings == 0x03 {
            decrypt_trimmed_ciphertext_and_verify_crc(
                ctx,
                &self.frame_data,
                self.last_requested_chunk_length as usize,
                Some(0x00),
            )?
        } else if ctx.authenticated && !self.request_iv.is_empty() {
            let expected_len = self.last_requested_chunk_length as usize;
            verify_authenticated_plain_payload_auto_mac_and_update_context_iv(
                ctx,
                &self.frame_data,
                result.status_code,
                &self.request_iv,
                expected_len,
            )?;
            self.frame_data[..expected_len].to_vec()
        } else {
            self.frame_data.clone()
        };

        if chunk_data.is_empty() || chunk_data.len() > self.last_requested_chunk_length as usize {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidResponse));
        }

        let consumed = chunk_data.len() as u32;
        self.data.extend_from_slice(&chunk_data);
        self.current_offset += consumed;
        self.remaining_length -= consumed;
        self.frame_data.clear();
        self.request_iv.clear();

        self.stage = if self.remaining_length == 0 {
            Stage::Complete
        } else {
            Stage::ReadChunk
        };

        Ok(result)
    }

    fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    fn reset(&mut self) {
        self.stage = Stage::Initial;
        self.frame_data.clear();
        self.request_iv.clear();
        self.data.clear();
        self.last_requested_chunk_length = 0;
    }
}

/// `WriteData`: mirrors `ReadData`'s chunking, building ciphertext for the
/// enciphered path via `protectEncryptedPayload` with a CRC appended before
/// padding.
pub struct WriteDataCommand {
    file_no: u8,
    communication_settings: u8,
    offset: u32,
    payload: Vec<u8>,
    cursor: usize,
    chunk_size: usize,
    stage: Stage,
    last_chunk_len: usize,
    protection_state: Vec<u8>,
    protection_is_legacy: bool,
}

impl WriteDataCommand {
    /// A fresh `WriteData` writing `payload` to `file_no` starting at
    /// `offset`.
    pub fn new(file_no: u8, offset: u32, payload: Vec<u8>, communication_settings: u8) -> Self {
        WriteDataCommand {
            file_no,
            communication_settings,
            offset,
            payload,
            cursor: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stage: Stage::Initial,
            last_chunk_len: 0,
            protection_state: Vec::new(),
            protection_is_legacy: false,
        }
    }

    fn effective_chunk_size(&self) -> usize {
        let requested = if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        };
        requested.min(MAX_CHUNK_SIZE)
    }
}

impl DesfireCommand for WriteDataCommand {
    fn name(&self) -> &'static str {
        "WriteData"
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

        if self.cursor >= self.payload.len() && !self.payload.is_empty() {
            self.stage = Stage::Complete;
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }

        let chunk_cap = self.effective_chunk_size();
        let remaining = self.payload.len() - self.cursor;
        let chunk_len = remaining.min(chunk_cap);
        let chunk = &self.payload[self.cursor..self.cursor + chunk_len];

        let mut data = Vec::with_capacity(7 + chunk_len + 8);
        data.push(self.file_no);
        append_le24(&mut data, self.offset + self.cursor as u32);
        append_le24(&mut data, chunk_len as u32);

        if self.communication_settings == 0x03 {
            if !ctx.authenticated || ctx.session_key_enc.is_empty() {
                return Err(DesfireError::from_desfire(DesfireErrorKind::AuthenticationError));
            }
            let mut plaintext = chunk.to_vec();
            let crc_input = plaintext.clone();
            let crc = crate::crypto::crc::crc32_desfire(&crc_input);
            plaintext.extend_from_slice(&crc.to_le_bytes());
            let block_size = ctx.session_cipher().block_size();
            while plaintext.len() % block_size != 0 {
                plaintext.push(0);
            }
            self.protection_is_legacy = ctx.uses_legacy_des_crypto_mode();
            let protection = protect_encrypted_payload(
                ctx,
                &plaintext,
                self.protection_is_legacy,
                LegacySendIvSeedMode::Zero,
            )?;
            self.protection_state = protection.request_state;
            data.extend_from_slice(&protection.encrypted_payload);
        } else {
            data.extend_from_slice(chunk);
        }

        self.last_chunk_len = chunk_len;
        self.stage = Stage::ReadChunk;
        Ok(DesfireRequest::new(WRITE_DATA_COMMAND_CODE, data, 0))
    }

    fn parse_response(&mut self, raw: &[u8], ctx: &mut DesfireContext) -> Result<DesfireResult> {
        if self.stage != Stage::ReadChunk && self.stage != Stage::AdditionalFrame {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
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
            use crate::secure_messaging::EncryptedPayloadProtection;
            let protection = EncryptedPayloadProtection {
                encrypted_payload: Vec::new(),
                request_state: self.protection_state.clone(),
                update_context_iv: !self.protection_is_legacy,
            };
            update_context_iv_for_encrypted_command_response(ctx, raw, &protection)?;
        }

        self.cursor += self.last_chunk_len;
        self.stage = if self.cursor >= self.payload.len() {
            Stage::Complete
        } else {
            Stage::ReadChunk
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
    fn read_data_issues_two_chunks_for_chunk_4_length_5() {
        let mut cmd = ReadDataCommand::new(1, 0, 5, 0x00).with_chunk_size(4);
        let ctx = DesfireContext::new();

        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.data[4], 4);
        let mut ctx_mut = DesfireContext::new();
        cmd.parse_response(&[0x00, 1, 2, 3, 4], &mut ctx_mut).unwrap();
        assert!(!cmd.is_complete());

        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.data[4], 1);
        cmd.parse_response(&[0x00, 5], &mut ctx_mut).unwrap();
        assert!(cmd.is_complete());
        assert_eq!(cmd.data(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn read_data_rejects_mac_only_communication_settings() {
        let mut cmd = ReadDataCommand::new(1, 0, 5, 0x01);
        let ctx = DesfireContext::new();
        assert!(cmd.build_request(&ctx).is_err());
    }

    #[test]
    fn write_data_completes_empty_payload_immediately() {
        let cmd = WriteDataCommand::new(1, 0, Vec::new(), 0x00);
        assert!(cmd.is_complete());
    }

    #[test]
    fn write_data_single_chunk_plain() {
        let mut cmd = WriteDataCommand::new(1, 0, vec![0xAA, 0xBB], 0x00);
        let ctx = DesfireContext::new();
        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, WRITE_DATA_COMMAND_CODE);
        assert_eq!(&req.data[7..], &[0xAA, 0xBB]);
        let mut ctx_mut = DesfireContext::new();
        cmd.parse_response(&[0x00], &mut ctx_mut).unwrap();
        assert!(cmd.is_complete());
    }
}
