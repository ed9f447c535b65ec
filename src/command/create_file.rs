//! `CreateStdDataFile` (0xCD) / `CreateBackupDataFile` (0xCB) /
//! `CreateValueFile` (0xCC) / `CreateLinearRecordFile` (0xC1) /
//! `CreateCyclicRecordFile` (0xC0), §4.8.9.
//!
//! Grounded on `examples/original_source/Src/Nfc/Desfire/Commands/Create*FileCommand.cpp`
//! and the shared `create_file_detail` helpers in
//! `examples/original_source/Include/Nfc/Desfire/Commands/CreateFileCommandUtils.h`:
//! these commands are sent in the clear regardless of the file's own
//! `communication_settings` (that byte only configures the file's future
//! access, it doesn't protect this command), so there is no secure
//! messaging here, matching the original's `(void)context;`.

use super::DesfireCommand;
use crate::access::AccessRights;
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::request::DesfireRequest;
use crate::result::DesfireResult;

const CREATE_STD_DATA_FILE_COMMAND_CODE: u8 = 0xCD;
const CREATE_BACKUP_DATA_FILE_COMMAND_CODE: u8 = 0xCB;
const CREATE_VALUE_FILE_COMMAND_CODE: u8 = 0xCC;
const CREATE_LINEAR_RECORD_FILE_COMMAND_CODE: u8 = 0xC1;
const CREATE_CYCLIC_RECORD_FILE_COMMAND_CODE: u8 = 0xC0;

const MAX_FILE_NO: u8 = 0x1F;
const MAX_LE24: u32 = 0x00FF_FFFF;
const SUPPORTED_VALUE_OPTIONS_MASK: u8 = 0x03;

fn append_le24(target: &mut Vec<u8>, value: u32) {
    target.push((value & 0xFF) as u8);
    target.push(((value >> 8) & 0xFF) as u8);
    target.push(((value >> 16) & 0xFF) as u8);
}

fn validate_common(file_no: u8, communication_settings: u8) -> Result<()> {
    if file_no > MAX_FILE_NO {
        return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
    }
    if communication_settings != 0x00 && communication_settings != 0x01 && communication_settings != 0x03 {
        return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
    }
    Ok(())
}

/// Shared shape for the one-shot, unprotected Create-file commands: build
/// `[fileNo, commSettings, access1, access2, <trailer>]` up front, send it
/// unchanged, and report the card's reply back verbatim.
struct CreateFileCommand {
    command_code: u8,
    body: Vec<u8>,
    complete: bool,
}

impl CreateFileCommand {
    fn new(command_code: u8, body: Vec<u8>) -> Self {
        CreateFileCommand {
            command_code,
            body,
            complete: false,
        }
    }

    fn build_request(&mut self) -> Result<DesfireRequest> {
        if self.complete {
            return Err(DesfireError::from_desfire(DesfireErrorKind::InvalidState));
        }
        Ok(DesfireRequest::new(self.command_code, self.body.clone(), 0))
    }

    fn parse_response(&mut self, raw: &[u8]) -> Result<DesfireResult> {
        let result = DesfireResult::parse(raw)
            .ok_or_else(|| DesfireError::from_desfire(DesfireErrorKind::InvalidResponse))?;
        if !result.is_success() {
            return Err(DesfireError::from_desfire_status(result.status_code, None));
        }
        self.complete = true;
        Ok(result)
    }
}

fn data_file_body(
    file_no: u8,
    communication_settings: u8,
    access_rights: AccessRights,
    file_size: u32,
) -> Result<Vec<u8>> {
    validate_common(file_no, communication_settings)?;
    if file_size == 0 || file_size > MAX_LE24 {
        return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
    }
    let [access1, access2] = access_rights.to_bytes();
    let mut body = vec![file_no, communication_settings, access1, access2];
    append_le24(&mut body, file_size);
    Ok(body)
}

fn record_file_body(
    file_no: u8,
    communication_settings: u8,
    access_rights: AccessRights,
    record_size: u32,
    max_records: u32,
) -> Result<Vec<u8>> {
    validate_common(file_no, communication_settings)?;
    if record_size == 0 || record_size > MAX_LE24 {
        return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
    }
    if max_records == 0 || max_records > MAX_LE24 {
        return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
    }
    let [access1, access2] = access_rights.to_bytes();
    let mut body = vec![file_no, communication_settings, access1, access2];
    append_le24(&mut body, record_size);
    append_le24(&mut body, max_records);
    Ok(body)
}

macro_rules! one_shot_create_command {
    ($name:ident, $command_name:expr) => {
        impl DesfireCommand for $name {
            fn name(&self) -> &'static str {
                $command_name
            }
            fn build_request(&mut self, _ctx: &DesfireContext) -> Result<DesfireRequest> {
                self.0.build_request()
            }
            fn parse_response(&mut self, raw: &[u8], _ctx: &mut DesfireContext) -> Result<DesfireResult> {
                self.0.parse_response(raw)
            }
            fn is_complete(&self) -> bool {
                self.0.complete
            }
            fn reset(&mut self) {
                self.0.complete = false;
            }
        }
    };
}

/// `CreateStdDataFile`: `[fileNo, commSettings, access1, access2, fileSize:le24]`.
pub struct CreateStdDataFileCommand(CreateFileCommand);

impl CreateStdDataFileCommand {
    /// A fresh `CreateStdDataFile` command.
    pub fn new(
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        file_size: u32,
    ) -> Result<Self> {
        let body = data_file_body(file_no, communication_settings, access_rights, file_size)?;
        Ok(CreateStdDataFileCommand(CreateFileCommand::new(
            CREATE_STD_DATA_FILE_COMMAND_CODE,
            body,
        )))
    }
}

one_shot_create_command!(CreateStdDataFileCommand, "CreateStdDataFile");

/// `CreateBackupDataFile`: same layout as `CreateStdDataFile` (INS 0xCB).
pub struct CreateBackupDataFileCommand(CreateFileCommand);

impl CreateBackupDataFileCommand {
    /// A fresh `CreateBackupDataFile` command.
    pub fn new(
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        file_size: u32,
    ) -> Result<Self> {
        let body = data_file_body(file_no, communication_settings, access_rights, file_size)?;
        Ok(CreateBackupDataFileCommand(CreateFileCommand::new(
            CREATE_BACKUP_DATA_FILE_COMMAND_CODE,
            body,
        )))
    }
}

one_shot_create_command!(CreateBackupDataFileCommand, "CreateBackupDataFile");

/// `CreateLinearRecordFile`: `[fileNo, commSettings, access1, access2, recordSize:le24, maxRecords:le24]`.
pub struct CreateLinearRecordFileCommand(CreateFileCommand);

impl CreateLinearRecordFileCommand {
    /// A fresh `CreateLinearRecordFile` command.
    pub fn new(
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        record_size: u32,
        max_records: u32,
    ) -> Result<Self> {
        let body = record_file_body(file_no, communication_settings, access_rights, record_size, max_records)?;
        Ok(CreateLinearRecordFileCommand(CreateFileCommand::new(
            CREATE_LINEAR_RECORD_FILE_COMMAND_CODE,
            body,
        )))
    }
}

one_shot_create_command!(CreateLinearRecordFileCommand, "CreateLinearRecordFile");

/// `CreateCyclicRecordFile`: same layout as `CreateLinearRecordFile` (INS 0xC0).
pub struct CreateCyclicRecordFileCommand(CreateFileCommand);

impl CreateCyclicRecordFileCommand {
    /// A fresh `CreateCyclicRecordFile` command.
    pub fn new(
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        record_size: u32,
        max_records: u32,
    ) -> Result<Self> {
        let body = record_file_body(file_no, communication_settings, access_rights, record_size, max_records)?;
        Ok(CreateCyclicRecordFileCommand(CreateFileCommand::new(
            CREATE_CYCLIC_RECORD_FILE_COMMAND_CODE,
            body,
        )))
    }
}

one_shot_create_command!(CreateCyclicRecordFileCommand, "CreateCyclicRecordFile");

/// `CreateValueFile`: `[fileNo, commSettings, access1, access2, lowerLimit:le32,
/// upperLimit:le32, limitedCreditValue:le32, valueOptions]`, §4.8.9.
pub struct CreateValueFileCommand(CreateFileCommand);

impl CreateValueFileCommand {
    /// A fresh `CreateValueFile` command. Limits and the limited-credit
    /// rollover value are signed 32-bit quantities on the wire; `value_options`
    /// bit0 enables `LimitedCredit`, bit1 enables free `GetValue`.
    pub fn new(
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        lower_limit: i32,
        upper_limit: i32,
        limited_credit_value: i32,
        value_options: u8,
    ) -> Result<Self> {
        validate_common(file_no, communication_settings)?;
        if lower_limit > upper_limit {
            return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
        }
        if limited_credit_value < lower_limit || limited_credit_value > upper_limit {
            return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
        }
        if value_options & !SUPPORTED_VALUE_OPTIONS_MASK != 0 {
            return Err(DesfireError::from_desfire(DesfireErrorKind::ParameterError));
        }

        let [access1, access2] = access_rights.to_bytes();
        let mut body = vec![file_no, communication_settings, access1, access2];
        body.extend_from_slice(&(lower_limit as u32).to_le_bytes());
        body.extend_from_slice(&(upper_limit as u32).to_le_bytes());
        body.extend_from_slice(&(limited_credit_value as u32).to_le_bytes());
        body.push(value_options);

        Ok(CreateValueFileCommand(CreateFileCommand::new(
            CREATE_VALUE_FILE_COMMAND_CODE,
            body,
        )))
    }
}

one_shot_create_command!(CreateValueFileCommand, "CreateValueFile");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessRight;

    fn open_access() -> AccessRights {
        AccessRights {
            read: AccessRight::Free,
            write: AccessRight::Free,
            read_write: AccessRight::Free,
            change: AccessRight::Key(0),
        }
    }

    #[test]
    fn create_std_data_file_builds_expected_wire_layout() {
        let mut cmd =
            CreateStdDataFileCommand::new(0x01, 0x00, open_access(), 0x000010).unwrap();
        let ctx = DesfireContext::new();
        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, CREATE_STD_DATA_FILE_COMMAND_CODE);
        assert_eq!(req.data, vec![0x01, 0x00, 0xE0, 0xEE, 0x10, 0x00, 0x00]);
    }

    #[test]
    fn create_std_data_file_rejects_zero_size() {
        assert!(CreateStdDataFileCommand::new(0x01, 0x00, open_access(), 0).is_err());
    }

    #[test]
    fn create_std_data_file_rejects_out_of_range_file_no() {
        assert!(CreateStdDataFileCommand::new(0x20, 0x00, open_access(), 16).is_err());
    }

    #[test]
    fn create_linear_record_file_builds_expected_wire_layout() {
        let mut cmd =
            CreateLinearRecordFileCommand::new(0x02, 0x03, open_access(), 16, 10).unwrap();
        let ctx = DesfireContext::new();
        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, CREATE_LINEAR_RECORD_FILE_COMMAND_CODE);
        assert_eq!(
            req.data,
            vec![0x02, 0x03, 0xE0, 0xEE, 16, 0, 0, 10, 0, 0]
        );
    }

    #[test]
    fn create_cyclic_record_file_rejects_zero_max_records() {
        assert!(CreateCyclicRecordFileCommand::new(0x02, 0x00, open_access(), 16, 0).is_err());
    }

    #[test]
    fn create_value_file_builds_expected_wire_layout() {
        let mut cmd = CreateValueFileCommand::new(0x03, 0x01, open_access(), 0, 1000, 0, 0x01).unwrap();
        let ctx = DesfireContext::new();
        let req = cmd.build_request(&ctx).unwrap();
        assert_eq!(req.command_code, CREATE_VALUE_FILE_COMMAND_CODE);
        let mut expected = vec![0x03, 0x01, 0xE0, 0xEE];
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&1000u32.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.push(0x01);
        assert_eq!(req.data, expected);
    }

    #[test]
    fn create_value_file_rejects_inverted_limits() {
        assert!(CreateValueFileCommand::new(0x03, 0x00, open_access(), 1000, 0, 0, 0).is_err());
    }

    #[test]
    fn create_value_file_rejects_credit_value_outside_limits() {
        assert!(CreateValueFileCommand::new(0x03, 0x00, open_access(), 0, 100, 200, 0).is_err());
    }

    #[test]
    fn create_value_file_rejects_unsupported_options_bits() {
        assert!(CreateValueFileCommand::new(0x03, 0x00, open_access(), 0, 100, 0, 0x04).is_err());
    }

    #[test]
    fn create_file_command_rejects_building_twice() {
        let mut cmd = CreateStdDataFileCommand::new(0x01, 0x00, open_access(), 16).unwrap();
        let ctx = DesfireContext::new();
        cmd.build_request(&ctx).unwrap();
        cmd.parse_response(&[0x00], &mut DesfireContext::new()).unwrap();
        assert!(cmd.build_request(&ctx).is_err());
    }

    #[test]
    fn create_file_command_propagates_card_error() {
        let mut cmd = CreateStdDataFileCommand::new(0x01, 0x00, open_access(), 16).unwrap();
        let ctx = DesfireContext::new();
        cmd.build_request(&ctx).unwrap();
        let err = cmd
            .parse_response(&[0xDE], &mut DesfireContext::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DesfireError::Desfire(_)
        ));
        assert!(!cmd.is_complete());
    }
}
