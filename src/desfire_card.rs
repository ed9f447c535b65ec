//! `DesfireCard`: the public, ergonomic surface over the command engine
//! (§2, §4.9). Each method instantiates the matching command and drives
//! it to completion: `build_request → wire.wrap → transceive → wire.unwrap
//! → parse_response`, looping while the command reports `AdditionalFrame`
//! chaining, exactly per the data-flow diagram in §2.

use crate::access::{AccessRights, KeySettings2};
use crate::command::application::{
    CreateApplicationCommand, CreateApplicationOptions, DeleteApplicationCommand, SelectApplicationCommand,
};
use crate::command::authenticate::{AuthenticateCommand, AuthenticateOptions};
use crate::command::change_key::{ChangeKeyCommand, ChangeKeyCommandOptions};
use crate::command::create_file::{
    CreateBackupDataFileCommand, CreateCyclicRecordFileCommand, CreateLinearRecordFileCommand,
    CreateStdDataFileCommand, CreateValueFileCommand,
};
use crate::command::data_file::{ReadDataCommand, WriteDataCommand};
use crate::command::file_management::{
    ChangeFileSettingsCommand, ClearRecordFileCommand, CommitTransactionCommand, DeleteFileCommand,
    FileSettingsDetail, GetFileIdsCommand, GetFileSettingsCommand,
};
use crate::command::get_application_ids::GetApplicationIdsCommand;
use crate::command::get_version::GetVersionCommand;
use crate::command::management::{
    ChangeKeySettingsCommand, FormatPiccCommand, FreeMemoryCommand, GetCardUidCommand, GetKeySettingsCommand,
    GetKeyVersionCommand, SetConfigurationCommand,
};
use crate::command::record_file::{ReadRecordsCommand, WriteRecordCommand};
use crate::command::value::{GetValueCommand, ValueMutationCommand, ValueMutationKind};
use crate::command::DesfireCommand;
use crate::context::DesfireContext;
use crate::error::{DesfireError, DesfireErrorKind, Result};
use crate::transceiver::ApduTransceiver;
use crate::wire::Wire;

/// Drives a `DesfireCommand` to completion against `transceiver`/`wire`,
/// per the data-flow in §2. Shared by every `DesfireCard` method.
fn run<C: DesfireCommand>(
    transceiver: &mut dyn ApduTransceiver,
    wire: &dyn Wire,
    ctx: &mut DesfireContext,
    command: &mut C,
) -> Result<()> {
    loop {
        let request = command.build_request(ctx)?;
        let apdu = wire.wrap(&request.to_native_pdu());
        trace!("{}: request {:02x?}", command.name(), apdu);
        let response = transceiver.transceive(&apdu)?;
        let raw = wire.unwrap(&response.data, response.sw1, response.sw2)?;
        trace!("{}: response {:02x?}", command.name(), raw);
        if let Err(e) = command.parse_response(&raw, ctx) {
            warn!("{}: failed: {}", command.name(), e);
            return Err(e);
        }
        if command.is_complete() {
            debug!("{}: complete", command.name());
            return Ok(());
        }
    }
}

/// The public DESFire command surface. Borrows the transceiver and wire
/// for its lifetime; owns no context of its own — callers drive it
/// against whatever `DesfireContext` their `CardSession` holds.
pub struct DesfireCard<'a, T: ApduTransceiver> {
    transceiver: &'a mut T,
    wire: &'a dyn Wire,
}

impl<'a, T: ApduTransceiver> DesfireCard<'a, T> {
    pub fn new(transceiver: &'a mut T, wire: &'a dyn Wire) -> Self {
        DesfireCard { transceiver, wire }
    }

    fn run<C: DesfireCommand>(&mut self, ctx: &mut DesfireContext, command: &mut C) -> Result<()> {
        run(self.transceiver, self.wire, ctx, command)
    }

    /// §4.6: three-pass mutual authentication. On success, `ctx` carries a
    /// fresh session (`authenticated=true`, session keys, zeroed IV).
    pub fn authenticate(&mut self, ctx: &mut DesfireContext, options: AuthenticateOptions) -> Result<()> {
        let mut command = AuthenticateCommand::new(options);
        self.run(ctx, &mut command)
    }

    /// §4.8.2. Returns up to 84 application AIDs.
    pub fn get_application_ids(&mut self, ctx: &mut DesfireContext) -> Result<Vec<[u8; 3]>> {
        let mut command = GetApplicationIdsCommand::new();
        self.run(ctx, &mut command)?;
        Ok(command.aids().to_vec())
    }

    /// §4.8.3. Payload: AID + `KeySettings1` + `KeySettings2`.
    pub fn create_application(&mut self, ctx: &mut DesfireContext, aid: [u8; 3], key_settings1: u8, key_settings2: KeySettings2) -> Result<()> {
        let mut command = CreateApplicationCommand::new(CreateApplicationOptions { aid, key_settings1, key_settings2 });
        self.run(ctx, &mut command)
    }

    pub fn delete_application(&mut self, ctx: &mut DesfireContext, aid: [u8; 3]) -> Result<()> {
        let mut command = DeleteApplicationCommand::new(aid);
        self.run(ctx, &mut command)
    }

    /// Selects `aid`. On success, clears `ctx.authenticated` — a new
    /// application requires re-authenticating under one of its own keys.
    pub fn select_application(&mut self, ctx: &mut DesfireContext, aid: [u8; 3]) -> Result<()> {
        let mut command = SelectApplicationCommand::new(aid);
        self.run(ctx, &mut command)
    }

    /// §4.8.1: EV1 version info (hardware + software + production blocks).
    pub fn get_version(&mut self, ctx: &mut DesfireContext) -> Result<Vec<u8>> {
        let mut command = GetVersionCommand::new();
        self.run(ctx, &mut command)?;
        Ok(command.version_data().to_vec())
    }

    /// §4.8.4. Reads `length` bytes from `file_no` starting at `offset`,
    /// chunked per `ctx`'s reader capabilities via the command's own
    /// chunking loop.
    pub fn read_data(&mut self, ctx: &mut DesfireContext, file_no: u8, offset: u32, length: u32, communication_settings: u8) -> Result<Vec<u8>> {
        let mut command = ReadDataCommand::new(file_no, offset, length, communication_settings);
        self.run(ctx, &mut command)?;
        Ok(command.data().to_vec())
    }

    pub fn write_data(&mut self, ctx: &mut DesfireContext, file_no: u8, offset: u32, payload: Vec<u8>, communication_settings: u8) -> Result<()> {
        let mut command = WriteDataCommand::new(file_no, offset, payload, communication_settings);
        self.run(ctx, &mut command)
    }

    /// §4.8.5. `expected_data_length = record_count * record_size` is
    /// enforced by the command constructor.
    pub fn read_records(
        &mut self,
        ctx: &mut DesfireContext,
        file_no: u8,
        record_offset: u32,
        record_count: u32,
        record_size: u32,
        communication_settings: u8,
    ) -> Result<Vec<u8>> {
        let mut command = ReadRecordsCommand::new(file_no, record_offset, record_count, record_size, communication_settings)?;
        self.run(ctx, &mut command)?;
        Ok(command.data().to_vec())
    }

    pub fn write_record(&mut self, ctx: &mut DesfireContext, file_no: u8, offset: u32, payload: Vec<u8>, communication_settings: u8) -> Result<()> {
        let mut command = WriteRecordCommand::new(file_no, offset, payload, communication_settings);
        self.run(ctx, &mut command)
    }

    /// §4.8.6. Signed 32-bit stored value.
    pub fn get_value(&mut self, ctx: &mut DesfireContext, file_no: u8) -> Result<i32> {
        let mut command = GetValueCommand::new(file_no);
        self.run(ctx, &mut command)?;
        Ok(command.value())
    }

    pub fn credit(&mut self, ctx: &mut DesfireContext, file_no: u8, value: i32) -> Result<()> {
        self.value_mutation(ctx, ValueMutationKind::Credit, file_no, value)
    }

    pub fn debit(&mut self, ctx: &mut DesfireContext, file_no: u8, value: i32) -> Result<()> {
        self.value_mutation(ctx, ValueMutationKind::Debit, file_no, value)
    }

    pub fn limited_credit(&mut self, ctx: &mut DesfireContext, file_no: u8, value: i32) -> Result<()> {
        self.value_mutation(ctx, ValueMutationKind::LimitedCredit, file_no, value)
    }

    fn value_mutation(&mut self, ctx: &mut DesfireContext, kind: ValueMutationKind, file_no: u8, value: i32) -> Result<()> {
        let mut command = ValueMutationCommand::new(kind, file_no, value);
        self.run(ctx, &mut command)
    }

    /// §4.8.9 create-file family.
    pub fn create_std_data_file(&mut self, ctx: &mut DesfireContext, file_no: u8, communication_settings: u8, access_rights: AccessRights, file_size: u32) -> Result<()> {
        let mut command = CreateStdDataFileCommand::new(file_no, communication_settings, access_rights, file_size)?;
        self.run(ctx, &mut command)
    }

    pub fn create_backup_data_file(&mut self, ctx: &mut DesfireContext, file_no: u8, communication_settings: u8, access_rights: AccessRights, file_size: u32) -> Result<()> {
        let mut command = CreateBackupDataFileCommand::new(file_no, communication_settings, access_rights, file_size)?;
        self.run(ctx, &mut command)
    }

    pub fn create_linear_record_file(
        &mut self,
        ctx: &mut DesfireContext,
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        record_size: u32,
        max_records: u32,
    ) -> Result<()> {
        let mut command = CreateLinearRecordFileCommand::new(file_no, communication_settings, access_rights, record_size, max_records)?;
        self.run(ctx, &mut command)
    }

    pub fn create_cyclic_record_file(
        &mut self,
        ctx: &mut DesfireContext,
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        record_size: u32,
        max_records: u32,
    ) -> Result<()> {
        let mut command = CreateCyclicRecordFileCommand::new(file_no, communication_settings, access_rights, record_size, max_records)?;
        self.run(ctx, &mut command)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_value_file(
        &mut self,
        ctx: &mut DesfireContext,
        file_no: u8,
        communication_settings: u8,
        access_rights: AccessRights,
        lower_limit: i32,
        upper_limit: i32,
        limited_credit_value: i32,
        value_options: u8,
    ) -> Result<()> {
        let mut command = CreateValueFileCommand::new(
            file_no,
            communication_settings,
            access_rights,
            lower_limit,
            upper_limit,
            limited_credit_value,
            value_options,
        )?;
        self.run(ctx, &mut command)
    }

    pub fn delete_file(&mut self, ctx: &mut DesfireContext, file_no: u8) -> Result<()> {
        let mut command = DeleteFileCommand::new(file_no)?;
        self.run(ctx, &mut command)
    }

    pub fn get_file_ids(&mut self, ctx: &mut DesfireContext) -> Result<Vec<u8>> {
        let mut command = GetFileIdsCommand::new();
        self.run(ctx, &mut command)?;
        Ok(command.file_ids().to_vec())
    }

    /// Returns `(communication_settings, access_rights, detail)`.
    pub fn get_file_settings(&mut self, ctx: &mut DesfireContext, file_no: u8) -> Result<(u8, AccessRights, FileSettingsDetail)> {
        let mut command = GetFileSettingsCommand::new(file_no);
        self.run(ctx, &mut command)?;
        Ok((command.communication_settings(), command.access_rights().clone(), command.detail().clone()))
    }

    pub fn change_file_settings(
        &mut self,
        ctx: &mut DesfireContext,
        file_no: u8,
        new_communication_settings: u8,
        access_rights: AccessRights,
        communication_settings: u8,
    ) -> Result<()> {
        let mut command = ChangeFileSettingsCommand::new(file_no, new_communication_settings, access_rights, communication_settings)?;
        self.run(ctx, &mut command)
    }

    pub fn clear_record_file(&mut self, ctx: &mut DesfireContext, file_no: u8) -> Result<()> {
        let mut command = ClearRecordFileCommand::new(file_no)?;
        self.run(ctx, &mut command)
    }

    pub fn commit_transaction(&mut self, ctx: &mut DesfireContext) -> Result<()> {
        let mut command = CommitTransactionCommand::new();
        self.run(ctx, &mut command)
    }

    /// Returns `(key_settings1, key_settings2)` raw bytes.
    pub fn get_key_settings(&mut self, ctx: &mut DesfireContext) -> Result<(u8, u8)> {
        let mut command = GetKeySettingsCommand::new();
        self.run(ctx, &mut command)?;
        Ok((command.key_settings1(), command.key_settings2()))
    }

    pub fn change_key_settings(&mut self, ctx: &mut DesfireContext, new_key_settings1: u8) -> Result<()> {
        let mut command = ChangeKeySettingsCommand::new(new_key_settings1);
        self.run(ctx, &mut command)
    }

    pub fn get_key_version(&mut self, ctx: &mut DesfireContext, key_no: u8) -> Result<u8> {
        let mut command = GetKeyVersionCommand::new(key_no);
        self.run(ctx, &mut command)?;
        Ok(command.key_version())
    }

    /// §4.8.7: the keystone command. See `ChangeKeyCommandOptions` for the
    /// full set of inputs (old key requirement, legacy IV seed, etc).
    pub fn change_key(&mut self, ctx: &mut DesfireContext, options: ChangeKeyCommandOptions) -> Result<()> {
        let mut command = ChangeKeyCommand::new(options);
        self.run(ctx, &mut command)
    }

    /// §4.8.10: 7-byte UID, encrypted when authenticated.
    pub fn get_card_uid(&mut self, ctx: &mut DesfireContext) -> Result<[u8; 7]> {
        let mut command = GetCardUidCommand::new();
        self.run(ctx, &mut command)?;
        Ok(command.uid())
    }

    pub fn free_memory(&mut self, ctx: &mut DesfireContext) -> Result<u32> {
        let mut command = FreeMemoryCommand::new();
        self.run(ctx, &mut command)?;
        Ok(command.free_bytes())
    }

    /// Resets the PICC to factory state. On success the session is no
    /// longer valid (`ctx.invalidate_session()` has already run).
    pub fn format_picc(&mut self, ctx: &mut DesfireContext) -> Result<()> {
        let mut command = FormatPiccCommand::new();
        self.run(ctx, &mut command)
    }

    pub fn set_configuration(&mut self, ctx: &mut DesfireContext, subcommand: u8, plaintext_payload: Vec<u8>) -> Result<()> {
        let mut command = SetConfigurationCommand::new(subcommand, plaintext_payload);
        self.run(ctx, &mut command)
    }
}

/// Guard used by callers that want a hard error instead of a silent no-op
/// when a command is attempted on an unauthenticated context that requires
/// a session (most enciphered/MACed operations do).
pub fn require_authenticated(ctx: &DesfireContext) -> Result<()> {
    if ctx.authenticated {
        Ok(())
    } else {
        Err(DesfireError::from_desfire(DesfireErrorKind::AuthenticationError))
    }
}
