//! Session state: `DesfireContext` and its associated enums (§3).
//!
//! Grounded on `examples/original_source/Include/Nfc/Desfire/DesfireContext.h`
//! for the field list, extended with `authScheme` and `sessionEncRndB` per
//! the data model, and on the teacher's `SecureChannel` for key zeroization
//! on session-invalidating events.

use zeroize::Zeroize;

/// DESFire communication mode for a given command.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CommMode {
    /// No security applied to the payload.
    Plain,
    /// MAC-only; not implemented (see `SecureMessagingPolicy` design notes).
    Maced,
    /// Full CBC encryption of the payload.
    Enciphered,
}

/// Which authentication scheme produced the current session keys. Governs
/// CMAC variant, IV chaining rules, and block size.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AuthScheme {
    /// No session established.
    None,
    /// Legacy DES/2K3DES authentication (INS 0x0A).
    Legacy,
    /// ISO 2K3DES/3K3DES authentication (INS 0x1A).
    Iso,
    /// AES authentication (INS 0xAA).
    Aes,
}

/// Which session cipher family governs block size and CMAC variant, derived
/// from `sessionKeyEnc.len()` and whether the current IV is 16 bytes wide.
/// Grounded on `ValueOperationCryptoUtils.h::resolveSessionCipher`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SessionCipher {
    /// Single DES, 8-byte key, 8-byte block.
    Des,
    /// Two-key triple DES, 16-byte key, 8-byte block.
    Des3_2k,
    /// Three-key triple DES, 24-byte key, 8-byte block.
    Des3_3k,
    /// AES-128, 16-byte key, 16-byte block.
    Aes,
    /// No session established yet.
    Unknown,
}

impl SessionCipher {
    /// Block size in bytes for this cipher family.
    pub fn block_size(self) -> usize {
        match self {
            SessionCipher::Aes => 16,
            SessionCipher::Des | SessionCipher::Des3_2k | SessionCipher::Des3_3k => 8,
            SessionCipher::Unknown => 0,
        }
    }
}

/// The session of record for one authenticated (or not-yet-authenticated)
/// DESFire card dialogue. Exclusively owned by a `CardSession`; commands
/// borrow it mutably only during `parse_response`.
#[derive(Debug)]
pub struct DesfireContext {
    /// Whether a session is currently authenticated.
    pub authenticated: bool,
    /// Current communication mode for in-flight commands.
    pub comm_mode: CommMode,
    /// Which scheme authenticated the current session.
    pub auth_scheme: AuthScheme,
    /// Session encryption key (length encodes cipher: 8/16/24).
    pub session_key_enc: Vec<u8>,
    /// Session MAC key (equal to `session_key_enc` for Legacy/ISO).
    pub session_key_mac: Vec<u8>,
    /// Running CMAC/CBC initialization vector (block-size wide).
    pub iv: Vec<u8>,
    /// Currently authenticated key slot (low 4 bits significant).
    pub key_no: u8,
    /// Currently selected application ID, `000000` = PICC root.
    pub selected_aid: [u8; 3],
    /// Session-encrypted RndB, retained for legacy ChangeKey IV seeding.
    pub session_enc_rnd_b: Vec<u8>,
}

impl DesfireContext {
    /// A freshly detected card: no session, PICC root selected.
    pub fn new() -> Self {
        DesfireContext {
            authenticated: false,
            comm_mode: CommMode::Plain,
            auth_scheme: AuthScheme::None,
            session_key_enc: Vec::new(),
            session_key_mac: Vec::new(),
            iv: Vec::new(),
            key_no: 0,
            selected_aid: [0, 0, 0],
            session_enc_rnd_b: Vec::new(),
        }
    }

    /// Resolve which cipher family governs the current session.
    pub fn session_cipher(&self) -> SessionCipher {
        if self.iv.len() == 16 && self.session_key_enc.len() >= 16 {
            return SessionCipher::Aes;
        }
        match self.session_key_enc.len() {
            8 => SessionCipher::Des,
            16 => SessionCipher::Des3_2k,
            24 => SessionCipher::Des3_3k,
            _ => SessionCipher::Unknown,
        }
    }

    /// True for Legacy-scheme DES or 2K3DES sessions, where CBC/CMAC
    /// chaining resets at every command boundary instead of continuing.
    pub fn uses_legacy_des_crypto_mode(&self) -> bool {
        self.auth_scheme == AuthScheme::Legacy
            && matches!(
                self.session_cipher(),
                SessionCipher::Des | SessionCipher::Des3_2k
            )
    }

    /// Install a freshly authenticated session (end of `Authenticate`, §4.6
    /// step 11).
    pub fn install_session(
        &mut self,
        key_no: u8,
        session_key: Vec<u8>,
        auth_scheme: AuthScheme,
        session_enc_rnd_b: Vec<u8>,
    ) {
        let block_size = if session_key.len() == 16 && auth_scheme == AuthScheme::Aes {
            16
        } else {
            8
        };
        self.authenticated = true;
        self.key_no = key_no;
        self.session_key_mac = session_key.clone();
        self.session_key_enc = session_key;
        self.auth_scheme = auth_scheme;
        self.comm_mode = CommMode::Enciphered;
        self.iv = vec![0u8; block_size];
        self.session_enc_rnd_b = session_enc_rnd_b;
        debug!("session installed: key_no={} auth_scheme={:?} block_size={}", self.key_no, self.auth_scheme, block_size);
    }

    /// Clear authentication state (session keys, IV, scheme) without
    /// touching `selected_aid`. Shared by `invalidate_session` and
    /// `select_application`, which disagree on whether the AID resets.
    fn clear_auth_state(&mut self) {
        self.session_key_enc.zeroize();
        self.session_key_mac.zeroize();
        self.session_key_enc.clear();
        self.session_key_mac.clear();
        self.authenticated = false;
        self.comm_mode = CommMode::Plain;
        self.auth_scheme = AuthScheme::None;
        self.iv.clear();
        self.session_enc_rnd_b.clear();
    }

    /// Invalidate the session (same-slot `ChangeKey`, `FormatPICC`,
    /// deletion of the selected application): zeroizes key material and
    /// resets `selected_aid` to the PICC root (§3).
    pub fn invalidate_session(&mut self) {
        self.clear_auth_state();
        self.selected_aid = [0, 0, 0];
        debug!("session invalidated");
    }

    /// `selectApplication` transition: updates the selected AID and clears
    /// authentication (a new application requires re-authenticating). Unlike
    /// `invalidate_session`, the newly selected AID is preserved rather than
    /// reset to the PICC root.
    pub fn select_application(&mut self, aid: [u8; 3]) {
        trace!("selecting application {:02x?}", aid);
        self.clear_auth_state();
        self.selected_aid = aid;
    }
}

impl Default for DesfireContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DesfireContext {
    fn drop(&mut self) {
        self.session_key_enc.zeroize();
        self.session_key_mac.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_unauthenticated_plain() {
        let ctx = DesfireContext::new();
        assert!(!ctx.authenticated);
        assert_eq!(ctx.comm_mode, CommMode::Plain);
        assert!(ctx.session_key_enc.is_empty());
    }

    #[test]
    fn install_session_sets_block_size_iv() {
        let mut ctx = DesfireContext::new();
        ctx.install_session(0, vec![0u8; 16], AuthScheme::Aes, vec![]);
        assert!(ctx.authenticated);
        assert_eq!(ctx.iv.len(), 16);
        assert_eq!(ctx.session_cipher(), SessionCipher::Aes);
    }

    #[test]
    fn invalidate_session_clears_authenticated_and_keys() {
        let mut ctx = DesfireContext::new();
        ctx.install_session(1, vec![0xAAu8; 16], AuthScheme::Iso, vec![0xBBu8; 8]);
        ctx.invalidate_session();
        assert!(!ctx.authenticated);
        assert!(ctx.session_key_enc.is_empty());
        assert!(ctx.iv.is_empty());
    }
}
