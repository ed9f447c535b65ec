//! Access-rights nibble packing and key-settings bit layouts (§6).
//!
//! Grounded on `examples/drahnr-yubihsm-rs/src/domains.rs`'s `bitflags!`
//! encoding of a bit-packed settings byte, applied here to DESFire's
//! nibble-packed access-rights bytes and `KeySettings1`/`KeySettings2`.

use bitflags::bitflags;

use crate::error::{DesfireErrorKind, Result};

/// One nibble of an access-rights byte: a key slot 0x0-0xD, "free" (0xE),
/// or "denied" (0xF).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AccessRight {
    /// Operation requires authentication with this key slot (0x0-0xD).
    Key(u8),
    /// Operation never requires authentication.
    Free,
    /// Operation is never permitted.
    Denied,
}

impl AccessRight {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x0..=0xD => AccessRight::Key(nibble),
            0xE => AccessRight::Free,
            0xF => AccessRight::Denied,
            _ => unreachable!("nibble out of range"),
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            AccessRight::Key(n) => n & 0x0F,
            AccessRight::Free => 0xE,
            AccessRight::Denied => 0xF,
        }
    }
}

/// The four access rights governing a DESFire file, packed into two bytes
/// per §6: `access1 = (readWrite<<4) | change`, `access2 = (read<<4) | write`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct AccessRights {
    /// Permission to read.
    pub read: AccessRight,
    /// Permission to write.
    pub write: AccessRight,
    /// Permission to both read and write.
    pub read_write: AccessRight,
    /// Permission to change these access rights.
    pub change: AccessRight,
}

impl AccessRights {
    /// Pack into the two wire bytes `[access1, access2]`.
    pub fn to_bytes(self) -> [u8; 2] {
        let access1 = (self.read_write.to_nibble() << 4) | self.change.to_nibble();
        let access2 = (self.read.to_nibble() << 4) | self.write.to_nibble();
        [access1, access2]
    }

    /// Unpack from the two wire bytes.
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let access1 = bytes[0];
        let access2 = bytes[1];
        AccessRights {
            read_write: AccessRight::from_nibble((access1 >> 4) & 0x0F),
            change: AccessRight::from_nibble(access1 & 0x0F),
            read: AccessRight::from_nibble((access2 >> 4) & 0x0F),
            write: AccessRight::from_nibble(access2 & 0x0F),
        }
    }
}

bitflags! {
    /// `KeySettings1` bits (§6): low nibble is behaviour flags, high nibble
    /// is the master-key access-rights nibble (which key may change keys).
    pub struct KeySettings1: u8 {
        /// b0: changeKey with the master key is allowed.
        const ALLOW_CHANGE_KEY_WITH_MASTER = 0b0000_0001;
        /// b1: free directory listing without authentication.
        const FREE_LISTING = 0b0000_0010;
        /// b2: free create/delete of files/applications without authentication.
        const FREE_CREATE_DELETE = 0b0000_0100;
        /// b3: the configuration (this settings byte) may itself be changed.
        const CONFIGURATION_CHANGEABLE = 0b0000_1000;
    }
}

/// DESFire key family, packed into the high bits of `KeySettings2`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum KeyFamily {
    /// DES or 2K3DES (`0x00`).
    Des2k3Des,
    /// 3K3DES (`0x40`).
    Des3k3Des,
    /// AES-128 (`0x80`).
    Aes,
}

impl KeyFamily {
    fn high_bits(self) -> u8 {
        match self {
            KeyFamily::Des2k3Des => 0x00,
            KeyFamily::Des3k3Des => 0x40,
            KeyFamily::Aes => 0x80,
        }
    }

    fn from_high_bits(bits: u8) -> Result<Self> {
        match bits & 0xC0 {
            0x00 => Ok(KeyFamily::Des2k3Des),
            0x40 => Ok(KeyFamily::Des3k3Des),
            0x80 => Ok(KeyFamily::Aes),
            _ => Err(crate::error::DesfireError::from_desfire(
                DesfireErrorKind::ParameterError,
            )),
        }
    }
}

/// `KeySettings2`: low nibble key count (1-14), high bits key family (§6).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct KeySettings2 {
    /// Number of keys in the application (1-14).
    pub key_count: u8,
    /// Cipher family shared by all keys in the application.
    pub key_family: KeyFamily,
}

impl KeySettings2 {
    /// Encode, validating `key_count` per §4.8.3/§8 property 7.
    pub fn to_byte(self) -> Result<u8> {
        if self.key_count == 0 || self.key_count > 14 {
            return Err(crate::error::DesfireError::from_desfire(
                DesfireErrorKind::ParameterError,
            ));
        }
        Ok((self.key_family.high_bits() & 0xC0) | (self.key_count & 0x0F))
    }

    /// Decode from the wire byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let key_count = byte & 0x0F;
        if key_count == 0 || key_count > 14 {
            return Err(crate::error::DesfireError::from_desfire(
                DesfireErrorKind::ParameterError,
            ));
        }
        Ok(KeySettings2 {
            key_count,
            key_family: KeyFamily::from_high_bits(byte)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_rights_round_trip_through_bytes() {
        let rights = AccessRights {
            read: AccessRight::Key(0x0),
            write: AccessRight::Key(0x1),
            read_write: AccessRight::Free,
            change: AccessRight::Denied,
        };
        let bytes = rights.to_bytes();
        assert_eq!(AccessRights::from_bytes(bytes), rights);
    }

    #[test]
    fn access_rights_byte_layout_matches_spec() {
        let rights = AccessRights {
            read: AccessRight::Key(0x1),
            write: AccessRight::Key(0x2),
            read_write: AccessRight::Key(0x3),
            change: AccessRight::Key(0x4),
        };
        assert_eq!(rights.to_bytes(), [0x34, 0x12]);
    }

    #[test]
    fn key_settings2_rejects_zero_and_over_fourteen_keys() {
        assert!(KeySettings2 {
            key_count: 0,
            key_family: KeyFamily::Aes
        }
        .to_byte()
        .is_err());
        assert!(KeySettings2 {
            key_count: 15,
            key_family: KeyFamily::Aes
        }
        .to_byte()
        .is_err());
    }

    #[test]
    fn key_settings2_encodes_family_in_high_bits() {
        let settings = KeySettings2 {
            key_count: 3,
            key_family: KeyFamily::Aes,
        };
        assert_eq!(settings.to_byte().unwrap(), 0x83);
        assert_eq!(KeySettings2::from_byte(0x83).unwrap(), settings);
    }

    #[test]
    fn key_settings1_bits() {
        let settings = KeySettings1::ALLOW_CHANGE_KEY_WITH_MASTER | KeySettings1::FREE_LISTING;
        assert_eq!(settings.bits(), 0x03);
    }
}
