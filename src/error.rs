//! Tagged error taxonomy shared by every layer of the command engine.
//!
//! Each layer (`Hardware`, `Link`, `Pn532`, `Rc522`, `CardManager`, `Apdu`,
//! `Desfire`) gets its own `Kind` enum and is wrapped in the generic
//! [`Error<T>`] carrier. The top-level [`DesfireError`] sum type tags which
//! layer produced a failure so callers can match on it without downcasting.

pub use failure::{Backtrace, Context, Fail};
use std::error::Error as StdError;
use std::fmt::{self, Display};

/// Placeholder for when we have no description for an error
const NO_DESCRIPTION: &str = "(no description)";

/// Error types used by this library
#[derive(Debug)]
pub struct Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    inner: Context<T>,
    description: Option<String>,
}

impl<T> Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    /// Create a new error type from its kind
    pub fn new(kind: T, description: Option<String>) -> Self {
        Self {
            inner: Context::new(kind),
            description,
        }
    }

    /// Obtain the error's `Kind`
    pub fn kind(&self) -> T {
        *self.inner.get_context()
    }
}

impl<T> Display for Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.description {
            None => Display::fmt(&self.inner, f),
            Some(ref desc) => {
                if desc == NO_DESCRIPTION {
                    Display::fmt(&self.inner, f)
                } else {
                    write!(f, "{}: {}", &self.inner, desc)
                }
            }
        }
    }
}

impl<T> StdError for Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    fn description(&self) -> &str {
        match self.description {
            Some(ref s) => s,
            None => NO_DESCRIPTION,
        }
    }
}

/// Hardware-layer error kinds: timeout, bus error, framing error, overflow.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum HardwareErrorKind {
    #[fail(display = "reader timed out")]
    Timeout,
    #[fail(display = "bus error")]
    BusError,
    #[fail(display = "framing error")]
    FramingError,
    #[fail(display = "buffer overflow")]
    Overflow,
}

/// Link-layer error kinds: NACK, bad checksum, unexpected disconnect.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum LinkErrorKind {
    #[fail(display = "negative acknowledgement")]
    Nack,
    #[fail(display = "checksum mismatch")]
    ChecksumMismatch,
    #[fail(display = "link disconnected")]
    Disconnected,
}

/// PN532-specific error kinds (malformed reader frame/ack handling).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum Pn532ErrorKind {
    #[fail(display = "unexpected ACK frame")]
    UnexpectedAck,
    #[fail(display = "malformed PN532 frame")]
    MalformedFrame,
    #[fail(display = "PN532 application-level error: 0x{:02x}", code)]
    ApplicationError {
        /// Error byte as reported by the PN532
        code: u8,
    },
}

/// RC522-specific error kinds.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum Rc522ErrorKind {
    #[fail(display = "collision detected")]
    Collision,
    #[fail(display = "RC522 timeout")]
    Timeout,
}

/// CardManager-layer error kinds.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum CardManagerErrorKind {
    #[fail(display = "no card present")]
    NoCardPresent,
    #[fail(display = "multiple cards present")]
    MultipleCards,
    #[fail(display = "unsupported card type")]
    UnsupportedCardType,
    #[fail(display = "authentication required")]
    AuthenticationRequired,
    #[fail(display = "operation failed")]
    OperationFailed,
    #[fail(display = "invalid parameter")]
    InvalidParameter,
}

/// ISO 7816-4 APDU error kinds, emitted only by the ISO wire.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum ApduErrorKind {
    #[fail(display = "wrong length")]
    WrongLength,
    #[fail(display = "security status not satisfied")]
    SecurityStatusNotSatisfied,
    #[fail(display = "conditions not satisfied")]
    ConditionsNotSatisfied,
    #[fail(display = "file not found")]
    FileNotFound,
    #[fail(display = "wrong P1/P2")]
    WrongParameters,
    #[fail(display = "unknown status word: SW1=0x{:02x} SW2=0x{:02x}", sw1, sw2)]
    UnknownStatusWord {
        /// Status word 1
        sw1: u8,
        /// Status word 2
        sw2: u8,
    },
}

/// DESFire status-byte/internal logic error kinds (§4.1, §7 of the design notes).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum DesfireErrorKind {
    #[fail(display = "no changes done to backup files")]
    NoChanges,
    #[fail(display = "CRC or MAC integrity error")]
    IntegrityError,
    #[fail(display = "no such key")]
    NoSuchKey,
    #[fail(display = "length error")]
    LengthError,
    #[fail(display = "permission denied")]
    PermissionDenied,
    #[fail(display = "parameter error")]
    ParameterError,
    #[fail(display = "application not found")]
    ApplicationNotFound,
    #[fail(display = "authentication error")]
    AuthenticationError,
    #[fail(display = "additional frame")]
    AdditionalFrame,
    #[fail(display = "boundary error")]
    BoundaryError,
    #[fail(display = "command aborted")]
    CommandAborted,
    #[fail(display = "count error")]
    CountError,
    #[fail(display = "duplicate error")]
    DuplicateError,
    #[fail(display = "file not found")]
    FileNotFound,
    #[fail(display = "unknown DESFire status code: 0x{:02x}", code)]
    Unknown {
        /// Raw status byte
        code: u8,
    },
    /// Command invoked out of sequence (e.g. not authenticated)
    #[fail(display = "invalid state")]
    InvalidState,
    /// Short or unparseable response
    #[fail(display = "invalid response")]
    InvalidResponse,
}

impl DesfireErrorKind {
    /// Map a raw DESFire status byte (`DesfireResult::status_code`) to its
    /// named error kind. `0x00` and `0xAF` are not errors and must be
    /// handled by the caller before reaching here.
    pub fn from_status_byte(status: u8) -> Self {
        match status {
            0x0C => DesfireErrorKind::NoChanges,
            0x1E => DesfireErrorKind::IntegrityError,
            0x40 => DesfireErrorKind::NoSuchKey,
            0x7E => DesfireErrorKind::LengthError,
            0x9D => DesfireErrorKind::PermissionDenied,
            0x9E => DesfireErrorKind::ParameterError,
            0xA0 => DesfireErrorKind::ApplicationNotFound,
            0xAE => DesfireErrorKind::AuthenticationError,
            0xAF => DesfireErrorKind::AdditionalFrame,
            0xBE => DesfireErrorKind::BoundaryError,
            0xCA => DesfireErrorKind::CommandAborted,
            0xCE => DesfireErrorKind::CountError,
            0xDE => DesfireErrorKind::DuplicateError,
            0xF0 => DesfireErrorKind::FileNotFound,
            code => DesfireErrorKind::Unknown { code },
        }
    }
}

/// Top-level tagged error: identifies which layer raised the failure.
///
/// `Display` renders as `"<Layer> Error: <Name>"`, e.g.
/// `"Desfire Error: authentication error"`.
#[derive(Debug)]
pub enum DesfireError {
    /// Reader hardware layer (timeouts, bus errors)
    Hardware(Error<HardwareErrorKind>),
    /// Link layer (NACK, checksum, disconnects)
    Link(Error<LinkErrorKind>),
    /// PN532 reader-specific errors
    Pn532(Error<Pn532ErrorKind>),
    /// RC522 reader-specific errors
    Rc522(Error<Rc522ErrorKind>),
    /// CardManager/session-management errors
    CardManager(Error<CardManagerErrorKind>),
    /// ISO 7816-4 APDU wire errors
    Apdu(Error<ApduErrorKind>),
    /// DESFire command/status errors
    Desfire(Error<DesfireErrorKind>),
}

impl DesfireError {
    fn layer_name(&self) -> &'static str {
        match self {
            DesfireError::Hardware(_) => "Hardware",
            DesfireError::Link(_) => "Link",
            DesfireError::Pn532(_) => "Pn532",
            DesfireError::Rc522(_) => "Rc522",
            DesfireError::CardManager(_) => "CardManager",
            DesfireError::Apdu(_) => "Apdu",
            DesfireError::Desfire(_) => "Desfire",
        }
    }

    /// Construct a `Desfire`-layer error directly from a status byte.
    pub fn from_desfire_status(status: u8, description: Option<String>) -> Self {
        DesfireError::Desfire(Error::new(
            DesfireErrorKind::from_status_byte(status),
            description,
        ))
    }

    /// Construct a `Desfire`-layer error from an already-resolved kind.
    pub fn from_desfire(kind: DesfireErrorKind) -> Self {
        DesfireError::Desfire(Error::new(kind, None))
    }
}

impl Display for DesfireError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DesfireError::Hardware(e) => write!(f, "{} Error: {}", self.layer_name(), e),
            DesfireError::Link(e) => write!(f, "{} Error: {}", self.layer_name(), e),
            DesfireError::Pn532(e) => write!(f, "{} Error: {}", self.layer_name(), e),
            DesfireError::Rc522(e) => write!(f, "{} Error: {}", self.layer_name(), e),
            DesfireError::CardManager(e) => write!(f, "{} Error: {}", self.layer_name(), e),
            DesfireError::Apdu(e) => write!(f, "{} Error: {}", self.layer_name(), e),
            DesfireError::Desfire(e) => write!(f, "{} Error: {}", self.layer_name(), e),
        }
    }
}

impl StdError for DesfireError {
    fn description(&self) -> &str {
        "DESFire command engine error"
    }
}

impl From<Error<HardwareErrorKind>> for DesfireError {
    fn from(e: Error<HardwareErrorKind>) -> Self {
        DesfireError::Hardware(e)
    }
}

impl From<Error<LinkErrorKind>> for DesfireError {
    fn from(e: Error<LinkErrorKind>) -> Self {
        DesfireError::Link(e)
    }
}

impl From<Error<Pn532ErrorKind>> for DesfireError {
    fn from(e: Error<Pn532ErrorKind>) -> Self {
        DesfireError::Pn532(e)
    }
}

impl From<Error<Rc522ErrorKind>> for DesfireError {
    fn from(e: Error<Rc522ErrorKind>) -> Self {
        DesfireError::Rc522(e)
    }
}

impl From<Error<CardManagerErrorKind>> for DesfireError {
    fn from(e: Error<CardManagerErrorKind>) -> Self {
        DesfireError::CardManager(e)
    }
}

impl From<Error<ApduErrorKind>> for DesfireError {
    fn from(e: Error<ApduErrorKind>) -> Self {
        DesfireError::Apdu(e)
    }
}

impl From<Error<DesfireErrorKind>> for DesfireError {
    fn from(e: Error<DesfireErrorKind>) -> Self {
        DesfireError::Desfire(e)
    }
}

/// Create a new error (of a given kind) with a formatted message
macro_rules! err {
    ($kind:path, $msg:expr) => {
        $crate::error::Error::new($kind, Some($msg.to_string()))
    };
    ($kind:path, $fmt:expr, $($arg:tt)+) => {
        err!($kind, &format!($fmt, $($arg)+))
    };
}

/// Create and return an error with a formatted message
macro_rules! fail {
    ($kind:path, $msg:expr) => {
        return Err(err!($kind, $msg).into());
    };
    ($kind:path, $fmt:expr, $($arg:tt)+) => {
        fail!($kind, &format!($fmt, $($arg)+));
    };
}

/// Assert a condition is true, returning an error type with a formatted message if not
macro_rules! ensure {
    ($cond:expr, $kind:path, $msg:expr) => {
        if !($cond) {
            return Err(err!($kind, $msg).into());
        }
    };
    ($cond:expr, $kind:path, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err(err!($kind, $fmt, $($arg)+).into());
        }
    };
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DesfireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_byte_mapping_is_total_for_named_codes() {
        assert_eq!(
            DesfireErrorKind::from_status_byte(0xAE),
            DesfireErrorKind::AuthenticationError
        );
        assert_eq!(
            DesfireErrorKind::from_status_byte(0xF0),
            DesfireErrorKind::FileNotFound
        );
        assert_eq!(
            DesfireErrorKind::from_status_byte(0x33),
            DesfireErrorKind::Unknown { code: 0x33 }
        );
    }

    #[test]
    fn display_renders_layer_and_name() {
        let e = DesfireError::from_desfire(DesfireErrorKind::AuthenticationError);
        assert_eq!(e.to_string(), "Desfire Error: authentication error");
    }
}
