//! `ApduTransceiver`: the sole boundary between this crate and the reader
//! driver (§4.5).

use crate::error::Result;

/// Raw reply from one `transceive` call: data bytes plus the ISO status
/// word. For native framing, `sw1`/`sw2` are typically synthesized by the
/// reader adapter and ignored by `NativeWire::unwrap`.
#[derive(Clone, Debug)]
pub struct ApduResponse {
    /// Response payload (excludes SW1/SW2).
    pub data: Vec<u8>,
    /// Status word byte 1.
    pub sw1: u8,
    /// Status word byte 2.
    pub sw2: u8,
}

/// Opaque channel to a contactless reader. Implementations live outside
/// this crate's core (PN532/RC522 drivers) or, under `feature = "mock"`,
/// in `crate::mock`.
pub trait ApduTransceiver {
    /// Send `apdu` to the card and return its reply. Hardware/Link/Pn532/
    /// Apdu-layer errors propagate untouched.
    fn transceive(&mut self, apdu: &[u8]) -> Result<ApduResponse>;
}
