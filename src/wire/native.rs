//! Native DESFire framing: identity wrap/unwrap (§4.4).

use super::Wire;
use crate::error::Result;

/// Pass-through framing: the transceiver already exchanges native
/// `[INS, data...]` / `[status, data...]` buffers (e.g. PN532
/// `InDataExchange`), so no wrapping is needed.
pub struct NativeWire;

impl Wire for NativeWire {
    fn wrap(&self, pdu: &[u8]) -> Vec<u8> {
        pdu.to_vec()
    }

    fn unwrap(&self, response_data: &[u8], _sw1: u8, _sw2: u8) -> Result<Vec<u8>> {
        Ok(response_data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_is_identity() {
        let wire = NativeWire;
        let pdu = vec![0x60];
        assert_eq!(wire.wrap(&pdu), pdu);
    }

    #[test]
    fn unwrap_ignores_status_word() {
        let wire = NativeWire;
        let data = vec![0x00, 0x01, 0x02];
        assert_eq!(wire.unwrap(&data, 0x91, 0x00).unwrap(), data);
    }
}
