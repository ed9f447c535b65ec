//! ISO 7816-4 APDU framing (§4.4, §6).

use super::Wire;
use crate::error::{ApduErrorKind, Result};

/// Wraps/unwraps native DESFire PDUs as ISO 7816-4 APDUs with `CLA=0x90`.
pub struct IsoWire;

impl Wire for IsoWire {
    fn wrap(&self, pdu: &[u8]) -> Vec<u8> {
        debug_assert!(!pdu.is_empty(), "PDU must contain at least a command byte");
        let ins = pdu[0];
        let payload = &pdu[1..];

        let mut apdu = Vec::with_capacity(5 + payload.len() + 1);
        apdu.push(0x90);
        apdu.push(ins);
        apdu.push(0x00);
        apdu.push(0x00);
        if !payload.is_empty() {
            apdu.push(payload.len() as u8);
            apdu.extend_from_slice(payload);
        }
        apdu.push(0x00);
        apdu
    }

    fn unwrap(&self, response_data: &[u8], sw1: u8, sw2: u8) -> Result<Vec<u8>> {
        match sw1 {
            0x90 | 0x91 => {
                let mut pdu = Vec::with_capacity(1 + response_data.len());
                pdu.push(sw2);
                pdu.extend_from_slice(response_data);
                Ok(pdu)
            }
            _ => Err(err!(
                ApduErrorKind::UnknownStatusWord { sw1, sw2 },
                "unexpected status word SW1=0x{:02x} SW2=0x{:02x}",
                sw1,
                sw2
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_omits_lc_when_payload_empty() {
        let wire = IsoWire;
        let apdu = wire.wrap(&[0x60]);
        assert_eq!(apdu, vec![0x90, 0x60, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn wrap_includes_lc_when_payload_present() {
        let wire = IsoWire;
        let apdu = wire.wrap(&[0x0A, 0x01]);
        assert_eq!(apdu, vec![0x90, 0x0A, 0x00, 0x00, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn unwrap_success_status_becomes_status_zero() {
        let wire = IsoWire;
        let pdu = wire.unwrap(&[0xAA, 0xBB], 0x90, 0x00).unwrap();
        assert_eq!(pdu, vec![0x00, 0xAA, 0xBB]);
    }

    #[test]
    fn unwrap_carries_desfire_status_via_sw2() {
        let wire = IsoWire;
        let pdu = wire.unwrap(&[], 0x91, 0xAE).unwrap();
        assert_eq!(pdu, vec![0xAE]);
    }

    #[test]
    fn unwrap_rejects_unknown_sw1() {
        let wire = IsoWire;
        assert!(wire.unwrap(&[], 0x6A, 0x82).is_err());
    }
}
