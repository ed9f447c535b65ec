//! `DesfireResult`: the parsed native response a command receives back (§3).

/// Maximum accumulated DESFire response size (post-chaining), per §3/§6.
pub const MAX_RESULT_DATA: usize = 256;

/// A native DESFire response: `[statusCode, data...]`.
#[derive(Clone, Debug)]
pub struct DesfireResult {
    /// Raw status byte as returned by the card (or synthesized from SW2 by
    /// the ISO wire).
    pub status_code: u8,
    /// Response payload, excluding the status byte.
    pub data: Vec<u8>,
}

impl DesfireResult {
    /// Parse a native response buffer `[status, data...]`.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        Some(DesfireResult {
            status_code: raw[0],
            data: raw[1..].to_vec(),
        })
    }

    /// `true` iff the status byte is `0x00`.
    pub fn is_success(&self) -> bool {
        self.status_code == 0x00
    }

    /// `true` iff the status byte is `0xAF` ("additional frame follows").
    pub fn is_additional_frame(&self) -> bool {
        self.status_code == 0xAF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_status_and_data() {
        let raw = [0x00, 0x01, 0x02];
        let result = DesfireResult::parse(&raw).unwrap();
        assert!(result.is_success());
        assert_eq!(result.data, vec![0x01, 0x02]);
    }

    #[test]
    fn parse_rejects_empty_buffer() {
        assert!(DesfireResult::parse(&[]).is_none());
    }

    #[test]
    fn additional_frame_detection() {
        let result = DesfireResult::parse(&[0xAF]).unwrap();
        assert!(result.is_additional_frame());
        assert!(!result.is_success());
    }
}
