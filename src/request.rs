//! `DesfireRequest`: the native command PDU built by a command's
//! `build_request` before wire wrapping (§3).

/// Maximum command data bytes accepted before wire wrapping (§4.8).
pub const MAX_REQUEST_DATA: usize = 252;

/// A native DESFire request: `[commandCode, data...]` plus how many bytes
/// of response the caller expects back (used to size read buffers, not
/// enforced on the wire).
#[derive(Clone, Debug)]
pub struct DesfireRequest {
    /// DESFire instruction byte.
    pub command_code: u8,
    /// Command payload, at most `MAX_REQUEST_DATA` bytes.
    pub data: Vec<u8>,
    /// Expected response length hint.
    pub expected_response_length: usize,
}

impl DesfireRequest {
    /// Build a request, asserting the payload fits within the wire limit.
    pub fn new(command_code: u8, data: Vec<u8>, expected_response_length: usize) -> Self {
        debug_assert!(
            data.len() <= MAX_REQUEST_DATA,
            "DESFire request payload exceeds {} bytes",
            MAX_REQUEST_DATA
        );
        DesfireRequest {
            command_code,
            data,
            expected_response_length,
        }
    }

    /// Serialize to the native PDU `[commandCode, data...]`.
    pub fn to_native_pdu(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(1 + self.data.len());
        pdu.push(self.command_code);
        pdu.extend_from_slice(&self.data);
        pdu
    }
}
