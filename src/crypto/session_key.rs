//! Session key assembly and DES parity handling (§4.3, §4.6 step 10).

/// Clears bit 0 (the parity bit) of every byte in `key`, in place. DESFire
/// normalizes DES/2K3DES/3K3DES key material this way after XOR-combining
/// key halves.
pub fn clear_parity_bits(key: &mut [u8]) {
    for b in key.iter_mut() {
        *b &= 0xFE;
    }
}

/// Assemble a DES/2K3DES session key from the two random challenges:
/// `rndA[0..3] ∥ rndB[0..3] ∥ rndA[4..7] ∥ rndB[4..7]`, then clear parity.
pub fn generate_session_key_des(rnd_a: &[u8], rnd_b: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&rnd_a[0..4]);
    key.extend_from_slice(&rnd_b[0..4]);
    key.extend_from_slice(&rnd_a[4..8]);
    key.extend_from_slice(&rnd_b[4..8]);
    clear_parity_bits(&mut key);
    key
}

/// Assemble a 3K3DES session key (24 bytes) from 16-byte challenges.
pub fn generate_session_key_3k3des(rnd_a: &[u8], rnd_b: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&rnd_a[0..4]);
    key.extend_from_slice(&rnd_b[0..4]);
    key.extend_from_slice(&rnd_a[6..10]);
    key.extend_from_slice(&rnd_b[6..10]);
    key.extend_from_slice(&rnd_a[12..16]);
    key.extend_from_slice(&rnd_b[12..16]);
    clear_parity_bits(&mut key);
    key
}

/// Assemble an AES-128 session key from 16-byte challenges:
/// `rndA[0..3] ∥ rndB[0..3] ∥ rndA[12..15] ∥ rndB[12..15]`. AES keys carry
/// no parity bits, so no clearing step applies.
pub fn generate_session_key_aes(rnd_a: &[u8], rnd_b: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&rnd_a[0..4]);
    key.extend_from_slice(&rnd_b[0..4]);
    key.extend_from_slice(&rnd_a[12..16]);
    key.extend_from_slice(&rnd_b[12..16]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_parity_bits_masks_lsb() {
        let mut key = vec![0xFFu8, 0x01, 0x00];
        clear_parity_bits(&mut key);
        assert_eq!(key, vec![0xFE, 0x00, 0x00]);
    }

    #[test]
    fn des_session_key_is_sixteen_bytes() {
        let rnd_a = [0x11u8; 8];
        let rnd_b = [0x22u8; 8];
        let key = generate_session_key_des(&rnd_a, &rnd_b);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn aes_session_key_layout() {
        let rnd_a: Vec<u8> = (0..16).collect();
        let rnd_b: Vec<u8> = (16..32).collect();
        let key = generate_session_key_aes(&rnd_a, &rnd_b);
        assert_eq!(key, vec![0, 1, 2, 3, 16, 17, 18, 19, 12, 13, 14, 15, 28, 29, 30, 31]);
    }
}
