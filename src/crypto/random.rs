//! Byte rotation and RNG helpers (§4.3).

use rand::{rngs::OsRng, RngCore};

fn os_rng() -> OsRng {
    OsRng::new().expect("failed to access OS random number generator")
}

/// Circular left rotation of `data` by `n` bytes (`n` taken modulo length).
pub fn rotate_left(data: &[u8], n: usize) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let n = n % data.len();
    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[n..]);
    out.extend_from_slice(&data[..n]);
    out
}

/// Circular right rotation of `data` by `n` bytes (`n` taken modulo length).
pub fn rotate_right(data: &[u8], n: usize) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let n = n % data.len();
    rotate_left(data, data.len() - n)
}

/// Cryptographically seeded random bytes, used for RndA during authentication.
pub fn generate_random(n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    os_rng().fill_bytes(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_left_then_right_is_identity() {
        let data = b"01234567".to_vec();
        let rotated = rotate_left(&data, 1);
        assert_eq!(rotated, b"12345670".to_vec());
        assert_eq!(rotate_right(&rotated, 1), data);
    }

    #[test]
    fn rotate_handles_n_larger_than_length() {
        let data = b"abcd".to_vec();
        assert_eq!(rotate_left(&data, 4), data);
        assert_eq!(rotate_left(&data, 5), rotate_left(&data, 1));
    }

    #[test]
    fn generate_random_respects_length() {
        assert_eq!(generate_random(16).len(), 16);
    }
}
