use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// 32-byte SHA-256 output, by-value everywhere.
#[derive(Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HashBytes(pub [u8; 32]);

impl HashBytes {
    pub const SIZE: usize = 32;

    /// All-zero hash standing in for the imaginary row 0.
    pub const SENTINEL: Self = Self([0; 32]);

    pub const fn is_sentinel(&self) -> bool {
        let mut i = 0;
        while i < 32 {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    pub fn digest(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for HashBytes {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<HashBytes> for [u8; 32] {
    fn from(hash: HashBytes) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for HashBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for HashBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for HashBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashBytes({})", self)
    }
}

impl FromStr for HashBytes {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_zero() {
        assert!(HashBytes::SENTINEL.is_sentinel());
        assert_eq!(HashBytes::SENTINEL.0, [0; 32]);
        assert!(!HashBytes([1; 32]).is_sentinel());
    }

    #[test]
    fn hex_round_trip() -> anyhow::Result<()> {
        let hash = HashBytes::digest(&[b"abc"]);
        assert_eq!(
            hash.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash.to_string().parse::<HashBytes>()?, hash);
        Ok(())
    }

    #[test]
    fn digest_concatenates_parts() {
        let split = HashBytes::digest(&[b"ab", b"c"]);
        let whole = HashBytes::digest(&[b"abc"]);
        assert_eq!(split, whole);
    }
}
