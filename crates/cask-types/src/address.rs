use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Digest algorithm used to derive a [`ContentAddress`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-1 (20-byte digest).
    Sha1,
    /// SHA-256 (32-byte digest).
    Sha256,
    /// BLAKE3 (32-byte digest).
    Blake3,
}

impl HashAlgorithm {
    /// Every supported algorithm, in tag order.
    pub const ALL: [Self; 3] = [Self::Sha1, Self::Sha256, Self::Blake3];

    /// The lowercase tag used in the stable string form and on disk.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Length of a digest produced by this algorithm, in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 | Self::Blake3 => 32,
        }
    }

    /// Parse an algorithm tag.
    pub fn from_tag(tag: &str) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|algo| algo.tag() == tag)
            .ok_or_else(|| TypeError::UnknownAlgorithm(tag.to_string()))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for HashAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

/// Content-addressed identifier for a blob.
///
/// A `ContentAddress` pairs a [`HashAlgorithm`] with the digest of a blob's
/// bytes. Two addresses are equal iff both the algorithm and the digest bytes
/// are equal. The stable string form is `<tag>-<lowercase hex>`, e.g.
/// `sha1-0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33`; it is used as the on-disk
/// filename stem and as a map key by index backends.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl ContentAddress {
    /// Build an address from an algorithm and raw digest bytes.
    ///
    /// Fails if the digest length does not match the algorithm.
    pub fn new(algorithm: HashAlgorithm, digest: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        let digest = digest.into();
        if digest.len() != algorithm.digest_len() {
            return Err(TypeError::InvalidLength {
                algorithm: algorithm.tag().to_string(),
                expected: algorithm.digest_len(),
                actual: digest.len(),
            });
        }
        Ok(Self { algorithm, digest })
    }

    pub fn sha1(digest: [u8; 20]) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha1,
            digest: digest.to_vec(),
        }
    }

    pub fn sha256(digest: [u8; 32]) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            digest: digest.to_vec(),
        }
    }

    pub fn blake3(digest: [u8; 32]) -> Self {
        Self {
            algorithm: HashAlgorithm::Blake3,
            digest: digest.to_vec(),
        }
    }

    /// Parse an address from its algorithm tag and a hex digest.
    pub fn from_hex(algorithm: HashAlgorithm, hex_digest: &str) -> Result<Self, TypeError> {
        let digest = hex::decode(hex_digest).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::new(algorithm, digest)
    }

    /// The digest algorithm.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Lowercase hex encoding of the digest (without the algorithm tag).
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// Short form for logs: tag plus the first 8 hex characters.
    pub fn short(&self) -> String {
        format!("{}-{}", self.algorithm, hex::encode(&self.digest[..4]))
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.short())
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, self.to_hex())
    }
}

impl FromStr for ContentAddress {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, hex_digest) = s
            .split_once('-')
            .ok_or_else(|| TypeError::MalformedAddress(s.to_string()))?;
        let algorithm = HashAlgorithm::from_tag(tag)?;
        Self::from_hex(algorithm, hex_digest)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentAddress> for String {
    fn from(address: ContentAddress) -> Self {
        address.to_string()
    }
}

/// A committed blob: its address plus the size observed on disk.
///
/// Only produced after a successful commit. The size is authoritative: it is
/// taken from the committed file, never from the sender's claim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizedContentAddress {
    pub address: ContentAddress,
    pub size: u64,
}

impl SizedContentAddress {
    pub fn new(address: ContentAddress, size: u64) -> Self {
        Self { address, size }
    }
}

impl fmt::Display for SizedContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.address, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HELLO_SHA1: &str = "sha1-aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    #[test]
    fn parses_stable_string_form() {
        let addr: ContentAddress = HELLO_SHA1.parse().unwrap();
        assert_eq!(addr.algorithm(), HashAlgorithm::Sha1);
        assert_eq!(addr.digest().len(), 20);
        assert_eq!(addr.to_string(), HELLO_SHA1);
    }

    #[test]
    fn uppercase_hex_normalizes_to_lowercase() {
        let addr: ContentAddress = "sha1-AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D".parse().unwrap();
        assert_eq!(addr.to_string(), HELLO_SHA1);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let err = "md5-d41d8cd98f00b204e9800998ecf8427e"
            .parse::<ContentAddress>()
            .unwrap_err();
        assert_eq!(err, TypeError::UnknownAlgorithm("md5".into()));
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            "sha1aaf4".parse::<ContentAddress>(),
            Err(TypeError::MalformedAddress(_))
        ));
    }

    #[test]
    fn rejects_wrong_digest_length() {
        let err = "sha256-aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
            .parse::<ContentAddress>()
            .unwrap_err();
        assert!(matches!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 20,
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(
            "sha1-zzf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".parse::<ContentAddress>(),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn equality_includes_algorithm() {
        let digest = [7u8; 32];
        let a = ContentAddress::new(HashAlgorithm::Sha256, digest).unwrap();
        let b = ContentAddress::new(HashAlgorithm::Blake3, digest).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, ContentAddress::new(HashAlgorithm::Sha256, digest).unwrap());
    }

    #[test]
    fn serde_uses_string_form() {
        let addr: ContentAddress = HELLO_SHA1.parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{HELLO_SHA1}\""));
        let back: ContentAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn serde_rejects_malformed_string() {
        assert!(serde_json::from_str::<ContentAddress>("\"sha1-xyz\"").is_err());
    }

    #[test]
    fn short_form() {
        let addr: ContentAddress = HELLO_SHA1.parse().unwrap();
        assert_eq!(addr.short(), "sha1-aaf4c61d");
        assert_eq!(format!("{addr:?}"), "ContentAddress(sha1-aaf4c61d)");
    }

    #[test]
    fn sized_display() {
        let addr: ContentAddress = HELLO_SHA1.parse().unwrap();
        let sized = SizedContentAddress::new(addr, 5);
        assert_eq!(sized.to_string(), format!("{HELLO_SHA1} (5 bytes)"));
    }

    proptest! {
        #[test]
        fn string_form_identifies_address(digest in prop::collection::vec(any::<u8>(), 32)) {
            let addr = ContentAddress::new(HashAlgorithm::Blake3, digest.clone()).unwrap();
            let text = addr.to_string();
            prop_assert!(text.starts_with("blake3-"));
            prop_assert_eq!(text.len(), "blake3-".len() + 64);
            let parsed: ContentAddress = text.parse().unwrap();
            prop_assert_eq!(parsed.digest(), digest.as_slice());
        }
    }
}
