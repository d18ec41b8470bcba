use std::fmt;
use std::io::{Read, Write};

use serde::Deserialize as _;
use sha2::digest::DynDigest;
use sha2::Digest as _;

use crate::codec;
use crate::error::{Error, Result};

/// digest algorithm identifier, encoded as the first byte of every digest.
///
/// the hex form of a digest therefore starts with the algorithm tag: all
/// SHA-256 digests begin with "01", all SHA-512/256 with "05".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DigestAlgorithm {
    Sha224 = 0,
    Sha256 = 1,
    Sha384 = 2,
    Sha512 = 3,
    Sha512_224 = 4,
    Sha512_256 = 5,
    Sha3_224 = 6,
    Sha3_256 = 7,
    Sha3_384 = 8,
    Sha3_512 = 9,
}

/// algorithm tag reserved for digests this implementation cannot interpret
pub const ALGORITHM_UNKNOWN: u8 = 255;

/// default algorithm for newly written objects
pub const DEFAULT_ALGORITHM: DigestAlgorithm = DigestAlgorithm::Sha512_256;

impl DigestAlgorithm {
    /// parse an algorithm tag byte
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => DigestAlgorithm::Sha224,
            1 => DigestAlgorithm::Sha256,
            2 => DigestAlgorithm::Sha384,
            3 => DigestAlgorithm::Sha512,
            4 => DigestAlgorithm::Sha512_224,
            5 => DigestAlgorithm::Sha512_256,
            6 => DigestAlgorithm::Sha3_224,
            7 => DigestAlgorithm::Sha3_256,
            8 => DigestAlgorithm::Sha3_384,
            9 => DigestAlgorithm::Sha3_512,
            other => return Err(Error::UnknownAlgorithm(other)),
        })
    }

    /// tag byte for this algorithm
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// length in bytes of the raw hash output
    pub fn digest_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha224 | DigestAlgorithm::Sha3_224 | DigestAlgorithm::Sha512_224 => 28,
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha3_256 | DigestAlgorithm::Sha512_256 => 32,
            DigestAlgorithm::Sha384 | DigestAlgorithm::Sha3_384 => 48,
            DigestAlgorithm::Sha512 | DigestAlgorithm::Sha3_512 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha224 => "SHA224",
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Sha384 => "SHA384",
            DigestAlgorithm::Sha512 => "SHA512",
            DigestAlgorithm::Sha512_224 => "SHA512/224",
            DigestAlgorithm::Sha512_256 => "SHA512/256",
            DigestAlgorithm::Sha3_224 => "SHA3-224",
            DigestAlgorithm::Sha3_256 => "SHA3-256",
            DigestAlgorithm::Sha3_384 => "SHA3-384",
            DigestAlgorithm::Sha3_512 => "SHA3-512",
        }
    }

    fn new_hasher(self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Sha224 => Box::new(sha2::Sha224::new()),
            DigestAlgorithm::Sha256 => Box::new(sha2::Sha256::new()),
            DigestAlgorithm::Sha384 => Box::new(sha2::Sha384::new()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::new()),
            DigestAlgorithm::Sha512_224 => Box::new(sha2::Sha512_224::new()),
            DigestAlgorithm::Sha512_256 => Box::new(sha2::Sha512_256::new()),
            DigestAlgorithm::Sha3_224 => Box::new(sha3::Sha3_224::default()),
            DigestAlgorithm::Sha3_256 => Box::new(sha3::Sha3_256::default()),
            DigestAlgorithm::Sha3_384 => Box::new(sha3::Sha3_384::default()),
            DigestAlgorithm::Sha3_512 => Box::new(sha3::Sha3_512::default()),
        }
    }
}

impl DigestAlgorithm {
    /// parse an algorithm by its registered name, case-insensitively
    pub fn from_name(name: &str) -> Result<Self> {
        let needle = name.to_ascii_uppercase();
        for tag in 0u8..=9 {
            let alg = Self::from_tag(tag)?;
            if alg.name() == needle {
                return Ok(alg);
            }
        }
        Err(Error::InvalidDigest(format!("unknown algorithm name: {name}")))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for DigestAlgorithm {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> serde::Deserialize<'de> for DigestAlgorithm {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_name(&s).map_err(serde::de::Error::custom)
    }
}

/// algorithm-tagged digest of an object body.
///
/// byte 0 is the algorithm tag, the remainder is the raw hash output of the
/// registered length. equality is byte equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(Vec<u8>);

impl Digest {
    /// construct from raw tagged bytes, validating tag and length
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let Some(&tag) = bytes.first() else {
            return Err(Error::InvalidDigest("empty digest".to_string()));
        };
        let alg = DigestAlgorithm::from_tag(tag)?;
        if bytes.len() != 1 + alg.digest_len() {
            return Err(Error::InvalidDigest(format!(
                "{} digest must be {} bytes, got {}",
                alg,
                1 + alg.digest_len(),
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// parse from a lowercase hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidDigest(s.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// algorithm this digest was produced with
    pub fn algorithm(&self) -> DigestAlgorithm {
        // validated at construction
        DigestAlgorithm::from_tag(self.0[0]).unwrap_or(DigestAlgorithm::Sha512_256)
    }

    /// raw tagged bytes (first byte is the algorithm tag)
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// lowercase hex encoding of the tagged bytes
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// marshal as a length-prefixed byte string
    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_bytes(w, &self.0, "digest")
    }

    /// unmarshal a length-prefixed digest, validating tag and length
    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        Self::from_bytes(codec::read_bytes(r)?)
    }

    /// marshal an optional digest; absent encodes as a zero-length string
    pub fn marshal_opt<W: Write>(d: Option<&Digest>, w: &mut W) -> Result<()> {
        match d {
            Some(d) => d.marshal(w),
            None => codec::write_bytes(w, &[], "digest"),
        }
    }

    /// unmarshal an optional digest; a zero-length string decodes as absent
    pub fn unmarshal_opt<R: Read>(r: &mut R) -> Result<Option<Self>> {
        let bytes = codec::read_bytes(r)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Self::from_bytes(bytes).map(Some)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..14.min(self.0.len() * 2)])
    }
}

/// streaming digester producing algorithm-tagged digests
pub struct Digester {
    alg: DigestAlgorithm,
    hasher: Box<dyn DynDigest>,
}

impl Digester {
    pub fn new(alg: DigestAlgorithm) -> Self {
        Self {
            alg,
            hasher: alg.new_hasher(),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.alg
    }

    /// feed data into the hash
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// digest of the data fed so far; the hasher remains usable
    pub fn digest(&self) -> Digest {
        let mut bytes = Vec::with_capacity(1 + self.alg.digest_len());
        bytes.push(self.alg.tag());
        bytes.extend_from_slice(&self.hasher.clone().finalize());
        Digest(bytes)
    }
}

impl Clone for Digester {
    fn clone(&self) -> Self {
        Self {
            alg: self.alg,
            hasher: self.hasher.clone(),
        }
    }
}

/// convenience: digest a complete byte slice
pub fn digest_of(alg: DigestAlgorithm, data: &[u8]) -> Digest {
    let mut d = Digester::new(alg);
    d.update(data);
    d.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_tag_roundtrip() {
        for tag in 0u8..=9 {
            let alg = DigestAlgorithm::from_tag(tag).unwrap();
            assert_eq!(alg.tag(), tag);
        }
        assert!(matches!(
            DigestAlgorithm::from_tag(10),
            Err(Error::UnknownAlgorithm(10))
        ));
        assert!(matches!(
            DigestAlgorithm::from_tag(ALGORITHM_UNKNOWN),
            Err(Error::UnknownAlgorithm(255))
        ));
    }

    #[test]
    fn test_digest_hex_roundtrip() {
        let d = digest_of(DEFAULT_ALGORITHM, b"hello");
        let parsed = Digest::from_hex(&d.to_hex()).unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn test_digest_hex_prefix_is_algorithm_tag() {
        let d = digest_of(DigestAlgorithm::Sha512_256, b"hello");
        assert!(d.to_hex().starts_with("05"));
        let d = digest_of(DigestAlgorithm::Sha256, b"hello");
        assert!(d.to_hex().starts_with("01"));
    }

    #[test]
    fn test_digest_length_validation() {
        // SHA-256 tag with a truncated suffix
        let mut bytes = digest_of(DigestAlgorithm::Sha256, b"x").as_bytes().to_vec();
        bytes.pop();
        assert!(Digest::from_bytes(bytes).is_err());

        assert!(Digest::from_bytes(vec![]).is_err());
        assert!(Digest::from_bytes(vec![200; 33]).is_err());
    }

    #[test]
    fn test_digest_marshal_roundtrip() {
        let d = digest_of(DigestAlgorithm::Sha3_384, b"content");
        let mut buf = Vec::new();
        d.marshal(&mut buf).unwrap();

        let parsed = Digest::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn test_optional_digest_roundtrip() {
        let mut buf = Vec::new();
        Digest::marshal_opt(None, &mut buf).unwrap();
        assert_eq!(Digest::unmarshal_opt(&mut buf.as_slice()).unwrap(), None);

        let d = digest_of(DEFAULT_ALGORITHM, b"x");
        let mut buf = Vec::new();
        Digest::marshal_opt(Some(&d), &mut buf).unwrap();
        assert_eq!(
            Digest::unmarshal_opt(&mut buf.as_slice()).unwrap(),
            Some(d)
        );
    }

    #[test]
    fn test_digester_matches_one_shot() {
        let mut streaming = Digester::new(DEFAULT_ALGORITHM);
        streaming.update(b"hello ");
        streaming.update(b"world");
        assert_eq!(streaming.digest(), digest_of(DEFAULT_ALGORITHM, b"hello world"));
    }

    #[test]
    fn test_digester_is_resumable() {
        let mut d = Digester::new(DEFAULT_ALGORITHM);
        d.update(b"abc");
        let first = d.digest();
        // digest() must not consume the hasher state
        assert_eq!(first, d.digest());
        d.update(b"def");
        assert_eq!(d.digest(), digest_of(DEFAULT_ALGORITHM, b"abcdef"));
    }

    #[test]
    fn test_known_sha512_256_vector() {
        // SHA-512/256("abc")
        let d = digest_of(DigestAlgorithm::Sha512_256, b"abc");
        assert_eq!(
            d.to_hex(),
            format!(
                "05{}",
                "53048e2681941ef99b2e29b76b4c7dabe4c2d0c634fc6d46e0e2f13107e7af23"
            )
        );
    }

    #[test]
    fn test_all_algorithms_produce_tagged_lengths() {
        for tag in 0u8..=9 {
            let alg = DigestAlgorithm::from_tag(tag).unwrap();
            let d = digest_of(alg, b"data");
            assert_eq!(d.as_bytes().len(), 1 + alg.digest_len());
            assert_eq!(d.as_bytes()[0], tag);
        }
    }
}
