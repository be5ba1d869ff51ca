use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256, Sha512};

use crate::error::FormatError;
use crate::patterns;

/// Hash algorithm of a digest, possibly composite (`sha256+b64u`).
///
/// Components may be separated by any of `+`, `.`, `_` or `-` when parsed but
/// are always rendered joined with `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashAlgorithm {
    components: Vec<String>,
}

impl HashAlgorithm {
    pub const SHA256: &'static str = "sha256";
    pub const SHA512: &'static str = "sha512";

    pub fn new<I, S>(components: I) -> Result<Self, FormatError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        if components.is_empty() {
            return Err(FormatError::Algorithm(
                "at least one algorithm must be given".to_string(),
            ));
        }
        if let Some(bad) = components
            .iter()
            .find(|c| !patterns::ALGORITHM_COMPONENT.is_match(c))
        {
            return Err(FormatError::Algorithm(format!(
                "invalid algorithm component {:?}",
                bad
            )));
        }

        Ok(Self { components })
    }

    pub fn parse(text: &str) -> Result<Self, FormatError> {
        Self::new(patterns::ALGORITHM_SEPARATOR.split(text))
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Name of the algorithm when it is a single component.
    fn single(&self) -> Option<&str> {
        match self.components.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("+"))
    }
}

impl FromStr for HashAlgorithm {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Represents an OCI content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: HashAlgorithm,
    encoded: String,
}

impl Digest {
    /// Create a digest, validating `encoded` against the algorithm.
    ///
    /// Only single, well-known algorithms get the exact-length check; unknown
    /// or composite algorithms accept any encoded value of the generic grammar.
    pub fn new(algorithm: HashAlgorithm, encoded: impl Into<String>) -> Result<Self, FormatError> {
        let encoded = encoded.into();
        if !patterns::ENCODED.is_match(&encoded) {
            return Err(FormatError::Digest(format!("invalid encoded string {:?}", encoded)));
        }

        let pattern = match algorithm.single() {
            Some(HashAlgorithm::SHA256) => Some(&*patterns::SHA256),
            Some(HashAlgorithm::SHA512) => Some(&*patterns::SHA512),
            _ => None,
        };
        if let Some(pattern) = pattern {
            if !pattern.is_match(&encoded) {
                return Err(FormatError::Digest(format!(
                    "invalid encoded string for {}: {:?}",
                    algorithm, encoded
                )));
            }
        }

        Ok(Self { algorithm, encoded })
    }

    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let (algorithm, encoded) = text
            .split_once(':')
            .ok_or_else(|| FormatError::Digest(format!("missing ':' in {:?}", text)))?;
        Self::new(HashAlgorithm::parse(algorithm)?, encoded)
    }

    /// SHA-256 digest of `content`.
    pub fn sha256(content: &[u8]) -> Self {
        let mut digester = Digester::sha256();
        digester.update(content);
        digester.finalize()
    }

    /// SHA-512 digest of `content`.
    pub fn sha512(content: &[u8]) -> Self {
        let mut digester = Digester::sha512();
        digester.update(content);
        digester.finalize()
    }

    pub fn algorithm(&self) -> &HashAlgorithm {
        &self.algorithm
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Check `content` against this digest. Returns `None` when the algorithm
    /// is not one this crate can compute.
    pub fn verify(&self, content: &[u8]) -> Option<bool> {
        let mut digester = Digester::for_algorithm(&self.algorithm)?;
        digester.update(content);
        Some(&digester.finalize() == self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Running hash over content that arrives in pieces.
#[derive(Clone)]
pub enum Digester {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Digester {
    pub fn sha256() -> Self {
        Digester::Sha256(Sha256::new())
    }

    pub fn sha512() -> Self {
        Digester::Sha512(Sha512::new())
    }

    pub fn for_algorithm(algorithm: &HashAlgorithm) -> Option<Self> {
        match algorithm.single()? {
            HashAlgorithm::SHA256 => Some(Self::sha256()),
            HashAlgorithm::SHA512 => Some(Self::sha512()),
            _ => None,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digester::Sha256(h) => h.update(data),
            Digester::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Digest {
        let (name, encoded) = match self {
            Digester::Sha256(h) => (HashAlgorithm::SHA256, hex::encode(h.finalize())),
            Digester::Sha512(h) => (HashAlgorithm::SHA512, hex::encode(h.finalize())),
        };
        Digest {
            algorithm: HashAlgorithm {
                components: vec![name.to_string()],
            },
            encoded,
        }
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Digester::Sha256(_) => f.write_str("Digester(sha256)"),
            Digester::Sha512(_) => f.write_str("Digester(sha512)"),
        }
    }
}
