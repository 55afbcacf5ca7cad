use std::fmt;

use super::{parse, SignatureError, TypeNode};

/// A validated, owned D-Bus signature together with its parsed type
/// sequence.
///
/// # Examples
///
/// ```
/// use wirebus::OwnedSignature;
///
/// let signature = OwnedSignature::new("a(su)")?;
/// assert_eq!(signature.as_str(), "a(su)");
/// assert_eq!(signature.nodes().len(), 1);
/// # Ok::<_, wirebus::SignatureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OwnedSignature {
    raw: Box<str>,
    nodes: Vec<TypeNode>,
}

impl OwnedSignature {
    /// Validate `signature` and construct an owned copy of it.
    pub fn new(signature: &str) -> Result<Self, SignatureError> {
        let nodes = parse(signature)?;

        Ok(Self {
            raw: signature.into(),
            nodes,
        })
    }

    /// The empty signature, describing an empty message body.
    pub fn empty() -> Self {
        Self {
            raw: Box::from(""),
            nodes: Vec::new(),
        }
    }

    /// Get the signature as a string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Test if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The sequence of complete types this signature describes.
    pub fn nodes(&self) -> &[TypeNode] {
        &self.nodes
    }
}

impl Default for OwnedSignature {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for OwnedSignature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for OwnedSignature {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for OwnedSignature {}

impl PartialEq<str> for OwnedSignature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        &*self.raw == other
    }
}

impl PartialEq<&str> for OwnedSignature {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        &*self.raw == *other
    }
}
