use std::fmt;
use std::str::FromStr;

use crate::digest::Digest;
use crate::error::FormatError;
use crate::patterns;

/// A validated tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn new(tag: impl Into<String>) -> Result<Self, FormatError> {
        let tag = tag.into();
        if !patterns::TAG.is_match(&tag) {
            return Err(FormatError::Reference(format!("invalid tag {:?}", tag)));
        }
        Ok(Self(tag))
    }

    pub fn latest() -> Self {
        Self("latest".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tag or a digest, whichever the endpoint was addressed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Tag(Tag),
    Digest(Digest),
}

impl Reference {
    /// Create a tag reference, validating it against the tag grammar.
    pub fn tag(tag: impl Into<String>) -> Result<Self, FormatError> {
        Ok(Reference::Tag(Tag::new(tag)?))
    }

    pub fn as_digest(&self) -> Option<&Digest> {
        match self {
            Reference::Digest(d) => Some(d),
            Reference::Tag(_) => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Tag(tag) => write!(f, "{}", tag),
            Reference::Digest(digest) => write!(f, "{}", digest),
        }
    }
}

/// Parses as a digest when the text contains `:`, otherwise as a tag.
impl FromStr for Reference {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            Ok(Reference::Digest(Digest::parse(s)?))
        } else {
            Reference::tag(s)
        }
    }
}

impl From<Digest> for Reference {
    fn from(digest: Digest) -> Self {
        Reference::Digest(digest)
    }
}

/// Coordinates of a repository and, optionally, of one manifest in it.
///
/// ```text
/// [{hostname}[:{port}]/]{name}[:{tag}|@{digest}]
/// ```
///
/// The first path segment is the domain only if it contains `.` or `:`
/// and more segments follow:
///
/// ```text
///               domain name
///               ------ ---------
///  x.com/a/b -> x.com  a/b
///  a/x.com/b ->        a/x.com/b
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    name: String,
    domain: Option<String>,
    reference: Option<Reference>,
}

impl Ref {
    pub fn new(name: impl Into<String>) -> Result<Self, FormatError> {
        let name = name.into();
        if !patterns::NAME.is_match(&name) {
            return Err(FormatError::Reference(format!("invalid name {:?}", name)));
        }
        Ok(Self {
            name,
            domain: None,
            reference: None,
        })
    }

    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut segments: Vec<&str> = text.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(FormatError::Reference(format!("empty path segment in {:?}", text)));
        }

        let mut reference = None;
        if let Some(last) = segments.last_mut() {
            let current: &str = *last;
            // A digest contains ':' too, so '@' has to be looked at first.
            if let Some((head, digest)) = split_nonempty_head(current, '@') {
                reference = Some(Reference::Digest(Digest::parse(digest)?));
                *last = head;
            } else if let Some((head, tag)) = split_nonempty_head(current, ':') {
                reference = Some(Reference::tag(tag)?);
                *last = head;
            }
        }

        let mut domain = None;
        let name = match segments.as_slice() {
            [only] => only.to_string(),
            [first, rest @ ..] if looks_like_domain(first) => {
                domain = Some(first.to_string());
                rest.join("/")
            }
            _ => segments.join("/"),
        };

        let mut parsed = Self::new(name)?;
        parsed.domain = domain;
        parsed.reference = reference;
        Ok(parsed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    /// Same repository and reference, served from `domain`.
    pub fn with_domain(&self, domain: impl Into<String>) -> Result<Self, FormatError> {
        let domain = domain.into();
        if !patterns::DOMAIN.is_match(&domain) {
            return Err(FormatError::Domain(domain));
        }
        Ok(Self {
            domain: Some(domain),
            ..self.clone()
        })
    }

    /// Same repository, pointing at `reference`.
    pub fn with_reference(&self, reference: impl Into<Reference>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..self.clone()
        }
    }
}

/// Split at the first `sep` unless it is the first character.
fn split_nonempty_head(s: &str, sep: char) -> Option<(&str, &str)> {
    match s.find(sep) {
        Some(i) if i > 0 => Some((&s[..i], &s[i + sep.len_utf8()..])),
        _ => None,
    }
}

fn looks_like_domain(segment: &str) -> bool {
    (segment.contains('.') || segment.contains(':')) && patterns::DOMAIN.is_match(segment)
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(domain) = &self.domain {
            write!(f, "{}/", domain)?;
        }
        f.write_str(&self.name)?;
        match &self.reference {
            Some(Reference::Digest(digest)) => write!(f, "@{}", digest),
            Some(Reference::Tag(tag)) => write!(f, ":{}", tag),
            None => Ok(()),
        }
    }
}

impl FromStr for Ref {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Tag> for Reference {
    fn from(tag: Tag) -> Self {
        Reference::Tag(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(algorithm: &str, encoded: &str) -> Reference {
        Reference::Digest(Digest::parse(&format!("{}:{}", algorithm, encoded)).unwrap())
    }

    fn tag(t: &str) -> Reference {
        Reference::tag(t).unwrap()
    }

    #[test]
    fn test_parse_ok() {
        let cases: Vec<(&str, Option<&str>, &str, Option<Reference>)> = vec![
            ("a", None, "a", None),
            ("a/b", None, "a/b", None),
            ("a/b/c", None, "a/b/c", None),
            ("x.com/a/b/c", Some("x.com"), "a/b/c", None),
            ("x.com:80/a/b/c", Some("x.com:80"), "a/b/c", None),
            ("localhost:5000/a", Some("localhost:5000"), "a", None),
            ("a/b/c:latest", None, "a/b/c", Some(tag("latest"))),
            ("a/x.com:80", None, "a/x.com", Some(tag("80"))),
            ("a/b/c@d:e", None, "a/b/c", Some(digest("d", "e"))),
            ("a/b/c@d+d:e", None, "a/b/c", Some(digest("d+d", "e"))),
            ("x.com/a/b/c:latest", Some("x.com"), "a/b/c", Some(tag("latest"))),
            ("x.com/a/b/c@d+d:e", Some("x.com"), "a/b/c", Some(digest("d+d", "e"))),
        ];
        for (given, domain, name, reference) in cases {
            let r = Ref::parse(given).unwrap();
            assert_eq!(r.domain(), domain, "{}", given);
            assert_eq!(r.name(), name, "{}", given);
            assert_eq!(r.reference(), reference.as_ref(), "{}", given);
        }
    }

    #[test]
    fn test_parse_rejects_empty_components() {
        for given in [
            "", "/", "//", "a/", "a//b", "x.com/", ":latest", "a/:latest", "@d:e", "a/@d:e",
        ] {
            assert!(Ref::parse(given).is_err(), "{:?}", given);
        }
    }

    #[test]
    fn test_parse_rejects_invalid_parts() {
        assert!(Ref::parse("Upper/case").is_err());
        assert!(Ref::parse("a/b:.bad").is_err());
        assert!(Ref::parse("a/b@sha256:abc").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for given in ["a", "x.com:80/a/b/c", "a/b:v1", "x.com/a@d+d:e"] {
            assert_eq!(Ref::parse(given).unwrap().to_string(), given);
        }
    }

    #[test]
    fn test_with_domain_and_reference() {
        let r = Ref::parse("library/node:20").unwrap();
        let moved = r.with_domain("registry.example.com").unwrap();
        assert_eq!(moved.domain(), Some("registry.example.com"));
        assert_eq!(moved.reference(), r.reference());
        assert_eq!(r.domain(), None);

        let pinned = moved.with_reference(Digest::sha256(b"x"));
        assert!(pinned.reference().unwrap().as_digest().is_some());
        assert_eq!(moved.reference(), Some(&tag("20")));

        assert!(r.with_domain("bad host").is_err());
    }

    #[test]
    fn test_reference_from_str() {
        assert_eq!("latest".parse::<Reference>().unwrap(), tag("latest"));
        assert!(matches!(
            "a:b".parse::<Reference>().unwrap(),
            Reference::Digest(_)
        ));
    }
}
