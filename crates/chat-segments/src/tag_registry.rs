use std::hash::Hasher;

use rustc_hash::{FxHashMap, FxHasher};
use thiserror::Error;

/// The reserved name of the text segment kind.
///
/// It can never be registered as a tag name: a segment whose kind is
/// `text` is a plain text run, not a tag.
pub const TEXT_SEGMENT_NAME: &str = "text";

/// How a recognized tag is treated once one of its segments completes.
///
///  - `Renderable` tags are displayed inline by the host.
///  - `Metadata` tags trigger a registered handler and are not displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagKind {
    Renderable,
    Metadata,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("\"{0}\" is reserved for text segments and cannot be registered as a tag")]
    ReservedName(Box<str>),

    #[error("\"{0}\" is not a valid tag name")]
    InvalidName(Box<str>),
}

/// Whether `byte` may appear in a tag name after the leading ASCII letter.
pub(crate) fn is_name_byte(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.')
}

/// Length of the longest tag-name run at the start of `bytes`: an ASCII
/// letter followed by letters, digits, `-`, `_`, and `.`. Zero when no
/// name starts there, so `<3` and `</chart>` fall straight through to the
/// plain-text path.
pub(crate) fn tag_name_span(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(byte) if byte.is_ascii_alphabetic() => {
            1 + bytes[1..]
                .iter()
                .take_while(|&&byte| is_name_byte(byte))
                .count()
        }
        _ => 0,
    }
}

/// Reports whether `name` satisfies the tag name grammar: an ASCII letter
/// followed by ASCII letters, digits, `-`, `_`, or `.`.
///
/// Names are matched case-sensitively everywhere, so no normalization
/// happens here or at lookup time.
pub fn is_valid_tag_name(name: &str) -> bool {
    !name.is_empty() && tag_name_span(name.as_bytes()) == name.len()
}

/// The runtime table of recognized tag names.
///
/// The registry answers two questions: whether a string names a recognized
/// tag, and whether that tag is a metadata tag. All lookups are total.
///
/// The registry is read-mostly. A parser never reads it mid-scan; instead
/// it takes a [`RegistrySnapshot`] at the start of each parse call and uses
/// that snapshot throughout, detecting changes between calls through the
/// content [`fingerprint`](TagRegistry::fingerprint).
#[derive(Debug, Default, Clone)]
pub struct TagRegistry {
    tags: FxHashMap<Box<str>, TagKind>,
    fingerprint: u64,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `(name, kind)` pairs.
    pub fn from_tags<'a, I>(tags: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (&'a str, TagKind)>,
    {
        let mut registry = Self::new();
        for (name, kind) in tags {
            registry.register(name, kind)?;
        }
        Ok(registry)
    }

    /// Adds `name` as a recognized tag, or overwrites its kind if it is
    /// already registered.
    pub fn register(&mut self, name: &str, kind: TagKind) -> Result<(), RegistryError> {
        if name == TEXT_SEGMENT_NAME {
            return Err(RegistryError::ReservedName(name.into()));
        }
        if !is_valid_tag_name(name) {
            return Err(RegistryError::InvalidName(name.into()));
        }

        self.tags.insert(name.into(), kind);
        self.refresh_fingerprint();
        Ok(())
    }

    /// Removes `name` from recognition. Safe to call for absent names.
    pub fn unregister(&mut self, name: &str) {
        if self.tags.remove(name).is_some() {
            self.refresh_fingerprint();
        }
    }

    /// Looks up a name. `None` means the name is unknown.
    pub fn lookup(&self, name: &str) -> Option<TagKind> {
        self.tags.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// A content hash of the registered `(name, kind)` pairs.
    ///
    /// Two registries with the same contents produce the same fingerprint
    /// regardless of registration order, so a cached snapshot can be kept
    /// as long as the fingerprint matches.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// A stable copy of the recognized names and kinds, tagged with the
    /// fingerprint of the contents it was taken from.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            tags: self.tags.clone(),
            fingerprint: self.fingerprint,
        }
    }

    fn refresh_fingerprint(&mut self) {
        /*
         * Hash map iteration order is unspecified, so the fingerprint
         * combines the per-entry hashes with XOR, which is commutative.
         * An empty registry hashes to zero.
         */
        let mut combined = 0u64;
        for (name, kind) in &self.tags {
            let mut hasher = FxHasher::default();
            hasher.write(name.as_bytes());
            hasher.write_u8(match kind {
                TagKind::Renderable => 0,
                TagKind::Metadata => 1,
            });
            combined ^= hasher.finish();
        }
        self.fingerprint = combined;
    }
}

/// The registry contents as seen at the start of one parse call.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    tags: FxHashMap<Box<str>, TagKind>,
    fingerprint: u64,
}

impl RegistrySnapshot {
    pub fn lookup(&self, name: &str) -> Option<TagKind> {
        self.tags.get(name).copied()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// The recognized names, in unspecified order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(AsRef::as_ref)
    }
}
