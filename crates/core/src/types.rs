//! Registry domain types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-addressed identifier of an image artifact (e.g. `sha256:ab12...`).
///
/// Treated as opaque: no validation is performed on the algorithm prefix or
/// the hash, since the registry is the authority on what a digest looks like.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap a raw digest string.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Borrow the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Digest {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One entry of a repository image listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageId {
    /// Digest of the image manifest.
    pub digest: Digest,
    /// Tag pointing at the digest, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ImageId {
    /// An image entry without a tag.
    #[must_use]
    pub fn untagged(digest: impl Into<Digest>) -> Self {
        Self {
            digest: digest.into(),
            tag: None,
        }
    }

    /// An image entry carrying a tag.
    #[must_use]
    pub fn tagged(digest: impl Into<Digest>, tag: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            tag: Some(tag.into()),
        }
    }

    /// Whether this entry has a non-empty tag.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        self.tag.as_deref().is_some_and(|tag| !tag.is_empty())
    }
}

/// A single page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A page with no successor.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    /// A page followed by another one.
    #[must_use]
    pub fn with_next(items: Vec<T>, next_token: impl Into<String>) -> Self {
        Self {
            items,
            next_token: Some(next_token.into()),
        }
    }
}

/// A per-item failure reported inside an otherwise successful batch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFailure {
    /// Digest the failure refers to.
    pub digest: Digest,
    /// Registry failure code (e.g. `ImageNotFound`).
    pub code: String,
    /// Human-readable reason supplied by the registry.
    pub reason: String,
}

impl ImageFailure {
    /// Create a new failure record.
    #[must_use]
    pub fn new(
        digest: impl Into<Digest>,
        code: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            digest: digest.into(),
            code: code.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ImageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.digest, self.code, self.reason)
    }
}

/// A manifest body fetched for one digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Digest the manifest was requested for.
    pub digest: Digest,
    /// Raw JSON manifest document.
    pub body: String,
}

/// Result of a batched manifest fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestBatch {
    /// Manifests that were returned.
    pub manifests: Vec<Manifest>,
    /// Digests the registry could not return.
    pub failures: Vec<ImageFailure>,
}

/// Result of a batched delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    /// Digests that were deleted.
    pub deleted: Vec<Digest>,
    /// Digests the registry refused to delete.
    pub failures: Vec<ImageFailure>,
}

/// Failure code the registry reports for a digest that no longer exists.
pub const IMAGE_NOT_FOUND: &str = "ImageNotFound";

impl BatchDeleteOutcome {
    /// Count `ImageNotFound` failures as deleted.
    ///
    /// Only valid for a resent request, where an earlier attempt may have
    /// been applied before its response was lost.
    #[must_use]
    pub fn with_missing_as_deleted(mut self) -> Self {
        let (missing, failures): (Vec<_>, Vec<_>) = self
            .failures
            .into_iter()
            .partition(|failure| failure.code == IMAGE_NOT_FOUND);
        self.deleted
            .extend(missing.into_iter().map(|failure| failure.digest));
        self.failures = failures;
        self
    }
}
