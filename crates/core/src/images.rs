//! Image set resolution: one repository's listing split into tagged and
//! untagged digests.

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::types::Digest;
use indexmap::IndexSet;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// A repository's images partitioned by whether they carry a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    /// Tagged digests in listing order, each listed once even if it has several tags.
    pub tagged: IndexSet<Digest>,
    /// Untagged digests; the orphan candidates.
    pub untagged: BTreeSet<Digest>,
}

impl ImageSet {
    /// Build an image set from explicit digests. A digest present in both
    /// inputs is kept only as tagged.
    #[must_use]
    pub fn from_parts<T, U>(tagged: T, untagged: U) -> Self
    where
        T: IntoIterator,
        T::Item: Into<Digest>,
        U: IntoIterator,
        U::Item: Into<Digest>,
    {
        let mut set = Self::default();
        for digest in tagged {
            set.insert_tagged(digest.into());
        }
        for digest in untagged {
            set.insert_untagged(digest.into());
        }
        set
    }

    fn insert_tagged(&mut self, digest: Digest) {
        self.untagged.remove(&digest);
        self.tagged.insert(digest);
    }

    fn insert_untagged(&mut self, digest: Digest) {
        if !self.tagged.contains(&digest) {
            self.untagged.insert(digest);
        }
    }
}

/// List every image in `repository` and partition the digests.
///
/// Pages are fetched until the registry stops returning a continuation
/// token. A failed page aborts the whole resolution; no partial set is
/// returned.
pub async fn resolve_image_set(registry: &dyn Registry, repository: &str) -> Result<ImageSet> {
    let mut images = ImageSet::default();
    let mut next_token = None;
    let mut pages = 0usize;

    loop {
        let page = registry
            .list_images_page(repository, next_token)
            .await
            .map_err(|source| Error::ListImages {
                repository: repository.to_string(),
                source,
            })?;
        pages += 1;
        trace!(repository, page = pages, items = page.items.len(), "Fetched image page");

        for image in page.items {
            if image.is_tagged() {
                images.insert_tagged(image.digest);
            } else {
                images.insert_untagged(image.digest);
            }
        }

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    debug!(
        repository,
        pages,
        tagged = images.tagged.len(),
        untagged = images.untagged.len(),
        "Resolved image set"
    );
    Ok(images)
}
