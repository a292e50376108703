//! Repository enumeration and selection.

use crate::config::RepositorySelection;
use crate::error::{Error, Result};
use crate::registry::Registry;
use indexmap::IndexSet;
use regex::Regex;
use tracing::debug;

/// List every repository name in the registry.
pub async fn list_repositories(registry: &dyn Registry) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut next_token = None;

    loop {
        let page = registry
            .list_repositories_page(next_token)
            .await
            .map_err(|source| Error::ListRepositories { source })?;
        names.extend(page.items);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    debug!(count = names.len(), "Listed repositories");
    Ok(names)
}

/// Keep the names the pattern matches anywhere in.
///
/// The pattern is not anchored: `team` matches `my-team-api`. Use `^` and `$`
/// for whole-name matches.
pub fn filter_by_pattern(names: Vec<String>, pattern: &str) -> Result<Vec<String>> {
    let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(names.into_iter().filter(|name| regex.is_match(name)).collect())
}

/// Turn a selection into a concrete list of repository names.
///
/// Explicit names are used as given (trimmed, empties dropped, first
/// occurrence kept) without asking the registry whether they exist. A
/// missing repository then fails in its own pipeline.
pub async fn resolve_repositories(
    registry: &dyn Registry,
    selection: &RepositorySelection,
) -> Result<Vec<String>> {
    match selection {
        RepositorySelection::All => list_repositories(registry).await,
        RepositorySelection::Pattern(pattern) => {
            // Compile before listing so a bad pattern costs no remote call.
            Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            let names = list_repositories(registry).await?;
            filter_by_pattern(names, pattern)
        }
        RepositorySelection::Names(names) => Ok(names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()),
    }
}
