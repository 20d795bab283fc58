//! Resolves relative resource references against an immutable base location.
//!
//! A `ResolverContext` is a value, never a shared mutable base: stages that
//! need to resolve references found inside a fetched file `descend` into that
//! file's directory and pass the derived context down the call chain.
use std::path::Path;

use tracing::debug;
use url::Url;

use crate::error::ResolutionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverContext {
    base: Url,
}

impl ResolverContext {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn parse(base: &str) -> Result<Self, ResolutionError> {
        Url::parse(base)
            .map(Self::new)
            .map_err(|source| ResolutionError {
                reference: base.to_string(),
                base: String::new(),
                source,
            })
    }

    /// Context rooted at a local directory, expressed as a `file://` URL.
    pub fn from_directory(dir: &Path) -> Result<Self, ResolutionError> {
        Url::from_directory_path(dir)
            .map(Self::new)
            .map_err(|_| ResolutionError {
                reference: dir.display().to_string(),
                base: String::new(),
                source: url::ParseError::RelativeUrlWithoutBase,
            })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Standard reference resolution; `reference` may be absolute,
    /// scheme-relative, or relative.
    pub fn resolve(&self, reference: &str) -> Result<Url, ResolutionError> {
        self.base
            .join(reference.trim())
            .map_err(|source| ResolutionError {
                reference: reference.to_string(),
                base: self.base.to_string(),
                source,
            })
    }

    /// Returns a context whose base is the directory containing `reference`.
    pub fn descend(&self, reference: &str) -> Result<Self, ResolutionError> {
        let target = self.resolve(reference)?;
        let directory = target.join(".").map_err(|source| ResolutionError {
            reference: reference.to_string(),
            base: self.base.to_string(),
            source,
        })?;
        debug!(from = %self.base, to = %directory, "descended resolver context");
        Ok(Self::new(directory))
    }
}
