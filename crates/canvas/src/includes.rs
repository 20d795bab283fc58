//! Expands `#include` directives in fragment source before compilation.
//!
//! `LygiaIncludes` inlines lines of the form `#include "lygia/..."` by
//! fetching the named file from the include service. Lines that do not match
//! are kept verbatim and the result is re-joined with `\n` in source order.
use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;
use url::Url;

use crate::error::{LoadError, ResolutionError};
use crate::fetch::Fetcher;

pub const DEFAULT_INCLUDE_SERVICE: &str = "https://lygia.xyz";

const LYGIA_DIRECTIVE: &str = "#include \"lygia";

#[async_trait]
pub trait IncludeResolver: Send + Sync {
    async fn expand(&self, source: &str) -> Result<String, LoadError>;
}

/// Leaves the source untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIncludes;

#[async_trait]
impl IncludeResolver for NoIncludes {
    async fn expand(&self, source: &str) -> Result<String, LoadError> {
        Ok(source.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LygiaIncludes {
    fetcher: Fetcher,
    service: String,
}

impl LygiaIncludes {
    pub fn new(fetcher: Fetcher, service: impl Into<String>) -> Self {
        let service = service.into().trim_end_matches('/').to_string();
        Self { fetcher, service }
    }

    pub fn with_default_service(fetcher: Fetcher) -> Self {
        Self::new(fetcher, DEFAULT_INCLUDE_SERVICE)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// URL for a directive line, or `None` if the line is not a lygia include.
    pub fn include_url(&self, line: &str) -> Option<Result<Url, ResolutionError>> {
        let rest = line.trim().strip_prefix(LYGIA_DIRECTIVE)?;
        let path: String = rest
            .chars()
            .filter(|c| !matches!(c, '"' | ';') && !c.is_whitespace())
            .collect();
        let raw = format!("{}{}", self.service, path);
        Some(Url::parse(&raw).map_err(|source| ResolutionError {
            reference: path,
            base: self.service.clone(),
            source,
        }))
    }
}

#[async_trait]
impl IncludeResolver for LygiaIncludes {
    async fn expand(&self, source: &str) -> Result<String, LoadError> {
        let expansions = source.lines().map(|line| async move {
            match self.include_url(line) {
                None => Ok(line.to_string()),
                Some(url) => {
                    let url = url?;
                    debug!(%url, "expanding include");
                    self.fetcher.text(&url).await
                }
            }
        });
        let lines = join_all(expansions)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, LoadError>>()?;
        Ok(lines.join("\n"))
    }
}
