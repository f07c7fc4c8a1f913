// Template Sources
// Collaborator interface for fetching template documents from repositories

use crate::parser::models::TemplateRepository;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from a template source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The template does not exist in the repository; never retried
    #[error("template '{path}' not found in repository '{alias}'")]
    NotFound { alias: String, path: String },

    /// The repository could not be reached; retried a bounded number of
    /// times before being surfaced as fatal
    #[error("repository '{alias}' unavailable: {reason}")]
    Unavailable { alias: String, reason: String },
}

/// Fetches template documents by (repository, path).
///
/// Network and storage details live entirely behind this trait; the
/// resolver only sees document bodies or errors.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch(
        &self,
        repository: &TemplateRepository,
        path: &str,
    ) -> Result<String, SourceError>;
}

/// Filesystem-backed template source.
///
/// An alias can be mapped to a local directory explicitly; otherwise the
/// repository's declared location is treated as a directory path.
pub struct FsTemplateSource {
    roots: HashMap<String, PathBuf>,
}

impl FsTemplateSource {
    pub fn new() -> Self {
        Self {
            roots: HashMap::new(),
        }
    }

    /// Map a repository alias to a local directory
    pub fn with_root(mut self, alias: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(alias.into(), root.into());
        self
    }

    fn root_for(&self, repository: &TemplateRepository) -> PathBuf {
        self.roots
            .get(&repository.alias)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(&repository.location))
    }
}

impl Default for FsTemplateSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateSource for FsTemplateSource {
    async fn fetch(
        &self,
        repository: &TemplateRepository,
        path: &str,
    ) -> Result<String, SourceError> {
        let full_path = self.root_for(repository).join(path);
        tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SourceError::NotFound {
                    alias: repository.alias.clone(),
                    path: path.to_string(),
                },
                _ => SourceError::Unavailable {
                    alias: repository.alias.clone(),
                    reason: e.to_string(),
                },
            })
    }
}

/// Wraps a template source with bounded retries for transient failures.
///
/// `NotFound` is surfaced immediately; `Unavailable` is retried with a
/// linear backoff until the attempt budget runs out.
pub struct RetryingSource<S> {
    inner: S,
    max_attempts: u32,
    backoff: Duration,
}

impl<S> RetryingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl<S: TemplateSource> TemplateSource for RetryingSource<S> {
    async fn fetch(
        &self,
        repository: &TemplateRepository,
        path: &str,
    ) -> Result<String, SourceError> {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(repository, path).await {
                Ok(body) => return Ok(body),
                Err(err @ SourceError::NotFound { .. }) => return Err(err),
                Err(err @ SourceError::Unavailable { .. }) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(
                        alias = %repository.alias,
                        path,
                        attempt,
                        "template source unavailable, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn repo(alias: &str, location: &str) -> TemplateRepository {
        TemplateRepository {
            alias: alias.to_string(),
            kind: "git".to_string(),
            location: location.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fs_source_reads_template() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("steps")).unwrap();
        std::fs::write(dir.path().join("steps/build.yml"), "steps: []\n").unwrap();

        let source = FsTemplateSource::new().with_root("ci", dir.path());
        let body = source.fetch(&repo("ci", "org/ci"), "steps/build.yml").await.unwrap();
        assert_eq!(body, "steps: []\n");
    }

    #[tokio::test]
    async fn test_fs_source_falls_back_to_location() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("t.yml"), "jobs: []\n").unwrap();

        let source = FsTemplateSource::new();
        let location = dir.path().to_string_lossy().to_string();
        let body = source.fetch(&repo("ci", &location), "t.yml").await.unwrap();
        assert_eq!(body, "jobs: []\n");
    }

    #[tokio::test]
    async fn test_fs_source_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = FsTemplateSource::new().with_root("ci", dir.path());
        let err = source.fetch(&repo("ci", "org/ci"), "missing.yml").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    /// Source that fails with `Unavailable` for the first N calls
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TemplateSource for FlakySource {
        async fn fetch(
            &self,
            repository: &TemplateRepository,
            _path: &str,
        ) -> Result<String, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(SourceError::Unavailable {
                    alias: repository.alias.clone(),
                    reason: "connection reset".to_string(),
                })
            } else {
                Ok("steps: []\n".to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_source_recovers_from_transient_failures() {
        let source = RetryingSource::new(FlakySource {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let body = source.fetch(&repo("ci", "org/ci"), "t.yml").await.unwrap();
        assert_eq!(body, "steps: []\n");
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_source_exhausts_attempts() {
        let source = RetryingSource::new(FlakySource {
            failures: 10,
            calls: AtomicU32::new(0),
        })
        .with_max_attempts(3);

        let err = source.fetch(&repo("ci", "org/ci"), "t.yml").await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_source_does_not_retry_not_found() {
        struct MissingSource(AtomicU32);

        #[async_trait]
        impl TemplateSource for MissingSource {
            async fn fetch(
                &self,
                repository: &TemplateRepository,
                path: &str,
            ) -> Result<String, SourceError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::NotFound {
                    alias: repository.alias.clone(),
                    path: path.to_string(),
                })
            }
        }

        let source = RetryingSource::new(MissingSource(AtomicU32::new(0)));
        let err = source.fetch(&repo("ci", "org/ci"), "t.yml").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
        assert_eq!(source.inner.0.load(Ordering::SeqCst), 1);
    }
}
