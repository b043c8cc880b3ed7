//! Pre-flight checks run before a cluster operation mutates anything

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// A named check with a hint for fixing it when it fails
pub struct Validation<'a> {
    pub name: String,
    pub remediation: String,
    check: BoxFuture<'a, Result<()>>,
}

impl<'a> Validation<'a> {
    pub fn new(
        name: impl Into<String>,
        remediation: impl Into<String>,
        check: impl Future<Output = Result<()>> + Send + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            remediation: remediation.into(),
            check: check.boxed(),
        }
    }

    pub async fn run(self) -> ValidationResult {
        let err = self.check.await.err();
        ValidationResult {
            name: self.name,
            remediation: self.remediation,
            err,
        }
    }
}

impl std::fmt::Debug for Validation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validation")
            .field("name", &self.name)
            .field("remediation", &self.remediation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ValidationResult {
    pub name: String,
    pub remediation: String,
    pub err: Option<Error>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}

/// Run every validation, then fail with one error naming each failed check.
pub async fn run_validations(validations: Vec<Validation<'_>>) -> Result<()> {
    let mut failures = Vec::new();
    for v in validations {
        let result = v.run().await;
        match &result.err {
            None => info!(validation = %result.name, "Validation passed"),
            Some(e) => {
                warn!(validation = %result.name, error = %e, "Validation failed");
                failures.push(format!(
                    "{}: {} ({})",
                    result.name, e, result.remediation
                ));
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::ValidationError(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let validations = vec![
            Validation::new("ok", "nothing", async { Ok(()) }),
            Validation::new("Flux path", "pick another path", async {
                Err(Error::ValidationError("exists".to_string()))
            }),
            Validation::new("token", "set GITHUB_TOKEN", async {
                Err(Error::ConfigError("missing".to_string()))
            }),
        ];
        let err = run_validations(validations).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Flux path"));
        assert!(msg.contains("pick another path"));
        assert!(msg.contains("set GITHUB_TOKEN"));
        assert!(!msg.contains("ok:"));
    }

    #[tokio::test]
    async fn test_empty_set_passes() {
        assert!(run_validations(Vec::new()).await.is_ok());
    }
}
