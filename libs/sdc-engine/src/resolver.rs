//! Injected collaborators for data the engine cannot compute itself.

use crate::error::Result;
use async_trait::async_trait;
use sdc_models::Coding;
use serde_json::Value;

/// Runs an `application/x-fhir-query` against a FHIR server or store.
#[async_trait]
pub trait XFhirQueryResolver: Send + Sync {
    /// `query` is relative, e.g. `Practitioner?active=true`, with every
    /// `{{ }}` placeholder already substituted. Returns matching resources.
    async fn resolve(&self, query: &str) -> Result<Vec<Value>>;
}

/// Expands an `answerValueSet` canonical that is not contained in the
/// questionnaire.
#[async_trait]
pub trait AnswerValueSetResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<Vec<Coding>>;
}
