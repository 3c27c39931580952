//! Questionnaire state engine for Structured Data Capture
//!
//! Given a FHIR Questionnaire (and optionally a QuestionnaireResponse), the
//! engine keeps the response consistent while answers change:
//!
//! - `enableWhen` / `enableWhenExpression` decide which items exist;
//!   answers of disabled items are parked and come back on re-enable
//! - `calculatedExpression`, `initialExpression`, `answerExpression`,
//!   `cqf-calculatedValue` bounds and `cqf-expression` text are evaluated
//!   with FHIRPath, in dependency order; cycles are rejected at load
//! - answers are validated against required, min/max value, length and
//!   regex constraints
//! - pages and the questionnaire's entry mode gate navigation
//!
//! Every change publishes a new [`QuestionnaireState`] snapshot on a
//! `tokio::sync::watch` channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use sdc_engine::{ItemPath, QuestionnaireEngine};
//! use sdc_models::AnswerValue;
//!
//! # async fn run() -> sdc_engine::Result<()> {
//! let mut engine = QuestionnaireEngine::builder()
//!     .questionnaire_path("questionnaire.json")
//!     .build()
//!     .await?;
//!
//! let path: ItemPath = "age".parse()?;
//! engine.set_answer(&path, vec![AnswerValue::Integer(42)]).await?;
//!
//! for item in &engine.state().items {
//!     println!("{item:?}");
//! }
//! let response = engine.questionnaire_response()?;
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod answer_options;
pub mod calculated;
pub mod config;
pub mod dependency;
pub mod enablement;
pub mod engine;
pub mod error;
pub mod expression;
pub mod pagination;
pub mod path;
pub mod resolver;
pub mod response;
pub mod state;
pub mod tree;
pub mod validation;

pub use config::EngineConfig;
pub use engine::{QuestionnaireEngine, QuestionnaireEngineBuilder};
pub use error::{ConfigError, Error, Result};
pub use pagination::{QuestionnairePage, QuestionnairePagination};
pub use path::ItemPath;
pub use resolver::{AnswerValueSetResolver, XFhirQueryResolver};
pub use state::{
    DisplayMode, NavigationButton, QuestionItem, QuestionnaireAdapterItem,
    QuestionnaireNavigationUiState, QuestionnaireState,
};
pub use validation::ValidationResult;
