//! FHIRPath for SDC questionnaire expressions
//!
//! A tree-walking FHIRPath evaluator over FHIR JSON:
//!
//! ```text
//! Expression String
//!      |
//!   Lexer -> Tokens
//!      |
//!   Parser -> AST  (cached by Engine)
//!      |
//!   Evaluator + Context -> Collection
//! ```
//!
//! [`references::ExpressionReferences`] inspects an AST without evaluating
//! it, which the questionnaire engine uses to build its dependency graph.

pub mod ast;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod operations;
pub mod parser;
pub mod references;
pub mod temporal;
pub mod token;
pub mod value;

pub use context::Context;
pub use engine::Engine;
pub use error::{Error, Result};
pub use references::ExpressionReferences;
pub use temporal::{FhirDate, FhirDateTime, FhirTime};
pub use value::{Collection, Value, ValueData};
