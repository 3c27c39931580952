//! FHIR models for Structured Data Capture
//!
//! Strongly-typed serde models for the resources a questionnaire engine
//! reads and writes:
//!
//! - [`Questionnaire`] and its items, enableWhen conditions and options
//! - [`QuestionnaireResponse`] with answers and nested items
//! - [`ValueSet`] for contained answer value sets
//!
//! SDC behaviour is carried in extensions; [`extensions`] defines their
//! URLs and typed accessors on the models.
//!
//! # Example
//!
//! ```rust
//! use sdc_models::{ItemType, Questionnaire};
//!
//! let questionnaire = Questionnaire::from_json_str(r#"{
//!     "resourceType": "Questionnaire",
//!     "item": [{"linkId": "age", "type": "integer"}]
//! }"#).unwrap();
//!
//! let item = questionnaire.find_item("age").unwrap();
//! assert_eq!(item.item_type(), Some(ItemType::Integer));
//! ```

pub mod complex;
pub mod error;
pub mod extensions;
pub mod questionnaire;
pub mod resource_types;
pub mod response;
pub mod translation;
pub mod value;
pub mod value_set;

pub use complex::*;
pub use error::{Error, Result};
pub use extensions::{AnswerOptionsToggle, EntryMode, LaunchContextDeclaration};
pub use questionnaire::*;
pub use resource_types::is_resource_type;
pub use response::*;
pub use value::{AnswerValue, ExtensionValue};
pub use value_set::*;
