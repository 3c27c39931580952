//! Engine configuration
//!
//! Plain data, deserializable from any `serde` source. Collaborators
//! (resolvers, launch contexts) are not configuration and are passed to
//! [`crate::QuestionnaireEngineBuilder`] instead.

use crate::error::ConfigError;
use sdc_models::EntryMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Render everything as review; no edits
    pub read_only: bool,
    pub enable_review_page: bool,
    /// Open on the review page; requires `enable_review_page`
    pub show_review_page_first: bool,
    pub show_submit_button: bool,
    pub submit_button_text: Option<String>,
    pub show_cancel_button: bool,
    /// Emit navigation as a trailing list item instead of a bottom bar
    pub show_navigation_in_long_scroll: bool,
    /// Mark required questions with an asterisk
    pub show_asterisk: bool,
    /// Add a "Required" hint to required questions
    pub show_required_text: bool,
    /// Add an "(optional)" hint to optional questions
    pub show_optional_text: bool,
    /// Overrides the questionnaire's entryMode extension
    pub entry_mode: Option<EntryMode>,
    /// BCP-47 tag used to pick translations, e.g. `de-CH`
    pub locale: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            enable_review_page: false,
            show_review_page_first: false,
            show_submit_button: true,
            submit_button_text: None,
            show_cancel_button: false,
            show_navigation_in_long_scroll: false,
            show_asterisk: false,
            show_required_text: true,
            show_optional_text: false,
            entry_mode: None,
            locale: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.show_review_page_first && !self.enable_review_page {
            return Err(ConfigError::ReviewFirstWithoutReviewPage);
        }
        if let Some(locale) = &self.locale {
            if locale.is_empty() || locale.split('-').any(str::is_empty) {
                return Err(ConfigError::InvalidConfig(format!(
                    "locale '{locale}' is not a language tag"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: EngineConfig = serde_json::from_value(json!({})).unwrap();
        assert!(config.show_submit_button);
        assert!(config.show_required_text);
        assert!(!config.show_cancel_button);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_review_first_requires_review_page() {
        let config = EngineConfig {
            show_review_page_first: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReviewFirstWithoutReviewPage)
        ));
    }

    #[test]
    fn test_entry_mode_override() {
        let config: EngineConfig =
            serde_json::from_value(json!({"entry_mode": "prior-edit", "locale": "de-CH"})).unwrap();
        assert_eq!(config.entry_mode, Some(EntryMode::PriorEdit));
        assert!(config.validate().is_ok());
    }
}
