//! Localized text from `translation` extensions
//!
//! A translated primitive looks like
//! `"_text": {"extension": [{"url": ".../translation", "extension": [
//! {"url": "lang", "valueCode": "de"}, {"url": "content", "valueString": "..."}]}]}`.

use crate::complex::{Coding, Element, Extension};
use crate::extensions::TRANSLATION;
use crate::questionnaire::QuestionnaireItem;

/// Translation for `lang`, matched exactly
pub fn translation<'a>(element: &'a Element, lang: &str) -> Option<&'a str> {
    element
        .extension
        .iter()
        .filter(|e| e.url == TRANSLATION)
        .find(|e| e.sub_extension("lang").and_then(Extension::as_str) == Some(lang))
        .and_then(|e| e.sub_extension("content"))
        .and_then(Extension::as_str)
}

/// Text in `locale`: the exact tag first, then its primary language
/// (`de-CH` falls back to `de`), then `base`.
pub fn localized<'a>(
    base: Option<&'a str>,
    element: Option<&'a Element>,
    locale: Option<&str>,
) -> Option<&'a str> {
    let (Some(element), Some(locale)) = (element, locale) else {
        return base;
    };
    let language = locale.split('-').next().unwrap_or(locale);
    translation(element, locale)
        .or_else(|| translation(element, language))
        .or(base)
}

impl QuestionnaireItem {
    pub fn localized_text(&self, locale: Option<&str>) -> Option<&str> {
        localized(self.text.as_deref(), self.text_element.as_ref(), locale)
    }

    pub fn localized_prefix(&self, locale: Option<&str>) -> Option<&str> {
        localized(self.prefix.as_deref(), self.prefix_element.as_ref(), locale)
    }
}

impl Coding {
    pub fn localized_display(&self, locale: Option<&str>) -> Option<&str> {
        localized(self.display.as_deref(), self.display_element.as_ref(), locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaire::ItemType;
    use crate::value::ExtensionValue;

    fn translated(lang: &str, content: &str) -> Extension {
        Extension::complex(
            TRANSLATION,
            vec![
                Extension::new("lang", ExtensionValue::Code(lang.into())),
                Extension::new("content", ExtensionValue::String(content.into())),
            ],
        )
    }

    fn item() -> QuestionnaireItem {
        let mut item = QuestionnaireItem::new("q", ItemType::String);
        item.text = Some("Name".into());
        item.text_element = Some(Element {
            id: None,
            extension: vec![translated("de", "Name (de)"), translated("fr-CA", "Nom")],
        });
        item
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(item().localized_text(Some("fr-CA")), Some("Nom"));
    }

    #[test]
    fn test_language_fallback() {
        assert_eq!(item().localized_text(Some("de-CH")), Some("Name (de)"));
    }

    #[test]
    fn test_base_text_fallback() {
        assert_eq!(item().localized_text(Some("fr-FR")), Some("Name"));
        assert_eq!(item().localized_text(None), Some("Name"));
    }
}
