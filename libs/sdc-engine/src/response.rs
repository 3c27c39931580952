//! Response lifecycle
//!
//! Load-time checks, building new responses, and converting between the
//! exchanged form (one response item per repeated group occurrence) and
//! the packed form the engine works on (one response item per repeated
//! group, one answer per occurrence).

use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use sdc_models::{
    extensions, is_resource_type, Extension, ExtensionValue, ItemType, Questionnaire,
    QuestionnaireItem, QuestionnaireResponse, QuestionnaireResponseAnswer,
    QuestionnaireResponseItem, QuestionnaireResponseStatus,
};

/// Check every `launchContext` extension carries a `name` Coding from the
/// launch context code system and resource type `type` codes.
pub fn validate_launch_context_extensions(questionnaire: &Questionnaire) -> Result<()> {
    for extension in questionnaire.launch_context_extensions() {
        let name = match extension.sub_extension("name").and_then(|e| e.value.as_ref()) {
            Some(ExtensionValue::Coding(coding)) => coding,
            _ => {
                return Err(Error::InvalidLaunchContext(format!(
                    "The extension:name is missing or is not of type Coding in {}",
                    extensions::LAUNCH_CONTEXT
                )))
            }
        };
        let types: Vec<&str> = extension
            .sub_extensions("type")
            .filter_map(|e| match e.value.as_ref() {
                Some(ExtensionValue::Code(code)) => Some(code.as_str()),
                _ => None,
            })
            .collect();
        if types.is_empty() {
            return Err(Error::InvalidLaunchContext(format!(
                "The extension:type is missing or is not of type CodeType in {}",
                extensions::LAUNCH_CONTEXT
            )));
        }
        let valid_name = name.system.as_deref() == Some(extensions::LAUNCH_CONTEXT_SYSTEM)
            && name.code.is_some();
        if !valid_name || !types.iter().all(|t| is_resource_type(t)) {
            return Err(Error::InvalidLaunchContext(format!(
                "The extension:name and/or extension:type do not follow the format specified in {}",
                extensions::LAUNCH_CONTEXT
            )));
        }
    }
    Ok(())
}

/// Structural rules on the definition: item types and initial values.
pub fn check_questionnaire(questionnaire: &Questionnaire) -> Result<()> {
    fn check(item: &QuestionnaireItem) -> Result<()> {
        let Some(item_type) = item.item_type() else {
            return Err(Error::MissingItemType(item.link_id.clone()));
        };
        let initial_selected = item.answer_option.iter().filter(|o| o.is_initial_selected()).count();
        if !item.initial.is_empty() {
            if matches!(item_type, ItemType::Group | ItemType::Display) {
                return Err(Error::InitialValueOnGroup(item.link_id.clone()));
            }
            if !item.answer_option.is_empty() && item.initial_expression().is_none() {
                return Err(Error::InitialValueWithAnswerOption(item.link_id.clone()));
            }
        }
        if (item.initial.len() > 1 || initial_selected > 1) && !item.is_repeating() {
            return Err(Error::MultipleInitialValues(item.link_id.clone()));
        }
        item.item.iter().try_for_each(check)
    }
    questionnaire.item.iter().try_for_each(check)
}

/// Check a packed response against its questionnaire.
pub fn check_questionnaire_response(
    questionnaire: &Questionnaire,
    response: &QuestionnaireResponse,
) -> Result<()> {
    if let Some(canonical) = &response.questionnaire {
        if questionnaire.url.as_deref() != Some(canonical.as_str()) {
            return Err(Error::QuestionnaireMismatch {
                questionnaire: questionnaire.url.clone().unwrap_or_default(),
                response: canonical.clone(),
            });
        }
    }
    check_items(&questionnaire.item, &response.item)
}

/// Response items must follow definition order; items may be missing.
fn check_items(definitions: &[QuestionnaireItem], responses: &[QuestionnaireResponseItem]) -> Result<()> {
    let mut remaining = definitions.iter();
    for response in responses {
        let definition = remaining
            .by_ref()
            .find(|d| d.link_id == response.link_id)
            .ok_or_else(|| Error::MissingQuestionnaireItem(response.link_id.clone()))?;
        check_item(definition, response)?;
    }
    Ok(())
}

fn check_item(definition: &QuestionnaireItem, response: &QuestionnaireResponseItem) -> Result<()> {
    let item_type = definition
        .item_type()
        .ok_or_else(|| Error::MissingItemType(definition.link_id.clone()))?;
    match item_type {
        ItemType::Display => Ok(()),
        ItemType::Group if !definition.is_repeating() => check_items(&definition.item, &response.item),
        _ => {
            if !definition.is_repeating() && response.answer.len() > 1 {
                return Err(Error::MultipleAnswers(definition.link_id.clone()));
            }
            for answer in &response.answer {
                if let Some(value) = &answer.value {
                    if !item_type.accepts(value) {
                        return Err(Error::AnswerTypeMismatch {
                            link_id: definition.link_id.clone(),
                            item_type: item_type.code().to_string(),
                            answer_type: value.type_name().to_string(),
                        });
                    }
                }
                check_items(&definition.item, &answer.item)?;
            }
            Ok(())
        }
    }
}

/// Give every definition item at least one response item, keeping the
/// supplied ones. Works on the exchanged (unpacked) form.
pub fn add_missing_response_items(
    definitions: &[QuestionnaireItem],
    responses: &mut Vec<QuestionnaireResponseItem>,
) -> Result<()> {
    let mut supplied = std::mem::take(responses);
    for definition in definitions {
        let mut matching: Vec<QuestionnaireResponseItem> = Vec::new();
        let mut rest = Vec::with_capacity(supplied.len());
        for item in supplied {
            if item.link_id == definition.link_id {
                matching.push(item);
            } else {
                rest.push(item);
            }
        }
        supplied = rest;

        if matching.is_empty() {
            if !definition.is_repeated_group() {
                responses.push(create_response_item(definition)?);
            }
            continue;
        }
        if definition.is_group() {
            for item in &mut matching {
                add_missing_response_items(&definition.item, &mut item.item)?;
            }
        }
        responses.extend(matching);
    }
    // unknown link ids are kept so the consistency check can name them
    responses.extend(supplied);
    Ok(())
}

/// Fold repeated group occurrences into one item with an answer each.
pub fn pack_repeated_groups(
    definitions: &[QuestionnaireItem],
    responses: Vec<QuestionnaireResponseItem>,
) -> Vec<QuestionnaireResponseItem> {
    let mut supplied = responses;
    let mut packed = Vec::with_capacity(supplied.len());
    for definition in definitions {
        let (matching, rest): (Vec<_>, Vec<_>) = supplied
            .into_iter()
            .partition(|item| item.link_id == definition.link_id);
        supplied = rest;

        let matching = matching.into_iter().map(|mut item| {
            item.item = pack_repeated_groups(&definition.item, std::mem::take(&mut item.item));
            for answer in &mut item.answer {
                answer.item = pack_repeated_groups(&definition.item, std::mem::take(&mut answer.item));
            }
            item
        });
        if definition.is_repeated_group() {
            let mut group = QuestionnaireResponseItem::new(&definition.link_id);
            group.answer = matching
                .map(|occurrence| QuestionnaireResponseAnswer {
                    value: None,
                    item: occurrence.item,
                })
                .collect();
            packed.push(group);
        } else {
            packed.extend(matching);
        }
    }
    packed.extend(supplied);
    packed
}

/// Expand packed repeated groups back to one item per occurrence.
pub fn unpack_repeated_groups(
    definitions: &[QuestionnaireItem],
    responses: Vec<QuestionnaireResponseItem>,
    locale: Option<&str>,
) -> Vec<QuestionnaireResponseItem> {
    let mut unpacked = Vec::with_capacity(responses.len());
    for mut item in responses {
        let Some(definition) = definitions.iter().find(|d| d.link_id == item.link_id) else {
            unpacked.push(item);
            continue;
        };
        item.item = unpack_repeated_groups(&definition.item, std::mem::take(&mut item.item), locale);
        for answer in &mut item.answer {
            answer.item = unpack_repeated_groups(&definition.item, std::mem::take(&mut answer.item), locale);
        }
        if definition.is_repeated_group() {
            let text = definition.localized_text(locale).map(str::to_string);
            unpacked.extend(item.answer.into_iter().map(|occurrence| QuestionnaireResponseItem {
                link_id: definition.link_id.clone(),
                text: text.clone(),
                item: occurrence.item,
                ..Default::default()
            }));
        } else {
            unpacked.push(item);
        }
    }
    unpacked
}

/// Initial answers from `initial` or `initialSelected` options.
pub fn initial_answers(definition: &QuestionnaireItem) -> Vec<QuestionnaireResponseAnswer> {
    if !definition.initial.is_empty() {
        return definition
            .initial
            .iter()
            .map(|initial| QuestionnaireResponseAnswer::new(initial.value.clone()))
            .collect();
    }
    definition
        .answer_option
        .iter()
        .filter(|o| o.is_initial_selected())
        .map(|o| QuestionnaireResponseAnswer::new(o.value.clone()))
        .collect()
}

/// A fresh response item for `definition`: initial answers, nested items
/// under them, and children of non-repeating groups. Repeated groups
/// inside start with no occurrence.
pub fn create_response_item(definition: &QuestionnaireItem) -> Result<QuestionnaireResponseItem> {
    let mut item = QuestionnaireResponseItem::new(&definition.link_id);
    item.answer = initial_answers(definition);
    if definition.is_group() && !definition.is_repeating() {
        for child in &definition.item {
            if !child.is_repeated_group() {
                item.item.push(create_response_item(child)?);
            }
        }
    } else if !definition.item.is_empty() && !item.answer.is_empty() {
        copy_nested_items_to_childless_answers(definition, &mut item)?;
    }
    Ok(item)
}

/// Answers of questions with nested items each carry a copy of the
/// nested items.
pub fn copy_nested_items_to_childless_answers(
    definition: &QuestionnaireItem,
    item: &mut QuestionnaireResponseItem,
) -> Result<()> {
    if !definition.should_have_nested_items_under_answers() || definition.is_repeated_group() {
        return Ok(());
    }
    for answer in item.answer.iter_mut().filter(|a| a.item.is_empty()) {
        answer.item = definition
            .item
            .iter()
            .map(create_response_item)
            .collect::<Result<_>>()?;
    }
    Ok(())
}

/// Items of one new repeated group occurrence
pub fn create_occurrence(definition: &QuestionnaireItem) -> Result<QuestionnaireResponseAnswer> {
    if !definition.is_repeated_group() {
        return Err(Error::NotARepeatedGroup(definition.link_id.clone()));
    }
    Ok(QuestionnaireResponseAnswer {
        value: None,
        item: definition
            .item
            .iter()
            .filter(|c| !c.is_repeated_group())
            .map(create_response_item)
            .collect::<Result<_>>()?,
    })
}

pub fn fhir_date_time(now: DateTime<FixedOffset>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A new in-progress response in packed form.
pub fn new_response(
    questionnaire: &Questionnaire,
    now: DateTime<FixedOffset>,
) -> Result<QuestionnaireResponse> {
    let mut response = QuestionnaireResponse {
        questionnaire: questionnaire.url.clone(),
        status: QuestionnaireResponseStatus::InProgress,
        ..Default::default()
    };
    set_launch_timestamp(&mut response, now);
    let items = questionnaire
        .item
        .iter()
        .filter(|d| !d.is_repeated_group())
        .map(create_response_item)
        .collect::<Result<Vec<_>>>()?;
    response.item = pack_repeated_groups(&questionnaire.item, items);
    Ok(response)
}

pub fn set_launch_timestamp(response: &mut QuestionnaireResponse, now: DateTime<FixedOffset>) {
    let value = ExtensionValue::DateTime(fhir_date_time(now));
    match response
        .extension
        .iter_mut()
        .find(|e| e.url == extensions::LAST_LAUNCHED_TIMESTAMP)
    {
        Some(existing) => existing.value = Some(value),
        None => response
            .extension
            .push(Extension::new(extensions::LAST_LAUNCHED_TIMESTAMP, value)),
    }
}

/// Prepare a supplied response: add missing items, pack repeated groups
/// and check it against the questionnaire.
pub fn load_response(
    questionnaire: &Questionnaire,
    mut response: QuestionnaireResponse,
) -> Result<QuestionnaireResponse> {
    add_missing_response_items(&questionnaire.item, &mut response.item)?;
    response.item = pack_repeated_groups(&questionnaire.item, std::mem::take(&mut response.item));
    check_questionnaire_response(questionnaire, &response)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use sdc_models::{AnswerOption, AnswerValue, Coding, Initial};
    use serde_json::json;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .and_then(|tz| tz.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).single())
            .unwrap()
    }

    fn repeated_group() -> QuestionnaireItem {
        let mut group = QuestionnaireItem::new("people", ItemType::Group);
        group.repeats = Some(true);
        group.text = Some("People".into());
        group.item.push(QuestionnaireItem::new("name", ItemType::String));
        group
    }

    fn launch_context(name: ExtensionValue, kind: ExtensionValue) -> Questionnaire {
        let mut q = Questionnaire::default();
        q.extension.push(Extension::complex(
            extensions::LAUNCH_CONTEXT,
            vec![Extension::new("name", name), Extension::new("type", kind)],
        ));
        q
    }

    #[test]
    fn test_launch_context_validation() {
        let valid = launch_context(
            ExtensionValue::Coding(Coding::new(extensions::LAUNCH_CONTEXT_SYSTEM, "patient")),
            ExtensionValue::Code("Patient".into()),
        );
        assert!(validate_launch_context_extensions(&valid).is_ok());

        let not_coding = launch_context(
            ExtensionValue::String("patient".into()),
            ExtensionValue::Code("Patient".into()),
        );
        assert_eq!(
            validate_launch_context_extensions(&not_coding).unwrap_err().to_string(),
            format!(
                "The extension:name is missing or is not of type Coding in {}",
                extensions::LAUNCH_CONTEXT
            )
        );

        let bad_type = launch_context(
            ExtensionValue::Coding(Coding::new(extensions::LAUNCH_CONTEXT_SYSTEM, "patient")),
            ExtensionValue::Code("Patients".into()),
        );
        assert!(validate_launch_context_extensions(&bad_type)
            .unwrap_err()
            .to_string()
            .starts_with("The extension:name and/or extension:type do not follow"));
    }

    #[test]
    fn test_initial_value_rules() {
        let mut group = QuestionnaireItem::new("g", ItemType::Group);
        group.initial.push(Initial {
            value: AnswerValue::Boolean(true),
        });
        let mut q = Questionnaire::default();
        q.item.push(group);
        assert!(matches!(check_questionnaire(&q), Err(Error::InitialValueOnGroup(_))));

        let mut choice = QuestionnaireItem::new("c", ItemType::Choice);
        choice.initial.push(Initial {
            value: AnswerValue::String("a".into()),
        });
        choice.answer_option.push(AnswerOption::new(AnswerValue::String("a".into())));
        q.item = vec![choice];
        assert!(matches!(
            check_questionnaire(&q),
            Err(Error::InitialValueWithAnswerOption(_))
        ));

        let mut single = QuestionnaireItem::new("s", ItemType::String);
        for v in ["a", "b"] {
            single.initial.push(Initial {
                value: AnswerValue::String(v.into()),
            });
        }
        q.item = vec![single];
        assert!(matches!(check_questionnaire(&q), Err(Error::MultipleInitialValues(_))));
    }

    #[test]
    fn test_response_checks() {
        let mut q = Questionnaire::default();
        q.url = Some("http://example.org/q".into());
        q.item.push(QuestionnaireItem::new("a", ItemType::Boolean));
        q.item.push(QuestionnaireItem::new("b", ItemType::String));

        let mut r = QuestionnaireResponse {
            questionnaire: Some("http://example.org/other".into()),
            ..Default::default()
        };
        assert!(matches!(
            check_questionnaire_response(&q, &r),
            Err(Error::QuestionnaireMismatch { .. })
        ));

        r.questionnaire = None;
        r.item = vec![QuestionnaireResponseItem::new("b"), QuestionnaireResponseItem::new("a")];
        assert_eq!(
            check_questionnaire_response(&q, &r).unwrap_err().to_string(),
            "Missing questionnaire item for questionnaire response item a"
        );

        let mut a = QuestionnaireResponseItem::new("a");
        a.answer.push(AnswerValue::String("yes".into()).into());
        r.item = vec![a.clone()];
        assert_eq!(
            check_questionnaire_response(&q, &r).unwrap_err().to_string(),
            "Mismatching question type boolean and answer type string for a"
        );

        a.answer = vec![AnswerValue::Boolean(true).into(), AnswerValue::Boolean(false).into()];
        r.item = vec![a];
        assert!(matches!(
            check_questionnaire_response(&q, &r),
            Err(Error::MultipleAnswers(id)) if id == "a"
        ));
    }

    #[test]
    fn test_pack_and_unpack() {
        let definitions = vec![repeated_group()];
        let occurrence = |name: &str| {
            let mut child = QuestionnaireResponseItem::new("name");
            child.answer.push(AnswerValue::String(name.into()).into());
            let mut item = QuestionnaireResponseItem::new("people");
            item.text = Some("People".into());
            item.item.push(child);
            item
        };
        let exchanged = vec![occurrence("Ada"), occurrence("Grace")];

        let packed = pack_repeated_groups(&definitions, exchanged.clone());
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].answer.len(), 2);
        assert_eq!(unpack_repeated_groups(&definitions, packed, None), exchanged);
    }

    #[test]
    fn test_new_response_shape() {
        let mut q = Questionnaire::default();
        q.url = Some("http://example.org/q".into());
        let mut smoker = QuestionnaireItem::new("smoker", ItemType::Boolean);
        smoker.initial.push(Initial {
            value: AnswerValue::Boolean(false),
        });
        smoker.item.push(QuestionnaireItem::new("packs", ItemType::Integer));
        q.item.push(smoker);
        q.item.push(repeated_group());

        let response = new_response(&q, now()).unwrap();
        assert_eq!(
            response.to_json().unwrap(),
            json!({
                "resourceType": "QuestionnaireResponse",
                "questionnaire": "http://example.org/q",
                "status": "in-progress",
                "extension": [{
                    "url": extensions::LAST_LAUNCHED_TIMESTAMP,
                    "valueDateTime": "2024-03-15T09:00:00Z"
                }],
                "item": [
                    {
                        "linkId": "smoker",
                        "answer": [{"valueBoolean": false, "item": [{"linkId": "packs"}]}]
                    },
                    {"linkId": "people"}
                ]
            })
        );
    }

    #[test]
    fn test_add_missing_items_keeps_order() {
        let mut q = Questionnaire::default();
        let mut group = QuestionnaireItem::new("g", ItemType::Group);
        group.item.push(QuestionnaireItem::new("x", ItemType::String));
        group.item.push(QuestionnaireItem::new("y", ItemType::String));
        q.item.push(QuestionnaireItem::new("a", ItemType::String));
        q.item.push(group);

        let mut supplied_group = QuestionnaireResponseItem::new("g");
        supplied_group.item.push(QuestionnaireResponseItem::new("y"));
        let mut items = vec![supplied_group];
        add_missing_response_items(&q.item, &mut items).unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.link_id.as_str()).collect();
        assert_eq!(ids, ["a", "g"]);
        let nested: Vec<_> = items[1].item.iter().map(|i| i.link_id.as_str()).collect();
        assert_eq!(nested, ["x", "y"]);
    }
}
