//! Addressing response items
//!
//! Link ids are unique in a questionnaire, but a repeated group or a
//! question with nested items holds one copy of its children per answer.
//! An [`ItemPath`] therefore records, per level, which answer to descend
//! through. Written form: `group#1/name` is the `name` item inside the
//! second occurrence of `group`.

use crate::error::{Error, Result};
use sdc_models::QuestionnaireResponseItem;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathStep {
    pub link_id: String,
    /// Answer whose nested items the next step is looked up in; `None`
    /// descends through the item's own `item` list
    pub answer: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPath(Vec<PathStep>);

impl ItemPath {
    pub fn root(link_id: impl Into<String>) -> Self {
        Self(vec![PathStep {
            link_id: link_id.into(),
            answer: None,
        }])
    }

    /// Child reached through this item's `item` list
    pub fn child(&self, link_id: impl Into<String>) -> Self {
        self.push(None, link_id)
    }

    /// Child reached through `answer[index].item`
    pub fn nested(&self, index: usize, link_id: impl Into<String>) -> Self {
        self.push(Some(index), link_id)
    }

    fn push(&self, answer: Option<usize>, link_id: impl Into<String>) -> Self {
        let mut steps = self.0.clone();
        if let Some(last) = steps.last_mut() {
            last.answer = answer;
        }
        steps.push(PathStep {
            link_id: link_id.into(),
            answer: None,
        });
        Self(steps)
    }

    pub fn link_id(&self) -> &str {
        self.0.last().map(|s| s.link_id.as_str()).unwrap_or("")
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether `self` is `other` or lies inside it
    pub fn starts_with(&self, other: &ItemPath) -> bool {
        if other.0.len() > self.0.len() {
            return false;
        }
        let last = other.0.len().saturating_sub(1);
        self.0.iter().zip(other.0.iter()).enumerate().all(|(i, (a, b))| {
            a.link_id == b.link_id && (i == last || a.answer == b.answer)
        })
    }

    /// Where this path lands once occurrence `removed` of the repeated
    /// group at `group` is deleted; `None` if it was inside that occurrence.
    pub fn after_occurrence_removed(&self, group: &ItemPath, removed: usize) -> Option<ItemPath> {
        let level = group.depth();
        if level == 0 || self.depth() <= level || !self.starts_with(group) {
            return Some(self.clone());
        }
        let mut steps = self.0.clone();
        let step = &mut steps[level - 1];
        match step.answer {
            Some(index) if index == removed => None,
            Some(index) if index > removed => {
                step.answer = Some(index - 1);
                Some(Self(steps))
            }
            _ => Some(Self(steps)),
        }
    }

    pub fn find<'a>(
        &self,
        items: &'a [QuestionnaireResponseItem],
    ) -> Option<&'a QuestionnaireResponseItem> {
        let (last, parents) = self.0.split_last()?;
        let mut level = items;
        for step in parents {
            let item = level.iter().find(|i| i.link_id == step.link_id)?;
            level = match step.answer {
                Some(index) => &item.answer.get(index)?.item,
                None => &item.item,
            };
        }
        level.iter().find(|i| i.link_id == last.link_id)
    }

    pub fn find_mut<'a>(
        &self,
        items: &'a mut [QuestionnaireResponseItem],
    ) -> Option<&'a mut QuestionnaireResponseItem> {
        let (last, parents) = self.0.split_last()?;
        let mut level = items;
        for step in parents {
            let item = level.iter_mut().find(|i| i.link_id == step.link_id)?;
            level = match step.answer {
                Some(index) => &mut item.answer.get_mut(index)?.item,
                None => &mut item.item,
            };
        }
        level.iter_mut().find(|i| i.link_id == last.link_id)
    }

    pub fn resolve<'a>(
        &self,
        items: &'a [QuestionnaireResponseItem],
    ) -> Result<&'a QuestionnaireResponseItem> {
        self.find(items)
            .ok_or_else(|| Error::UnknownItem(self.to_string()))
    }

    pub fn resolve_mut<'a>(
        &self,
        items: &'a mut [QuestionnaireResponseItem],
    ) -> Result<&'a mut QuestionnaireResponseItem> {
        let display = self.to_string();
        self.find_mut(items).ok_or(Error::UnknownItem(display))
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&step.link_id)?;
            if let Some(index) = step.answer {
                write!(f, "#{index}")?;
            }
        }
        Ok(())
    }
}

impl Serialize for ItemPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for ItemPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for segment in s.split('/') {
            let (link_id, answer) = match segment.rsplit_once('#') {
                Some((link_id, index)) => {
                    let index = index
                        .parse::<usize>()
                        .map_err(|_| Error::InvalidPath(s.to_string()))?;
                    (link_id, Some(index))
                }
                None => (segment, None),
            };
            if link_id.is_empty() {
                return Err(Error::InvalidPath(s.to_string()));
            }
            steps.push(PathStep {
                link_id: link_id.to_string(),
                answer,
            });
        }
        if steps.last().is_some_and(|s| s.answer.is_some()) {
            return Err(Error::InvalidPath(s.to_string()));
        }
        Ok(Self(steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_models::QuestionnaireResponseAnswer;

    fn tree() -> Vec<QuestionnaireResponseItem> {
        let mut occurrence = QuestionnaireResponseAnswer::default();
        occurrence.item.push(QuestionnaireResponseItem::new("name"));
        let mut group = QuestionnaireResponseItem::new("people");
        group.answer.push(QuestionnaireResponseAnswer::default());
        group.answer.push(occurrence);

        let mut section = QuestionnaireResponseItem::new("section");
        section.item.push(QuestionnaireResponseItem::new("q"));
        vec![group, section]
    }

    #[test]
    fn test_after_occurrence_removed() {
        let group = ItemPath::root("people");
        let first = group.nested(0, "name");
        let third = group.nested(2, "name");
        assert_eq!(first.after_occurrence_removed(&group, 0), None);
        assert_eq!(third.after_occurrence_removed(&group, 0), Some(group.nested(1, "name")));
        assert_eq!(group.after_occurrence_removed(&group, 0), Some(group.clone()));
        let other = ItemPath::root("section").child("q");
        assert_eq!(other.after_occurrence_removed(&group, 0), Some(other.clone()));
    }

    #[test]
    fn test_display_and_parse() {
        let path = ItemPath::root("people").nested(1, "name");
        assert_eq!(path.to_string(), "people#1/name");
        assert_eq!("people#1/name".parse::<ItemPath>().unwrap(), path);
        assert!("people#x/name".parse::<ItemPath>().is_err());
        assert!("people#1".parse::<ItemPath>().is_err());
    }

    #[test]
    fn test_find_through_answers_and_items() {
        let items = tree();
        assert!(ItemPath::root("people").nested(1, "name").find(&items).is_some());
        assert!(ItemPath::root("people").nested(0, "name").find(&items).is_none());
        assert!(ItemPath::root("section").child("q").find(&items).is_some());
    }

    #[test]
    fn test_starts_with() {
        let group = ItemPath::root("people");
        let inner = group.nested(1, "name");
        assert!(inner.starts_with(&group));
        assert!(!group.starts_with(&inner));
        assert!(!ItemPath::root("section").starts_with(&group));
    }
}
