//! The engine facade
//!
//! A [`QuestionnaireEngine`] owns one questionnaire and one response. Every
//! update is applied to a working copy, pushed through calculated values,
//! enablement and answer options, projected into a [`QuestionnaireState`],
//! and only then committed and published on the watch channel.

use crate::answer;
use crate::answer_options::{
    disallowed_answers, request_for, OptionsContext, OptionsRequest, ResolvedOptions,
    ValueSetCache,
};
use crate::calculated::{
    apply_initial_expressions, evaluated_text, find_definition, recalculate, EmptyResult,
};
use crate::config::EngineConfig;
use crate::dependency::DependencyGraph;
use crate::enablement::{settle, EnablementEvaluator, ShadowStore};
use crate::error::{Error, Result};
use crate::expression::{ExpressionEvaluator, ResponseView, ScopeEntry};
use crate::pagination::{compute_pages, PageController, QuestionnairePage};
use crate::path::ItemPath;
use crate::resolver::{AnswerValueSetResolver, XFhirQueryResolver};
use crate::response::{
    check_questionnaire, copy_nested_items_to_childless_answers, create_occurrence,
    fhir_date_time, load_response, new_response, set_launch_timestamp, unpack_repeated_groups,
    validate_launch_context_extensions,
};
use crate::state::{assemble, Projector, QuestionnaireState};
use crate::tree::{walk, Walk};
use crate::validation::{validate_response, ValidationResult};
use chrono::{DateTime, FixedOffset, Local};
use sdc_models::{
    AnswerValue, Questionnaire, QuestionnaireItem, QuestionnaireResponse,
    QuestionnaireResponseAnswer, QuestionnaireResponseItem,
};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Rounds of clearing answers that lost their option before giving up
const OPTION_PASSES: usize = 8;

#[derive(Default)]
pub struct QuestionnaireEngineBuilder {
    questionnaire_json: Option<String>,
    questionnaire_path: Option<PathBuf>,
    response_json: Option<String>,
    response_path: Option<PathBuf>,
    config: EngineConfig,
    launch_contexts: HashMap<String, JsonValue>,
    query_resolver: Option<Arc<dyn XFhirQueryResolver>>,
    value_set_resolver: Option<Arc<dyn AnswerValueSetResolver>>,
    now: Option<DateTime<FixedOffset>>,
}

impl QuestionnaireEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn questionnaire_json(mut self, json: impl Into<String>) -> Self {
        self.questionnaire_json = Some(json.into());
        self
    }

    /// Takes precedence over [`Self::questionnaire_json`]
    pub fn questionnaire_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.questionnaire_path = Some(path.into());
        self
    }

    pub fn response_json(mut self, json: impl Into<String>) -> Self {
        self.response_json = Some(json.into());
        self
    }

    pub fn response_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.response_path = Some(path.into());
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Resource bound to `%name` for a declared launch context
    pub fn launch_context(mut self, name: impl Into<String>, resource: JsonValue) -> Self {
        self.launch_contexts.insert(name.into(), resource);
        self
    }

    pub fn launch_contexts(mut self, contexts: HashMap<String, JsonValue>) -> Self {
        self.launch_contexts.extend(contexts);
        self
    }

    pub fn x_fhir_query_resolver(mut self, resolver: Arc<dyn XFhirQueryResolver>) -> Self {
        self.query_resolver = Some(resolver);
        self
    }

    pub fn answer_value_set_resolver(mut self, resolver: Arc<dyn AnswerValueSetResolver>) -> Self {
        self.value_set_resolver = Some(resolver);
        self
    }

    /// Fixed clock for `now()`, `today()` and timestamps
    pub fn now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    pub async fn build(self) -> Result<QuestionnaireEngine> {
        self.config.validate()?;

        let questionnaire = match (&self.questionnaire_path, &self.questionnaire_json) {
            (Some(path), json) => {
                if json.is_some() {
                    tracing::debug!(path = %path.display(), "questionnaire path and JSON given; using the path");
                }
                Questionnaire::from_path(path)?
            }
            (None, Some(json)) => Questionnaire::from_json_str(json)?,
            (None, None) => return Err(Error::MissingQuestionnaire),
        };
        validate_launch_context_extensions(&questionnaire)?;
        check_questionnaire(&questionnaire)?;
        if self.query_resolver.is_none() {
            require_no_x_fhir_query(&questionnaire.item)?;
        }
        let questionnaire = Arc::new(questionnaire);

        let mut expressions = ExpressionEvaluator::new(questionnaire.clone(), self.launch_contexts)?
            .with_query_resolver(self.query_resolver);
        if let Some(now) = self.now {
            expressions = expressions.with_now(now);
        }
        let graph = DependencyGraph::build(&questionnaire, &expressions)?;

        let core = Core {
            questionnaire,
            config: self.config,
            expressions,
            graph,
            value_sets: ValueSetCache::new(self.value_set_resolver),
        };
        let now = core.now();

        let supplied = match (self.response_path, self.response_json) {
            (Some(path), _) => Some(QuestionnaireResponse::from_path(path)?),
            (None, Some(json)) => Some(QuestionnaireResponse::from_json_str(&json)?),
            (None, None) => None,
        };
        let response = match supplied {
            Some(response) => {
                let mut response = load_response(&core.questionnaire, response)?;
                set_launch_timestamp(&mut response, now);
                response
            }
            None => {
                let mut response = new_response(&core.questionnaire, now)?;
                apply_initial_expressions(&core.questionnaire, &mut response, &core.expressions)?;
                response
            }
        };

        let mut working = Working {
            response,
            shadow: ShadowStore::default(),
            modified: BTreeSet::new(),
        };
        core.settle(&mut working)?;
        recalculate(
            core.graph.calculation_order(),
            &core.questionnaire.item,
            &mut working.response,
            &working.modified,
            &core.expressions,
            EmptyResult::Skip,
        )?;
        core.settle(&mut working)?;

        let entry_mode = core
            .config
            .entry_mode
            .or_else(|| core.questionnaire.entry_mode())
            .unwrap_or_default();
        let mut pages = PageController::new(entry_mode);
        let review_mode = core.config.show_review_page_first;
        let state = core.snapshot(&mut working, &mut pages, review_mode).await?;

        tracing::debug!(
            questionnaire = core.questionnaire.url.as_deref().unwrap_or(""),
            items = core.questionnaire.all_items().len(),
            ?entry_mode,
            "questionnaire engine ready"
        );
        let (state_tx, _) = watch::channel(Arc::new(state));
        Ok(QuestionnaireEngine {
            core,
            working,
            pages,
            review_mode,
            modification_count: 0,
            state_tx,
        })
    }
}

fn require_no_x_fhir_query(items: &[QuestionnaireItem]) -> Result<()> {
    for item in items {
        if let Some(expression) = item.answer_expression().filter(|e| e.is_x_fhir_query()) {
            return Err(Error::MissingXFhirQueryResolver(expression.text().to_string()));
        }
        require_no_x_fhir_query(&item.item)?;
    }
    Ok(())
}

/// Response and bookkeeping an update works on before it is committed
#[derive(Debug, Clone)]
struct Working {
    response: QuestionnaireResponse,
    shadow: ShadowStore,
    /// Paths the user changed; calculated values never overwrite these
    modified: BTreeSet<ItemPath>,
}

/// Parts fixed at load
struct Core {
    questionnaire: Arc<Questionnaire>,
    config: EngineConfig,
    expressions: ExpressionEvaluator,
    graph: DependencyGraph,
    value_sets: ValueSetCache,
}

impl Core {
    fn now(&self) -> DateTime<FixedOffset> {
        self.expressions
            .now()
            .unwrap_or_else(|| Local::now().fixed_offset())
    }

    fn settle(&self, working: &mut Working) -> Result<bool> {
        settle(
            &mut working.response,
            &mut working.shadow,
            &self.questionnaire.item,
            &self.expressions,
        )
    }

    fn recalculate(&self, working: &mut Working, link_ids: &[String]) -> Result<()> {
        recalculate(
            link_ids,
            &self.questionnaire.item,
            &mut working.response,
            &working.modified,
            &self.expressions,
            EmptyResult::Clear,
        )?;
        Ok(())
    }

    /// Recalculate what depends on `link_id`, then settle enablement. Items
    /// enabled by the change get a full recalculation pass.
    fn propagate(&self, working: &mut Working, link_id: &str) -> Result<()> {
        self.recalculate(working, &self.graph.affected(link_id))?;
        if self.settle(working)? {
            self.recalculate(working, self.graph.calculation_order())?;
            self.settle(working)?;
        }
        Ok(())
    }

    fn propagate_all(&self, working: &mut Working) -> Result<()> {
        self.recalculate(working, self.graph.calculation_order())?;
        self.settle(working)?;
        Ok(())
    }

    fn pages(&self, response: &QuestionnaireResponse) -> Result<Vec<QuestionnairePage>> {
        let view = ResponseView::new(response)?;
        compute_pages(&self.questionnaire, response, &view, &self.expressions)
    }

    /// Validate a page (or everything) and mark the checked paths modified
    /// so their results become visible. Returns whether all were valid.
    fn validate_and_mark(&self, working: &mut Working, page: Option<usize>) -> Result<bool> {
        let definitions = match page.and_then(|index| self.questionnaire.item.get(index)) {
            Some(item) => std::slice::from_ref(item),
            None => self.questionnaire.item.as_slice(),
        };
        let results = validate_response(definitions, &working.response, &self.expressions)?;
        let valid = !results.values().any(ValidationResult::is_invalid);
        working.modified.extend(results.into_keys());
        Ok(valid)
    }

    fn option_requests(&self, working: &Working) -> Result<Vec<OptionsRequest>> {
        let view = ResponseView::new(&working.response)?;
        let enablement = EnablementEvaluator::new(&working.response, &view, &self.expressions);
        let mut requests: Vec<OptionsRequest> = Vec::new();
        let mut failure = None;
        walk(&self.questionnaire.item, &working.response.item, &mut |path, scope| {
            let Some(current) = scope.last() else {
                return Walk::Skip;
            };
            if failure.is_some() || !enablement.is_enabled(current.item, scope) {
                return Walk::Skip;
            }
            match request_for(current.item, path, &self.expressions, &view, scope) {
                Ok(Some(request)) if !requests.contains(&request) => requests.push(request),
                Ok(_) => {}
                Err(error) => failure = Some(error),
            }
            Walk::Descend
        });
        match failure {
            Some(error) => Err(error),
            None => Ok(requests),
        }
    }

    /// Drop selected answers a toggle expression no longer offers. Returns
    /// the link ids that changed.
    fn clear_disallowed(&self, working: &mut Working, resolved: &ResolvedOptions) -> Result<Vec<String>> {
        let mut clears: Vec<(ItemPath, Vec<AnswerValue>)> = Vec::new();
        {
            let view = ResponseView::new(&working.response)?;
            let enablement = EnablementEvaluator::new(&working.response, &view, &self.expressions);
            let options = OptionsContext {
                questionnaire: &self.questionnaire,
                value_sets: &self.value_sets,
                resolved,
                expressions: &self.expressions,
                view: &view,
            };
            walk(&self.questionnaire.item, &working.response.item, &mut |path, scope| {
                let Some(current) = scope.last() else {
                    return Walk::Skip;
                };
                if !enablement.is_enabled(current.item, scope) {
                    return Walk::Skip;
                }
                if current.item.answer_options_toggle_expressions().is_empty() {
                    return Walk::Descend;
                }
                let selected: Vec<AnswerValue> = current
                    .response
                    .map(|r| r.answer_values().cloned().collect())
                    .unwrap_or_default();
                if selected.is_empty() {
                    return Walk::Descend;
                }
                let offered = options.answer_options(current.item, path, scope);
                let enabled = options.enabled_options(current.item, offered, scope);
                let disallowed = disallowed_answers(&selected, &enabled);
                if !disallowed.is_empty() {
                    clears.push((path.clone(), disallowed));
                }
                Walk::Descend
            });
        }

        let mut changed = Vec::new();
        for (path, disallowed) in clears {
            if let Some(item) = path.find_mut(&mut working.response.item) {
                tracing::debug!(path = %path, removed = disallowed.len(), "clearing answers no longer offered");
                item.answer.retain(|a| {
                    a.value
                        .as_ref()
                        .map_or(true, |v| !disallowed.iter().any(|d| answer::same_value(v, d)))
                });
                changed.push(path.link_id().to_string());
            }
        }
        Ok(changed)
    }

    async fn resolve_options(&self, working: &mut Working) -> Result<ResolvedOptions> {
        let mut pass = 0;
        loop {
            let mut resolved = ResolvedOptions::default();
            for request in self.option_requests(working)? {
                match request {
                    OptionsRequest::ValueSet(url) => {
                        self.value_sets.resolve(&url).await?;
                    }
                    OptionsRequest::Query { path, query } => {
                        let resources = self.expressions.run_x_fhir_query(&query).await?;
                        resolved.queries.insert(path, resources);
                    }
                }
            }
            let changed = self.clear_disallowed(working, &resolved)?;
            if changed.is_empty() {
                return Ok(resolved);
            }
            pass += 1;
            if pass >= OPTION_PASSES {
                tracing::warn!("answer options did not settle");
                return Ok(resolved);
            }
            for link_id in changed {
                self.propagate(working, &link_id)?;
            }
        }
    }

    async fn snapshot(
        &self,
        working: &mut Working,
        pages: &mut PageController,
        review_mode: bool,
    ) -> Result<QuestionnaireState> {
        let resolved = self.resolve_options(working).await?;
        let page_list = self.pages(&working.response)?;
        pages.sync(&page_list);

        let view = ResponseView::new(&working.response)?;
        let options = OptionsContext {
            questionnaire: &self.questionnaire,
            value_sets: &self.value_sets,
            resolved: &resolved,
            expressions: &self.expressions,
            view: &view,
        };
        let review = review_mode || self.config.read_only;
        let page = if review || page_list.is_empty() {
            None
        } else {
            pages.current()
        };
        let items = Projector::new(
            &self.questionnaire,
            &working.response,
            &view,
            &self.expressions,
            &options,
            &working.modified,
            &self.config,
            review,
            page,
        )
        .items();
        Ok(assemble(items, &self.config, review_mode, pages, &page_list))
    }

    /// Enabled subset of `items`, with missing text filled in
    fn enabled_subset<'a>(
        &self,
        definitions: &'a [QuestionnaireItem],
        items: &'a [QuestionnaireResponseItem],
        scope: &mut Vec<ScopeEntry<'a>>,
        enablement: &EnablementEvaluator<'_>,
        view: &ResponseView,
    ) -> Vec<QuestionnaireResponseItem> {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let Some(definition) = definitions.iter().find(|d| d.link_id == item.link_id) else {
                continue;
            };
            scope.push(ScopeEntry {
                item: definition,
                response: Some(item),
            });
            if enablement.is_enabled(definition, scope) {
                let text = item.text.clone().or_else(|| {
                    evaluated_text(definition, &self.expressions, view, scope).or_else(|| {
                        definition
                            .localized_text(self.config.locale.as_deref())
                            .map(str::to_string)
                    })
                });
                let children = self.enabled_subset(&definition.item, &item.item, scope, enablement, view);
                let answer = item
                    .answer
                    .iter()
                    .map(|answer| QuestionnaireResponseAnswer {
                        value: answer.value.clone(),
                        item: self.enabled_subset(&definition.item, &answer.item, scope, enablement, view),
                    })
                    .collect();
                kept.push(QuestionnaireResponseItem {
                    text,
                    item: children,
                    answer,
                    ..item.clone()
                });
            }
            scope.pop();
        }
        kept
    }
}

/// Questionnaire state engine
///
/// Mutations take `&mut self`, so updates are serialized by ownership.
/// Observers hold a [`watch::Receiver`] from [`Self::subscribe`].
pub struct QuestionnaireEngine {
    core: Core,
    working: Working,
    pages: PageController,
    review_mode: bool,
    modification_count: u64,
    state_tx: watch::Sender<Arc<QuestionnaireState>>,
}

impl QuestionnaireEngine {
    pub fn builder() -> QuestionnaireEngineBuilder {
        QuestionnaireEngineBuilder::new()
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.core.questionnaire
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// The current snapshot
    pub fn state(&self) -> Arc<QuestionnaireState> {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<QuestionnaireState>> {
        self.state_tx.subscribe()
    }

    /// Number of answer changes since load
    pub fn modification_count(&self) -> u64 {
        self.modification_count
    }

    pub fn is_review_mode(&self) -> bool {
        self.review_mode
    }

    pub fn current_page(&self) -> Option<usize> {
        self.pages.current()
    }

    /// The response as held by the engine, repeated groups packed
    pub fn working_response(&self) -> &QuestionnaireResponse {
        &self.working.response
    }

    async fn commit(&mut self, mut working: Working, mut pages: PageController, review_mode: bool) -> Result<()> {
        let state = self.core.snapshot(&mut working, &mut pages, review_mode).await?;
        self.working = working;
        self.pages = pages;
        self.review_mode = review_mode;
        self.state_tx.send_replace(Arc::new(state));
        Ok(())
    }

    async fn commit_answers(&mut self, working: Working) -> Result<()> {
        self.commit(working, self.pages.clone(), self.review_mode).await?;
        self.modification_count += 1;
        Ok(())
    }

    fn definition(&self, path: &ItemPath) -> Result<&QuestionnaireItem> {
        find_definition(&self.core.questionnaire.item, path.link_id())
            .ok_or_else(|| Error::UnknownItem(path.to_string()))
    }

    /// Replace the answers of the item at `path`.
    pub async fn set_answer(&mut self, path: &ItemPath, answers: Vec<AnswerValue>) -> Result<()> {
        let definition = self.definition(path)?.clone();
        if answers.len() > 1 && !definition.is_repeating() {
            return Err(Error::MultipleAnswers(definition.link_id.clone()));
        }
        if let Some(item_type) = definition.item_type() {
            if let Some(wrong) = answers.iter().find(|a| !item_type.accepts(a)) {
                return Err(Error::AnswerTypeMismatch {
                    link_id: definition.link_id.clone(),
                    item_type: item_type.code().to_string(),
                    answer_type: wrong.type_name().to_string(),
                });
            }
        }

        let mut working = self.working.clone();
        let item = path.resolve_mut(&mut working.response.item)?;
        let previous = std::mem::take(&mut item.answer);
        item.answer = answers
            .into_iter()
            .map(|value| {
                let nested = previous
                    .iter()
                    .find(|p| p.value.as_ref().is_some_and(|v| answer::same_value(v, &value)))
                    .map(|p| p.item.clone())
                    .unwrap_or_default();
                QuestionnaireResponseAnswer {
                    value: Some(value),
                    item: nested,
                }
            })
            .collect();
        copy_nested_items_to_childless_answers(&definition, item)?;
        working.modified.insert(path.clone());
        tracing::debug!(path = %path, "answer set");

        self.core.propagate(&mut working, path.link_id())?;
        self.commit_answers(working).await
    }

    pub async fn clear_answer(&mut self, path: &ItemPath) -> Result<()> {
        self.set_answer(path, Vec::new()).await
    }

    /// Append an occurrence to the repeated group at `path`.
    pub async fn add_repeated_group(&mut self, path: &ItemPath) -> Result<()> {
        let occurrence = create_occurrence(self.definition(path)?)?;
        let mut working = self.working.clone();
        path.resolve_mut(&mut working.response.item)?
            .answer
            .push(occurrence);
        working.modified.insert(path.clone());

        self.core.propagate(&mut working, path.link_id())?;
        self.commit_answers(working).await
    }

    /// Remove occurrence `index` of the repeated group at `path`.
    pub async fn remove_repeated_group(&mut self, path: &ItemPath, index: usize) -> Result<()> {
        if !self.definition(path)?.is_repeated_group() {
            return Err(Error::NotARepeatedGroup(path.to_string()));
        }
        let mut working = self.working.clone();
        let group = path.resolve_mut(&mut working.response.item)?;
        if index >= group.answer.len() {
            return Err(Error::UnknownItem(format!("{path}#{index}")));
        }
        group.answer.remove(index);
        working.modified = working
            .modified
            .iter()
            .filter_map(|p| p.after_occurrence_removed(path, index))
            .collect();
        working.shadow.occurrence_removed(path, index);
        working.modified.insert(path.clone());

        self.core.propagate(&mut working, path.link_id())?;
        self.commit_answers(working).await
    }

    /// Clear every answer and forget which items the user touched.
    pub async fn clear_all_answers(&mut self) -> Result<()> {
        let mut working = self.working.clone();
        clear_answers(&mut working.response.item);
        working.modified.clear();
        working.shadow.clear();

        self.core.propagate_all(&mut working)?;
        self.commit_answers(working).await
    }

    /// Move to the next visible page. Returns whether the page changed;
    /// validating entry modes stay put on an invalid page.
    pub async fn go_to_next_page(&mut self) -> Result<bool> {
        let pages = self.core.pages(&self.working.response)?;
        let Some(target) = self.pages.next_page(&pages) else {
            return Ok(false);
        };
        self.move_forward(target).await
    }

    pub async fn go_to_previous_page(&mut self) -> Result<bool> {
        if !self.pages.allows_backward() {
            tracing::warn!(entry_mode = ?self.pages.entry_mode(), "backward navigation is not allowed");
            return Ok(false);
        }
        let pages = self.core.pages(&self.working.response)?;
        let Some(target) = self.pages.previous_page(&pages) else {
            return Ok(false);
        };
        self.move_to(target).await
    }

    /// Jump to page `index`; not available in sequential entry mode.
    pub async fn go_to_page(&mut self, index: usize) -> Result<bool> {
        if !self.pages.allows_jump() {
            tracing::warn!(index, "jumping between pages is not allowed in sequential entry mode");
            return Ok(false);
        }
        let pages = self.core.pages(&self.working.response)?;
        if !pages.get(index).is_some_and(QuestionnairePage::is_visible) {
            tracing::warn!(index, "page is not available");
            return Ok(false);
        }
        match self.pages.current() {
            Some(current) if index > current => self.move_forward(index).await,
            _ => self.move_to(index).await,
        }
    }

    async fn move_forward(&mut self, target: usize) -> Result<bool> {
        if self.pages.validates_forward() {
            let mut working = self.working.clone();
            if !self.core.validate_and_mark(&mut working, self.pages.current())? {
                tracing::debug!(page = ?self.pages.current(), "page is invalid; staying");
                self.commit(working, self.pages.clone(), self.review_mode).await?;
                return Ok(false);
            }
            let mut pages = self.pages.clone();
            pages.move_to(target);
            self.commit(working, pages, self.review_mode).await?;
            return Ok(true);
        }
        self.move_to(target).await
    }

    async fn move_to(&mut self, target: usize) -> Result<bool> {
        let mut pages = self.pages.clone();
        pages.move_to(target);
        self.commit(self.working.clone(), pages, self.review_mode).await?;
        Ok(true)
    }

    /// Enter or leave review mode. Entering is refused while the pages the
    /// entry mode requires are invalid.
    pub async fn set_review_mode(&mut self, review: bool) -> Result<bool> {
        let mut working = self.working.clone();
        if review && !self.review_mode {
            let paginated = !self.core.pages(&working.response)?.is_empty();
            let checked = if self.pages.validates_all_before_review() {
                Some(None)
            } else if self.pages.validates_forward() && paginated {
                Some(self.pages.current())
            } else {
                None
            };
            if let Some(page) = checked {
                if !self.core.validate_and_mark(&mut working, page)? {
                    self.commit(working, self.pages.clone(), false).await?;
                    return Ok(false);
                }
            }
        }
        self.commit(working, self.pages.clone(), review).await?;
        Ok(true)
    }

    /// Results for every enabled question, without changing what is shown.
    pub fn validate_all(&self) -> Result<BTreeMap<ItemPath, ValidationResult>> {
        validate_response(
            &self.core.questionnaire.item,
            &self.working.response,
            &self.core.expressions,
        )
    }

    /// Validate everything and surface the results on every item.
    pub async fn validate_and_show(&mut self) -> Result<BTreeMap<ItemPath, ValidationResult>> {
        let results = self.validate_all()?;
        if results.values().any(ValidationResult::is_invalid) {
            let mut working = self.working.clone();
            working.modified.extend(results.keys().cloned());
            self.commit(working, self.pages.clone(), self.review_mode).await?;
        }
        Ok(results)
    }

    /// The response for submission: enabled items only, repeated groups
    /// unpacked, `authored` set to now.
    pub fn questionnaire_response(&self) -> Result<QuestionnaireResponse> {
        let core = &self.core;
        let response = &self.working.response;
        let view = ResponseView::new(response)?;
        let enablement = EnablementEvaluator::new(response, &view, &core.expressions);
        let mut scope = Vec::new();
        let items = core.enabled_subset(
            &core.questionnaire.item,
            &response.item,
            &mut scope,
            &enablement,
            &view,
        );
        Ok(QuestionnaireResponse {
            authored: Some(fhir_date_time(core.now())),
            item: unpack_repeated_groups(
                &core.questionnaire.item,
                items,
                core.config.locale.as_deref(),
            ),
            ..response.clone()
        })
    }
}

fn clear_answers(items: &mut [QuestionnaireResponseItem]) {
    for item in items {
        item.answer.clear();
        clear_answers(&mut item.item);
    }
}
