//! Expression dependency graph
//!
//! Nodes are calculated items and `variable` extensions. An edge points
//! from a node to every item or variable its expression reads. The graph
//! is checked for cycles when the engine is built and afterwards tells the
//! engine which calculated items to re-run after an answer changes.

use crate::error::{Error, Result};
use crate::expression::{is_reserved, ExpressionEvaluator};
use sdc_models::{Expression, Questionnaire, QuestionnaireItem};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Item(String),
    /// `scope` is the linkId of the declaring item, `None` for the root
    Variable { scope: Option<String>, name: String },
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Item(link_id) => f.write_str(link_id),
            Node::Variable { name, .. } => write!(f, "%{name}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<Node, BTreeSet<Node>>,
    dependents: BTreeMap<Node, BTreeSet<Node>>,
    /// Nodes reading the whole response rather than specific items
    wildcard: BTreeSet<Node>,
    /// Calculated items, sources before the items reading them
    calculation_order: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph and reject cyclic calculations.
    pub fn build(questionnaire: &Questionnaire, evaluator: &ExpressionEvaluator) -> Result<Self> {
        let mut builder = Builder {
            questionnaire,
            evaluator,
            known: questionnaire
                .all_items()
                .into_iter()
                .map(|i| i.link_id.as_str())
                .collect(),
            graph: DependencyGraph::default(),
        };
        for variable in questionnaire.variable_expressions() {
            builder.add_variable(None, variable, &[]);
        }
        let mut stack = Vec::new();
        for item in &questionnaire.item {
            builder.add_item(item, &mut stack);
        }

        let mut graph = builder.graph;
        graph.calculation_order = graph.check_cycles()?;
        tracing::debug!(
            nodes = graph.edges.len(),
            calculated = graph.calculation_order.len(),
            "built expression dependency graph"
        );
        Ok(graph)
    }

    pub fn sources(&self, node: &Node) -> impl Iterator<Item = &Node> {
        self.edges.get(node).into_iter().flatten()
    }

    pub fn calculation_order(&self) -> &[String] {
        &self.calculation_order
    }

    /// Calculated items to re-run after `link_id` changed, in
    /// calculation order. The changed item itself is excluded.
    pub fn affected(&self, link_id: &str) -> Vec<String> {
        let start = Node::Item(link_id.to_string());
        let mut seen: HashSet<&Node> = HashSet::new();
        let mut queue: VecDeque<&Node> = VecDeque::new();
        queue.push_back(&start);
        for node in &self.wildcard {
            if seen.insert(node) {
                queue.push_back(node);
            }
        }
        while let Some(node) = queue.pop_front() {
            for dependent in self.dependents.get(node).into_iter().flatten() {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        self.calculation_order
            .iter()
            .filter(|id| id.as_str() != link_id && seen.contains(&Node::Item((*id).clone())))
            .cloned()
            .collect()
    }

    fn add_edge(&mut self, from: Node, to: Node) {
        self.dependents
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
        self.edges.entry(from).or_default().insert(to);
    }

    /// Depth-first search returning the calculated items in post-order.
    fn check_cycles(&self) -> Result<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        fn visit<'a>(
            graph: &'a DependencyGraph,
            node: &'a Node,
            marks: &mut BTreeMap<&'a Node, Mark>,
            order: &mut Vec<String>,
        ) -> Result<()> {
            marks.insert(node, Mark::Active);
            for source in graph.sources(node) {
                match marks.get(source) {
                    Some(Mark::Active) => {
                        return Err(Error::CyclicDependency {
                            first: source.to_string(),
                            second: node.to_string(),
                        })
                    }
                    Some(Mark::Done) => {}
                    None => visit(graph, source, marks, order)?,
                }
            }
            marks.insert(node, Mark::Done);
            if let Node::Item(link_id) = node {
                if graph.edges.contains_key(node) {
                    order.push(link_id.clone());
                }
            }
            Ok(())
        }

        let mut marks = BTreeMap::new();
        let mut order = Vec::new();
        for node in self.edges.keys() {
            if !marks.contains_key(node) {
                visit(self, node, &mut marks, &mut order)?;
            }
        }
        Ok(order)
    }
}

struct Builder<'a> {
    questionnaire: &'a Questionnaire,
    evaluator: &'a ExpressionEvaluator,
    known: HashSet<&'a str>,
    graph: DependencyGraph,
}

impl<'a> Builder<'a> {
    fn add_item(&mut self, item: &'a QuestionnaireItem, stack: &mut Vec<&'a QuestionnaireItem>) {
        stack.push(item);
        for variable in item.variable_expressions() {
            self.add_variable(Some(&item.link_id), variable, stack);
        }
        if let Some(expression) = item.calculated_expression() {
            let node = Node::Item(item.link_id.clone());
            // keeps calculated items without references in the order
            self.graph.edges.entry(node.clone()).or_default();
            self.add_references(node, expression, stack);
        }
        for child in &item.item {
            self.add_item(child, stack);
        }
        stack.pop();
    }

    fn add_variable(
        &mut self,
        scope: Option<&str>,
        expression: &Expression,
        stack: &[&'a QuestionnaireItem],
    ) {
        let Some(name) = expression.name.clone() else {
            return;
        };
        let node = Node::Variable {
            scope: scope.map(str::to_string),
            name,
        };
        self.graph.edges.entry(node.clone()).or_default();
        self.add_references(node, expression, stack);
    }

    fn add_references(&mut self, node: Node, expression: &Expression, stack: &[&'a QuestionnaireItem]) {
        if !expression.is_fhirpath() {
            return;
        }
        let references = match self.evaluator.references(expression.text()) {
            Ok(references) => references,
            Err(error) => {
                tracing::warn!(node = %node, %error, "skipping unparseable expression");
                return;
            }
        };

        for link_id in &references.link_ids {
            if self.known.contains(link_id.as_str()) {
                self.graph.add_edge(node.clone(), Node::Item(link_id.clone()));
            }
        }
        for name in &references.constants {
            if let Some(variable) = self.resolve_variable(name, stack) {
                self.graph.add_edge(node.clone(), variable);
            }
        }
        let reads_response = ["resource", "rootResource"]
            .iter()
            .any(|c| references.constants.contains(*c));
        if reads_response && references.link_ids.is_empty() {
            self.graph.wildcard.insert(node);
        }
    }

    fn resolve_variable(&self, name: &str, stack: &[&'a QuestionnaireItem]) -> Option<Node> {
        if is_reserved(name) {
            return None;
        }
        for item in stack.iter().rev() {
            if item
                .variable_expressions()
                .iter()
                .any(|e| e.name.as_deref() == Some(name))
            {
                return Some(Node::Variable {
                    scope: Some(item.link_id.clone()),
                    name: name.to_string(),
                });
            }
        }
        self.questionnaire
            .variable_expressions()
            .iter()
            .any(|e| e.name.as_deref() == Some(name))
            .then(|| Node::Variable {
                scope: None,
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_models::{extensions, Extension, ExtensionValue, ItemType};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn calculated(link_id: &str, expression: &str) -> QuestionnaireItem {
        let mut item = QuestionnaireItem::new(link_id, ItemType::Decimal);
        item.extension.push(Extension::new(
            extensions::CALCULATED_EXPRESSION,
            ExtensionValue::Expression(Expression::fhirpath(expression)),
        ));
        item
    }

    fn answer_of(link_id: &str) -> String {
        format!("%resource.repeat(item).where(linkId = '{link_id}').answer.value")
    }

    fn graph(q: Questionnaire) -> Result<DependencyGraph> {
        let q = Arc::new(q);
        let evaluator = ExpressionEvaluator::new(q.clone(), HashMap::new())?;
        DependencyGraph::build(&q, &evaluator)
    }

    #[test]
    fn test_calculation_order_puts_sources_first() {
        let mut q = Questionnaire::default();
        q.item.push(calculated("total", &format!("{} + {}", answer_of("a"), answer_of("b"))));
        q.item.push(calculated("b", &format!("{} * 2", answer_of("a"))));
        q.item.push(QuestionnaireItem::new("a", ItemType::Decimal));
        let graph = graph(q).unwrap();
        assert_eq!(graph.calculation_order(), ["b", "total"]);
        assert_eq!(graph.affected("a"), vec!["b", "total"]);
        assert_eq!(graph.affected("b"), vec!["total"]);
        assert!(graph.affected("total").is_empty());
    }

    #[test]
    fn test_mutual_calculation_is_a_cycle() {
        let mut q = Questionnaire::default();
        q.item.push(calculated("a", &answer_of("b")));
        q.item.push(calculated("b", &answer_of("a")));
        let err = graph(q).unwrap_err();
        assert_eq!(
            err.to_string(),
            "a and b have cyclic dependency in expression based extension"
        );
    }

    #[test]
    fn test_cycle_through_nested_variable() {
        let mut group = QuestionnaireItem::new("group", ItemType::Group);
        group.extension.push(Extension::new(
            extensions::VARIABLE,
            ExtensionValue::Expression(Expression {
                name: Some("x".into()),
                ..Expression::fhirpath(answer_of("inner"))
            }),
        ));
        group.item.push(calculated("inner", "%x + 1"));
        let mut q = Questionnaire::default();
        q.item.push(group);

        match graph(q) {
            Err(Error::CyclicDependency { first, second }) => {
                let mut names = [first, second];
                names.sort();
                assert_eq!(names, ["%x".to_string(), "inner".to_string()]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_enable_when_expressions_do_not_form_cycles() {
        let mut a = calculated("a", &answer_of("b"));
        a.extension.clear();
        a.extension.push(Extension::new(
            extensions::ENABLE_WHEN_EXPRESSION,
            ExtensionValue::Expression(Expression::fhirpath(format!("{}.exists()", answer_of("b")))),
        ));
        let mut q = Questionnaire::default();
        q.item.push(a);
        q.item.push(calculated("b", &answer_of("a")));
        assert!(graph(q).is_ok());
    }

    #[test]
    fn test_whole_response_readers_are_always_affected() {
        let mut q = Questionnaire::default();
        q.item.push(calculated("count", "%resource.repeat(item).answer.count()"));
        q.item.push(QuestionnaireItem::new("a", ItemType::String));
        let graph = graph(q).unwrap();
        assert_eq!(graph.affected("a"), vec!["count"]);
    }
}
