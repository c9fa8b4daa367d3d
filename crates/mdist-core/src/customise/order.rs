//! Dependency ordering of customisation operations
//!
//! Operations declare `requires` (run after) and `affects` (run before)
//! edges against each other and against four reserved phase markers. The
//! order is derived from the transitive closure of those edges: an
//! operation with more transitive successors always runs earlier, and ties
//! are broken by the successor set and then the name, so the result never
//! depends on input order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use super::CustomiseError;
use crate::build::context::BuildContext;

pub const FILES: &str = "FILES";
pub const PLUGINS: &str = "PLUGINS";
pub const CONFIG: &str = "CONFIG";
pub const ALL: &str = "ALL";

/// Phase markers, in the order they run.
pub const PHASES: [&str; 4] = [FILES, PLUGINS, CONFIG, ALL];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Customisation operations form a dependency cycle: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Operation '{operation}' refers to unknown operation '{reference}'")]
    UnknownOperation { operation: String, reference: String },

    #[error("Operation '{0}' is declared more than once")]
    DuplicateOperation(String),

    #[error("'{0}' is a reserved phase name and cannot name an operation")]
    ReservedName(String),
}

pub type Action<'a> = Box<dyn FnMut(&mut BuildContext) -> Result<(), CustomiseError> + 'a>;

/// One named step and its ordering edges.
pub struct OrderedOperation<'a> {
    pub name: String,
    pub requires: BTreeSet<String>,
    pub affects: BTreeSet<String>,
    action: Option<Action<'a>>,
}

impl fmt::Debug for OrderedOperation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedOperation")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("affects", &self.affects)
            .finish_non_exhaustive()
    }
}

impl<'a> OrderedOperation<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: BTreeSet::new(),
            affects: BTreeSet::new(),
            action: None,
        }
    }

    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn affects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affects.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_action(
        mut self,
        action: impl FnMut(&mut BuildContext) -> Result<(), CustomiseError> + 'a,
    ) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    /// Whether this is one of the phase markers.
    pub fn is_phase(&self) -> bool {
        PHASES.contains(&self.name.as_str())
    }

    /// Run the action, if any.
    pub fn run(&mut self, ctx: &mut BuildContext) -> Result<(), CustomiseError> {
        match self.action.as_mut() {
            Some(action) => action(ctx),
            None => Ok(()),
        }
    }

    fn normalised(self) -> Result<Self, OrderError> {
        if reserved(&self.name).is_some() {
            return Err(OrderError::ReservedName(self.name));
        }
        let normalise_all =
            |names: BTreeSet<String>| names.iter().map(|n| normalise_name(n)).collect();
        Ok(Self {
            name: normalise_name(&self.name),
            requires: normalise_all(self.requires),
            affects: normalise_all(self.affects),
            action: self.action,
        })
    }
}

fn reserved(name: &str) -> Option<&'static str> {
    PHASES.iter().copied().find(|p| p.eq_ignore_ascii_case(name))
}

/// Lowercase `name` unless it refers to a phase marker.
pub fn normalise_name(name: &str) -> String {
    match reserved(name) {
        Some(phase) => phase.to_string(),
        None => {
            let lower = name.to_lowercase();
            if lower != name {
                tracing::warn!("Operation name '{name}' is not lower case; using '{lower}'");
            }
            lower
        }
    }
}

fn phase_markers<'a>() -> Vec<OrderedOperation<'a>> {
    let mut markers = Vec::new();
    let mut previous: Option<&str> = None;
    for phase in PHASES {
        let marker = OrderedOperation::new(phase);
        markers.push(match previous {
            Some(before) => marker.requires([before]),
            None => marker,
        });
        previous = Some(phase);
    }
    markers
}

/// Add the phase markers to `operations` and return everything in
/// execution order.
pub fn order_operations(
    operations: Vec<OrderedOperation<'_>>,
) -> Result<Vec<OrderedOperation<'_>>, OrderError> {
    let mut nodes: BTreeMap<String, OrderedOperation<'_>> = BTreeMap::new();
    for marker in phase_markers() {
        nodes.insert(marker.name.clone(), marker);
    }
    for op in operations {
        let op = op.normalised()?;
        if nodes.contains_key(&op.name) {
            return Err(OrderError::DuplicateOperation(op.name));
        }
        nodes.insert(op.name.clone(), op);
    }

    // before -> operations that must run after it
    let mut successors: BTreeMap<&str, BTreeSet<&str>> =
        nodes.keys().map(|k| (k.as_str(), BTreeSet::new())).collect();
    for (name, op) in &nodes {
        for reference in op.requires.iter().chain(&op.affects) {
            if !nodes.contains_key(reference) {
                return Err(OrderError::UnknownOperation {
                    operation: name.clone(),
                    reference: reference.clone(),
                });
            }
        }
        for before in &op.requires {
            if let Some(set) = successors.get_mut(before.as_str()) {
                set.insert(name.as_str());
            }
        }
        if let Some(set) = successors.get_mut(name.as_str()) {
            set.extend(op.affects.iter().map(String::as_str));
        }
    }

    let closure: BTreeMap<&str, BTreeSet<&str>> = successors
        .keys()
        .map(|&start| (start, reachable(&successors, start)))
        .collect();

    let cyclic: Vec<String> = closure
        .iter()
        .filter(|(name, after)| after.contains(*name))
        .map(|(name, _)| (*name).to_string())
        .collect();
    if !cyclic.is_empty() {
        return Err(OrderError::DependencyCycle(cyclic));
    }

    let mut order: Vec<(&str, &BTreeSet<&str>)> = closure.iter().map(|(k, v)| (*k, v)).collect();
    order.sort_by(|(a_name, a_after), (b_name, b_after)| {
        (a_after.len(), *a_after, *a_name)
            .cmp(&(b_after.len(), *b_after, *b_name))
            .reverse()
    });
    let order: Vec<String> = order.into_iter().map(|(name, _)| name.to_string()).collect();

    Ok(order
        .into_iter()
        .filter_map(|name| nodes.remove(&name))
        .collect())
}

/// Everything reachable from `start` through at least one edge.
fn reachable<'n>(successors: &BTreeMap<&'n str, BTreeSet<&'n str>>, start: &'n str) -> BTreeSet<&'n str> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<&str> = successors
        .get(start)
        .map(|s| s.iter().copied().collect())
        .unwrap_or_default();
    while let Some(next) = pending.pop() {
        if seen.insert(next) {
            if let Some(more) = successors.get(next) {
                pending.extend(more.iter().copied());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ops: &[OrderedOperation<'_>]) -> Vec<String> {
        ops.iter().map(|o| o.name.clone()).collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_phase_order() {
        let order = names(&order_operations(Vec::new()).unwrap());
        assert_eq!(order, vec!["FILES", "PLUGINS", "CONFIG", "ALL"]);
    }

    #[test]
    fn test_requires_chain() {
        let ops = vec![
            OrderedOperation::new("a").requires(["b", "c"]),
            OrderedOperation::new("b").requires(["d", "c"]),
            OrderedOperation::new("c"),
            OrderedOperation::new("d"),
        ];
        let order = names(&order_operations(ops).unwrap());
        assert!(position(&order, "c") < position(&order, "b"));
        assert!(position(&order, "d") < position(&order, "b"));
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(position(&order, "c") < position(&order, "a"));
    }

    #[test]
    fn test_cycle_is_reported() {
        let ops = vec![
            OrderedOperation::new("x").requires(["y"]),
            OrderedOperation::new("y").requires(["x"]),
            OrderedOperation::new("z"),
        ];
        assert_eq!(
            order_operations(ops).unwrap_err(),
            OrderError::DependencyCycle(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn test_phase_hooks_and_affects() {
        let ops = vec![
            OrderedOperation::new("manifest").requires(["all"]),
            OrderedOperation::new("Config-Writer").requires(["Config"]).affects(["ALL"]),
            OrderedOperation::new("strip").requires(["files"]).affects(["manifest", "plugins"]),
        ];
        let order = names(&order_operations(ops).unwrap());
        assert!(position(&order, "FILES") < position(&order, "strip"));
        assert!(position(&order, "strip") < position(&order, "PLUGINS"));
        assert!(position(&order, "CONFIG") < position(&order, "config-writer"));
        assert!(position(&order, "config-writer") < position(&order, "ALL"));
        assert_eq!(order.last().map(String::as_str), Some("manifest"));
    }

    #[test]
    fn test_order_is_independent_of_input_order() {
        let build = |reverse: bool| {
            let mut ops = vec![
                OrderedOperation::new("p").requires(["FILES"]),
                OrderedOperation::new("q").requires(["FILES"]),
                OrderedOperation::new("r").requires(["FILES"]),
            ];
            if reverse {
                ops.reverse();
            }
            names(&order_operations(ops).unwrap())
        };
        assert_eq!(build(false), build(true));
    }

    #[test]
    fn test_configuration_errors() {
        assert_eq!(
            order_operations(vec![OrderedOperation::new("Plugins")]).unwrap_err(),
            OrderError::ReservedName("Plugins".into())
        );
        assert_eq!(
            order_operations(vec![OrderedOperation::new("a"), OrderedOperation::new("A")])
                .unwrap_err(),
            OrderError::DuplicateOperation("a".into())
        );
        assert!(matches!(
            order_operations(vec![OrderedOperation::new("a").requires(["ghost"])]).unwrap_err(),
            OrderError::UnknownOperation { .. }
        ));
        assert!(matches!(
            order_operations(vec![OrderedOperation::new("a").requires(["a"])]).unwrap_err(),
            OrderError::DependencyCycle(_)
        ));
    }
}
