// src/dag/graph.rs

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::unit::Compiler;

/// Structured result of dependency validation.
///
/// `Display` renders the exact report surfaced to callers: one
/// ``Compiler dependency `X` not found.`` line per unresolved name, in
/// declaration order, then the cycle block with its `source -> target`
/// lines sorted by (source, target). The sort order is part of the
/// contract: identical inputs must yield identical reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Unresolved dependency names, one entry per declaration.
    pub missing: Vec<String>,
    /// Edges left over after reduction, i.e. participating in a cycle.
    /// `(source, target)` means source depends on target.
    pub cycle_edges: Vec<(String, String)>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.cycle_edges.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .missing
            .iter()
            .map(|name| format!("Compiler dependency `{name}` not found."))
            .collect();

        if !self.cycle_edges.is_empty() {
            let mut block = vec!["Circular dependency found in compiler dependencies.".to_string()];
            block.extend(
                self.cycle_edges
                    .iter()
                    .map(|(source, target)| format!("{source} -> {target}")),
            );
            parts.push(block.join("\n"));
        }

        f.write_str(&parts.join("\n"))
    }
}

/// Check that every declared dependency resolves to a compiler in the set
/// and that the resolvable edges form an acyclic graph.
pub fn validate(compilers: &[Arc<dyn Compiler>]) -> Result<(), ValidationReport> {
    let units: Vec<(&str, &[String])> = compilers
        .iter()
        .map(|c| (c.name(), c.dependencies()))
        .collect();
    validate_units(&units)
}

fn validate_units(units: &[(&str, &[String])]) -> Result<(), ValidationReport> {
    let known: HashSet<&str> = units.iter().map(|(name, _)| *name).collect();

    // Resolve dependency names; edge direction is source -> target where
    // source depends on target.
    let mut missing = Vec::new();
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (name, _) in units {
        graph.add_node(*name);
    }
    for (source, deps) in units {
        for dep in deps.iter() {
            if known.contains(dep.as_str()) {
                graph.add_edge(*source, dep.as_str(), ());
            } else {
                missing.push(dep.clone());
            }
        }
    }

    // Kahn-style reduction: start from compilers nothing depends on,
    // delete their outgoing edges, release targets as their last incoming
    // edge disappears. Edges surviving the reduction form cycles.
    let mut stack: Vec<&str> = units
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| {
            graph
                .neighbors_directed(*name, Direction::Incoming)
                .next()
                .is_none()
        })
        .collect();

    while let Some(current) = stack.pop() {
        let targets: Vec<&str> = graph
            .neighbors_directed(current, Direction::Outgoing)
            .collect();
        for target in targets {
            graph.remove_edge(current, target);
            if graph
                .neighbors_directed(target, Direction::Incoming)
                .next()
                .is_none()
            {
                stack.push(target);
            }
        }
    }

    let mut cycle_edges: Vec<(String, String)> = graph
        .all_edges()
        .map(|(source, target, _)| (source.to_string(), target.to_string()))
        .collect();
    cycle_edges.sort();

    let report = ValidationReport {
        missing,
        cycle_edges,
    };
    if report.is_empty() {
        Ok(())
    } else {
        Err(report)
    }
}
