use std::collections::BTreeMap;

use super::{
    ArgumentNode, ArgumentWire, ArgumentationFramework, Edge, FractionFramework, PercentFramework,
    Snapshot,
};
use crate::error::{FrameworkError, FrameworkResult};

/// Percentage (wire) to fraction (internal). Exact for every whole percent.
pub fn percent_to_fraction(percent: u8) -> f64 {
    f64::from(percent) / 100.0
}

/// Fraction (internal) to percentage (wire), rounding half away from zero.
///
/// Fractions with more than two decimal digits lose precision here.
pub fn fraction_to_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Validate and convert a fraction-scaled payload from the remote engine.
pub fn from_remote(wire: FractionFramework) -> FrameworkResult<ArgumentationFramework> {
    for (id, arg) in &wire.arguments {
        check_fraction(id, "initial_weight", arg.initial_weight)?;
        check_fraction(id, "strength", arg.strength)?;
    }

    let nodes: BTreeMap<String, ArgumentNode> = wire
        .arguments
        .into_iter()
        .map(|(id, arg)| {
            let node = ArgumentNode {
                id: id.clone(),
                name: arg.name,
                label: arg.argument,
                initial_weight: arg.initial_weight,
                strength: arg.strength,
                provenance: arg.provenance,
            };
            (id, node)
        })
        .collect();

    ArgumentationFramework::new(nodes, into_edges(wire.attacks), into_edges(wire.supports))
}

/// Fraction-scaled payload for forwarding a framework to the remote engine.
pub fn to_remote(framework: &ArgumentationFramework) -> FractionFramework {
    FractionFramework {
        arguments: framework
            .nodes()
            .iter()
            .map(|(id, node)| {
                let arg = ArgumentWire {
                    name: node.name.clone(),
                    argument: node.label.clone(),
                    initial_weight: node.initial_weight,
                    strength: node.strength,
                    provenance: node.provenance,
                };
                (id.clone(), arg)
            })
            .collect(),
        attacks: from_edges(framework.attack_edges()),
        supports: from_edges(framework.support_edges()),
    }
}

/// Validate and convert a percentage-scaled payload (export files).
pub fn from_percent(wire: PercentFramework) -> FrameworkResult<ArgumentationFramework> {
    for (id, arg) in &wire.arguments {
        check_percent(id, "initial_weight", arg.initial_weight)?;
        check_percent(id, "strength", arg.strength)?;
    }
    from_remote(wire.map_scores(percent_to_fraction))
}

/// Percentage-scaled payload for export and display.
pub fn to_percent(framework: &ArgumentationFramework) -> PercentFramework {
    to_remote(framework).map_scores(fraction_to_percent)
}

/// Serialize a framework as an export document.
pub fn export_json(framework: &ArgumentationFramework) -> FrameworkResult<String> {
    Ok(serde_json::to_string_pretty(&to_percent(framework))?)
}

/// Parse an export document back into a framework.
pub fn import_json(document: &str) -> FrameworkResult<ArgumentationFramework> {
    let wire: PercentFramework = serde_json::from_str(document)?;
    from_percent(wire)
}

/// Fold a new snapshot into the current one.
///
/// Always the full replacement: the engine does not version nodes, so no
/// diff between snapshots can be trusted.
pub fn merge(current: Option<&Snapshot>, incoming: Snapshot) -> Snapshot {
    let _ = current;
    incoming
}

fn check_fraction(id: &str, field: &'static str, value: f64) -> FrameworkResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(FrameworkError::OutOfRange {
            id: id.to_string(),
            field,
            value: value.to_string(),
        })
    }
}

fn check_percent(id: &str, field: &'static str, value: u8) -> FrameworkResult<()> {
    if value <= 100 {
        Ok(())
    } else {
        Err(FrameworkError::OutOfRange {
            id: id.to_string(),
            field,
            value: value.to_string(),
        })
    }
}

fn into_edges(pairs: Vec<(String, String)>) -> Vec<Edge> {
    pairs.into_iter().map(|(src, dst)| Edge { src, dst }).collect()
}

fn from_edges(edges: &[Edge]) -> Vec<(String, String)> {
    edges
        .iter()
        .map(|e| (e.src.clone(), e.dst.clone()))
        .collect()
}
