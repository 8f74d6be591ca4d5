use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Provenance;

/// JSON shape of a framework, generic over the score scale.
///
/// Fields are required; a payload missing any of them fails to deserialize
/// instead of being defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkWire<W> {
    /// Arguments by id.
    pub arguments: BTreeMap<String, ArgumentWire<W>>,
    /// Attack edges as `[src, dst]`.
    pub attacks: Vec<(String, String)>,
    /// Support edges as `[src, dst]`.
    pub supports: Vec<(String, String)>,
}

/// JSON shape of one argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentWire<W> {
    /// Short name, usually equal to the id.
    pub name: String,
    /// Argument text.
    pub argument: String,
    /// Base score before propagation.
    pub initial_weight: W,
    /// Score after propagation.
    pub strength: W,
    /// Whether this is the topic or a mined argument.
    pub provenance: Provenance,
}

/// Percentage scale: export files and display.
pub type PercentFramework = FrameworkWire<u8>;

/// Fraction scale: everything exchanged with the remote engine.
pub type FractionFramework = FrameworkWire<f64>;

impl<W> FrameworkWire<W> {
    /// Convert every score with `f`, keeping structure and order.
    pub fn map_scores<V>(self, mut f: impl FnMut(W) -> V) -> FrameworkWire<V> {
        FrameworkWire {
            arguments: self
                .arguments
                .into_iter()
                .map(|(id, arg)| {
                    let mapped = ArgumentWire {
                        name: arg.name,
                        argument: arg.argument,
                        initial_weight: f(arg.initial_weight),
                        strength: f(arg.strength),
                        provenance: arg.provenance,
                    };
                    (id, mapped)
                })
                .collect(),
            attacks: self.attacks,
            supports: self.supports,
        }
    }
}
