use std::collections::BTreeMap;

use ndarray::Array2;

use crate::partials::Partials;

/// Raw partial derivative blocks collected from one linearization pass.
///
/// Blocks are keyed by `(component, output, input)`. Components that do not
/// support linearization are listed as inert; every partial they would have
/// contributed is an exact zero.
#[derive(Debug, Clone, Default)]
pub struct Linearization {
    partials: BTreeMap<String, Partials>,
    inert: Vec<String>,
}

impl Linearization {
    pub(crate) fn insert(&mut self, component: &str, partials: Partials) {
        self.partials.insert(component.to_owned(), partials);
    }

    pub(crate) fn mark_inert(&mut self, component: &str) {
        self.inert.push(component.to_owned());
    }

    /// Returns the block `d component.output / d component.input`, if reported.
    #[must_use]
    pub fn block(&self, component: &str, output: &str, input: &str) -> Option<&Array2<f64>> {
        self.partials.get(component)?.get(output, input)
    }

    /// Returns all blocks reported by one component.
    #[must_use]
    pub fn partials_of(&self, component: &str) -> Option<&Partials> {
        self.partials.get(component)
    }

    /// Iterates over `(component, output, input, block)` entries.
    pub fn blocks(&self) -> impl Iterator<Item = (&str, &str, &str, &Array2<f64>)> {
        self.partials.iter().flat_map(|(component, partials)| {
            partials
                .iter()
                .map(move |(output, input, block)| (component.as_str(), output, input, block))
        })
    }

    /// Returns the components that supplied no partials, in execution order.
    #[must_use]
    pub fn inert_components(&self) -> &[String] {
        &self.inert
    }
}
