//! Partial derivative blocks reported by components.
//!
//! A block for the pair `(output, input)` is a dense matrix with one row per
//! output element and one column per input element. Scalars count as one
//! element.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::{
    component::Component,
    error::ComponentError,
    value::{Slots, Value},
};

/// How a component obtains one of its partial derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeKind {
    /// Computed analytically.
    Exact,

    /// Approximated by finite differences of `evaluate`.
    FiniteDifference,

    /// Deliberately reported as zero.
    ///
    /// Used when the true dependency exists but is not differentiated, so
    /// callers can tell a known gap from a genuine absence of dependency.
    Null,
}

/// Declares the derivative kind of one `(output, input)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialDeclaration {
    pub output: String,
    pub input: String,
    pub kind: DerivativeKind,
}

impl PartialDeclaration {
    #[must_use]
    pub fn new(output: impl Into<String>, input: impl Into<String>, kind: DerivativeKind) -> Self {
        Self {
            output: output.into(),
            input: input.into(),
            kind,
        }
    }
}

/// Partial derivative blocks keyed by `(output, input)` slot names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partials {
    blocks: BTreeMap<(String, String), Array2<f64>>,
}

impl Partials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the block for `d output / d input`, replacing any previous one.
    pub fn insert(&mut self, output: impl Into<String>, input: impl Into<String>, block: Array2<f64>) {
        self.blocks.insert((output.into(), input.into()), block);
    }

    /// Stores a 1×1 block for a scalar-to-scalar partial.
    pub fn insert_scalar(&mut self, output: impl Into<String>, input: impl Into<String>, value: f64) {
        self.insert(output, input, Array2::from_elem((1, 1), value));
    }

    #[must_use]
    pub fn get(&self, output: &str, input: &str) -> Option<&Array2<f64>> {
        self.blocks.get(&(output.to_owned(), input.to_owned()))
    }

    /// Iterates over `((output, input), block)` entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Array2<f64>)> {
        self.blocks
            .iter()
            .map(|((output, input), block)| (output.as_str(), input.as_str(), block))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Approximates `d output / d input` by central differences of `evaluate`.
///
/// Each input element is perturbed by `±step` in turn; the component is
/// evaluated twice per element.
///
/// # Errors
///
/// Returns an error if the component fails, or if either slot is missing.
pub fn central_difference<C: Component + ?Sized>(
    component: &mut C,
    inputs: &Slots,
    output: &str,
    input: &str,
    step: f64,
) -> Result<Array2<f64>, ComponentError> {
    let base = inputs
        .get(input)
        .ok_or_else(|| format!("missing input `{input}`"))?;
    let columns = base.len();

    let mut block: Option<Array2<f64>> = None;
    let mut perturbed = inputs.clone();

    for col in 0..columns {
        let forward = shifted(&mut perturbed, input, base, col, step);
        let plus = read_output(&component.evaluate(forward)?, output)?;

        let backward = shifted(&mut perturbed, input, base, col, -step);
        let minus = read_output(&component.evaluate(backward)?, output)?;

        let block = block.get_or_insert_with(|| Array2::zeros((plus.len(), columns)));
        for (row, (hi, lo)) in plus.iter().zip(&minus).enumerate() {
            block[[row, col]] = (hi - lo) / (2.0 * step);
        }
    }

    Ok(block.unwrap_or_else(|| Array2::zeros((0, 0))))
}

fn shifted<'a>(slots: &'a mut Slots, name: &str, base: &Value, index: usize, delta: f64) -> &'a Slots {
    let mut value = base.clone();
    value.as_mut_slice()[index] += delta;
    slots.insert(name, value);
    slots
}

fn read_output(outputs: &Slots, name: &str) -> Result<Vec<f64>, ComponentError> {
    outputs
        .get(name)
        .map(|value| value.as_slice().to_vec())
        .ok_or_else(|| format!("missing output `{name}`").into())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::value::SlotSpec;

    /// y = [x0 * x1, x1²]
    struct Products;

    impl Component for Products {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::array_with("x", vec![1.0, 1.0])]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::array("y", 2)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            let x = inputs.array("x")?;
            Ok(Slots::new().with("y", vec![x[0] * x[1], x[1] * x[1]]))
        }
    }

    #[test]
    fn central_difference_matches_analytic_block() {
        let inputs = Slots::new().with("x", vec![2.0, 3.0]);
        let block = central_difference(&mut Products, &inputs, "y", "x", 1e-6).unwrap();

        assert_eq!(block.dim(), (2, 2));
        assert_relative_eq!(block[[0, 0]], 3.0, epsilon = 1e-6);
        assert_relative_eq!(block[[0, 1]], 2.0, epsilon = 1e-6);
        assert_relative_eq!(block[[1, 0]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(block[[1, 1]], 6.0, epsilon = 1e-6);
    }

    #[test]
    fn missing_slots_are_errors() {
        let inputs = Slots::new().with("x", vec![2.0, 3.0]);
        assert!(central_difference(&mut Products, &inputs, "y", "z", 1e-6).is_err());
        assert!(central_difference(&mut Products, &inputs, "w", "x", 1e-6).is_err());
    }
}
