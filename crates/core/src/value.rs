use std::collections::BTreeMap;

use thiserror::Error;

/// The value held by a component slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Value {
    /// Returns the number of elements; scalars have one.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Array(values) => values.len(),
        }
    }

    /// Returns `true` for an empty array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Self::Scalar(value) => std::slice::from_ref(value),
            Self::Array(values) => values,
        }
    }

    /// Returns the elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        match self {
            Self::Scalar(value) => std::slice::from_mut(value),
            Self::Array(values) => values,
        }
    }

    /// Returns the shape this value has.
    #[must_use]
    pub fn shape(&self) -> Shape {
        match self {
            Self::Scalar(_) => Shape::Scalar,
            Self::Array(values) => Shape::Array(values.len()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Self::Array(values)
    }
}

/// The declared shape of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Array(usize),
}

impl Shape {
    /// Returns the number of elements a value of this shape has.
    #[must_use]
    pub fn len(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Array(len) => len,
        }
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Declares one named input or output of a component.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSpec {
    pub name: String,
    pub default: Value,
}

impl SlotSpec {
    /// A scalar slot with the given default.
    #[must_use]
    pub fn scalar(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            default: Value::Scalar(default),
        }
    }

    /// A fixed-length array slot initialized to zeros.
    #[must_use]
    pub fn array(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            default: Value::Array(vec![0.0; len]),
        }
    }

    /// A fixed-length array slot with explicit defaults.
    #[must_use]
    pub fn array_with(name: impl Into<String>, defaults: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            default: Value::Array(defaults),
        }
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.default.shape()
    }
}

/// Errors from reading named slot values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("missing slot `{0}`")]
    Missing(String),

    #[error("slot `{0}` is an array, expected a scalar")]
    ExpectedScalar(String),

    #[error("slot `{0}` is a scalar, expected an array")]
    ExpectedArray(String),
}

/// Named slot values passed into and out of components.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slots(BTreeMap<String, Value>);

impl Slots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a slot value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder form of [`Slots::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.0.get_mut(name)
    }

    /// Reads a scalar slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot is missing or holds an array.
    pub fn scalar(&self, name: &str) -> Result<f64, SlotError> {
        match self.0.get(name) {
            Some(Value::Scalar(value)) => Ok(*value),
            Some(Value::Array(_)) => Err(SlotError::ExpectedScalar(name.to_owned())),
            None => Err(SlotError::Missing(name.to_owned())),
        }
    }

    /// Reads an array slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot is missing or holds a scalar.
    pub fn array(&self, name: &str) -> Result<&[f64], SlotError> {
        match self.0.get(name) {
            Some(Value::Array(values)) => Ok(values),
            Some(Value::Scalar(_)) => Err(SlotError::ExpectedArray(name.to_owned())),
            None => Err(SlotError::Missing(name.to_owned())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Slots {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_reads() {
        let slots = Slots::new()
            .with("pitch", 2.5)
            .with("chord", vec![0.1, 0.2]);

        assert_eq!(slots.scalar("pitch"), Ok(2.5));
        assert_eq!(slots.array("chord"), Ok(&[0.1, 0.2][..]));
        assert_eq!(
            slots.scalar("chord"),
            Err(SlotError::ExpectedScalar("chord".into()))
        );
        assert_eq!(slots.array("twist"), Err(SlotError::Missing("twist".into())));
    }

    #[test]
    fn scalars_behave_as_one_element() {
        let mut value = Value::Scalar(1.0);
        assert_eq!(value.len(), 1);
        value.as_mut_slice()[0] = 4.0;
        assert_eq!(value, Value::Scalar(4.0));
        assert_eq!(SlotSpec::array("cl", 3).shape(), Shape::Array(3));
    }
}
