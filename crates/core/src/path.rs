//! Addresses of component slots and the connections between them.
//!
//! A [`Path`] is written `component.slot` or `component.slot[index]`, and a
//! [`Connection`] is written `source -> target`, e.g.
//! `polar.cl[2] -> rotor.cl[2]`.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// A slot address, optionally narrowed to one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    pub component: String,
    pub slot: String,
    pub index: Option<usize>,
}

/// Errors that can occur when parsing a [`Path`] or [`Connection`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("`{0}` is not of the form `component.slot` or `component.slot[index]`")]
    Malformed(String),

    #[error("`{0}` is not a valid name")]
    BadName(String),

    #[error("`{0}` has an invalid element index")]
    BadIndex(String),

    #[error("`{0}` is not of the form `source -> target`")]
    MalformedConnection(String),
}

impl Path {
    /// Creates a path to a whole slot.
    #[must_use]
    pub fn new(component: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            slot: slot.into(),
            index: None,
        }
    }

    /// Narrows this path to a single element.
    #[must_use]
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Returns the element offset within the slot, treating scalars as element 0.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.index.unwrap_or(0)
    }
}

pub(crate) fn is_name(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let (component, rest) = text
            .split_once('.')
            .ok_or_else(|| PathError::Malformed(text.to_owned()))?;

        let (slot, index) = match rest.split_once('[') {
            Some((slot, tail)) => {
                let digits = tail
                    .strip_suffix(']')
                    .ok_or_else(|| PathError::BadIndex(text.to_owned()))?;
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| PathError::BadIndex(text.to_owned()))?;
                (slot, Some(index))
            }
            None => (rest, None),
        };

        for name in [component, slot] {
            if !is_name(name) {
                return Err(PathError::BadName(name.to_owned()));
            }
        }

        Ok(Self {
            component: component.to_owned(),
            slot: slot.to_owned(),
            index,
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.slot)?;
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

impl<C: Into<String>, S: Into<String>> From<(C, S)> for Path {
    fn from((component, slot): (C, S)) -> Self {
        Self::new(component, slot)
    }
}

/// A directed value connection from a component output to a component input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: Path,
    pub target: Path,
}

impl FromStr for Connection {
    type Err = PathError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (source, target) = text
            .split_once("->")
            .ok_or_else(|| PathError::MalformedConnection(text.to_owned()))?;

        Ok(Self {
            source: source.parse()?,
            target: target.parse()?,
        })
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}
