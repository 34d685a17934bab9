//! Linear expressions over component outputs.
//!
//! Objectives and constraints are written as sums of terms, each a number, an
//! output path, or `number * path`:
//!
//! ```
//! use braid_core::expression::{LinearExpr, Relation};
//!
//! let expr: LinearExpr = "-bem.data[3]".parse().unwrap();
//! assert_eq!(expr.terms().len(), 1);
//!
//! let (lhs, relation, rhs) = braid_core::expression::split_relation("2 * a.x + 1 <= b.y").unwrap();
//! assert_eq!(relation, Some(Relation::LessEqual));
//! assert_eq!(lhs.trim(), "2 * a.x + 1");
//! assert_eq!(rhs.map(str::trim), Some("b.y"));
//! ```

use std::{fmt, str::FromStr};

use crate::{error::ConfigError, path::Path};

/// A comparison operator in a constraint expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Relation {
    /// Returns `true` for `=` and `==`.
    #[must_use]
    pub fn is_equality(self) -> bool {
        self == Self::Equal
    }
}

/// An affine combination `constant + Σ coefficient · path`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearExpr {
    terms: Vec<(f64, Path)>,
    constant: f64,
}

impl LinearExpr {
    /// An expression that is just a constant.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// Returns the `(coefficient, path)` terms.
    #[must_use]
    pub fn terms(&self) -> &[(f64, Path)] {
        &self.terms
    }

    #[must_use]
    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    /// Returns `self - other`.
    #[must_use]
    pub fn minus(mut self, other: &Self) -> Self {
        self.constant -= other.constant;
        self.terms
            .extend(other.terms.iter().map(|(coef, path)| (-coef, path.clone())));
        self
    }

    /// Returns `self - value`.
    #[must_use]
    pub fn offset(mut self, value: f64) -> Self {
        self.constant -= value;
        self
    }

    /// Returns `-self`.
    #[must_use]
    pub fn negated(mut self) -> Self {
        self.constant = -self.constant;
        for (coef, _) in &mut self.terms {
            *coef = -*coef;
        }
        self
    }

    /// Evaluates the expression, reading each path through `lookup`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `lookup`.
    pub fn evaluate<E>(&self, mut lookup: impl FnMut(&Path) -> Result<f64, E>) -> Result<f64, E> {
        self.terms
            .iter()
            .try_fold(self.constant, |acc, (coef, path)| Ok(acc + coef * lookup(path)?))
    }
}

impl FromStr for LinearExpr {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Parser::new(text).parse()
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (coef, path)) in self.terms.iter().enumerate() {
            match (i, *coef < 0.0) {
                (0, true) => f.write_str("-")?,
                (0, false) => {}
                (_, true) => f.write_str(" - ")?,
                (_, false) => f.write_str(" + ")?,
            }
            if coef.abs() != 1.0 {
                write!(f, "{} * ", coef.abs())?;
            }
            write!(f, "{path}")?;
        }

        if self.terms.is_empty() {
            write!(f, "{}", self.constant)
        } else if self.constant < 0.0 {
            write!(f, " - {}", -self.constant)
        } else if self.constant > 0.0 {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

/// Splits `lhs OP rhs` at its comparison operator.
///
/// Returns the whole text as `lhs` with no relation when no operator is present.
///
/// # Errors
///
/// Returns an error if more than one operator is present.
pub fn split_relation(text: &str) -> Result<(&str, Option<Relation>, Option<&str>), ConfigError> {
    const OPERATORS: [(&str, Relation); 6] = [
        ("==", Relation::Equal),
        ("<=", Relation::LessEqual),
        (">=", Relation::GreaterEqual),
        ("=", Relation::Equal),
        ("<", Relation::Less),
        (">", Relation::Greater),
    ];

    let Some(at) = text.find(['=', '<', '>']) else {
        return Ok((text, None, None));
    };

    let (op, relation) = OPERATORS
        .iter()
        .find(|(op, _)| text[at..].starts_with(op))
        .copied()
        .ok_or_else(|| expression_error(text, "unrecognized operator"))?;

    let lhs = &text[..at];
    let rhs = &text[at + op.len()..];
    if rhs.contains(['=', '<', '>']) {
        return Err(expression_error(text, "more than one comparison operator"));
    }

    Ok((lhs, Some(relation), Some(rhs)))
}

fn expression_error(text: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Expression {
        text: text.to_owned(),
        reason: reason.into(),
    }
}

/// A small recursive-descent parser over `term (('+' | '-') term)*`.
struct Parser<'a> {
    text: &'a str,
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, rest: text }
    }

    fn parse(mut self) -> Result<LinearExpr, ConfigError> {
        let mut expr = LinearExpr::default();

        let mut sign = if self.eat('-') {
            -1.0
        } else {
            self.eat('+');
            1.0
        };

        loop {
            self.term(sign, &mut expr)?;

            if self.eat('+') {
                sign = 1.0;
            } else if self.eat('-') {
                sign = -1.0;
            } else if self.rest.trim().is_empty() {
                return Ok(expr);
            } else {
                return Err(self.error(format!("unexpected `{}`", self.rest.trim())));
            }
        }
    }

    fn term(&mut self, sign: f64, expr: &mut LinearExpr) -> Result<(), ConfigError> {
        self.skip_space();
        match self.rest.chars().next() {
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let number = self.number()?;
                if self.eat('*') {
                    let path = self.path()?;
                    expr.terms.push((sign * number, path));
                } else {
                    expr.constant += sign * number;
                }
                Ok(())
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let path = self.path()?;
                expr.terms.push((sign, path));
                Ok(())
            }
            _ => Err(self.error("expected a number or an output path")),
        }
    }

    fn number(&mut self) -> Result<f64, ConfigError> {
        let bytes = self.rest.as_bytes();
        let mut end = 0;
        while end < bytes.len() {
            let b = bytes[end];
            let exponent_sign =
                (b == b'+' || b == b'-') && end > 0 && matches!(bytes[end - 1], b'e' | b'E');
            if b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || exponent_sign {
                end += 1;
            } else {
                break;
            }
        }

        let (digits, rest) = self.rest.split_at(end);
        let number = digits
            .parse::<f64>()
            .map_err(|_| self.error(format!("`{digits}` is not a number")))?;
        self.rest = rest;
        Ok(number)
    }

    fn path(&mut self) -> Result<Path, ConfigError> {
        self.skip_space();
        let end = self
            .rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')))
            .unwrap_or(self.rest.len());

        let (text, rest) = self.rest.split_at(end);
        let path: Path = text.parse()?;
        self.rest = rest;
        Ok(path)
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_space();
        match self.rest.strip_prefix(c) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn skip_space(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn error(&self, reason: impl Into<String>) -> ConfigError {
        expression_error(self.text, reason)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn lookup(path: &Path) -> Result<f64, ConfigError> {
        match (path.component.as_str(), path.slot.as_str(), path.index) {
            ("a", "x", None) => Ok(2.0),
            ("b", "y", Some(1)) => Ok(5.0),
            _ => Err(ConfigError::Invalid(path.to_string())),
        }
    }

    #[test]
    fn parses_weighted_sums() {
        let expr: LinearExpr = "1 - 2.5 * a.x + b.y[1] - 0.5".parse().unwrap();

        assert_eq!(expr.terms().len(), 2);
        assert_relative_eq!(expr.constant_term(), 0.5);
        assert_relative_eq!(expr.evaluate(lookup).unwrap(), 0.5 - 5.0 + 5.0);
    }

    #[test]
    fn parses_negated_paths_and_exponents() {
        let expr: LinearExpr = "-bem.data[3]".parse().unwrap();
        assert_eq!(expr.terms(), &[(-1.0, Path::new("bem", "data").at(3))]);

        let expr: LinearExpr = "1e-3 * a.x + 2E+1".parse().unwrap();
        assert_relative_eq!(expr.terms()[0].0, 1e-3);
        assert_relative_eq!(expr.constant_term(), 20.0);
    }

    #[test]
    fn rejects_garbage() {
        for text in ["", "a.x +", "a.x * 2", "2 * 3", "a.x b.y", "a..x", "(a.x)"] {
            assert!(text.parse::<LinearExpr>().is_err(), "accepted `{text}`");
        }
    }

    #[test]
    fn splits_relations() {
        let (lhs, relation, rhs) = split_relation("a.x = b.y[1]").unwrap();
        assert_eq!((lhs, relation, rhs), ("a.x ", Some(Relation::Equal), Some(" b.y[1]")));

        let (_, relation, _) = split_relation("a.x >= 1").unwrap();
        assert_eq!(relation, Some(Relation::GreaterEqual));

        let (_, relation, _) = split_relation("a.x == 1").unwrap();
        assert_eq!(relation, Some(Relation::Equal));

        let (lhs, relation, rhs) = split_relation("a.x").unwrap();
        assert_eq!((lhs, relation, rhs), ("a.x", None, None));

        assert!(split_relation("0 < a.x < 1").is_err());
    }

    #[test]
    fn displays_in_source_syntax() {
        let expr: LinearExpr = "-a.x + 2 * b.y[1] - 3".parse().unwrap();
        assert_eq!(expr.to_string(), "-a.x + 2 * b.y[1] - 3");
        assert_eq!(LinearExpr::constant(1.5).to_string(), "1.5");
    }

    #[test]
    fn subtraction_combines_terms() {
        let lhs: LinearExpr = "a.x".parse().unwrap();
        let rhs: LinearExpr = "b.y[1] + 1".parse().unwrap();
        let diff = lhs.minus(&rhs);

        assert_relative_eq!(diff.evaluate(lookup).unwrap(), 2.0 - 5.0 - 1.0);
        assert_relative_eq!(diff.negated().evaluate(lookup).unwrap(), 4.0);
    }
}
