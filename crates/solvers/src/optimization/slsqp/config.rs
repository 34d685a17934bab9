use std::path::PathBuf;

use thiserror::Error;

/// Output file name used when none is given.
pub const DEFAULT_OUTPUT_FILE: &str = "slsqp.out";

/// How much the driver writes to its output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub enum PrintLevel {
    /// No output.
    #[default]
    Silent,

    /// A final summary.
    Summary,

    /// One line per major iteration plus the summary.
    Iterations,

    /// Every evaluation, one line per iteration, and the summary.
    Detailed,
}

impl TryFrom<u8> for PrintLevel {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Silent),
            1 => Ok(Self::Summary),
            2 => Ok(Self::Iterations),
            3 => Ok(Self::Detailed),
            other => Err(ConfigError::PrintLevel(other)),
        }
    }
}

/// Where the driver writes its report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub enum Output {
    #[default]
    Stdout,

    /// A file, truncated when the run starts.
    File(PathBuf),
}

impl Output {
    /// A file named [`DEFAULT_OUTPUT_FILE`] in the working directory.
    #[must_use]
    pub fn default_file() -> Self {
        Self::File(PathBuf::from(DEFAULT_OUTPUT_FILE))
    }
}

/// Configuration for the SLSQP driver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
pub struct Config {
    accuracy: f64,
    max_iters: usize,
    print_level: PrintLevel,
    output: Output,
}

/// Errors that can occur when validating an SLSQP config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("accuracy must be finite and positive")]
    Accuracy,

    #[error("print level must be 0, 1, 2, or 3, got {0}")]
    PrintLevel(u8),
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(1e-6, 50).unwrap()
    }
}

impl Config {
    /// Creates a silent config writing to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if `accuracy` is not finite and positive.
    pub fn new(accuracy: f64, max_iters: usize) -> Result<Self, ConfigError> {
        if !accuracy.is_finite() || accuracy <= 0.0 {
            return Err(ConfigError::Accuracy);
        }

        Ok(Self {
            accuracy,
            max_iters,
            print_level: PrintLevel::Silent,
            output: Output::Stdout,
        })
    }

    #[must_use]
    pub fn with_print_level(mut self, print_level: PrintLevel) -> Self {
        self.print_level = print_level;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Returns the requested accuracy for the objective and constraints.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Returns the maximum number of major iterations.
    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    #[must_use]
    pub fn print_level(&self) -> PrintLevel {
        self.print_level
    }

    #[must_use]
    pub fn output(&self) -> &Output {
        &self.output
    }
}
