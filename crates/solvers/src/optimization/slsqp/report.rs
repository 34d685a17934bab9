use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
};

use super::{
    Error,
    code::mode_message,
    config::{Config, Output, PrintLevel},
};

/// Writes the run report at the configured print level.
///
/// Write failures are logged once and otherwise ignored; a broken output
/// channel never stops a run.
pub(super) struct Reporter {
    level: PrintLevel,
    sink: Option<Box<dyn Write>>,
    failed: bool,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("level", &self.level)
            .field("open", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Opens the output channel; a silent config opens nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the output file cannot be created.
    pub(super) fn open(config: &Config) -> Result<Self, Error> {
        let level = config.print_level();
        let sink: Option<Box<dyn Write>> = match (level, config.output()) {
            (PrintLevel::Silent, _) => None,
            (_, Output::Stdout) => Some(Box::new(io::stdout())),
            (_, Output::File(path)) => {
                let file = File::create(path).map_err(|source| Error::Output {
                    path: path.clone(),
                    source,
                })?;
                Some(Box::new(BufWriter::new(file)))
            }
        };
        Ok(Self {
            level,
            sink,
            failed: false,
        })
    }

    pub(super) fn header(&mut self, n: usize, m: usize, meq: usize, config: &Config) {
        self.line(
            PrintLevel::Iterations,
            format_args!(
                "SLSQP: n = {n}, m = {m}, meq = {meq}, acc = {:e}, maxiter = {}",
                config.accuracy(),
                config.max_iters()
            ),
        );
        self.line(
            PrintLevel::Iterations,
            format_args!("{:>5} {:>5} {:>22} {:>14}", "NIT", "FC", "OBJFUN", "VIOLATION"),
        );
    }

    pub(super) fn iteration(&mut self, iter: usize, func_count: usize, objective: f64, violation: f64) {
        self.line(
            PrintLevel::Iterations,
            format_args!("{iter:>5} {func_count:>5} {objective:>22.15e} {violation:>14.6e}"),
        );
    }

    pub(super) fn function(&mut self, x: &[f64], objective: f64, violation: f64) {
        self.line(
            PrintLevel::Detailed,
            format_args!("  f(x = {x:?}) = {objective:e}, violation = {violation:e}"),
        );
    }

    pub(super) fn gradient(&mut self, x: &[f64], gradient: &[f64]) {
        self.line(
            PrintLevel::Detailed,
            format_args!("  df(x = {x:?}) = {gradient:?}"),
        );
    }

    /// Writes the final summary for raw `mode`.
    pub(super) fn summary(
        &mut self,
        mode: i32,
        objective: f64,
        iters: usize,
        func_count: usize,
        grad_count: usize,
    ) {
        let lines = [
            format!("{}    (Exit mode {mode})", mode_message(mode)),
            format!("            Current function value: {objective}"),
            format!("            Iterations: {iters}"),
            format!("            Function evaluations: {func_count}"),
            format!("            Gradient evaluations: {grad_count}"),
        ];
        for line in lines {
            self.line(PrintLevel::Summary, format_args!("{line}"));
        }
        self.flush();
    }

    fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.flush() {
                self.report_failure(&err);
            }
        }
    }

    fn line(&mut self, level: PrintLevel, args: fmt::Arguments<'_>) {
        if self.level < level {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(err) = sink.write_fmt(args).and_then(|()| sink.write_all(b"\n")) {
            self.report_failure(&err);
        }
    }

    fn report_failure(&mut self, err: &io::Error) {
        if !self.failed {
            log::warn!("failed to write solver output: {err}");
            self.failed = true;
        }
    }
}
