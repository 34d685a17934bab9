/// Actions an observer can take during an SLSQP run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop after this evaluation and return the current point.
    StopEarly,
}
