//! The generic interpreter substrate.
//!
//! A [`Cell`] is a stateless, referentially-transparent transformation
//! over some state type `T`. Compound cells ([`SequenceCell`],
//! [`IfCell`], [`WhileCell`]) own their control flow entirely; the
//! [`CellRunner`] is a dumb entry point that never special-cases a cell
//! type.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::Error;

/// Context threaded through a single program run.
///
/// Carries the cancellation signal honored at every suspension point
/// (completions calls, tool calls, console reads). Pure cells never
/// consult it.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    cancellation: CancellationToken,
}

impl RunContext {
    /// Creates a context that is never cancelled.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context driven by the given cancellation token.
    #[inline]
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    /// Returns the cancellation token for this run.
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fails with [`Error::Cancelled`] if the run has been cancelled.
    pub fn ensure_active(&self) -> Result<(), Error> {
        if self.cancellation.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A pure, possibly-suspending state transformation node.
#[async_trait]
pub trait Cell<T>: Send + Sync
where
    T: Send + 'static,
{
    /// A short name for logging.
    fn name(&self) -> &str {
        "cell"
    }

    /// Transforms the input state into the next state.
    async fn run(&self, input: T, cx: &RunContext) -> Result<T, Error>;
}

/// A cell that returns its input unchanged.
pub struct TerminalCell;

#[async_trait]
impl<T> Cell<T> for TerminalCell
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        "terminal"
    }

    async fn run(&self, input: T, _cx: &RunContext) -> Result<T, Error> {
        Ok(input)
    }
}

/// A cell wrapping a pure synchronous transform.
pub struct LambdaCell<T> {
    func: Box<dyn Fn(T) -> T + Send + Sync>,
}

impl<T> LambdaCell<T> {
    /// Creates a cell from the given transform.
    pub fn new(func: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        Self {
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl<T> Cell<T> for LambdaCell<T>
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        "lambda"
    }

    async fn run(&self, input: T, _cx: &RunContext) -> Result<T, Error> {
        Ok((self.func)(input))
    }
}

/// A predicate over the current state.
pub trait Condition<T>: Send + Sync {
    /// Evaluates the predicate without consuming the state.
    fn evaluate(&self, input: &T) -> bool;
}

/// A condition wrapping a closure.
pub struct LambdaCondition<T> {
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> LambdaCondition<T> {
    /// Creates a condition from the given predicate.
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl<T> Condition<T> for LambdaCondition<T> {
    fn evaluate(&self, input: &T) -> bool {
        (self.predicate)(input)
    }
}

/// A condition that always holds.
pub struct AlwaysTrue;

impl<T> Condition<T> for AlwaysTrue {
    fn evaluate(&self, _input: &T) -> bool {
        true
    }
}

/// A condition that never holds.
pub struct AlwaysFalse;

impl<T> Condition<T> for AlwaysFalse {
    fn evaluate(&self, _input: &T) -> bool {
        false
    }
}

/// Runs children strictly in order, threading each child's output into
/// the next child's input. An empty sequence is the identity.
pub struct SequenceCell<T> {
    cells: Vec<Box<dyn Cell<T>>>,
}

impl<T> SequenceCell<T>
where
    T: Send + 'static,
{
    /// Creates a sequence over the given cells.
    pub fn new(cells: Vec<Box<dyn Cell<T>>>) -> Self {
        Self { cells }
    }
}

#[async_trait]
impl<T> Cell<T> for SequenceCell<T>
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        "sequence"
    }

    async fn run(&self, input: T, cx: &RunContext) -> Result<T, Error> {
        let mut state = input;
        for cell in &self.cells {
            debug!(cell = cell.name(), "running sequence child");
            state = cell.run(state, cx).await?;
        }
        Ok(state)
    }
}

/// Evaluates its condition once against the current input and runs
/// exactly one of the two child cells.
pub struct IfCell<T> {
    condition: Box<dyn Condition<T>>,
    if_true: Box<dyn Cell<T>>,
    if_false: Box<dyn Cell<T>>,
}

impl<T> IfCell<T>
where
    T: Send + 'static,
{
    /// Creates a conditional cell.
    pub fn new(
        condition: Box<dyn Condition<T>>,
        if_true: Box<dyn Cell<T>>,
        if_false: Box<dyn Cell<T>>,
    ) -> Self {
        Self {
            condition,
            if_true,
            if_false,
        }
    }
}

#[async_trait]
impl<T> Cell<T> for IfCell<T>
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        "if"
    }

    async fn run(&self, input: T, cx: &RunContext) -> Result<T, Error> {
        let branch = if self.condition.evaluate(&input) {
            debug!("condition true; taking the true branch");
            &self.if_true
        } else {
            debug!("condition false; taking the false branch");
            &self.if_false
        };
        branch.run(input, cx).await
    }
}

/// Repeats its body while the condition holds against the current state.
///
/// Zero iterations occur if the condition is initially false. The loop
/// is otherwise unbounded: termination is the condition's responsibility
/// and the engine does not cap it.
pub struct WhileCell<T> {
    condition: Box<dyn Condition<T>>,
    body: Box<dyn Cell<T>>,
}

impl<T> WhileCell<T>
where
    T: Send + 'static,
{
    /// Creates a loop cell.
    pub fn new(
        condition: Box<dyn Condition<T>>,
        body: Box<dyn Cell<T>>,
    ) -> Self {
        Self { condition, body }
    }
}

#[async_trait]
impl<T> Cell<T> for WhileCell<T>
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        "while"
    }

    async fn run(&self, input: T, cx: &RunContext) -> Result<T, Error> {
        let mut state = input;
        let mut iteration = 0u64;
        while self.condition.evaluate(&state) {
            debug!(iteration, "loop condition true; starting iteration");
            state = self.body.run(state, cx).await?;
            iteration += 1;
        }
        debug!(iteration, "loop condition false; ending");
        Ok(state)
    }
}

/// The single execution entry point for cell programs.
///
/// The runner does nothing beyond invoking the root cell: branching and
/// looping live inside cells. It attaches a unique correlation token to
/// the logging context so one run's events can be traced end to end.
#[derive(Clone, Copy, Debug, Default)]
pub struct CellRunner;

impl CellRunner {
    /// Creates a runner.
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Runs a cell program against the input state.
    pub async fn run<T>(
        &self,
        cell: &dyn Cell<T>,
        input: T,
        cx: &RunContext,
    ) -> Result<T, Error>
    where
        T: Send + 'static,
    {
        let run_id = short_run_id();
        async {
            cx.ensure_active()?;
            info!(cell = cell.name(), "run starting");
            let output = cell.run(input, cx).await;
            match &output {
                Ok(_) => info!("run complete"),
                Err(err) => warn!("run failed: {err}"),
            }
            output
        }
        .instrument(info_span!("cell_run", %run_id))
        .await
    }
}

fn short_run_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn append(suffix: &'static str) -> Box<dyn Cell<String>> {
        Box::new(LambdaCell::new(move |s: String| s + suffix))
    }

    #[tokio::test]
    async fn test_sequence_preserves_order() {
        let sequence = SequenceCell::new(vec![
            append("a"),
            append("b"),
            append("c"),
            append("d"),
        ]);

        let runner = CellRunner::new();
        let result = runner
            .run(&sequence, String::new(), &RunContext::new())
            .await
            .unwrap();

        assert_eq!(result, "abcd");
    }

    #[tokio::test]
    async fn test_empty_sequence_is_identity() {
        let sequence: SequenceCell<String> = SequenceCell::new(vec![]);

        let runner = CellRunner::new();
        let result = runner
            .run(&sequence, "unchanged".to_owned(), &RunContext::new())
            .await
            .unwrap();

        assert_eq!(result, "unchanged");
    }

    #[tokio::test]
    async fn test_while_terminates_on_condition() {
        for start in [0, 2, 9, 10] {
            let cell = WhileCell::new(
                Box::new(LambdaCondition::new(|i: &i32| *i < 10)),
                Box::new(LambdaCell::new(|i: i32| i + 1)),
            );

            let runner = CellRunner::new();
            let result = runner
                .run(&cell, start, &RunContext::new())
                .await
                .unwrap();

            assert_eq!(result, 10);
        }
    }

    #[tokio::test]
    async fn test_while_with_false_condition_runs_zero_iterations() {
        let cell = WhileCell::new(
            Box::new(AlwaysFalse),
            Box::new(LambdaCell::new(|i: i32| i + 1)),
        );

        let runner = CellRunner::new();
        let result = runner.run(&cell, 7, &RunContext::new()).await.unwrap();

        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn test_if_takes_one_branch() {
        for (flag, expected) in [(true, 100), (false, -100)] {
            let condition: Box<dyn Condition<i32>> = if flag {
                Box::new(AlwaysTrue)
            } else {
                Box::new(AlwaysFalse)
            };
            let cell = IfCell::new(
                condition,
                Box::new(LambdaCell::new(|_| 100)),
                Box::new(LambdaCell::new(|_| -100)),
            );

            let runner = CellRunner::new();
            let result =
                runner.run(&cell, 0, &RunContext::new()).await.unwrap();

            assert_eq!(result, expected);
        }
    }

    #[tokio::test]
    async fn test_terminal_is_identity() {
        let runner = CellRunner::new();
        let result = runner
            .run(&TerminalCell, 42, &RunContext::new())
            .await
            .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_cancelled_run_fails_without_executing() {
        let token = CancellationToken::new();
        token.cancel();
        let cx = RunContext::with_cancellation(token);

        let cell = LambdaCell::new(|i: i32| i + 1);
        let runner = CellRunner::new();
        let result = runner.run(&cell, 0, &cx).await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
