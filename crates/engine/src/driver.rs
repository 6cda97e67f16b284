//! Sequence driver
//!
//! Idle -> Executing -> Deciding -> {Executing | Idle | Failed}
//!
//! A plan runs strictly in order and stops at the first failure. When the
//! step just executed was the thought tool, the driver reads the call's own
//! arguments to decide whether to ask the translator for the next thought.
//! Every plan is bounded by `max_iterations` whatever the translator claims.

use crate::classify::{ErrorInfo, ErrorKind};
use crate::executor::{Executor, StepOutcome};
use crate::parser::{CommandStyle, ParseError};
use crate::translator::{TranslationContext, TranslationResult, Translator};
use crate::value::{Arguments, Command};
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FOLLOW_UP_RESULT_LIMIT: usize = 4000;

/// Argument keys of the iterative thought tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtTool {
    pub name: String,
    pub continue_key: String,
    pub number_key: String,
    pub total_key: String,
}

impl Default for ThoughtTool {
    fn default() -> Self {
        Self {
            name: "sequentialthinking".to_string(),
            continue_key: "nextThoughtNeeded".to_string(),
            number_key: "thoughtNumber".to_string(),
            total_key: "totalThoughts".to_string(),
        }
    }
}

/// What a thought call declared about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ThoughtIntent {
    continuation: bool,
    step_number: i64,
    total: i64,
}

impl ThoughtTool {
    fn read(&self, arguments: &Arguments) -> ThoughtIntent {
        let int = |key: &str| arguments.get(key).and_then(|v| v.as_int()).unwrap_or(0);
        ThoughtIntent {
            continuation: arguments
                .get(&self.continue_key)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            step_number: int(&self.number_key),
            total: int(&self.total_key),
        }
    }
}

/// Driver knobs
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub max_iterations: u32,
    pub step_pause: Duration,
    pub thought_tool: Option<ThoughtTool>,
    pub style: CommandStyle,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            step_pause: Duration::ZERO,
            thought_tool: None,
            style: CommandStyle::KeyValue,
        }
    }
}

/// Driver states, for logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Executing,
    Deciding,
    Failed,
}

/// Progress of one thought sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceState {
    pub step_number: i64,
    pub total_steps_estimate: i64,
    pub continuation_requested: bool,
    pub history: Vec<StepOutcome>,
}

impl SequenceState {
    fn observe(&mut self, intent: ThoughtIntent, outcome: StepOutcome) {
        if intent.step_number < self.step_number {
            warn!(
                "◆ thought number went back from {} to {}",
                self.step_number, intent.step_number
            );
        }
        self.step_number = self.step_number.max(intent.step_number);
        self.total_steps_estimate = intent.total;
        self.continuation_requested = intent.continuation;
        self.history.push(outcome);
    }
}

/// Why a submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every planned step ran
    Completed,
    /// Thought sequence asked to continue but reached its own estimate
    EstimateReached,
    /// Thought sequence declared no further thought needed
    NoMoreThoughts,
    /// Translator asked for clarification; nothing ran
    NeedsInfo(String),
    Failed,
    Cancelled,
}

/// 1-based position of a step in its plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPosition {
    pub step: usize,
    pub of: usize,
}

/// Everything one submission produced
#[derive(Debug, Clone)]
pub struct SequenceReport {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub translation: Option<TranslationResult>,
    pub outcomes: Vec<StepOutcome>,
    pub termination: Termination,
    pub error: Option<ErrorInfo>,
    pub failed_at: Option<StepPosition>,
    pub warnings: Vec<String>,
    pub thought_state: Option<SequenceState>,
}

impl SequenceReport {
    pub fn is_success(&self) -> bool {
        matches!(
            self.termination,
            Termination::Completed | Termination::EstimateReached | Termination::NoMoreThoughts
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.error.as_ref().map(|e| e.kind.is_fatal()).unwrap_or(false)
    }

    pub fn final_state(&self) -> DriverState {
        match self.termination {
            Termination::Failed => DriverState::Failed,
            _ => DriverState::Idle,
        }
    }
}

/// Accumulates a report while a plan runs
struct Run {
    id: Uuid,
    started_at: DateTime<Local>,
    translation: Option<TranslationResult>,
    outcomes: Vec<StepOutcome>,
    warnings: Vec<String>,
    thought: Option<SequenceState>,
}

impl Run {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            translation: None,
            outcomes: Vec::new(),
            warnings: Vec::new(),
            thought: None,
        }
    }

    fn finish(self, termination: Termination) -> SequenceReport {
        self.report(termination, None, None)
    }

    fn fail(self, error: ErrorInfo, failed_at: Option<StepPosition>) -> SequenceReport {
        debug!(state = ?DriverState::Failed, "◆ plan {} failed: {}", self.id, error.kind);
        self.report(Termination::Failed, Some(error), failed_at)
    }

    fn report(
        self,
        termination: Termination,
        error: Option<ErrorInfo>,
        failed_at: Option<StepPosition>,
    ) -> SequenceReport {
        info!(
            "◆ plan {} finished: {:?} after {} step(s)",
            self.id,
            termination,
            self.outcomes.len()
        );
        SequenceReport {
            id: self.id,
            started_at: self.started_at,
            finished_at: Local::now(),
            translation: self.translation,
            outcomes: self.outcomes,
            termination,
            error,
            failed_at,
            warnings: self.warnings,
            thought_state: self.thought,
        }
    }
}

/// Runs user turns end to end
pub struct SequenceDriver {
    translator: Translator,
    executor: Executor,
    settings: DriverSettings,
}

impl SequenceDriver {
    pub fn new(translator: Translator, executor: Executor, settings: DriverSettings) -> Self {
        Self {
            translator,
            executor,
            settings,
        }
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub async fn submit(
        &self,
        user_text: &str,
        context: Option<&TranslationContext>,
    ) -> SequenceReport {
        self.submit_with_cancel(user_text, context, &CancellationToken::new())
            .await
    }

    pub async fn submit_with_cancel(
        &self,
        user_text: &str,
        context: Option<&TranslationContext>,
        cancel: &CancellationToken,
    ) -> SequenceReport {
        let mut run = Run::new();
        info!("◆ plan {} submitted", run.id);

        if cancel.is_cancelled() {
            return run.finish(Termination::Cancelled);
        }

        let translation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return run.finish(Termination::Cancelled),
            translation = self.translator.translate(user_text, context) => translation,
        };
        if let Some(warning) = translation.warning {
            run.warnings.push(warning.message);
        }
        run.translation = Some(translation.result.clone());

        let mut queue: VecDeque<String> = match translation.result {
            TranslationResult::NeedsInfo(message) => {
                return run.finish(Termination::NeedsInfo(message));
            }
            other => other.steps().into(),
        };
        if queue.is_empty() {
            return run.fail(
                ErrorInfo::from_kind(ErrorKind::EmptyCommand, ""),
                Some(StepPosition { step: 1, of: 1 }),
            );
        }

        let mut planned = queue.len();
        let mut thought_end: Option<Termination> = None;
        let mut iterations: u32 = 0;

        while let Some(step_text) = queue.pop_front() {
            if cancel.is_cancelled() {
                return run.finish(Termination::Cancelled);
            }

            let position = StepPosition {
                step: run.outcomes.len() + 1,
                of: planned,
            };

            iterations += 1;
            if iterations > self.settings.max_iterations {
                return run.fail(
                    ErrorInfo::from_kind(
                        ErrorKind::SequenceBudgetExceeded,
                        format!("stopped after {} steps", self.settings.max_iterations),
                    ),
                    Some(position),
                );
            }

            let parsed = match self.settings.style.parse(&step_text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    let kind = match e {
                        ParseError::EmptyCommand => ErrorKind::EmptyCommand,
                        ParseError::UnbalancedQuotes(_) => ErrorKind::ParseFailure,
                    };
                    return run.fail(ErrorInfo::from_kind(kind, step_text), Some(position));
                }
            };
            for token in parsed.skipped {
                run.warnings
                    .push(format!("step {}: skipped token '{}'", position.step, token));
            }
            let command = parsed.command;

            debug!(state = ?DriverState::Executing, "◆ step {}/{}: {}", position.step, position.of, command.tool_name);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return run.finish(Termination::Cancelled),
                outcome = self.executor.execute(position.step - 1, &command) => outcome,
            };

            if let Some(error) = outcome.error.clone() {
                run.outcomes.push(outcome);
                return run.fail(error, Some(position));
            }

            let Some(tool) = self.thought_tool_for(&command) else {
                run.outcomes.push(outcome);
                continue;
            };

            debug!(state = ?DriverState::Deciding, "◆ reading continuation from {}", tool.name);
            let intent = tool.read(&command.arguments);
            let result_text = outcome.text();
            run.thought
                .get_or_insert_with(SequenceState::default)
                .observe(intent, outcome.clone());
            run.outcomes.push(outcome);

            if !(intent.continuation && intent.step_number < intent.total) {
                thought_end = Some(if intent.continuation {
                    Termination::EstimateReached
                } else {
                    Termination::NoMoreThoughts
                });
                continue;
            }
            thought_end = None;

            if !self.settings.step_pause.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return run.finish(Termination::Cancelled),
                    _ = tokio::time::sleep(self.settings.step_pause) => {}
                }
            }

            let prompt = follow_up_prompt(tool, intent, &result_text);
            let next_position = StepPosition {
                step: position.step + 1,
                of: planned + 1,
            };
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return run.finish(Termination::Cancelled),
                next = self.translator.translate(&prompt, context) => next,
            };
            if let Some(warning) = next.warning {
                return run.fail(warning, Some(next_position));
            }

            let mut steps = match next.result {
                TranslationResult::NeedsInfo(message) => {
                    return run.finish(Termination::NeedsInfo(message));
                }
                other => other.steps().into_iter(),
            };
            let Some(first) = steps.next() else {
                return run.fail(
                    ErrorInfo::from_kind(ErrorKind::EmptyCommand, ""),
                    Some(next_position),
                );
            };
            let dropped = steps.count();
            if dropped > 0 {
                warn!("◆ follow-up returned a plan; dropping {} extra step(s)", dropped);
                run.warnings.push(format!(
                    "follow-up translation returned {} extra step(s); only the first was run",
                    dropped
                ));
            }
            queue.push_front(first);
            planned += 1;
        }

        run.finish(thought_end.unwrap_or(Termination::Completed))
    }

    /// The thought tool applies only when there is a translator to ask
    fn thought_tool_for(&self, command: &Command) -> Option<&ThoughtTool> {
        self.settings
            .thought_tool
            .as_ref()
            .filter(|tool| tool.name == command.tool_name && self.translator.is_configured())
    }
}

fn follow_up_prompt(tool: &ThoughtTool, intent: ThoughtIntent, result: &str) -> String {
    let result: String = result.chars().take(FOLLOW_UP_RESULT_LIMIT).collect();
    format!(
        "The previous tool executed successfully. Result: {}. Generate the next {} tool call for thought number {}.",
        result,
        tool.name,
        intent.step_number + 1
    )
}
