//! Text rendering of sequence reports

use std::fmt::Write;
use toolshell_engine::{ContentItem, SequenceReport, StepOutcome, Termination};

/// Render a whole report, one line per item
pub fn report(report: &SequenceReport) -> String {
    let mut out = String::new();

    for warning in &report.warnings {
        let _ = writeln!(out, "◆ warning: {}", warning);
    }

    let total = report
        .failed_at
        .map(|position| position.of)
        .unwrap_or(0)
        .max(report.outcomes.len());
    for outcome in &report.outcomes {
        step(&mut out, outcome, total);
    }

    match &report.termination {
        Termination::Completed => {
            if report.outcomes.len() > 1 {
                let _ = writeln!(out, "✓ Plan complete ({} steps)", report.outcomes.len());
            }
        }
        Termination::EstimateReached => {
            let _ = writeln!(out, "✓ Sequence complete: estimate reached");
        }
        Termination::NoMoreThoughts => {
            let _ = writeln!(out, "✓ Sequence complete: no more thoughts needed");
        }
        Termination::NeedsInfo(message) => {
            let _ = writeln!(out, "? {}", message);
        }
        Termination::Cancelled => {
            let _ = writeln!(out, "◆ Cancelled");
        }
        Termination::Failed => {
            let message = report
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown failure");
            // A failed step already printed its own message
            let shown = report
                .outcomes
                .last()
                .map(|o| !o.success)
                .unwrap_or(false);
            match (report.failed_at, shown) {
                (Some(position), true) => {
                    let _ = writeln!(out, "✗ Stopped at step {}/{}", position.step, position.of);
                }
                (Some(position), false) => {
                    let _ = writeln!(
                        out,
                        "✗ Stopped at step {}/{}: {}",
                        position.step, position.of, message
                    );
                }
                (None, _) => {
                    let _ = writeln!(out, "✗ {}", message);
                }
            }
            if report.is_fatal() {
                let _ = writeln!(out, "✗ Submission ended: not retrying");
            }
        }
    }

    out
}

fn step(out: &mut String, outcome: &StepOutcome, total: usize) {
    let args = serde_json::Value::Object(
        outcome
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect(),
    );
    let _ = writeln!(
        out,
        "◆ Step {}/{}: {} {}",
        outcome.step_index + 1,
        total,
        outcome.tool_name,
        args
    );

    for item in &outcome.content {
        let _ = match item {
            ContentItem::Text(text) => writeln!(out, "{}", text),
            ContentItem::Binary { data, mime_type } => {
                writeln!(out, "[binary {}, {} bytes]", mime_type, data.len())
            }
            ContentItem::Other { tag, .. } => writeln!(out, "[{} content]", tag),
        };
    }

    if let Some(error) = &outcome.error {
        let _ = writeln!(out, "✗ {}", error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::time::Duration;
    use toolshell_engine::{
        Arguments, ErrorInfo, ErrorKind, StepPosition, TranslationResult, Value,
    };
    use uuid::Uuid;

    fn outcome(index: usize, success: bool, content: Vec<ContentItem>) -> StepOutcome {
        let mut arguments = Arguments::new();
        arguments.insert("bucket".to_string(), Value::from("b1"));
        StepOutcome {
            step_index: index,
            tool_name: "list_objects".to_string(),
            arguments,
            success,
            content,
            error: (!success).then(|| ErrorInfo::from_kind(ErrorKind::NotFound, "not found")),
            elapsed: Duration::ZERO,
        }
    }

    fn report_with(outcomes: Vec<StepOutcome>, termination: Termination) -> SequenceReport {
        SequenceReport {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            finished_at: Local::now(),
            translation: Some(TranslationResult::Direct("x".to_string())),
            outcomes,
            termination,
            error: None,
            failed_at: None,
            warnings: Vec::new(),
            thought_state: None,
        }
    }

    #[test]
    fn test_render_content_items() {
        let text = report(&report_with(
            vec![outcome(
                0,
                true,
                vec![
                    ContentItem::Text("a.txt".to_string()),
                    ContentItem::Binary {
                        data: vec![1, 2, 3],
                        mime_type: "image/png".to_string(),
                    },
                    ContentItem::Other {
                        tag: "resource".to_string(),
                        raw: serde_json::Value::Null,
                    },
                ],
            )],
            Termination::Completed,
        ));

        assert!(text.contains(r#"◆ Step 1/1: list_objects {"bucket":"b1"}"#));
        assert!(text.contains("a.txt\n"));
        assert!(text.contains("[binary image/png, 3 bytes]"));
        assert!(text.contains("[resource content]"));
        assert!(!text.contains("Plan complete"));
    }

    #[test]
    fn test_render_failed_step_position() {
        let mut failed = report_with(
            vec![outcome(0, true, Vec::new()), outcome(1, false, Vec::new())],
            Termination::Failed,
        );
        failed.error = Some(ErrorInfo::from_kind(ErrorKind::NotFound, "not found"));
        failed.failed_at = Some(StepPosition { step: 2, of: 3 });

        let text = report(&failed);
        assert!(text.contains("◆ Step 2/3"));
        assert!(text.contains("✗ Resource not found."));
        assert!(text.contains("✗ Stopped at step 2/3\n"));
    }

    #[test]
    fn test_render_budget_failure() {
        let mut failed = report_with(Vec::new(), Termination::Failed);
        failed.error = Some(ErrorInfo::from_kind(ErrorKind::SequenceBudgetExceeded, ""));
        failed.failed_at = Some(StepPosition { step: 26, of: 26 });

        let text = report(&failed);
        assert!(text.contains("✗ Stopped at step 26/26: The sequence exceeded its step budget"));
        assert!(text.contains("Submission ended"));
    }

    #[test]
    fn test_render_completion_reasons() {
        let estimate = report(&report_with(Vec::new(), Termination::EstimateReached));
        let done = report(&report_with(Vec::new(), Termination::NoMoreThoughts));
        assert!(estimate.contains("estimate reached"));
        assert!(done.contains("no more thoughts needed"));

        let ask = report(&report_with(
            Vec::new(),
            Termination::NeedsInfo("which zone?".to_string()),
        ));
        assert_eq!(ask, "? which zone?\n");
    }
}
