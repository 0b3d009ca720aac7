//! Summaries over a sequence of [`ExecutionResult`]s.

use serde::Serialize;

use crate::error::{HookFailure, HookFailures};
use crate::executor::ExecutionResult;

/// Outcome tally. Skipped results count in neither `success` nor `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounts {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ResultCounts {
    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

/// Every failure among `results`, or `None` when nothing failed.
pub fn all_errors(results: &[ExecutionResult]) -> Option<HookFailures> {
    let failures: Vec<HookFailure> = results
        .iter()
        .filter(|r| r.failed())
        .filter_map(|r| {
            r.error.clone().map(|error| HookFailure {
                hook: r.hook.display_name().to_string(),
                error,
            })
        })
        .collect();

    (!failures.is_empty()).then(|| HookFailures::new(failures))
}

pub fn any_failed(results: &[ExecutionResult]) -> bool {
    results.iter().any(ExecutionResult::failed)
}

pub fn count_results(results: &[ExecutionResult]) -> ResultCounts {
    results
        .iter()
        .fold(ResultCounts::default(), |mut counts, r| {
            if r.skipped {
                counts.skipped += 1;
            } else if r.success {
                counts.success += 1;
            } else {
                counts.failed += 1;
            }
            counts
        })
}
