//! Structured observability hooks for AutoSync run lifecycle events.
//!
//! Every decision point of the pipeline and loop emits one event with stable
//! field names (`module`, `action`, `reason`, `state`) so log lines can be
//! filtered the same way in text and JSON output.

use tracing::{info, warn};

use crate::domain::{LoopStats, PatchResult, PlanItem, RunState};

/// Span covering one CLI command; attach with `Instrument`.
pub fn command_span(command: &str) -> tracing::Span {
    tracing::info_span!("autosync.command", command = %command)
}

/// Span for one hybrid-loop iteration; attach with `Instrument`.
pub fn loop_span(loop_index: u32) -> tracing::Span {
    tracing::info_span!("autosync.loop", loop_index = loop_index)
}

pub fn emit_pipeline_started(items: usize, dry_run: bool) {
    info!(event = "pipeline.started", items = items, dry_run = dry_run);
}

pub fn emit_item_skipped(item: &PlanItem, why: &str) {
    info!(
        event = "pipeline.item_skipped",
        module = %item.module,
        action = %item.action,
        reason = %item.reason,
        skipped_because = why,
    );
}

pub fn emit_patch_result(result: &PatchResult) {
    if result.success {
        info!(
            event = "pipeline.patch_result",
            module = %result.module,
            action = %result.action,
            exit_code = result.exit_code,
            success = true,
        );
    } else {
        warn!(
            event = "pipeline.patch_result",
            module = %result.module,
            action = %result.action,
            exit_code = result.exit_code,
            success = false,
            message = %result.message,
        );
    }
}

pub fn emit_gate_evaluated(state: RunState) {
    info!(event = "gate.evaluated", state = %state);
}

pub fn emit_gate_check_failed(check: &str, detail: &str) {
    warn!(event = "gate.check_failed", check = check, detail = detail);
}

pub fn emit_pipeline_finished(state: RunState, patched: usize, dry_run: bool) {
    info!(
        event = "pipeline.finished",
        state = %state,
        patched = patched,
        dry_run = dry_run,
    );
}

pub fn emit_loop_iteration(stats: &LoopStats) {
    info!(
        event = "loop.iteration",
        loop_index = stats.loop_index,
        state = %stats.state,
        patched = stats.patched_count,
    );
}

pub fn emit_loop_finished(loops_ran: u32, total_patched: usize, last_state: RunState, stop: &str) {
    info!(
        event = "loop.finished",
        loops_ran = loops_ran,
        total_patched = total_patched,
        last_state = %last_state,
        stop_reason = stop,
    );
}

pub fn emit_patch_outcome(module: &str, status: &str, detail: &str) {
    info!(event = "patch.outcome", module = module, status = status, detail = detail);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_create() {
        let _entered = command_span("check").entered();
        let _loop = loop_span(1).entered();
        emit_gate_evaluated(RunState::Green);
    }
}
