//! Response synthesis
//!
//! Folds a command result into the dual-track answer. Turns that did not
//! run a command keep whatever plan reasoning produced.

use crate::bridge::ToolOutput;
use crate::graph::{Classification, ResponsePlan, ScreenAction};

/// Build the final plan for a command turn
///
/// Returns `None` for non-command turns (or when nothing was attempted),
/// meaning the existing plan passes through untouched.
pub fn synthesize(
    classification: Option<Classification>,
    tool_output: Option<&ToolOutput>,
) -> Option<ResponsePlan> {
    if classification != Some(Classification::Command) {
        return None;
    }
    let output = tool_output?;
    Some(ResponsePlan::new(
        voice_summary(output),
        if output.success {
            ScreenAction::MarkdownResponse
        } else {
            ScreenAction::Error
        },
        format_markdown(output),
    ))
}

/// One-line spoken summary of a command result
pub fn voice_summary(output: &ToolOutput) -> String {
    if output.success {
        return "Command finished successfully.".to_string();
    }
    let error = output
        .error
        .as_deref()
        .unwrap_or("unknown error")
        .trim_end_matches('.');
    format!("Command failed: {}.", error)
}

/// Markdown block with status, stdout fence, and stderr when present
pub fn format_markdown(output: &ToolOutput) -> String {
    let mut md = String::new();

    match &output.data {
        Some(data) => {
            md.push_str(&format!("### `{}`\n\n", data.command));
            let status = if output.success { "Success" } else { "Failed" };
            md.push_str(&format!(
                "**Status:** {} (exit code {})\n\n",
                status, data.exit_code
            ));
        }
        None => md.push_str("**Status:** Failed\n\n"),
    }

    if let Some(error) = output.error.as_deref() {
        md.push_str(&format!("**Error:** {}\n\n", error));
    }

    let Some(data) = &output.data else {
        return md.trim_end().to_string();
    };

    md.push_str("**Output:**\n\n");
    push_fence(&mut md, &data.stdout, "(no output)");

    if !data.stderr.trim().is_empty() {
        md.push_str("\n**Errors:**\n\n");
        push_fence(&mut md, &data.stderr, "");
    }

    md.trim_end().to_string()
}

fn push_fence(md: &mut String, body: &str, empty: &str) {
    let body = body.trim_end();
    md.push_str("```\n");
    md.push_str(if body.is_empty() { empty } else { body });
    md.push_str("\n```\n");
}
