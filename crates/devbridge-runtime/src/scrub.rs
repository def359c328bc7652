//! Output scrubbing: turns raw terminal output into a command result.

use regex::Regex;
use std::sync::LazyLock;

use crate::prompt::PromptPatterns;

/// Matches CSI sequences, OSC sequences, two-byte escapes and any stray ESC.
///
/// The trailing lone-ESC alternative means no ESC survives a pass, which
/// makes stripping idempotent.
static ANSI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]|\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)?|\x1B[@-Z\\-_]|\x1B")
        .expect("Invalid ANSI regex")
});

/// Strip ANSI escape sequences from a string.
///
/// # Example
/// ```
/// use devbridge_runtime::scrub::strip_ansi;
///
/// let input = "text \x1B[90mgrayed\x1B[0m normal";
/// assert_eq!(strip_ansi(input), "text grayed normal");
/// ```
pub fn strip_ansi(s: &str) -> String {
    ANSI_REGEX.replace_all(s, "").into_owned()
}

/// Turns the raw output of one command into its result.
///
/// Strips escape sequences, normalizes line endings, drops the echoed
/// command line and a trailing prompt line, then trims.
pub fn scrub_output(raw: &str, command: &str, prompts: &PromptPatterns) -> String {
    let clean = strip_ansi(raw).replace("\r\n", "\n").replace('\r', "");
    let mut lines: Vec<&str> = clean.split('\n').collect();

    let command = command.trim();
    if !command.is_empty() && lines.first().is_some_and(|l| is_echo(l, command, prompts)) {
        lines.remove(0);
    }

    if lines.last().is_some_and(|l| prompts.is_prompt_line(l)) {
        lines.pop();
    }

    lines.join("\n").trim().to_string()
}

/// A line echoes `command` when it is the command alone or the command
/// typed after a prompt.
fn is_echo(line: &str, command: &str, prompts: &PromptPatterns) -> bool {
    match line.trim_end().strip_suffix(command) {
        Some(prefix) => prefix.trim().is_empty() || prompts.is_prompt_line(prefix),
        None => false,
    }
}

/// Scrubs output that has no associated command, such as a connect transcript.
pub fn scrub_transcript(raw: &str, prompts: &PromptPatterns) -> String {
    scrub_output(raw, "", prompts)
}
