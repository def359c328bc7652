//! Shell prompt and readiness detection.
//!
//! Detection is heuristic: a literal `$ ` printed by a command can look like a
//! prompt, and an unusual prompt style will go unnoticed. The pattern set is
//! therefore policy carried in the runner configuration, not a constant.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SessionError};
use crate::scrub::strip_ansi;

/// A named regex matched against the last line of output.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Human-readable name.
    pub name: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a new pattern.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let name = name.into();
        let regex = Regex::new(pattern)
            .map_err(|e| SessionError::Configuration(format!("invalid prompt pattern '{}': {}", name, e)))?;
        Ok(Self { name, regex })
    }

    /// Checks if the pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The source regex.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

static SHELL_PROMPTS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    [
        ("bash_prompt", r"\$ $"),
        ("root_prompt", r"# $"),
        ("zsh_prompt", r"% $"),
        ("generic_prompt", r"> $"),
    ]
    .into_iter()
    .map(|(name, re)| Pattern {
        name: name.to_string(),
        regex: Regex::new(re).expect("invalid built-in prompt regex"),
    })
    .collect()
});

const READY_MARKERS: &[&str] = &["ready", "login", "successfully"];

/// Prompt patterns plus literal readiness markers.
#[derive(Clone)]
pub struct PromptPatterns {
    prompts: Vec<Pattern>,
    ready_markers: Vec<String>,
}

impl PromptPatterns {
    /// Common shell prompts (`$ `, `# `, `% `, `> `) and the default readiness markers.
    pub fn shell() -> Self {
        Self {
            prompts: SHELL_PROMPTS.clone(),
            ready_markers: READY_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// An empty policy; nothing is ever detected.
    pub fn empty() -> Self {
        Self {
            prompts: Vec::new(),
            ready_markers: Vec::new(),
        }
    }

    /// Adds a prompt regex, matched against the last line of output.
    pub fn with_prompt(mut self, name: impl Into<String>, pattern: &str) -> Result<Self> {
        self.prompts.push(Pattern::new(name, pattern)?);
        Ok(self)
    }

    /// Adds a literal readiness marker, matched case-insensitively anywhere in the output.
    pub fn with_ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.ready_markers.push(marker.into().to_lowercase());
        self
    }

    /// Drops the readiness markers, leaving only prompts.
    pub fn without_ready_markers(mut self) -> Self {
        self.ready_markers.clear();
        self
    }

    /// The configured prompt patterns.
    pub fn prompts(&self) -> &[Pattern] {
        &self.prompts
    }

    /// Whether `line` is a prompt on its own.
    pub fn is_prompt_line(&self, line: &str) -> bool {
        let line = strip_ansi(line).replace('\r', "");
        self.prompts.iter().any(|p| p.matches(&line))
    }

    /// Whether the output ends in a prompt, i.e. the shell is waiting for input.
    pub fn ends_with_prompt(&self, output: &str) -> bool {
        self.is_prompt_line(last_line(output))
    }

    /// Whether a freshly spawned process looks ready: a trailing prompt or a readiness marker.
    pub fn is_ready(&self, output: &str) -> bool {
        if self.ends_with_prompt(output) {
            return true;
        }
        if self.ready_markers.is_empty() {
            return false;
        }
        let lower = strip_ansi(output).to_lowercase();
        self.ready_markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

impl Default for PromptPatterns {
    fn default() -> Self {
        Self::shell()
    }
}

impl fmt::Debug for PromptPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptPatterns")
            .field("prompts", &self.prompts.iter().map(|p| p.name.as_str()).collect::<Vec<_>>())
            .field("ready_markers", &self.ready_markers)
            .finish()
    }
}

/// Text after the last line break, or the whole text if there is none.
fn last_line(output: &str) -> &str {
    output.rsplit('\n').next().unwrap_or(output)
}
