//! Interactive REPL over one live shell session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use devbridge_runtime::{ProcessManager, RegistryConfig, SessionRegistry};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing::debug;

use crate::commands::Result;

/// Session ID of the REPL's shell.
const SESSION_ID: &str = "shell";

const HELP: &str = "\
Lines are executed in the shell session and their output printed.

Meta-commands:
  :output        Show the session's current output buffer
  :raw <text>    Write raw input without waiting (escapes: \\n \\r \\t \\e \\xHH)
  :status        Show session status
  :help          Show this help
  :quit          Stop the session and exit";

/// Tab completion for meta-commands.
struct MetaCompleter;

impl MetaCompleter {
    const COMMANDS: &'static [&'static str] = &[":help", ":output", ":quit", ":raw", ":status"];
}

impl Completer for MetaCompleter {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        if !line.starts_with(':') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<Pair> = Self::COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for MetaCompleter {
    type Hint = String;
}

impl Highlighter for MetaCompleter {}
impl Validator for MetaCompleter {}
impl Helper for MetaCompleter {}

/// A line of REPL input.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Run a command in the shell
    Execute(String),
    /// Show the output buffer
    Output,
    /// Write raw input
    Raw(String),
    /// Show session status
    Status,
    /// Show help
    Help,
    /// Quit the REPL
    Quit,
    /// Unknown meta-command
    Unknown(String),
    /// Blank line
    Empty,
}

impl ReplCommand {
    /// Parses input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }

        let Some(meta) = trimmed.strip_prefix(':') else {
            return ReplCommand::Execute(trimmed.to_string());
        };

        let (cmd, arg) = match meta.split_once(' ') {
            Some((cmd, arg)) => (cmd, Some(arg)),
            None => (meta, None),
        };

        match cmd.to_lowercase().as_str() {
            "output" | "o" => ReplCommand::Output,
            "raw" | "r" => match arg {
                Some(text) if !text.is_empty() => ReplCommand::Raw(unescape(text)),
                _ => ReplCommand::Unknown("raw requires input".to_string()),
            },
            "status" | "s" => ReplCommand::Status,
            "help" | "h" | "?" => ReplCommand::Help,
            "quit" | "q" | "exit" => ReplCommand::Quit,
            other => ReplCommand::Unknown(other.to_string()),
        }
    }
}

/// Expands `\n`, `\r`, `\t`, `\e`, `\\` and `\xHH`. Unknown escapes are kept as written.
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('e') => out.push('\x1b'),
            Some('\\') => out.push('\\'),
            Some('x') => {
                let hex: String = chars.clone().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 && byte.is_ascii() => {
                        out.push(byte as char);
                        chars.next();
                        chars.next();
                    }
                    _ => out.push_str("\\x"),
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// REPL state
pub struct Repl {
    editor: Editor<MetaCompleter, DefaultHistory>,
    history_path: Option<PathBuf>,
    runtime: tokio::runtime::Runtime,
    manager: ProcessManager,
    shell: String,
}

impl Repl {
    /// Creates a new REPL instance.
    pub fn new(state_dir: &Path, config: RegistryConfig, shell: String) -> Result<Self> {
        let editor_config = rustyline::Config::builder()
            .completion_type(rustyline::CompletionType::List)
            .build();
        let mut editor = Editor::with_config(editor_config)?;
        editor.set_helper(Some(MetaCompleter));

        let runtime = tokio::runtime::Runtime::new()?;

        let history_path = match std::fs::create_dir_all(state_dir) {
            Ok(()) => {
                let path = state_dir.join("shell_history.txt");
                if path.exists() {
                    let _ = editor.load_history(&path);
                }
                Some(path)
            }
            Err(e) => {
                debug!(error = %e, "history disabled");
                None
            }
        };

        Ok(Self {
            editor,
            history_path,
            runtime,
            manager: ProcessManager::new(config),
            shell,
        })
    }

    /// Runs the REPL loop.
    pub fn run(&mut self) -> Result<()> {
        let registry = self.manager.registry();
        self.runtime.block_on(self.manager.start())?;

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), serde_json::json!("devbridge shell"));
        let connected = self.runtime.block_on(async {
            registry.start_process(SESSION_ID, &self.shell, vec![], metadata).await?;
            registry.wait_until_connected(SESSION_ID).await
        });
        if let Err(e) = connected {
            self.runtime.block_on(self.manager.shutdown())?;
            return Err(format!("failed to start {}: {}", self.shell, e).into());
        }

        println!("devbridge shell v{} ({})", env!("CARGO_PKG_VERSION"), self.shell);
        println!("Type :help for meta-commands, :quit to exit");
        println!();

        loop {
            let prompt = self.prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        self.editor.add_history_entry(line.as_str())?;
                    }

                    let cmd = ReplCommand::parse(&line);
                    debug!(?cmd, "parsed command");

                    match self.handle_command(&registry, cmd) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    // Forward the interrupt to the running program
                    let _ = self.runtime.block_on(registry.write_to_process(SESSION_ID, "\x03"));
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = &self.history_path {
            let _ = self.editor.save_history(path);
        }

        self.runtime.block_on(self.manager.shutdown())?;
        println!("Goodbye!");
        Ok(())
    }

    /// Returns the prompt string.
    fn prompt(&self) -> String {
        prompt_for(&self.shell)
    }

    /// Handles a REPL command. Returns Ok(true) if should quit.
    fn handle_command(&mut self, registry: &SessionRegistry, cmd: ReplCommand) -> Result<bool> {
        match cmd {
            ReplCommand::Execute(command) => {
                let output = self
                    .runtime
                    .block_on(registry.execute_process_command(SESSION_ID, &command))?;
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            ReplCommand::Output => {
                let output = self.runtime.block_on(registry.get_process_output(SESSION_ID))?;
                println!("{}", output);
            }
            ReplCommand::Raw(text) => {
                self.runtime.block_on(registry.write_to_process(SESSION_ID, &text))?;
            }
            ReplCommand::Status => {
                let (session, state) = self.runtime.block_on(async {
                    let session = registry.get_process(SESSION_ID).await?;
                    let state = registry.get_runner_state(SESSION_ID).await?;
                    Ok::<_, devbridge_runtime::SessionError>((session, state))
                })?;
                println!("Session: {}", session.id);
                println!("  Command: {}", session.command);
                println!("  Started: {}", session.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
                println!("  Status:  {:?}", session.status);
                println!("  Runner:  {:?}", state);
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => return Ok(true),
            ReplCommand::Unknown(cmd) => {
                println!("Unknown meta-command: {}. Type :help for available commands.", cmd);
            }
            ReplCommand::Empty => {}
        }

        Ok(false)
    }
}

fn prompt_for(shell: &str) -> String {
    let name = Path::new(shell)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| shell.to_string());
    format!("devbridge [{}]> ", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute() {
        assert_eq!(ReplCommand::parse("git status"), ReplCommand::Execute("git status".to_string()));
        assert_eq!(ReplCommand::parse("  ls -la  \n"), ReplCommand::Execute("ls -la".to_string()));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ReplCommand::parse(""), ReplCommand::Empty);
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn test_parse_meta_commands() {
        assert_eq!(ReplCommand::parse(":output"), ReplCommand::Output);
        assert_eq!(ReplCommand::parse(":o"), ReplCommand::Output);
        assert_eq!(ReplCommand::parse(":status"), ReplCommand::Status);
        assert_eq!(ReplCommand::parse(":help"), ReplCommand::Help);
        assert_eq!(ReplCommand::parse(":?"), ReplCommand::Help);
        assert_eq!(ReplCommand::parse(":quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse(":EXIT"), ReplCommand::Quit);
    }

    #[test]
    fn test_parse_raw() {
        assert_eq!(ReplCommand::parse(":raw q"), ReplCommand::Raw("q".to_string()));
        assert_eq!(ReplCommand::parse(":raw y\\n"), ReplCommand::Raw("y\n".to_string()));
        assert!(matches!(ReplCommand::parse(":raw"), ReplCommand::Unknown(_)));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(ReplCommand::parse(":frobnicate"), ReplCommand::Unknown("frobnicate".to_string()));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape("a\\nb\\tc"), "a\nb\tc");
        assert_eq!(unescape("\\x03"), "\x03");
        assert_eq!(unescape("\\e[A"), "\x1b[A");
        assert_eq!(unescape("back\\\\slash"), "back\\slash");
    }

    #[test]
    fn test_unescape_keeps_unknown_and_malformed() {
        assert_eq!(unescape("\\q"), "\\q");
        assert_eq!(unescape("\\xZZ"), "\\xZZ");
        assert_eq!(unescape("\\x4"), "\\x4");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_prompt_uses_shell_name() {
        assert_eq!(prompt_for("/usr/bin/zsh"), "devbridge [zsh]> ");
        assert_eq!(prompt_for("bash"), "devbridge [bash]> ");
    }
}
