// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL for stepping a loaded project frame by frame.

use owo_colors::OwoColorize;
use pounce_engine::{Engine, GroupId, HeadlessHost};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};
use std::borrow::Cow;
use std::path::PathBuf;

/// REPL configuration constants
const HISTORY_FILE: &str = ".pounce_history";
const MAX_HISTORY_SIZE: usize = 1000;

/// REPL commands, all with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Flag,
    Step,
    Broadcast,
    Key,
    Click,
    Answer,
    Vars,
    Threads,
    Dump,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim().strip_prefix('.')?;

        let mut parts = input.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let cmd = match cmd.as_str() {
            "help" | "h" | "?" => ReplCommand::Help,
            "exit" | "quit" | "q" => ReplCommand::Exit,
            "flag" | "go" => ReplCommand::Flag,
            "step" | "s" => ReplCommand::Step,
            "broadcast" | "b" => ReplCommand::Broadcast,
            "key" | "k" => ReplCommand::Key,
            "click" => ReplCommand::Click,
            "answer" | "a" => ReplCommand::Answer,
            "vars" | "v" => ReplCommand::Vars,
            "threads" | "t" => ReplCommand::Threads,
            "dump" => ReplCommand::Dump,
            _ => return None,
        };
        Some((cmd, arg))
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".flag", "Stop everything and click the green flag"),
            (".step [n]", "Run n frames (default 1)"),
            (".broadcast <msg>", "Broadcast a message"),
            (".key <name>", "Press a key"),
            (".click <sprite>", "Click a sprite"),
            (".answer <text>", "Queue an answer for ask and wait"),
            (".vars", "Show variables, lists and speech"),
            (".threads", "Show queued threads"),
            (".dump", "Show compiled continuations"),
        ]
    }
}

/// Completion and hints for dot commands
#[derive(Default)]
struct PounceHelper {
    commands: Vec<String>,
}

impl PounceHelper {
    fn new() -> Self {
        let commands = ReplCommand::all_commands()
            .iter()
            .filter_map(|(usage, _)| usage.split_whitespace().next())
            .map(String::from)
            .collect();
        Self { commands }
    }
}

impl Completer for PounceHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let word = &line[..pos];
        if !word.starts_with('.') || word.contains(char::is_whitespace) {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(word))
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for PounceHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() || line.len() < 2 || !line.starts_with('.') {
            return None;
        }

        self.commands
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| (&cmd[line.len()..]).dimmed().to_string())
    }
}

impl Highlighter for PounceHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        if !cmd.starts_with('.') {
            return Cow::Borrowed(line);
        }
        let sep = if line.len() > cmd.len() { " " } else { "" };
        Cow::Owned(format!("{}{}{}", cmd.magenta(), sep, rest.yellow()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Validator for PounceHelper {}

impl Helper for PounceHelper {}

/// The interactive REPL around a loaded engine
pub struct Repl {
    engine: Engine,
    host: HeadlessHost,
    editor: Editor<PounceHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(engine: Engine, host: HeadlessHost) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(PounceHelper::new()));

        let history_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HISTORY_FILE);

        // A missing history file is normal on first run.
        let _ = editor.load_history(&history_path);

        Ok(Self { engine, host, editor, history_path })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", self.prompt_label().bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }

                    match ReplCommand::parse(trimmed) {
                        Some((cmd, arg)) => match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        },
                        None => {
                            eprintln!(
                                "{}: unknown command '{}', try {}",
                                "Error".red().bold(),
                                trimmed.cyan(),
                                ".help".cyan()
                            );
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        if let Err(err) = self.editor.save_history(&self.history_path) {
            tracing::warn!(%err, path = %self.history_path.display(), "could not save history");
        }

        println!();
        Ok(())
    }

    fn print_banner(&self) {
        let version = env!("CARGO_PKG_VERSION");
        println!();
        println!("  {} {} {}", "Pounce".bright_cyan().bold(), "v".dimmed(), version.bright_yellow());
        let targets = self.engine.runtime().targets().count();
        println!("  {} {}", targets.yellow(), "targets loaded".dimmed());
        println!();
        println!("  {} {} {}", "Type".dimmed(), ".help".cyan(), "for available commands".dimmed());
        println!();
    }

    /// `pounce[frame]>` with a star while threads are queued.
    fn prompt_label(&self) -> String {
        let runtime = self.engine.runtime();
        let busy = if runtime.is_idle() { "" } else { "*" };
        format!("pounce[{}{}]>", runtime.frame(), busy)
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Flag => {
                let group = self.engine.green_flag();
                self.report_started(group);
            }
            ReplCommand::Step => match arg.map(str::parse::<u64>).unwrap_or(Ok(1)) {
                Ok(frames) => self.step(frames),
                Err(_) => print_usage(".step [n]"),
            },
            ReplCommand::Broadcast => match arg {
                Some(message) => {
                    let group = self.engine.broadcast(message);
                    self.report_started(group);
                }
                None => print_usage(".broadcast <msg>"),
            },
            ReplCommand::Key => match arg {
                Some(key) => {
                    let group = self.engine.press_key(key);
                    self.report_started(group);
                }
                None => print_usage(".key <name>"),
            },
            ReplCommand::Click => match arg.map(|name| self.engine.click(name)) {
                Some(Some(group)) => self.report_started(group),
                Some(None) => eprintln!("{}: no sprite named '{}'", "Error".red().bold(), arg.unwrap_or_default()),
                None => print_usage(".click <sprite>"),
            },
            ReplCommand::Answer => match arg {
                Some(answer) => self.host.push_answer(answer),
                None => print_usage(".answer <text>"),
            },
            ReplCommand::Vars => crate::print_state(&self.engine, &self.host),
            ReplCommand::Threads => self.print_threads(),
            ReplCommand::Dump => print!("{}", self.engine.dump()),
        }
        CommandResult::Continue
    }

    fn step(&mut self, frames: u64) {
        if let Err(e) = self.engine.run_frames(frames) {
            eprintln!("{}: {}", "Error".red().bold(), e);
        }
        let runtime = self.engine.runtime();
        println!(
            "{} {} {} {}",
            "frame".dimmed(),
            runtime.frame().yellow(),
            "threads".dimmed(),
            runtime.thread_count().yellow()
        );
    }

    fn report_started(&self, group: GroupId) {
        let started = self.engine.runtime().threads().filter(|t| t.group == group).count();
        println!("{} {}", started.yellow(), "threads started".dimmed());
    }

    fn print_threads(&self) {
        let runtime = self.engine.runtime();
        if runtime.is_idle() {
            println!("{}", "idle".dimmed());
            return;
        }
        for thread in runtime.threads() {
            let name = runtime.target(thread.target).map_or("?", |t| t.name.as_str());
            let ready = if thread.ready { "" } else { " (next pass)" };
            println!(
                "  {:12} {} -> {} depth {}{}",
                name.bright_cyan(),
                thread.base,
                thread.continuation.yellow(),
                thread.frames.len(),
                ready.dimmed()
            );
        }
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();

        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:18} {}", cmd.cyan(), desc.dimmed());
        }

        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:18} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:18} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:18} {}", "Tab".yellow(), "Autocomplete".dimmed());
        println!();
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

fn print_usage(usage: &str) {
    eprintln!("{}: {}", "Usage".red().bold(), usage.cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(ReplCommand::parse(".help"), Some((ReplCommand::Help, None))));
        assert!(matches!(ReplCommand::parse(".exit"), Some((ReplCommand::Exit, None))));
        assert!(matches!(ReplCommand::parse(".step 10"), Some((ReplCommand::Step, Some("10")))));
        assert!(matches!(
            ReplCommand::parse(".broadcast  game over "),
            Some((ReplCommand::Broadcast, Some("game over")))
        ));
        assert!(matches!(ReplCommand::parse(".STEP"), Some((ReplCommand::Step, None))));
        assert!(ReplCommand::parse("flag").is_none());
        assert!(ReplCommand::parse(".launch").is_none());
    }

    #[test]
    fn test_helper_lists_every_command() {
        let helper = PounceHelper::new();
        assert_eq!(helper.commands.len(), ReplCommand::all_commands().len());
        assert!(helper.commands.iter().all(|c| c.starts_with('.') && !c.contains(' ')));
    }
}
