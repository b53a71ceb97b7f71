//! Interactive command parsing for the `ic10lab` CLI.

use std::path::PathBuf;

/// One REPL command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the editable text with a file's contents
    Edit(PathBuf),
    /// Clear the log and initialize from the editable text
    Load,
    /// Initialize from the editable text without clearing the log
    Init,
    Step(u64),
    /// Step until not ready (`None` = configured limit)
    Run(Option<u64>),
    Promote,
    Clear,
    Log,
    Current,
    Initial,
    Units,
    Validate,
    State,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  edit <file>   replace the editable text with a file's contents
  load          clear the log and initialize from the editable text
  init          initialize from the editable text
  step [n]      advance n ticks (default 1)
  run [n]       step until finished or faulted (at most n ticks)
  promote       adopt the live state as the editable text and reload
  clear         clear the terminal log
  log           print the terminal log
  current       print the live state
  initial       print the editable text
  units         list execution units
  validate      validate the editable text
  state         print the lifecycle state
  help          show this help
  quit          exit";

impl Command {
    /// Parses one input line; `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{}'", word));
        }

        let command = match (word, arg) {
            ("edit", Some(path)) => Command::Edit(PathBuf::from(path)),
            ("edit", None) => return Err("usage: edit <file>".to_string()),
            ("load", None) => Command::Load,
            ("init", None) => Command::Init,
            ("step", arg) => Command::Step(count(arg)?.unwrap_or(1)),
            ("run", arg) => Command::Run(count(arg)?),
            ("promote", None) => Command::Promote,
            ("clear", None) => Command::Clear,
            ("log", None) => Command::Log,
            ("current", None) => Command::Current,
            ("initial", None) => Command::Initial,
            ("units", None) => Command::Units,
            ("validate", None) => Command::Validate,
            ("state", None) => Command::State,
            ("help" | "?", None) => Command::Help,
            ("quit" | "exit", None) => Command::Quit,
            (word, Some(_)) if is_known(word) => {
                return Err(format!("'{}' takes no argument", word))
            }
            (word, _) => return Err(format!("unknown command '{}' (try 'help')", word)),
        };
        Ok(Some(command))
    }

    /// True for commands that clear the terminal log.
    pub fn clears_log(&self) -> bool {
        matches!(self, Command::Load | Command::Promote | Command::Clear)
    }
}

fn is_known(word: &str) -> bool {
    matches!(
        word,
        "load" | "init" | "promote" | "clear" | "log" | "current" | "initial" | "units"
            | "validate" | "state" | "help" | "?" | "quit" | "exit"
    )
}

fn count(arg: Option<&str>) -> Result<Option<u64>, String> {
    arg.map(|text| {
        text.parse::<u64>()
            .map_err(|_| format!("expected a tick count, found '{}'", text))
    })
    .transpose()
}
