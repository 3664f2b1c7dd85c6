use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::providers::Provider;

#[derive(Parser, Debug)]
#[command(name = "devmind")]
#[command(version)]
#[command(about = "A terminal AI pair-programmer with a virtual file tree and live preview")]
pub struct Args {
    /// Send this prompt as a single turn and exit instead of opening the REPL
    pub prompt: Option<String>,

    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// LLM provider: openai or anthropic
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Model name (e.g. gpt-4o, claude-sonnet-4-20250514)
    #[arg(long)]
    pub model: Option<String>,

    /// Provider endpoint override
    #[arg(long)]
    pub base_url: Option<String>,

    /// SQLite database holding the project library
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Keep projects in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Only accept generated files with these extensions (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub allow_ext: Vec<String>,

    /// Sampling temperature for new sessions
    #[arg(long)]
    pub temperature: Option<f32>,
}

impl Args {
    /// Layer the command-line flags over `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(provider) = self.provider {
            if provider != config.provider && self.model.is_none() {
                // a model named in the file belongs to the file's provider
                config.model = None;
            }
            config.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(db) = &self.db {
            config.store.path = db.clone();
        }
        if self.ephemeral {
            config.store.ephemeral = true;
        }
        if !self.allow_ext.is_empty() {
            config.extract.allowed_extensions = Some(self.allow_ext.clone());
        }
        if let Some(t) = self.temperature {
            config.sampling.temperature = t;
        }
        config
    }
}

// ---------------------------------------------------------------------------
// REPL commands
// ---------------------------------------------------------------------------

pub const HELP: &str = "\
:files                 list files (* marks the editing target)
:show [path]           print a file, default the editing target
:preview [out.html]    compose the preview, optionally write it to a file
:refresh               re-render the preview
:select <path>         toggle the selection of a file
:touch <path>          create an empty file and select it
:mv <path> <new>       rename a file
:rm <path>             delete a file
:projects              list projects, most recent first
:new [name]            create a project and switch to it
:switch <name>         switch to a project
:rename <name>         rename the active project
:delete [name]         delete a project, default the active one
:clear                 wipe messages and files of the active project
:help                  show this help
:quit                  exit
anything else is sent to the assistant";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Files,
    Show(Option<String>),
    Preview(Option<PathBuf>),
    Refresh,
    Select(String),
    Touch(String),
    Move { from: String, to: String },
    Remove(String),
    Projects,
    New(String),
    Switch(String),
    Rename(String),
    Delete(Option<String>),
    Clear,
    Help,
    Quit,
    Empty,
    /// Malformed command; the message says why.
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Prompt(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let optional = |arg: &str| (!arg.is_empty()).then(|| arg.to_string());
    let required = |arg: &str, cmd: fn(String) -> Command| {
        if arg.is_empty() {
            Command::Invalid(format!(":{} needs an argument", name))
        } else {
            cmd(arg.to_string())
        }
    };
    match name {
        "files" | "ls" => Command::Files,
        "show" | "cat" => Command::Show(optional(arg)),
        "preview" => Command::Preview(optional(arg).map(PathBuf::from)),
        "refresh" => Command::Refresh,
        "select" => required(arg, Command::Select),
        "touch" => required(arg, Command::Touch),
        "mv" => match arg.split_once(char::is_whitespace) {
            Some((from, to)) if !to.trim().is_empty() => Command::Move {
                from: from.to_string(),
                to: to.trim().to_string(),
            },
            _ => Command::Invalid(":mv needs <path> <new-path>".to_string()),
        },
        "rm" => required(arg, Command::Remove),
        "projects" => Command::Projects,
        "new" => Command::New(arg.to_string()),
        "switch" => required(arg, Command::Switch),
        "rename" => required(arg, Command::Rename),
        "delete" => Command::Delete(optional(arg)),
        "clear" => Command::Clear,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command :{}", other)),
    }
}
