//! Command-line surface of the `formlab` binary.

use crate::error::AppError;
use crate::session::SessionPrompt;
use async_trait::async_trait;
use formlab_core::{TaskId, DEFAULT_TOP_K};
use std::path::PathBuf;

pub const PASSWORD_ENV: &str = "FORMLAB_PASSWORD";

pub const USAGE: &str = "\
Usage: formlab [--config <path>] <command>

Commands:
  login <username>                 Log in (password from FORMLAB_PASSWORD)
  logout                           Forget the stored session
  chat <message> [--file <path>] [--top-k N] [--scope 1,2]
                                   Ask the agent, streaming the reply
  ingest <path>                    Upload a document and wait for ingestion
  task <id>                        Show one task's status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        username: String,
    },
    Logout,
    Chat {
        message: String,
        file: Option<PathBuf>,
        top_k: u32,
        scope: Vec<i64>,
    },
    Ingest {
        path: PathBuf,
    },
    Task {
        id: TaskId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

fn usage(reason: impl Into<String>) -> AppError {
    AppError::Usage(format!("{}\n\n{}", reason.into(), USAGE))
}

/// Parse arguments, program name excluded.
pub fn parse_args<I>(args: I) -> Result<Invocation, AppError>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut file = None;
    let mut top_k = None;
    let mut scope = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| usage(format!("{} requires a value", flag)))
        };
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(value("--config")?)),
            "--file" => file = Some(PathBuf::from(value("--file")?)),
            "--top-k" => {
                let raw = value("--top-k")?;
                let parsed = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|k| *k > 0)
                    .ok_or_else(|| usage(format!("invalid --top-k: {}", raw)))?;
                top_k = Some(parsed);
            }
            "--scope" => scope = parse_scope(&value("--scope")?)?,
            "-h" | "--help" => return Err(usage("")),
            flag if flag.starts_with("--") => return Err(usage(format!("unknown option {}", flag))),
            other => positional.push(other.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next().ok_or_else(|| usage("missing command"))?;
    let mut operand = |what: &str| {
        positional
            .next()
            .ok_or_else(|| usage(format!("{} requires {}", name, what)))
    };

    let command = match name.as_str() {
        "login" => Command::Login {
            username: operand("a username")?,
        },
        "logout" => Command::Logout,
        "chat" => Command::Chat {
            message: operand("a message")?,
            file,
            top_k: top_k.unwrap_or(DEFAULT_TOP_K),
            scope,
        },
        "ingest" => Command::Ingest {
            path: PathBuf::from(operand("a file path")?),
        },
        "task" => {
            let raw = operand("a task id")?;
            let id = raw
                .parse::<i64>()
                .map_err(|_| usage(format!("invalid task id: {}", raw)))?;
            Command::Task { id: TaskId(id) }
        }
        other => return Err(usage(format!("unknown command {}", other))),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

fn parse_scope(raw: &str) -> Result<Vec<i64>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| usage(format!("invalid project id in --scope: {}", part)))
        })
        .collect()
}

/// Terminal prompt: prints the notice and treats it as confirmed.
pub struct ConsolePrompt;

#[async_trait]
impl SessionPrompt for ConsolePrompt {
    async fn confirm_session_expired(&self) -> bool {
        eprintln!("Your session has expired. Please log in again.");
        true
    }

    fn redirect_to_login(&self) {
        eprintln!("Run `formlab login <username>` to start a new session.");
    }
}
