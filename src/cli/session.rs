//! Interactive session holding one passphrase cache
//!
//! The cache lives as long as the session. Leaving the session wipes every
//! cached passphrase.

use std::io::IsTerminal;
use std::sync::Arc;

use colored::Colorize;
use dialoguer::{Password, theme::ColorfulTheme};
use tabled::Tabled;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::cache::{
    CacheHandle, CachedEntryInfo, KEY_ID_SYMMETRIC, Passphrase, PresenceSignal,
};
use crate::cli::status::describe_ttl;
use crate::cli::{CommandContext, GlobalOptions, ops};
use crate::error::{Error, Result};
use crate::keyring::{format_key_id, parse_key_id};
use crate::operations::{BenchmarkParams, CryptoInput, Dispatcher, OperationRequest, ParseInputParams};
use crate::output;

const HELP: &str = "\
Commands:
  unlock <key> [subkey]   cache the passphrase of a key ('sym' for symmetric)
  get <key> [subkey]      check whether a passphrase is cached
  forget <key> [subkey]   remove a cached passphrase
  clear                   remove every cached passphrase
  status                  list cached entries
  bench [iterations]      run the hashing benchmark
  parse <file>            split a file into OpenPGP blocks
  help                    show this help
  quit                    wipe the cache and leave";

/// Prints presence transitions to the terminal
struct TerminalPresence;

impl PresenceSignal for TerminalPresence {
    fn activate(&self, count: usize, labels: &[String]) {
        println!(
            "{} {} passphrase(s) cached: {}",
            "●".green(),
            count,
            labels.join(", ").bold()
        );
    }

    fn deactivate(&self) {
        println!("{} No passphrases cached", "○".dimmed());
    }
}

/// Master and subkey ids a command refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRef {
    pub master_key_id: i64,
    pub sub_key_id: i64,
}

/// One parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Unlock(KeyRef),
    Get(KeyRef),
    Forget(KeyRef),
    Clear,
    Status,
    Bench(Option<u32>),
    Parse(String),
    Help,
    Quit,
    Empty,
}

fn key_arg(value: &str) -> std::result::Result<i64, String> {
    if value.eq_ignore_ascii_case("sym") || value.eq_ignore_ascii_case("symmetric") {
        return Ok(KEY_ID_SYMMETRIC);
    }
    parse_key_id(value).ok_or_else(|| format!("not a key id: '{}'", value))
}

fn key_ref(args: &[&str]) -> std::result::Result<KeyRef, String> {
    let master_key_id = key_arg(args.first().ok_or("missing key id")?)?;
    let sub_key_id = match args.get(1) {
        Some(sub) => key_arg(sub)?,
        None => master_key_id,
    };
    if args.len() > 2 {
        return Err("too many arguments".to_string());
    }
    Ok(KeyRef {
        master_key_id,
        sub_key_id,
    })
}

/// Parse one line of input
pub fn parse_line(line: &str) -> std::result::Result<SessionCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((command, args)) = words.split_first() else {
        return Ok(SessionCommand::Empty);
    };

    match command.to_ascii_lowercase().as_str() {
        "unlock" => key_ref(args).map(SessionCommand::Unlock),
        "get" => key_ref(args).map(SessionCommand::Get),
        "forget" => key_ref(args).map(SessionCommand::Forget),
        "clear" => Ok(SessionCommand::Clear),
        "status" | "ls" => Ok(SessionCommand::Status),
        "bench" => match args.first() {
            Some(n) => n
                .parse()
                .map(|n| SessionCommand::Bench(Some(n)))
                .map_err(|_| format!("not a number: '{}'", n)),
            None => Ok(SessionCommand::Bench(None)),
        },
        "parse" => match args {
            [file] => Ok(SessionCommand::Parse(file.to_string())),
            _ => Err("usage: parse <file>".to_string()),
        },
        "help" | "?" => Ok(SessionCommand::Help),
        "quit" | "exit" => Ok(SessionCommand::Quit),
        other => Err(format!("unknown command '{}', try 'help'", other)),
    }
}

#[derive(Debug, Tabled)]
struct EntryRow {
    #[tabled(rename = "KEY ID")]
    key_id: String,
    #[tabled(rename = "LABEL")]
    label: String,
    #[tabled(rename = "TTL")]
    ttl: String,
    #[tabled(rename = "EXPIRES IN")]
    expires_in: String,
}

impl From<&CachedEntryInfo> for EntryRow {
    fn from(info: &CachedEntryInfo) -> Self {
        Self {
            key_id: format_key_id(info.key_id),
            label: info.label.clone(),
            ttl: describe_ttl(info.ttl_seconds),
            expires_in: info
                .expires_in_seconds
                .map(|s| format!("{} s", s))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

struct Session {
    ctx: CommandContext,
    cache: CacheHandle,
    dispatcher: Dispatcher,
    lines: Lines<BufReader<Stdin>>,
}

impl Session {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }

    /// Hidden prompt on a terminal, next input line otherwise
    async fn prompt_secret(&mut self, prompt: String) -> Result<Option<Passphrase>> {
        if !std::io::stdin().is_terminal() {
            return Ok(self.next_line().await?.map(Passphrase::from));
        }
        let secret = tokio::task::spawn_blocking(move || {
            Password::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
        })
        .await
        .map_err(|e| Error::Other(format!("Prompt task failed: {}", e)))??;
        Ok(Some(Passphrase::from(secret)))
    }

    async fn unlock(&mut self, key: KeyRef) -> Result<()> {
        let kind = self.cache.secret_kind(key.master_key_id, key.sub_key_id)?;
        if !kind.needs_lookup() {
            println!("{} {} needs no passphrase", "○".dimmed(), format_key_id(key.sub_key_id));
            return Ok(());
        }

        let prompt = if key.master_key_id == KEY_ID_SYMMETRIC {
            "Symmetric passphrase".to_string()
        } else {
            format!("Passphrase for {}", format_key_id(key.sub_key_id))
        };
        let Some(passphrase) = self.prompt_secret(prompt).await? else {
            return Ok(());
        };
        self.cache
            .add_cached_passphrase(key.master_key_id, key.sub_key_id, passphrase, None)
            .await?;
        Ok(())
    }

    async fn get(&self, key: KeyRef) -> Result<()> {
        match self
            .cache
            .get_cached_passphrase(key.master_key_id, key.sub_key_id)
            .await?
        {
            Some(passphrase) => println!(
                "{} Cached ({} characters)",
                "✓".green(),
                passphrase.len()
            ),
            None => println!("{} Not cached", "✗".red()),
        }
        Ok(())
    }

    async fn forget(&self, key: KeyRef) -> Result<()> {
        if !self
            .cache
            .clear_cached_passphrase(key.master_key_id, key.sub_key_id)
            .await?
        {
            println!("{} Nothing cached for {}", "○".dimmed(), format_key_id(key.sub_key_id));
        }
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let snapshot = self.cache.snapshot().await?;
        let rows: Vec<EntryRow> = snapshot.entries.iter().map(EntryRow::from).collect();
        output::print_rows(&rows, &snapshot, self.ctx.format)
    }

    async fn run_operation(&self, request: OperationRequest) -> Result<()> {
        let result = ops::run_with_progress(&self.dispatcher, request, CryptoInput::new()).await;
        ops::print_result(&result, self.ctx.format)
    }

    /// Returns false when the session should end
    async fn execute(&mut self, command: SessionCommand) -> Result<bool> {
        match command {
            SessionCommand::Unlock(key) => self.unlock(key).await?,
            SessionCommand::Get(key) => self.get(key).await?,
            SessionCommand::Forget(key) => self.forget(key).await?,
            SessionCommand::Clear => {
                let removed = self.cache.clear_all().await?;
                println!("Removed {} cached passphrase(s)", removed);
            }
            SessionCommand::Status => self.status().await?,
            SessionCommand::Bench(iterations) => {
                let mut params = BenchmarkParams::default();
                if let Some(n) = iterations {
                    params.iterations = n;
                }
                self.run_operation(OperationRequest::Benchmark(params)).await?;
            }
            SessionCommand::Parse(file) => {
                let text = ops::read_input(&file)?;
                self.run_operation(OperationRequest::ParseInput(ParseInputParams { text }))
                    .await?;
            }
            SessionCommand::Help => println!("{}", HELP),
            SessionCommand::Quit => return Ok(false),
            SessionCommand::Empty => {}
        }
        Ok(true)
    }
}

/// Run the interactive session until `quit` or end of input
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let cache = ctx.spawn_cache(Arc::new(TerminalPresence))?;
    let dispatcher = ctx.dispatcher(cache.clone())?;
    let interactive = std::io::stdin().is_terminal();

    let mut session = Session {
        ctx,
        cache,
        dispatcher,
        lines: BufReader::new(tokio::io::stdin()).lines(),
    };

    if interactive {
        println!("{}", "passcache session. Type 'help' for commands.".bold());
    }
    loop {
        if interactive {
            print!("{} ", "passcache>".cyan());
            std::io::Write::flush(&mut std::io::stdout())?;
        }
        let Some(line) = session.next_line().await? else {
            break;
        };

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{} {}", "Error:".red(), message);
                continue;
            }
        };
        match session.execute(command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => eprintln!("{} {}", "Error:".red(), err),
        }
    }

    session.cache.shutdown().await?;
    Ok(())
}
