//! drivefs command line.
//!
//! This crate handles:
//! - Parsing `drivefs <command> [args]` into a [`Command`]
//! - Running commands against a [`FilesystemManager`]
//! - An interactive shell and the fork-label prompt, via rustyline

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::runtime::Runtime;

use drivefs_kernel::{
    ConfigOutcome, ConfigureOptions, DefaultBookmarks, FilesystemConfig,
    FilesystemManager, ForkOfRequest, ForkOfUpdate, LabelPrompt, LocalDriveStore, ProfileInit,
    StateStore,
};
use drivefs_types::{drive_url, DriveConfig};

/// What `add` should do with fork lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkArg {
    Keep,
    Set(String),
    Clear,
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List { system: bool },
    Add { url: String, fork: ForkArg, label: Option<String> },
    Remove { url: String },
    Mkdir { path: String },
    Mount { path: String, url: String },
    Unmount { path: String },
    Name { dir: String, basename: String, ext: Option<String> },
    Profile { init: Option<String> },
    Root,
}

pub const USAGE: &str = r#"Commands:
  ls [--system]                                   List registered drives
  add <url> [--fork-of <url>] [--label <label>] [--clear-fork]
                                                  Register a drive
  rm <url>                                        Unregister a drive
  mkdir <path>                                    Ensure a directory in the root drive
  mount <path> <url>                              Ensure a mount in the root drive
  unmount <path>                                  Ensure nothing is mounted at path
  name <dir> <basename> [ext]                     First free name in dir
  profile [--init <title>]                        Show or create the profile
  root                                            Show the root drive URL
"#;

/// Parse command words (without the program name).
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((cmd, rest)) = args.split_first() else {
        bail!("missing command");
    };
    let arg = |i: usize, what: &str| -> Result<String> {
        rest.get(i)
            .cloned()
            .with_context(|| format!("{cmd}: missing {what}"))
    };

    let command = match cmd.as_str() {
        "ls" => match rest {
            [] => Command::List { system: false },
            [flag] if flag == "--system" => Command::List { system: true },
            _ => bail!("ls: unexpected arguments: {}", rest.join(" ")),
        },
        "add" => parse_add(rest)?,
        "rm" => Command::Remove { url: arg(0, "url")? },
        "mkdir" => Command::Mkdir { path: arg(0, "path")? },
        "mount" => Command::Mount {
            path: arg(0, "path")?,
            url: arg(1, "url")?,
        },
        "unmount" => Command::Unmount { path: arg(0, "path")? },
        "name" => Command::Name {
            dir: arg(0, "directory")?,
            basename: arg(1, "basename")?,
            ext: rest.get(2).cloned(),
        },
        "profile" => match rest {
            [] => Command::Profile { init: None },
            [flag, title] if flag == "--init" => Command::Profile {
                init: Some(title.clone()),
            },
            _ => bail!("profile: expected [--init <title>]"),
        },
        "root" => Command::Root,
        other => bail!("unknown command: {other}"),
    };
    Ok(command)
}

fn parse_add(rest: &[String]) -> Result<Command> {
    let mut url = None;
    let mut fork = ForkArg::Keep;
    let mut label = None;

    let mut iter = rest.iter();
    while let Some(word) = iter.next() {
        match word.as_str() {
            "--fork-of" => {
                let parent = iter.next().context("--fork-of requires a url")?;
                fork = ForkArg::Set(parent.clone());
            }
            "--label" => {
                label = Some(iter.next().context("--label requires a value")?.clone());
            }
            "--clear-fork" => fork = ForkArg::Clear,
            flag if flag.starts_with("--") => bail!("add: unknown option {flag}"),
            value if url.is_none() => url = Some(value.to_string()),
            value => bail!("add: unexpected argument {value}"),
        }
    }

    Ok(Command::Add {
        url: url.context("add: missing url")?,
        fork,
        label,
    })
}

/// Run one command. Returns the text to print.
pub async fn execute(
    fs: &FilesystemManager,
    command: &Command,
    prompt: Option<&dyn LabelPrompt>,
) -> Result<String> {
    let out = match command {
        Command::List { system } => fs
            .list_drives(*system)
            .iter()
            .map(format_drive)
            .collect::<Vec<_>>()
            .join("\n"),

        Command::Add { url, fork, label } => {
            let update = match fork {
                ForkArg::Keep => ForkOfUpdate::Keep,
                ForkArg::Clear => ForkOfUpdate::Clear,
                ForkArg::Set(parent) => ForkOfUpdate::Set(ForkOfRequest {
                    parent: parent.clone(),
                    label: label.clone().unwrap_or_default(),
                }),
            };
            let mut opts = ConfigureOptions::fork_of(&update);
            if let Some(label) = label {
                opts = opts.with_label(label);
            }
            if let Some(prompt) = prompt {
                opts = opts.with_prompt(prompt);
            }
            match fs.config_drive(url, opts).await? {
                ConfigOutcome::Configured { config, .. } => format!("added {}", format_drive(&config)),
                ConfigOutcome::LabelRequired { parent_key, .. } => format!(
                    "fork of {} needs a label; run again with --label",
                    drive_url(&parent_key)
                ),
                ConfigOutcome::Cancelled { key } => format!("cancelled, {} not added", drive_url(&key)),
                ConfigOutcome::System { key } => {
                    format!("{} is the root drive, not added", drive_url(&key))
                }
            }
        }

        Command::Remove { url } => {
            if fs.remove_drive(url).await? {
                format!("removed {url}")
            } else {
                format!("{url} is not registered")
            }
        }

        Command::Mkdir { path } => format!("{path}: {:?}", fs.ensure_dir(path).await?),
        Command::Mount { path, url } => format!("{path}: {:?}", fs.ensure_mount(path, url).await?),
        Command::Unmount { path } => format!("{path}: {:?}", fs.ensure_unmount(path).await?),

        Command::Name { dir, basename, ext } => {
            fs.get_available_name(dir, basename, ext.as_deref(), '-')
                .await?
        }

        Command::Profile { init: Some(title) } => {
            let entry = fs
                .setup_default_profile(ProfileInit {
                    title: title.clone(),
                    ..Default::default()
                })
                .await?;
            format!("{} {}", drive_url(&entry.key), entry.title)
        }
        Command::Profile { init: None } => match fs.get_profile().await? {
            Some(entry) => format!("{} {}", drive_url(&entry.key), entry.title),
            None => "no profile".to_string(),
        },

        Command::Root => fs.get()?.url(),
    };
    Ok(out)
}

fn format_drive(config: &DriveConfig) -> String {
    match &config.fork_of {
        Some(fork) => format!(
            "{} (fork of {} \"{}\")",
            drive_url(&config.key),
            drive_url(&fork.key),
            fork.label
        ),
        None => drive_url(&config.key),
    }
}

/// Fork-label prompt on the terminal. Ctrl-C, Ctrl-D or an empty line
/// declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

#[async_trait]
impl LabelPrompt for TerminalPrompt {
    async fn ask(&self, message: &str) -> Option<String> {
        let message = format!("{message}: ");
        let answer = tokio::task::spawn_blocking(move || {
            let mut rl = match Editor::<(), DefaultHistory>::new() {
                Ok(rl) => rl,
                Err(e) => {
                    tracing::warn!("Failed to create editor: {}", e);
                    return None;
                }
            };
            match rl.readline(&message) {
                Ok(line) => Some(line),
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => None,
                Err(e) => {
                    tracing::warn!("Failed to read label: {}", e);
                    None
                }
            }
        })
        .await;
        answer.ok().flatten()
    }
}

/// Build a manager over the local drive store and state database.
pub fn open_manager(config: FilesystemConfig) -> Result<FilesystemManager> {
    let data = config.data_dir();
    let store = Arc::new(LocalDriveStore::new(data.join("drives")));
    let state = Arc::new(
        StateStore::open(data.join("state.db")).context("Failed to open state database")?,
    );
    Ok(FilesystemManager::new(store, state.clone(), state, config).with_seeder(DefaultBookmarks))
}

/// Run a single command and print its output.
pub fn run_once(args: &[String]) -> Result<()> {
    let command = parse_args(args)?;
    let fs = open_manager(FilesystemConfig::load()?)?;
    let runtime = Runtime::new().context("Failed to create tokio runtime")?;

    let output = runtime.block_on(async {
        fs.setup().await?;
        execute(&fs, &command, Some(&TerminalPrompt)).await
    })?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Run the interactive shell.
pub fn run() -> Result<()> {
    println!("drivefs v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for commands, 'quit' to exit.");

    let fs = open_manager(FilesystemConfig::load()?)?;
    let runtime = Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(fs.setup())?;

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;
    let history_path = Some(fs.config().data_dir().join("history.txt"));
    if let Some(ref path) = history_path
        && let Err(e) = rl.load_history(path)
    {
        let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
        if !is_not_found {
            tracing::warn!("Failed to load history: {}", e);
        }
    }

    loop {
        match rl.readline("drivefs> ") {
            Ok(line) => {
                let words: Vec<String> = line.split_whitespace().map(str::to_string).collect();
                if words.is_empty() {
                    continue;
                }
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    tracing::warn!("Failed to add history entry: {}", e);
                }
                match words[0].as_str() {
                    "quit" | "exit" => break,
                    "help" => {
                        print!("{USAGE}");
                        continue;
                    }
                    _ => {}
                }

                let result = parse_args(&words).and_then(|command| {
                    runtime.block_on(execute(&fs, &command, Some(&TerminalPrompt)))
                });
                match result {
                    Ok(output) if output.is_empty() => {}
                    Ok(output) => println!("{output}"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    Ok(())
}

fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("Failed to create history directory: {}", e);
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}
