//! `repochat chat` and `repochat ask`.
//!
//! The interactive loop moves between two states: choosing a repository
//! (from the registry, or by adding a new one) and asking questions about
//! it. `/switch` goes back to choosing and drops the chat history;
//! `exit`, `quit`, an empty line, or end of input leaves the program.

use std::io::{BufRead, Write};

use anyhow::{bail, Result};

use crate::app::App;
use crate::prompt::{self, Prompter};
use crate::workflow::{prepare, Prepared};

const ADD_NEW: &str = "Add new repository...";
const SWITCH: &str = "/switch";

/// `repochat ask --repo <name> <question>`
pub async fn run_ask(app: &App, repo: &str, question: &str) -> Result<()> {
    if !app.registry.contains(repo) {
        bail!("Unknown repository '{}'. Run `repochat repos` to list them.", repo);
    }

    let mut session = app.session();
    if session.select_repository(repo).await? == 0 {
        eprintln!("Warning: repository '{}' has no indexed content", repo);
    }

    let answer = session.ask(question).await?;
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("sources:");
        for source in &answer.sources {
            println!("  {}", source);
        }
    }
    Ok(())
}

/// `repochat chat [--repo <name>]`
pub async fn run_chat(app: &mut App, repo: Option<String>) -> Result<()> {
    if repo.is_none() && !prompt::is_interactive() {
        bail!("Repository selection needs a terminal: pass --repo <name>");
    }
    if let Some(name) = &repo {
        if !app.registry.contains(name) {
            bail!("Unknown repository '{}'. Run `repochat repos` to list them.", name);
        }
    }

    let mut prompter = prompt::stdio();
    chat_loop(app, &mut prompter, repo).await
}

/// Drive the select/ask loop over any line-oriented input and output.
pub async fn chat_loop<R: BufRead, W: Write>(
    app: &mut App,
    prompter: &mut Prompter<R, W>,
    initial_repo: Option<String>,
) -> Result<()> {
    let mut session = app.session();
    let mut next_repo = initial_repo;

    'select: loop {
        let repo = match next_repo.take() {
            Some(repo) => repo,
            None => match select_or_add(app, prompter).await? {
                Some(repo) => repo,
                None => return Ok(()),
            },
        };

        session.deselect();
        if session.select_repository(&repo).await? == 0 {
            prompter.say(&format!("Repository '{}' has no indexed content.", repo))?;
        }
        prompter.say(&format!(
            "Chatting with {}. Type {} to change repository, exit to quit.",
            repo, SWITCH
        ))?;

        loop {
            let question = match prompter.ask("you> ")? {
                Some(q) => q,
                None => return Ok(()),
            };
            match question.as_str() {
                "" | "exit" | "quit" => return Ok(()),
                SWITCH => continue 'select,
                _ => {}
            }

            match session.ask(&question).await {
                Ok(answer) => {
                    prompter.say(&answer.answer)?;
                    if !answer.sources.is_empty() {
                        prompter.say(&format!("sources: {}", answer.sources.join(", ")))?;
                    }
                }
                Err(e) => prompter.say(&format!("error: {}. Ask again to retry.", e))?,
            }
        }
    }
}

/// Repository menu. Returns `None` when the user leaves the menu.
async fn select_or_add<R: BufRead, W: Write>(
    app: &mut App,
    prompter: &mut Prompter<R, W>,
) -> Result<Option<String>> {
    loop {
        let mut options = app.registry.names().to_vec();
        let known = options.len();
        options.push(ADD_NEW.to_string());

        let choice = match prompter.choose("Select a repository:", &options)? {
            Some(i) => i,
            None => return Ok(None),
        };
        if choice < known {
            return Ok(Some(options[choice].clone()));
        }

        let url = match prompter.ask("Repository URL: ")? {
            Some(url) if !url.is_empty() => url,
            Some(_) => continue,
            None => return Ok(None),
        };

        match add_interactive(app, prompter, &url).await {
            Ok(Some(repo)) => return Ok(Some(repo)),
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "adding repository failed");
                prompter.say(&format!("error: {:#}", e))?;
            }
        }
    }
}

/// Fetch, estimate, and confirm a new repository. `None` when cancelled.
async fn add_interactive<R: BufRead, W: Write>(
    app: &mut App,
    prompter: &mut Prompter<R, W>,
    url: &str,
) -> Result<Option<String>> {
    prompter.say("Fetching repository...")?;
    let pending = match prepare(app, url).await? {
        Prepared::AlreadyRegistered(name) => {
            prompter.say(&format!("'{}' is already registered.", name))?;
            return Ok(Some(name));
        }
        Prepared::AwaitingConfirmation(pending) => pending,
    };

    prompter.say(&format!(
        "{}: {} tokens, estimated cost {:.2} USD",
        pending.repo.name, pending.estimate.total_tokens, pending.estimate.cost_usd
    ))?;

    if !prompter.confirm("Ingest this repository?")? {
        pending.cancel();
        prompter.say("Cancelled.")?;
        return Ok(None);
    }

    let name = pending.repo.name.clone();
    let report = pending.confirm(app).await?;
    prompter.say(&format!(
        "Ingested {}: {} chunks from {} files.",
        name,
        report.chunks_committed,
        report.files_loaded.len()
    ))?;
    for skipped in &report.skipped {
        prompter.say(&format!("  skipped {}", skipped))?;
    }
    Ok(Some(name))
}
