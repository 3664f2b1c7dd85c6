use std::io::{self, Write};

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use devmind::cli::{parse_command, Args, Command, HELP};
use devmind::{
    Compositor, Config, Conversation, Extractor, HttpCompletionClient, KeyValueStore,
    MemoryStore, PreviewDocument, ProjectLibrary, SqliteStore, Workspace,
};

type App = Workspace<HttpCompletionClient>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devmind=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = args.apply(Config::load(&args.config)?);

    let store: Box<dyn KeyValueStore> = if config.store.ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(SqliteStore::open(&config.store.path)?)
    };
    let library = ProjectLibrary::new(store, config.store.key.clone());

    let mut client = HttpCompletionClient::new(config.provider, config.model())?;
    if let Some(base_url) = &config.base_url {
        client = client.with_base_url(base_url.clone());
    }
    let conversation = Conversation::new(client).with_sampling(config.sampling.clone());

    let mut workspace = Workspace::open(
        library,
        conversation,
        Extractor::new(config.extension_policy()),
        Compositor::new(config.preview.clone()),
    );

    if let Some(prompt) = &args.prompt {
        run_turn(&mut workspace, prompt).await;
        return Ok(());
    }

    println!("{}", "DEVMIND".bright_cyan().bold());
    println!(
        "{} {} / {}",
        "Provider:".bright_yellow(),
        config.provider.to_string().bright_white(),
        config.model().bright_white()
    );
    println!("{}", "Type :help for commands.".dimmed());
    println!("{}", "=".repeat(50).bright_blue());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", format!("[{}]>", workspace.active_project().name).bright_green());
        let _ = io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if !dispatch(&mut workspace, parse_command(&line)).await {
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run one command. Returns `false` when the REPL should exit.
async fn dispatch(workspace: &mut App, command: Command) -> bool {
    let outcome = match command {
        Command::Empty => Ok(()),
        Command::Quit => return false,
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Invalid(msg) => {
            println!("{}", msg.yellow());
            Ok(())
        }
        Command::Prompt(text) => {
            run_turn(workspace, &text).await;
            Ok(())
        }
        Command::Files => {
            print_files(workspace);
            Ok(())
        }
        Command::Show(path) => show_file(workspace, path.as_deref()),
        Command::Preview(out) => write_preview(workspace, out.as_deref()),
        Command::Refresh => {
            let revision = workspace.refresh_preview();
            println!("{} {}", "preview revision".dimmed(), revision);
            Ok(())
        }
        Command::Select(path) => file_id(workspace, &path).map(|id| {
            workspace.toggle_select(&id);
        }),
        Command::Touch(path) => workspace.create_file(&path).map(|_| ()).map_err(|e| e.to_string()),
        Command::Move { from, to } => file_id(workspace, &from)
            .and_then(|id| workspace.rename_file(&id, &to).map_err(|e| e.to_string())),
        Command::Remove(path) => file_id(workspace, &path)
            .and_then(|id| workspace.delete_file(&id).map(|_| ()).map_err(|e| e.to_string())),
        Command::Projects => {
            print_projects(workspace);
            Ok(())
        }
        Command::New(name) => {
            workspace.create_project(&name);
            Ok(())
        }
        Command::Switch(name) => project_id(workspace, &name)
            .and_then(|id| workspace.switch_project(&id).map_err(|e| e.to_string())),
        Command::Rename(name) => {
            let id = workspace.active_project().id.clone();
            workspace.rename_project(&id, &name).map_err(|e| e.to_string())
        }
        Command::Delete(name) => {
            let id = match name {
                Some(name) => project_id(workspace, &name),
                None => Ok(workspace.active_project().id.clone()),
            };
            id.and_then(|id| workspace.delete_project(&id).map_err(|e| e.to_string()))
        }
        Command::Clear => {
            workspace.clear();
            println!("{}", "cleared".dimmed());
            Ok(())
        }
    };
    if let Err(msg) = outcome {
        println!("{} {}", "error:".bright_red().bold(), msg);
    }
    true
}

async fn run_turn(workspace: &mut App, prompt: &str) {
    println!();
    let result = workspace
        .send_turn(prompt, |fragment| {
            print!("{}", fragment);
            let _ = io::stdout().flush();
        })
        .await;
    println!();
    match result {
        Ok(report) => {
            if !report.files_touched.is_empty() {
                println!("{}", "-".repeat(50).bright_blue());
                for path in &report.files_touched {
                    println!("  {} {}", "wrote".bright_green(), path);
                }
            }
        }
        Err(e) => {
            println!("{}", devmind::ERROR_REPLY.bright_red());
            tracing::debug!(error = %e, "turn error shown to user");
        }
    }
}

fn file_id(workspace: &App, path: &str) -> Result<String, String> {
    workspace
        .files()
        .find_by_path(path)
        .map(|f| f.id.clone())
        .ok_or_else(|| format!("no file named '{}'", path))
}

fn project_id(workspace: &App, name: &str) -> Result<String, String> {
    workspace
        .find_project_by_name(name)
        .map(|p| p.id.clone())
        .ok_or_else(|| format!("no project named '{}'", name))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_files(workspace: &App) {
    if workspace.files().is_empty() {
        println!("{}", "(no files)".dimmed());
        return;
    }
    let editing = workspace.editing_file().map(|f| f.id.as_str());
    for file in workspace.files() {
        let marker = if Some(file.id.as_str()) == editing { "*" } else { " " };
        println!(
            "{} {:<32} {}",
            marker.bright_yellow(),
            file.path.bright_white(),
            file.language.dimmed()
        );
    }
}

fn show_file(workspace: &App, path: Option<&str>) -> Result<(), String> {
    let file = match path {
        Some(path) => workspace.files().find_by_path(path),
        None => workspace.editing_file(),
    };
    let file = file.ok_or_else(|| "nothing to show".to_string())?;
    println!("{} {}", "==>".bright_blue(), file.path.bright_white().bold());
    println!("{}", file.content);
    Ok(())
}

fn write_preview(workspace: &App, out: Option<&std::path::Path>) -> Result<(), String> {
    let document = workspace.preview();
    let kind = match &document {
        PreviewDocument::Html(_) => "html",
        PreviewDocument::Svg(_) => "svg",
        PreviewDocument::Markdown(_) => "markdown",
        PreviewDocument::Unavailable => return Err("nothing to preview".to_string()),
    };
    let body = document.as_str().unwrap_or_default();
    match out {
        Some(path) => {
            std::fs::write(path, body).map_err(|e| e.to_string())?;
            println!("{} {} ({})", "preview written to".bright_green(), path.display(), kind);
        }
        None => {
            println!("{} {}", "==> preview".bright_blue(), kind.dimmed());
            println!("{}", body);
        }
    }
    Ok(())
}

fn print_projects(workspace: &App) {
    let active = workspace.active_project().id.as_str();
    for project in workspace.projects() {
        let marker = if project.id == active { "*" } else { " " };
        println!(
            "{} {:<28} {} files, {} messages",
            marker.bright_yellow(),
            project.name.bright_white(),
            project.files.len(),
            project.messages.len()
        );
    }
}
