use std::io::{self, Stdout, Write};
use std::path::Path;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use iq_workbench::client::{RelayClient, DEFAULT_RELAY_URL};
use iq_workbench::error::{Result, WorkbenchError};
use iq_workbench::render::html::conversation_html;
use iq_workbench::render::terminal::{message_lines, terminal_width, typing_lines, TerminalSurface};
use iq_workbench::session::{run_turn, SessionController, TurnOutcome};

const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "iq-workbench")]
#[command(about = "Terminal chat client for the IQ Workbench relay")]
struct Cli {
    #[arg(long, env = "WORKBENCH_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    relay: String,
}

enum Command<'a> {
    Quit,
    NewChat,
    Export(&'a str),
    Help,
    Send(String),
}

fn parse_command<'a>(line: &'a str, session: &SessionController) -> Command<'a> {
    let trimmed = line.trim();
    match trimmed {
        "/quit" | "/exit" => return Command::Quit,
        "/new" => return Command::NewChat,
        "/help" => return Command::Help,
        _ => {}
    }
    if let Some(path) = trimmed.strip_prefix("/export ") {
        return Command::Export(path.trim());
    }
    if let Ok(choice) = trimmed.parse::<usize>() {
        if let Some(text) = choice
            .checked_sub(1)
            .and_then(|index| session.suggestions().get(index))
        {
            return Command::Send(text.to_string());
        }
    }
    Command::Send(line.to_string())
}

fn print_intro(surface: &mut TerminalSurface<Stdout>, session: &SessionController) -> io::Result<()> {
    surface.print_line(&format!(
        "IQ Workbench {} {DIM}(/new, /export <file.html>, /help, /quit; Ctrl-C stops a reply){RESET}",
        iq_workbench::BUILD_VERSION
    ))?;
    let suggestions = session.suggestions();
    if !suggestions.is_empty() {
        surface.print_line("Try one of these:")?;
        for (index, suggestion) in suggestions.iter().enumerate() {
            surface.print_line(&format!("  {}. {suggestion}", index + 1))?;
        }
    }
    Ok(())
}

fn export_html(session: &SessionController, path: &Path) -> Result<()> {
    let html = conversation_html(&session.view());
    std::fs::write(path, html)
        .map_err(|e| WorkbenchError::Runtime(format!("could not write {}: {e}", path.display())))
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    iq_workbench::logging::init_client_tracing();
    let cli = Cli::parse();
    let transport = RelayClient::new(&cli.relay);
    let mut session = SessionController::new();
    let mut surface = TerminalSurface::new(io::stdout(), terminal_width());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_intro(&mut surface, &session).map_err(|e| WorkbenchError::Runtime(e.to_string()))?;

    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line.map_err(|e| WorkbenchError::Runtime(e.to_string()))?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let text = match parse_command(&line, &session) {
            Command::Quit => break,
            Command::Help => {
                print_intro(&mut surface, &session)
                    .map_err(|e| WorkbenchError::Runtime(e.to_string()))?;
                continue;
            }
            Command::NewChat => {
                let note = if session.reset() {
                    "Started a new chat."
                } else {
                    "Nothing to reset."
                };
                surface
                    .print_line(&format!("{DIM}{note}{RESET}"))
                    .map_err(|e| WorkbenchError::Runtime(e.to_string()))?;
                print_intro(&mut surface, &session)
                    .map_err(|e| WorkbenchError::Runtime(e.to_string()))?;
                continue;
            }
            Command::Export(path) => {
                let note = match export_html(&session, Path::new(path)) {
                    Ok(()) => format!("{DIM}Saved transcript to {path}{RESET}"),
                    Err(err) => format!("{RED}{err}{RESET}"),
                };
                surface
                    .print_line(&note)
                    .map_err(|e| WorkbenchError::Runtime(e.to_string()))?;
                continue;
            }
            Command::Send(text) => text,
        };

        // The user's line is already on screen; only the reply is redrawn.
        let turn_start = session.messages().len() + 1;
        let cancel = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let outcome = run_turn(&mut session, &transport, &text, cancel, |session| {
            let view = session.view();
            let mut live: Vec<String> = view
                .messages
                .iter()
                .skip(turn_start)
                .flat_map(message_lines)
                .collect();
            if view.typing {
                live.extend(typing_lines());
            }
            if let Err(err) = surface.redraw(&live) {
                warn!(error = %err, "terminal redraw failed");
            }
        })
        .await;
        surface.commit();

        let note = match outcome {
            TurnOutcome::Rejected | TurnOutcome::Completed => None,
            TurnOutcome::Cancelled => Some(format!("{DIM}(stopped){RESET}")),
            TurnOutcome::Failed(_) => session.error().map(|error| format!("{RED}{error}{RESET}")),
        };
        if let Some(note) = note {
            surface
                .print_line(&note)
                .map_err(|e| WorkbenchError::Runtime(e.to_string()))?;
        }
    }

    Ok(())
}
