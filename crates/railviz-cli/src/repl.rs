//! REPL – operator commands while a stream session is running.
//!
//! Supported commands:
//!   p | pause     – toggle playback on the producer
//!   s | status    – print the current frame and channel state
//!   h | help      – show this list
//!   q | quit      – close the channel and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use railviz_middleware::{EmitOutcome, SessionHandle};
use railviz_types::{ControlIntent, StreamCategory};

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let cmd = line.trim();
        if cmd.is_empty() {
            return None;
        }
        Some(match cmd.to_ascii_lowercase().as_str() {
            "p" | "pause" => Command::TogglePause,
            "s" | "status" => Command::Status,
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(cmd.to_string()),
        })
    }
}

/// Read commands from stdin until `q`, EOF, or `shutdown` is set.
///
/// Always closes the session on the way out.
pub fn run(session: SessionHandle, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "railviz>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let Some(cmd) = Command::parse(&line) else {
            continue;
        };

        match cmd {
            Command::TogglePause => cmd_toggle(&session),
            Command::Status => cmd_status(&session),
            Command::Help => cmd_help(),
            Command::Quit => {
                println!("{}", "Closing stream …".green());
                break;
            }
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "help".bold()
                );
            }
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    session.close();
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "railviz Commands".bold().underline());
    println!("  {}  – toggle playback on the producer", "p  pause ".bold().cyan());
    println!("  {}  – current frame and channel state", "s  status".bold().cyan());
    println!("  {}  – close the stream and exit", "q  quit  ".bold().cyan());
    println!();
}

fn cmd_toggle(session: &SessionHandle) {
    match session.emit(ControlIntent::TogglePlayback) {
        EmitOutcome::Sent => println!("  {} playback toggle sent", "✓".green()),
        EmitOutcome::Dropped => println!(
            "  {} channel is {:?}; toggle dropped",
            "✗".yellow(),
            session.status()
        ),
    }
}

fn cmd_status(session: &SessionHandle) {
    let snapshot = session.snapshot();
    println!();
    println!("  Session    : {}", snapshot.session_id().to_string().dimmed());
    println!("  Channel    : {:?}", session.status());
    println!("  Frame      : {}", snapshot.frame().to_string().bold());
    println!("  Points     : {}", snapshot.points().len());
    println!("  Detections : {}", snapshot.detections().len());
    for category in StreamCategory::PAYLOADS {
        let state = match snapshot.received().get(category) {
            Some(at) => at.format("%H:%M:%S%.3f").to_string().green(),
            None => "loading".yellow(),
        };
        println!("  {:<10} : {}", category.to_string(), state);
    }
    println!();
}
