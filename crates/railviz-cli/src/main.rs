//! `railviz-cli` – headless stream client.
//!
//! This binary is the operator entry point for a railviz stream.  It:
//!
//! 1. Loads `~/.railviz/config.toml` (writing the defaults on first run) and
//!    applies `RAILVIZ_*` environment overrides.
//! 2. Connects to the sensor stream and runs the [`Viewer`] with a
//!    [`LogConsumer`], logging a summary line per reconciled frame.
//! 3. Reads operator commands from stdin (`p` toggles playback, `q` quits).
//! 4. Intercepts **Ctrl-C** to close the channel cleanly.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use railviz_middleware::{SessionSummary, connect};
use railviz_runtime::{LogConsumer, Viewer, init_tracing};
use railviz_types::StreamError;

fn main() {
    // Must outlive the runtime so pending spans are flushed on exit.
    let _tracing = init_tracing("railviz");

    print_banner();

    let cfg = load_config();
    println!(
        "  Stream {} · consistency {} · hazard {}–{} m",
        cfg.stream_url.bold(),
        cfg.consistency.to_string().bold(),
        cfg.hazard.near,
        cfg.hazard.far
    );

    let scorer = match cfg.scorer() {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            std::process::exit(1);
        }
    };

    let (session, task) = match runtime.block_on(connect(cfg.session_config())) {
        Ok(pair) => pair,
        Err(e) => {
            println!("{}: {}", "Connection failed".red(), e);
            std::process::exit(1);
        }
    };
    println!(
        "  {} connected (session {})",
        "✓".green().bold(),
        session.session_id().to_string().dimmed()
    );
    println!("  Type {} for a list of commands.\n", "help".bold().cyan());

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_session = session.clone();
    let ctrlc_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing stream …".yellow().bold());
        ctrlc_shutdown.store(true, Ordering::SeqCst);
        ctrlc_session.close();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use 'q' to exit");
    }

    // ── Viewer ────────────────────────────────────────────────────────────
    let snapshots = session.subscribe();
    let viewer = runtime.spawn(async move {
        let mut viewer = Viewer::new(scorer, LogConsumer::default());
        viewer.run(snapshots).await
    });

    // ── REPL ──────────────────────────────────────────────────────────────
    // stdin is blocking; the process exits when the session ends even if
    // the REPL thread is still parked on a read.
    let repl_shutdown = shutdown.clone();
    std::thread::spawn(move || repl::run(session, repl_shutdown));

    let outcome = runtime.block_on(async {
        let outcome = task
            .await
            .unwrap_or_else(|e| Err(StreamError::Transport(format!("session task failed: {e}"))));
        if let Ok(report) = viewer.await {
            tracing::debug!(?report, "viewer finished");
        }
        outcome
    });
    shutdown.store(true, Ordering::SeqCst);

    match outcome {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            println!("{}: {}", "Stream error".red(), e);
            std::process::exit(1);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> config::Config {
    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner & summary
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _______ _(_) /  __(_)___"#.bold().cyan());
    println!("{}", r#"  / __/ _ `/ / / |/ / /_ /"#.bold().cyan());
    println!("{}", r#" /_/  \_,_/_/_/|___/_//__/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "railviz".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Sensor stream reconciliation client");
    println!();
}

fn print_summary(summary: &SessionSummary) {
    println!();
    println!("{}", "Session closed".bold().underline());
    println!("  Session      : {}", summary.session_id.to_string().dimmed());
    println!("  Messages     : {}", summary.messages);
    println!("  Malformed    : {}", summary.dropped);
    println!("  Final frame  : {}", summary.final_frame.to_string().bold());
    println!(
        "  Frames       : {} committed, {} discarded",
        summary.stats.committed_frames, summary.stats.discarded_frames
    );
    println!();
}
