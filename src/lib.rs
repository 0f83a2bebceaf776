// Must come first so `tlog!` is visible in every module below
#[macro_use]
mod logging;

mod cli;
mod io;
mod menu;
mod parser;
mod repeat;
mod settings;
mod terminal;
mod transmit;

use clap::Parser;
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste, EventStream};
use crossterm::execute;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cli::Args;
use io::serial::list_serial_ports;
use menu::ConsoleMenu;
use settings::{default_history_path, default_settings_path, load_settings, save_settings, Settings};
use terminal::display::ConsoleScreen;
use terminal::line_editor::{History, LineEditor};
use terminal::{run_event_loop, Opener, Session};

// ============================================================================
// Terminal Mode
// ============================================================================

/// Raw mode plus bracketed paste for the lifetime of the guard.
/// Log echo to stderr is muted while it is held.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self, String> {
        crossterm::terminal::enable_raw_mode()
            .map_err(|e| format!("Failed to enable raw mode: {}", e))?;
        if let Err(e) = execute!(std::io::stdout(), EnableBracketedPaste) {
            tlog!("[busterm] Bracketed paste unavailable: {}", e);
        }
        logging::set_stderr_echo(false);
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = execute!(std::io::stdout(), DisableBracketedPaste);
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            tlog!("[busterm] Failed to restore terminal: {}", e);
        }
        logging::set_stderr_echo(true);
    }
}

/// Record SIGTERM, SIGHUP or SIGINT in `shutdown`. The loop checks it once
/// per iteration. Must be called inside the runtime.
fn spawn_signal_watcher(shutdown: Arc<AtomicBool>) -> Result<(), String> {
    use tokio::signal::unix::{signal, SignalKind};

    let register = |kind: SignalKind| {
        signal(kind).map_err(|e| format!("Failed to install signal handler: {}", e))
    };
    let mut terminate = register(SignalKind::terminate())?;
    let mut hangup = register(SignalKind::hangup())?;
    let mut interrupt = register(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => tlog!("[busterm] SIGTERM received"),
            _ = hangup.recv() => tlog!("[busterm] SIGHUP received"),
            _ = interrupt.recv() => tlog!("[busterm] SIGINT received"),
        }
        shutdown.store(true, Ordering::SeqCst);
    });
    Ok(())
}

// ============================================================================
// Entry Point
// ============================================================================

pub fn run() -> ExitCode {
    let args = Args::parse();
    let code = match run_with(args) {
        Ok(code) => code,
        Err(e) => {
            tlog!("[busterm] {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    };
    logging::stop_file_logging();
    code
}

fn print_ports() -> Result<(), String> {
    let ports = list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        let detail = match (port.manufacturer, port.product) {
            (Some(m), Some(p)) => format!(" - {} {}", m, p),
            (Some(s), None) | (None, Some(s)) => format!(" - {}", s),
            (None, None) => String::new(),
        };
        println!("{} ({}){}", port.port_name, port.port_type, detail);
    }
    Ok(())
}

fn run_with(args: Args) -> Result<ExitCode, String> {
    if let Some(dir) = &args.log_dir {
        logging::init_file_logging(dir)?;
    }

    if args.list_ports {
        print_ports()?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings_path = match &args.config {
        Some(path) => path.clone(),
        None => default_settings_path()?,
    };
    let mut settings = load_settings(&settings_path)?;
    if args.apply(&mut settings)? {
        if let Err(e) = save_settings(&settings_path, &settings) {
            tlog!("[busterm] {}", e);
            eprintln!("Warning: {}", e);
        }
    }

    let configure_can = !args.skip_can_setup;
    let transport = io::open_transport(&settings, configure_can)
        .map_err(|e| format!("Failed to open {} interface: {}", settings.interface, e))?;
    tlog!("[busterm] Opened {}", transport.describe());

    let opener: Opener = Box::new(move |s: &Settings| io::open_transport(s, configure_can));
    let mut session = Session::new(
        settings,
        Some(settings_path),
        transport,
        ConsoleScreen::new(),
        opener,
    );

    // One-shot mode
    if let Some(slot) = args.preset {
        let sent = session.fire_preset(slot);
        return Ok(if sent { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    if let Some((slot, interval_ms)) = args.repeat {
        session.settings.resolve_preset(slot)?;
        let ms = session.registry.arm_preset(slot, Some(interval_ms), Instant::now());
        println!("Preset {} repeating every {}ms", slot, ms);
    }

    println!(
        "Connected to {} (Ctrl-T: Menu, Ctrl-C: Quit)",
        session.transport_description()
    );

    let history = default_history_path().map_or_else(History::new, |path| History::load(&path));
    let mut editor = LineEditor::new(history);
    let mut menu = ConsoleMenu;
    let shutdown = Arc::new(AtomicBool::new(false));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    let result = {
        let _raw = RawModeGuard::enable()?;
        session.screen.show_input();
        runtime.block_on(async {
            match spawn_signal_watcher(shutdown.clone()) {
                Ok(()) => {
                    run_event_loop(&mut session, &mut editor, &mut menu, EventStream::new, shutdown)
                        .await
                }
                Err(e) => Err(e),
            }
        })
    };

    if let Err(e) = editor.save_history() {
        tlog!("[busterm] {}", e);
    }
    drop(session);

    match result {
        Ok(()) => {
            tlog!("[busterm] Session ended");
            println!("\nDisconnected.");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Err(e),
    }
}
