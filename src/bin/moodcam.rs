//! moodcam - live camera overlay driven by a remote analysis service
//!
//! Reads commands from stdin:
//! - `start`  acquire the camera and begin the capture loop
//! - `stop`   stop the loop and release the camera
//! - `status` print loop state and counters
//! - `quit`   stop and exit (also on Ctrl-C or end of input)

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use moodcam::{controller_from_config, LifecycleController, LoopState, LoopStats, MoodcamConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Overlay remote frame analysis on a live camera")]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "MOODCAM_CONFIG")]
    config: Option<PathBuf>,

    /// Camera URL (stub://webcam, http://host/stream).
    #[arg(long)]
    source: Option<String>,

    /// Analysis endpoint URL (http://host/process_frame, or stub:// for offline).
    #[arg(long)]
    analysis_url: Option<String>,

    /// Delay between cycles in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Write the live overlay to this JPEG file after every render.
    #[arg(long)]
    preview_out: Option<PathBuf>,

    /// Start capturing immediately.
    #[arg(long)]
    autostart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Status,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "start" => Some(Command::Start),
        "stop" => Some(Command::Stop),
        "status" => Some(Command::Status),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = MoodcamConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(url) = args.analysis_url {
        cfg.analysis.url = url;
    }
    if let Some(delay_ms) = args.delay_ms {
        cfg.capture_loop.delay = Duration::from_millis(delay_ms);
    }
    if let Some(path) = args.preview_out {
        cfg.display.preview_path = Some(path);
    }
    cfg.validate()?;

    let mut controller = controller_from_config(&cfg)?;
    log::info!(
        "moodcam ready: source={} analysis={} delay={}ms",
        cfg.source.url,
        cfg.analysis.url,
        cfg.capture_loop.delay.as_millis()
    );
    if let Some(path) = &cfg.display.preview_path {
        log::info!("live preview written to {}", path.display());
    }

    let (tx, rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Command::Quit);
    })
    .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    spawn_stdin_reader(tx)?;

    if args.autostart {
        start(&mut controller);
    }

    for command in rx {
        match command {
            Command::Start => start(&mut controller),
            Command::Stop => {
                controller.stop();
                log::info!("capture stopped");
            }
            Command::Status => print_status(&controller),
            Command::Quit => break,
        }
    }

    controller.stop();
    log::info!("moodcam exiting");
    Ok(())
}

fn start(controller: &mut LifecycleController) {
    // Acquisition failures are already logged; the controller stays idle.
    if controller.start().is_ok() {
        log::info!("capture started");
    }
}

fn print_status(controller: &LifecycleController) {
    eprintln!("{}", status_line(controller.state(), controller.is_streaming(), controller.stats()));
}

fn status_line(state: LoopState, streaming: bool, stats: LoopStats) -> String {
    format!(
        "state={:?} streaming={} cycles={} fallbacks={} capture_errors={} panics={}",
        state, streaming, stats.cycles, stats.fallbacks, stats.capture_errors, stats.panics
    )
}

fn spawn_stdin_reader(tx: mpsc::Sender<Command>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            return;
                        }
                    }
                    None => eprintln!("unknown command '{}'; try start, stop, status, quit", line.trim()),
                }
            }
            let _ = tx.send(Command::Quit);
        })
        .map_err(|e| anyhow!("failed to spawn stdin reader: {}", e))?;
    Ok(())
}
