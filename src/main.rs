use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use screen_replay::backend::mock::{FramebufferCapturer, RecordingInput, RecordingLauncher, StaticWindows};
use screen_replay::backend::{Backends, WindowInfo, shared_input};
use screen_replay::command::COMMANDS;
use screen_replay::config::{self, parse_resolution};
use screen_replay::coords::{Resolution, WindowBox};
use screen_replay::ocr::NullRecognizer;
use screen_replay::runner::RunProgress;
use screen_replay::state::SharedState;
use screen_replay::{Processor, RunPlan, Runner, Script, Session, export};

/// Screen Replay - scripted desktop GUI automation with OCR assertions
#[derive(Parser, Debug)]
#[command(
    name = "screen-replay",
    about = "Replay command scripts against desktop windows, with OCR-based text assertions",
    after_help = "ENVIRONMENT VARIABLES:\n\
        SCREEN_REPLAY_REFERENCE_SIZE   Reference resolution for scaled coordinates\n\
        SCREEN_REPLAY_SESSION_DIR      Base directory for sessions\n\
        SCREEN_REPLAY_POLL_INTERVAL    Stop-flag poll slice (ms)\n\
        SCREEN_REPLAY_RETRY_INTERVAL   Delay between text polling tries (ms)\n\
        SCREEN_REPLAY_WINDOW_CACHE     Window box cache TTL (ms)\n\
        SCREEN_REPLAY_OCR_BACKEND      tesseract or vlm\n\
        RUST_LOG                       Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a script against one or more target windows
    Run {
        /// Script file, one command per line
        script: PathBuf,

        /// Target window title (repeat to run each pass against several windows)
        #[arg(short, long = "window")]
        windows: Vec<String>,

        /// Number of passes over the script
        #[arg(short = 'n', long, default_value = "1")]
        iterations: u32,

        /// Use recording backends instead of touching the desktop
        #[arg(long)]
        dry_run: bool,

        /// Reference resolution: fhd, qhd, 4k or WxH
        #[arg(long, short = 'r', env = "SCREEN_REPLAY_REFERENCE_SIZE")]
        reference: Option<String>,

        /// Output directory for screenshots and exports (default: auto-generated in session dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Remove the session directory afterwards unless the run exported results or wrote a log
        #[arg(long)]
        discard: bool,

        /// Also write the log to run.log in the session directory
        #[arg(long)]
        log_file: bool,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a script and print each line in canonical form
    Check {
        /// Script file
        script: PathBuf,
    },

    /// List available commands
    Commands,

    /// List open windows (requires the desktop feature)
    Windows {
        /// Case-insensitive title filter
        filter: Option<String>,
    },

    /// List sessions, optionally removing old ones
    Sessions {
        /// Remove sessions older than this many hours
        #[arg(long)]
        cleanup_hours: Option<u64>,
    },
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();

    match args.command {
        Some(Commands::Run {
            script,
            windows,
            iterations,
            dry_run,
            reference,
            output,
            discard,
            log_file,
            json,
        }) => {
            let mut settings = config::get().run;
            if let Some(size) = &reference {
                settings = settings.reference(parse_resolution(size)?);
            }

            // Sessions outlive the run; --discard is decided once it ends
            let session = match &output {
                Some(dir) => Session::in_dir(dir),
                None => {
                    let name = script
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "run".to_string());
                    Session::with_name(&name)
                }
            }
            .keep(true)
            .with_reference(settings.reference);
            session.init()?;

            init_logging(log_file.then(|| session.file_path("run.log")).as_deref())?;

            let script = Script::load(&script)?;
            for (line, parsed) in script.check() {
                if let Err(e) = parsed {
                    warn!(line, error = %e, "line will be skipped");
                }
            }

            let backends = if dry_run {
                dry_run_backends(settings.reference, &windows)
            } else {
                desktop_backends()?
            };

            let mut plan = RunPlan::default().iterations(iterations);
            for title in &windows {
                plan = plan.target(title.clone());
            }
            if dry_run && windows.is_empty() {
                let Resolution { width, height } = settings.reference;
                plan = plan.fallback(WindowBox::new(0, 0, width, height));
            }

            let processor = Processor::new(backends, session, settings);
            let handle = Runner::spawn(processor, script, plan);
            let stop = handle.stop_flag();
            ctrlc::set_handler(move || {
                warn!("interrupt received, stopping run");
                stop.set();
            })?;
            for event in handle.progress.iter() {
                if json {
                    continue;
                }
                match event {
                    RunProgress::PassStarted { iteration, target } => {
                        println!("Pass {} {}", iteration, target.as_deref().unwrap_or(""));
                    }
                    RunProgress::CommandFinished { line, outcome, .. } => {
                        println!("  line {:>3}: {}", line, outcome);
                    }
                    RunProgress::CommandStarted { .. } | RunProgress::Finished { .. } => {}
                }
            }

            let (processor, report) = handle
                .join()
                .map_err(|_| "run worker panicked")?;

            let (state, session) = processor.into_parts();
            let keep = keep_session(discard && output.is_none(), log_file, &state);
            let _session = session.keep(keep);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!();
                print!("{}", export::summary_text(&state));
                if keep {
                    println!("\nSession: {}", report.session_dir.display());
                }
            }

            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Some(Commands::Check { script }) => {
            let script = Script::load(&script)?;
            let mut errors = 0;
            for (line, parsed) in script.check() {
                match parsed {
                    Ok(command) => println!("{:>4}  {}", line, command),
                    Err(e) => {
                        errors += 1;
                        eprintln!("{:>4}  error: {}", line, e);
                    }
                }
            }
            println!("{} lines, {} errors", script.len(), errors);
            Ok(if errors == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Some(Commands::Commands) => {
            for info in COMMANDS {
                let aliases = if info.aliases.is_empty() {
                    String::new()
                } else {
                    format!(" (aliases: {})", info.aliases.join(", "))
                };
                println!("{:<14}{}{}", info.name, info.description, aliases);
                println!("{:<14}{}", "", info.usage);
            }
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Windows { filter }) => {
            init_logging(None)?;
            let windows = list_windows(filter.as_deref().unwrap_or(""))?;
            for w in &windows {
                println!("{:>6},{:<6} {:>5}x{:<5} {}", w.left, w.top, w.width, w.height, w.title);
            }
            println!("{} windows", windows.len());
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Sessions { cleanup_hours }) => {
            if let Some(hours) = cleanup_hours {
                let removed = screen_replay::cleanup_old_sessions(Duration::from_secs(hours * 3600))?;
                println!("Removed {} sessions", removed);
            }
            for dir in screen_replay::list_sessions()? {
                println!("{}", dir.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        None => {
            println!("Screen Replay - scripted desktop GUI automation");
            println!();
            println!("Usage: screen-replay <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run       Run a script against target windows");
            println!("  check     Parse a script and print its canonical form");
            println!("  commands  List available script commands");
            println!("  windows   List open windows");
            println!("  sessions  List or clean up sessions");
            println!();
            println!("Run with --help for more information.");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Whether a finished run's session directory stays on disk
fn keep_session(discard: bool, log_file: bool, state: &SharedState) -> bool {
    !discard || log_file || state.last_export.is_some()
}

/// Install the tracing subscriber: stderr, plus an optional plain-text file
fn init_logging(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(File::create(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// Recording backends: every target window fills the reference area
fn dry_run_backends(reference: Resolution, titles: &[String]) -> Backends {
    let windows = StaticWindows::new(
        titles
            .iter()
            .map(|t| WindowInfo::new(t.clone(), 0, 0, reference.width, reference.height))
            .collect(),
    );
    let launcher = RecordingLauncher::new();
    info!(windows = titles.len(), "dry run: no input reaches the desktop");
    Backends {
        input: shared_input(RecordingInput::new()),
        capture: Box::new(FramebufferCapturer::new(reference)),
        windows: Box::new(windows),
        launcher: Box::new(launcher),
        recognizer: Box::new(NullRecognizer),
    }
}

#[cfg(feature = "desktop")]
fn desktop_backends() -> Result<Backends, Box<dyn Error>> {
    use screen_replay::backend::SystemLauncher;
    use screen_replay::backend::desktop::{EnigoInput, XcapCapturer, XcapWindows};
    use screen_replay::config::OcrBackendKind;
    use screen_replay::ocr::{recognizer_from_config, vlm::check_health};

    let ocr = &config::get().ocr;
    if ocr.backend == OcrBackendKind::Vlm {
        match check_health(&ocr.vlm_endpoint, 5) {
            Ok(true) => info!(endpoint = %ocr.vlm_endpoint, "VLM endpoint responding"),
            Ok(false) | Err(_) => {
                warn!(endpoint = %ocr.vlm_endpoint, "VLM endpoint not responding; OCR commands will fail")
            }
        }
    }

    let input = shared_input(EnigoInput::spawn()?);
    Ok(Backends {
        input: input.clone(),
        capture: Box::new(XcapCapturer::new()),
        windows: Box::new(XcapWindows::new(input)),
        launcher: Box::new(SystemLauncher::new()),
        recognizer: recognizer_from_config(ocr),
    })
}

#[cfg(not(feature = "desktop"))]
fn desktop_backends() -> Result<Backends, Box<dyn Error>> {
    Err("built without the `desktop` feature; use --dry-run or rebuild with --features desktop".into())
}

#[cfg(feature = "desktop")]
fn list_windows(filter: &str) -> Result<Vec<WindowInfo>, Box<dyn Error>> {
    use screen_replay::backend::WindowTracker;
    use screen_replay::backend::desktop::{EnigoInput, XcapWindows};

    let tracker = XcapWindows::new(shared_input(EnigoInput::spawn()?));
    Ok(tracker.find_windows(filter)?)
}

#[cfg(not(feature = "desktop"))]
fn list_windows(_filter: &str) -> Result<Vec<WindowInfo>, Box<dyn Error>> {
    Err("window listing needs the `desktop` feature".into())
}
