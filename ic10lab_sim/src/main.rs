//! ic10lab CLI
//!
//! Edit, validate and step chip environments from the terminal.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use ic10lab_core::{LabConfig, LifecycleState, SchemaSource, SessionController};
use ic10lab_sim::commands::{Command, HELP};
use ic10lab_sim::{SampleId, SimEngine};
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// ic10lab interactive simulator
#[derive(Parser, Debug)]
#[command(name = "ic10lab")]
#[command(about = "Edit, validate and step IC10 chip environments", long_about = None)]
struct Args {
    /// Environment file to start from (overrides the persisted text)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Sample used when there is neither a file nor persisted text
    /// (counter, relay, showcase, broken)
    #[arg(short = 'S', long, default_value = "counter")]
    sample: String,

    /// Directory for the persisted editor text (omit to disable persistence)
    #[arg(long)]
    store: Option<PathBuf>,

    /// JSON Schema file replacing the bundled environment schema
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Upper bound on ticks for a single `run`
    #[arg(long, default_value = "10000")]
    max_steps: u64,

    /// Seed for the `rand` instruction
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON lines output
    #[arg(long)]
    json: bool,
}

impl Args {
    fn config(&self) -> LabConfig {
        let mut config = LabConfig::default().with_max_run_steps(self.max_steps);
        if let Some(path) = &self.store {
            config = config.with_store_path(path);
        }
        if let Some(path) = &self.schema {
            config = config.with_schema(SchemaSource::File(path.clone()));
        }
        config
    }
}

/// Prints controller output, tracking which log entries were already shown.
struct Printer {
    json: bool,
    shown: usize,
}

impl Printer {
    fn new_entries(&mut self, controller: &SessionController<SimEngine>) -> anyhow::Result<()> {
        let entries = controller.log_entries();
        if entries.len() < self.shown {
            self.shown = 0;
        }
        for entry in &entries[self.shown..] {
            if self.json {
                println!("{}", serde_json::to_string(entry)?);
            } else {
                println!("{}", entry.render());
            }
        }
        self.shown = entries.len();
        Ok(())
    }

    fn state(&self, controller: &SessionController<SimEngine>) -> anyhow::Result<()> {
        let state = controller.lifecycle();
        let ticks = controller.ticks();
        if self.json {
            println!("{}", serde_json::json!({ "state": state, "ticks": ticks }));
        } else {
            println!("state: {} (tick {})", state, ticks);
        }
        Ok(())
    }

    fn text(&self, label: &str, text: &str) {
        if self.json {
            println!("{}", serde_json::json!({ label: text }));
        } else if text.is_empty() {
            println!("({} is empty)", label);
        } else {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
        }
    }
}

async fn dispatch(
    command: Command,
    controller: &SessionController<SimEngine>,
    printer: &mut Printer,
) -> anyhow::Result<()> {
    if command.clears_log() {
        printer.shown = 0;
    }

    match command {
        Command::Edit(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            controller.edit(text);
            info!("loaded {} into the editor", path.display());
            print_validation(controller, printer)?;
        }
        Command::Load => {
            controller.load().await;
        }
        Command::Init => {
            let text = controller.initial_text();
            controller.initialize(&text).await;
        }
        Command::Step(count) => {
            for _ in 0..count {
                if controller.step().await != LifecycleState::Ready {
                    break;
                }
            }
        }
        Command::Run(limit) => {
            let executed = controller.run(limit).await;
            debug!("run executed {} tick(s)", executed);
        }
        Command::Promote => {
            controller.promote_current().await;
        }
        Command::Clear => controller.clear_log(),
        Command::Log => {
            printer.shown = 0;
        }
        Command::Current => printer.text("current", &controller.current_text()),
        Command::Initial => printer.text("initial", &controller.initial_text()),
        Command::Units => {
            for unit in controller.units() {
                if printer.json {
                    println!("{}", serde_json::to_string(&unit)?);
                } else {
                    let status = if unit.halted { "halted" } else { "running" };
                    println!("chip {}: pc={} {}", unit.id, unit.program_counter, status);
                }
            }
        }
        Command::Validate => print_validation(controller, printer)?,
        Command::State | Command::Help | Command::Quit => {}
    }

    printer.new_entries(controller)?;
    Ok(())
}

fn print_validation(
    controller: &SessionController<SimEngine>,
    printer: &Printer,
) -> anyhow::Result<()> {
    let report = controller.validate(&controller.initial_text());
    if printer.json {
        let errors: Vec<_> = report.errors.iter().map(|e| e.render_with_context()).collect();
        println!("{}", serde_json::json!({ "valid": report.valid, "errors": errors }));
    } else if report.valid {
        println!("valid");
    } else if report.is_empty_input() {
        println!("invalid: the editor is empty");
    } else {
        for line in report.lines() {
            println!("invalid: {}", line);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (RUST_LOG wins over --verbose)
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let Some(sample) = SampleId::from_name(&args.sample) else {
        let names: Vec<&str> = SampleId::all().iter().map(SampleId::name).collect();
        bail!("unknown sample '{}' (available: {})", args.sample, names.join(", "));
    };

    let engine = SimEngine::new().with_seed(args.seed);
    let controller = SessionController::open(engine, args.config())?;

    if let Some(path) = &args.file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        controller.edit(text);
    } else if controller.initial_text().trim().is_empty() {
        info!("starting from sample '{}': {}", sample.name(), sample.description());
        controller.edit(sample.yaml());
    }

    // Application start: initialize from the editable text on a clean log
    controller.load().await;

    let mut printer = Printer {
        json: args.json,
        shown: 0,
    };
    printer.new_entries(&controller)?;
    printer.state(&controller)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        if !args.json {
            print!("ic10> ");
            io::stdout().flush()?;
        }

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            command => {
                let reports_state = !matches!(
                    command,
                    Command::Current | Command::Initial | Command::Log | Command::Validate
                );
                if let Err(err) = dispatch(command, &controller, &mut printer).await {
                    eprintln!("error: {:#}", err);
                }
                if reports_state {
                    printer.state(&controller)?;
                }
            }
        }
    }

    Ok(())
}
