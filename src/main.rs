//! modstack - main entry point

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use modstack::cli::{Cli, Commands};
use modstack::engine::plan;
use modstack::events::{ConsoleSink, EventSink, FanOut, TracingSink};
use modstack::{
    builtin_registry, expand_selection, resolve, Answers, CancelToken, CommandStackClient,
    ModuleName, ModuleSettings, Orchestrator, ProcessGuard, Registry, RunOutcome,
};

/// Initialize tracing with appropriate settings
fn init_tracing() {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse_args();
    debug!(?cli, "CLI arguments parsed");

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let mut answers = load_answers(&cli.answers)?;
    if let Some(environment) = &cli.environment {
        answers.environment = environment.clone();
    }
    if let Some(region) = &cli.region {
        answers.region = region.clone();
    }

    let settings = ModuleSettings::new(answers.environment.clone(), cli.source_root.clone());
    let registry = builtin_registry(&settings)?;

    if cli.command == Commands::Modules {
        list_modules(&registry);
        return Ok(0);
    }

    let selection = select_modules(cli, &registry, &answers)?;
    info!(modules = ?selection, "modules selected");

    match &cli.command {
        Commands::Validate => {
            answers.validate()?;
            let order = resolve(&registry, &selection)?;
            plan::validate_all(&registry, &order, &answers)?;
            println!("✓ Answers are valid for: {}", join(&order));
            Ok(0)
        }
        Commands::Plan { delete } => preview(&registry, &selection, &answers, *delete),
        Commands::Install | Commands::Delete if cli.dry_run => {
            preview(&registry, &selection, &answers, cli.command == Commands::Delete)
        }
        Commands::Install | Commands::Delete => execute(cli, &registry, &selection, &mut answers),
        Commands::Modules => Ok(0),
    }
}

fn load_answers(path: &Path) -> Result<Answers> {
    if path.exists() {
        info!(path = %path.display(), "loading answers");
        Answers::load_from_file(path)
    } else {
        warn!(path = %path.display(), "answers file not found, starting empty");
        Ok(Answers::default())
    }
}

/// `--modules`, else the modules recorded in the answers, else everything.
fn select_modules(cli: &Cli, registry: &Registry, answers: &Answers) -> Result<Vec<ModuleName>> {
    let mut selection = cli.module_names();
    if selection.is_empty() {
        selection = if answers.modules.is_empty() {
            registry.names()
        } else {
            answers.modules.clone()
        };
    }
    if cli.with_dependencies {
        selection = expand_selection(registry, &selection)?;
    }
    Ok(selection)
}

fn list_modules(registry: &Registry) {
    for module in registry.iter() {
        let info = module.info();
        println!("{:<20} {}", info.name, info.friendly_name);
        if !info.mandatory.is_empty() {
            println!("{:<20}   requires: {}", "", join(&info.mandatory));
        }
        if !info.optional.is_empty() {
            println!("{:<20}   uses if selected: {}", "", join(&info.optional));
        }
    }
}

fn preview(registry: &Registry, selection: &[ModuleName], answers: &Answers, delete: bool) -> Result<i32> {
    let lines = if delete {
        plan::preview_delete(registry, selection, answers)?
    } else {
        plan::preview_install(registry, selection, answers)?
    };

    println!("{} plan ({} tasks):", if delete { "Delete" } else { "Install" }, lines.len());
    for line in &lines {
        println!("  {}", line);
    }
    Ok(0)
}

fn execute(
    cli: &Cli,
    registry: &Registry,
    selection: &[ModuleName],
    answers: &mut Answers,
) -> Result<i32> {
    let cancel = match cli.timeout {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    if let Err(e) = modstack::process_guard::install_signal_handlers(cancel.clone()) {
        // Children are still cleaned up by the guard on exit
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    let client = CommandStackClient::new(cli.stack_cli.clone(), answers.region.clone());
    let tracing_sink = TracingSink;
    let console_sink = ConsoleSink;
    let sink = FanOut(vec![&tracing_sink as &dyn EventSink, &console_sink]);
    let mut orchestrator = Orchestrator::new(registry, &client, &sink).with_cancel(cancel);

    let result = if cli.command == Commands::Delete {
        orchestrator.delete(selection, answers)
    } else {
        orchestrator.install(selection, answers)
    };

    answers
        .save_to_file(&cli.answers)
        .with_context(|| format!("Failed to save answers after {:?}", cli.command))?;
    let outcome = result?;

    let state = orchestrator.state();
    match &outcome {
        RunOutcome::Succeeded => println!(
            "\n✓ Done: {} tasks run, {} skipped, {} already removed",
            state.tasks_run(),
            state.tasks_skipped(),
            state.tasks_tolerated()
        ),
        RunOutcome::Failed { module, task, cause } => {
            eprintln!("\n✗ Module '{}' failed at '{}': {}", module, task, cause)
        }
        RunOutcome::Cancelled => eprintln!("\n✗ Cancelled; answers saved, re-run to resume"),
    }
    Ok(outcome.exit_code())
}

fn join(names: &[ModuleName]) -> String {
    names.iter().map(ModuleName::as_str).collect::<Vec<_>>().join(", ")
}
