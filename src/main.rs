use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use ktx_macro::automation::autogui::AutoGuiDriver;
use ktx_macro::automation::telegram::TelegramNotifier;
use ktx_macro::{CancelToken, EngineConfig, MacroDocument, MacroEngine, RunStatus, validate};

/// Runs a macro sequence from a saved document against the live screen.
#[derive(Parser)]
#[command(name = "ktx-macro", version, about)]
struct Args {
    /// Path to the macro document.
    #[arg(short, long, default_value = "config/macro_config.json")]
    config: PathBuf,

    /// Name (or id) of the sequence to run.
    sequence: Option<String>,

    /// List the sequences in the document and exit.
    #[arg(long)]
    list: bool,

    /// Validate the sequence and exit without running it.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let doc = MacroDocument::load_from_file(&args.config)
        .with_context(|| format!("could not load {}", args.config.display()))?;

    if args.list {
        for seq in &doc.macro_sequences {
            println!(
                "{}  {} ({} actions, loop {})",
                seq.id,
                seq.name,
                seq.actions.len(),
                if seq.infinite_loop {
                    "infinite".to_string()
                } else {
                    seq.loop_count.to_string()
                }
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let Some(wanted) = args.sequence.as_deref() else {
        bail!("no sequence given; use --list to see what the document contains");
    };
    let sequence = doc
        .get_sequence_by_name(wanted)
        .or_else(|| doc.get_sequence(wanted))
        .with_context(|| format!("sequence '{wanted}' not found in {}", args.config.display()))?;

    let errors = validate(sequence, &doc.image_templates);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("validation error: {error}");
        }
        bail!("sequence '{}' failed validation", sequence.name);
    }
    if args.check {
        println!("sequence '{}' is valid", sequence.name);
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc_handler(handler_token)?;

    let (mut locator, mut dispatcher) = AutoGuiDriver::new()
        .map_err(|e| anyhow::anyhow!("{e}"))?
        .split();
    let notifier = TelegramNotifier::new(doc.telegram_config.clone())
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let engine = MacroEngine::new(EngineConfig::from_document(&doc));
    let summary = engine.run(
        sequence,
        &doc.image_templates,
        &mut locator,
        &mut dispatcher,
        Arc::new(notifier),
        &cancel,
    )?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    match summary.status {
        RunStatus::Completed | RunStatus::Cancelled => Ok(ExitCode::SUCCESS),
        RunStatus::Partial | RunStatus::Aborted => Ok(ExitCode::FAILURE),
    }
}

/// Ctrl-C requests a clean stop between actions instead of killing the
/// process mid-click.
fn ctrlc_handler(cancel: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("cancellation requested");
        cancel.cancel();
    })
    .context("failed to install ctrl-c handler")
}
