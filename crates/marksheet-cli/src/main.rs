// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Marksheet — command-line grader.
//
// Entry point. Initialises logging, loads the form registry, grades one page
// image and prints the page report as JSON on stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use image::DynamicImage;
use serde::Serialize;
use tracing::{error, info};

use marksheet_core::human_errors::humanize_error;
use marksheet_core::{
    AnswerKey, FormConfig, FormRegistry, PageReport, Result, ScoreSummary, score_card,
};
use marksheet_engine::image::{encode_png, open_page};
use marksheet_engine::{AlignedImage, align, grade_page_report};

#[derive(Parser)]
#[command(name = "marksheet")]
#[command(about = "Grade scanned OMR answer sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one page image and print the result as JSON.
    Grade(GradeArgs),

    /// List the registered form types.
    Forms {
        /// Extra form definitions (`{"forms": [...]}`) added to the presets.
        #[arg(long)]
        forms: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct GradeArgs {
    /// Path to the page image (JPEG, PNG, ...).
    image: PathBuf,

    /// Form type to grade against.
    #[arg(long, default_value = "yedam")]
    form: String,

    /// Extra form definitions (`{"forms": [...]}`) added to the presets.
    #[arg(long)]
    forms: Option<PathBuf>,

    /// Answer key (`{"answers": {"1": 3, ...}}`); adds a score per card.
    #[arg(long)]
    key: Option<PathBuf>,

    /// Write the rectified page as PNG.
    #[arg(long)]
    rectified: Option<PathBuf>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

/// JSON written to stdout by `grade`.
#[derive(Debug, Serialize)]
struct GradeOutput {
    #[serde(flatten)]
    report: PageReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<Vec<ScoreSummary>>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Grade(args) => run_grade(&args),
        Commands::Forms { forms } => run_forms(forms.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let human = humanize_error(&err);
            error!(%err, severity = ?human.severity, "Command failed");
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

fn run_grade(args: &GradeArgs) -> Result<()> {
    let registry = load_registry(args.forms.as_deref())?;
    let form = registry.get(&args.form)?;
    let key = args.key.as_deref().map(AnswerKey::from_json_file).transpose()?;
    let page = open_page(&args.image)?;

    if let Some(path) = &args.rectified {
        write_rectified(&page, form, path)?;
    }

    let report = grade_page_report(page, form)?;
    info!(request_id = %report.request_id, cards = report.cards.len(), "Page graded");
    let output = build_output(report, key.as_ref());
    let json = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");
    Ok(())
}

fn run_forms(forms: Option<&Path>) -> Result<()> {
    let registry = load_registry(forms)?;
    for name in registry.names() {
        println!("{name}");
    }
    Ok(())
}

/// Built-in presets, optionally extended (or overridden) from a file.
fn load_registry(forms: Option<&Path>) -> Result<FormRegistry> {
    let mut registry = FormRegistry::builtin();
    if let Some(path) = forms {
        let extra = FormRegistry::from_json_file(path)?;
        info!(path = %path.display(), forms = extra.len(), "Loaded form definitions");
        registry.merge(extra);
    }
    Ok(registry)
}

/// Rectify the page the same way grading will and save it for review.
fn write_rectified(page: &DynamicImage, form: &FormConfig, path: &Path) -> Result<()> {
    let aligned = if form.alignment.align_page {
        align(page.clone(), &form.alignment)
    } else {
        AlignedImage::skipped(page.clone())
    };
    let png = encode_png(&aligned.image)?;
    std::fs::write(path, png)?;
    info!(path = %path.display(), outcome = ?aligned.outcome, "Rectified page written");
    Ok(())
}

fn build_output(report: PageReport, key: Option<&AnswerKey>) -> GradeOutput {
    let scores = key.map(|key| {
        report
            .cards
            .iter()
            .map(|card| score_card(card, key))
            .collect()
    });
    GradeOutput { report, scores }
}
