use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use livediff_core::{
    AppConfig, ChangeReport, DocumentModel, ProjectWatcher, VersionLedger, WatchOutcome,
    analyze, compare, init_tracing_from_config, inspect_track,
    report::{
        file_label, render_change_list, render_change_report, render_session_summary,
        render_track_analysis, report_for_files,
    },
};

#[derive(Debug, Parser)]
#[command(name = "livediff-cli")]
#[command(about = "Compare, inspect and track versions of Ableton Live sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides `diagnostics.logs_dir` from the config file.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Structural diff of two session files.
    Compare {
        old: PathBuf,
        new: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Match tracks by name and device chain instead of position.
        #[arg(long)]
        fingerprint: bool,
    },
    /// Session change report between two session files.
    Report {
        old: PathBuf,
        new: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Detailed analysis of every track, or of one named track.
    AnalyzeTrack {
        file: PathBuf,

        #[arg(short, long)]
        track: Option<String>,
    },
    /// Tempo, time signature, counts and locators of one session.
    Summary { file: PathBuf },
    /// Register new versioned session files found in a project folder.
    Scan { project: PathBuf },
    /// List the recorded versions of a project.
    History { project: PathBuf },
    /// Report on the two most recent versions of a project.
    DiffLatest {
        project: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Poll a project folder and write a report for every new version.
    Watch {
        project: PathBuf,

        #[arg(short, long)]
        interval: Option<u64>,

        /// Check once and exit.
        #[arg(long)]
        once: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default()?;
    let mut diagnostics = config.diagnostics.clone();
    if let Some(log_dir) = cli.log_dir.clone() {
        diagnostics.logs_dir = log_dir;
    }
    let _telemetry = init_tracing_from_config(&diagnostics)?;

    match cli.command {
        Commands::Compare {
            old,
            new,
            output,
            fingerprint,
        } => {
            let old_doc = open(&old)?;
            let new_doc = open(&new)?;
            let text = if fingerprint {
                render_change_report(
                    &file_label(&old),
                    &file_label(&new),
                    Utc::now(),
                    &ChangeReport::build(&old_doc, &new_doc),
                )
            } else {
                render_change_list(
                    &file_label(&old),
                    &file_label(&new),
                    &compare(&old_doc, &new_doc),
                )
            };
            emit(&text, output.as_deref())?;
        }
        Commands::Report { old, new, output } => {
            let text = report_for_files(&old, &new, Utc::now(), config.report.include_positional)?;
            emit(&text, output.as_deref())?;
        }
        Commands::AnalyzeTrack { file, track } => {
            let document = open(&file)?;
            let tracks = document.tracks_by_fingerprint();
            let analyses: Vec<_> = tracks.values().map(inspect_track).collect();

            match track {
                Some(name) => {
                    let Some(analysis) = analyses.iter().find(|analysis| analysis.name == name)
                    else {
                        let available = analyses
                            .iter()
                            .map(|analysis| format!("  - {}", analysis.name))
                            .collect::<Vec<_>>()
                            .join("\n");
                        bail!("track '{name}' not found; available tracks:\n{available}");
                    };
                    print!("{}", render_track_analysis(analysis));
                }
                None => {
                    println!("DETAILED TRACK ANALYSIS");
                    println!("File: {}\n", file_label(&file));
                    for analysis in &analyses {
                        println!("{}", render_track_analysis(analysis));
                    }
                }
            }
        }
        Commands::Summary { file } => {
            let summary = analyze(&open(&file)?);
            print!("{}", render_session_summary(&file_label(&file), &summary));
        }
        Commands::Scan { project } => {
            let mut ledger = VersionLedger::open(&project, &config.ledger)?;
            let new_versions = ledger.register_new_versions()?;
            if new_versions.is_empty() {
                println!("No new versions found.");
            } else {
                println!("Found {} new version(s):", new_versions.len());
                for version in &new_versions {
                    println!(
                        "  - {} ({})",
                        version.version,
                        version.timestamp.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        Commands::History { project } => {
            let ledger = VersionLedger::open(&project, &config.ledger)?;
            let versions = ledger.sorted_versions();
            if versions.is_empty() {
                println!("No versions found.");
            } else {
                println!("Version History ({} versions):", versions.len());
                println!("{}", "-".repeat(80));
                for version in versions {
                    println!(
                        "  {:15} {}",
                        version.version,
                        version.timestamp.format("%Y-%m-%d %H:%M:%S")
                    );
                    for (key, value) in version
                        .metadata
                        .iter()
                        .filter(|(key, _)| !matches!(key.as_str(), "filepath" | "name"))
                    {
                        println!("    {key}: {value}");
                    }
                }
            }
        }
        Commands::DiffLatest { project, output } => {
            let mut ledger = VersionLedger::open(&project, &config.ledger)?;
            ledger.register_new_versions()?;
            let Some((old, new)) = ledger.latest_pair() else {
                println!("Need at least 2 versions to compare.");
                return Ok(());
            };
            println!("Comparing {} -> {}\n", old.version, new.version);
            let text = report_for_files(
                &old.file_path,
                &new.file_path,
                Utc::now(),
                config.report.include_positional,
            )?;
            emit(&text, output.as_deref())?;
        }
        Commands::Watch {
            project,
            interval,
            once,
        } => {
            let mut watcher = ProjectWatcher::new(&project, &config)?;
            if let Some(seconds) = interval {
                watcher = watcher.with_interval(Duration::from_secs(seconds.max(1)));
            }
            if once {
                let outcome = watcher.check_once()?;
                if !outcome.found_new() {
                    println!("No new versions found.");
                }
                print_outcome(&outcome);
            } else {
                println!("Watching {} (Ctrl+C to stop)", project.display());
                println!("Reports directory: {}", watcher.reports_dir().display());
                watcher.run(None, print_outcome);
            }
        }
    }

    Ok(())
}

fn open(path: &Path) -> anyhow::Result<DocumentModel> {
    DocumentModel::open(path).with_context(|| format!("failed to load session {}", path.display()))
}

fn emit(text: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("failed to write report: {}", path.display()))?;
            println!("Report saved to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn print_outcome(outcome: &WatchOutcome) {
    for version in &outcome.new_versions {
        println!(
            "New version: {} ({})",
            version.version,
            version.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(report) = &outcome.report {
        println!(
            "Change report {} -> {} saved: {}",
            report.old_version,
            report.new_version,
            report.path.display()
        );
        println!("{}", report.text);
    }
}
