//! acquaplan: tag coastal-ecology photographs with a local vision model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use acquaplan_lib::adapters::drive::{select_for_processing, DEFAULT_MIN_DESCRIPTION_LEN};
use acquaplan_lib::adapters::lightroom::catalog_items;
use acquaplan_lib::adapters::local::{exiftool_version, scan_folder};
use acquaplan_lib::adapters::{
    DriveClient, DriveDescriptionSink, DriveSource, LocalFileSource, XmpSidecarSink, RAW_EXTENSIONS,
};
use acquaplan_lib::config::{self, Settings};
use acquaplan_lib::models::SourceTag;
use acquaplan_lib::pipeline::batch::{
    BatchDriver, BatchEvent, BatchOptions, BatchReport, CompletionCache, ImageSource,
    ManifestWriter, MetadataSink, SourceItem,
};
use acquaplan_lib::pipeline::extraction::PromptBuilder;
use acquaplan_lib::pipeline::{ExtractionEngine, OllamaClient, VisionModel};
use acquaplan_lib::report::{export_filtered, ManifestLog};
use acquaplan_lib::vocabulary::Vocabulary;

#[derive(Parser)]
#[command(name = "acquaplan")]
#[command(about = "Acquaplan Tagger - scientific metadata for coastal photographs")]
#[command(version)]
struct Cli {
    /// Settings file (default: ~/.config/acquaplan/acquaplan.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Manifest (JSONL) to append to or read from
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Vision model name, overrides settings
    #[arg(long, global = true)]
    model: Option<String>,

    /// Ollama base URL, overrides settings
    #[arg(long, global = true)]
    ollama_url: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tag RAW files from a local folder or a Lightroom catalog (XMP via exiftool)
    Local {
        /// Folder to scan (not recursive)
        folder: Option<PathBuf>,

        /// Lightroom Classic catalog (.lrcat) instead of a folder
        #[arg(long, conflicts_with = "folder")]
        catalog: Option<PathBuf>,

        /// Only photos in this catalog collection
        #[arg(long, requires = "catalog")]
        collection: Option<String>,

        /// Mark images as contributor material instead of the archive
        #[arg(long)]
        contributor: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Tag images in Google Drive folders and write their descriptions
    Drive {
        /// Drive folder ids
        #[arg(required = true)]
        folder_ids: Vec<String>,

        /// OAuth bearer token
        #[arg(long, env = config::ENV_DRIVE_TOKEN, hide_env_values = true)]
        token: Option<String>,

        /// Files with a description at least this long are left alone
        #[arg(long, default_value_t = DEFAULT_MIN_DESCRIPTION_LEN)]
        min_description_len: usize,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run both passes on one image and print the record as JSON
    Analyze {
        image: PathBuf,
    },

    /// Check that Ollama, the vision model and exiftool are available
    Verify {
        /// Pull the vision model if missing
        #[arg(long)]
        pull: bool,
    },

    /// Summarize the manifest
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a filtered copy of the manifest
    Filter {
        #[arg(long)]
        habitat: Option<String>,

        /// Species common or scientific name (substring, case-insensitive)
        #[arg(long)]
        species: Option<String>,

        #[arg(long, default_value_t = 0.5)]
        min_confidence: f32,

        /// Only entries with archaeology flags
        #[arg(long)]
        archaeology: bool,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Export the manifest as CSV
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Exiftool)]
        format: ExportFormat,

        /// Only entries from this project (lightroom, drive, colaborador)
        #[arg(long)]
        project: Option<SourceTag>,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Reprocess images already in the completion cache
    #[arg(long)]
    force: bool,

    /// Extract only; write nothing
    #[arg(long)]
    dry_run: bool,

    /// Pull the vision model if missing
    #[arg(long)]
    pull: bool,
}

impl RunArgs {
    fn options(&self) -> BatchOptions {
        BatchOptions {
            skip_processed: !self.force,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    /// For `exiftool -csv=<file>`
    Exiftool,
    /// One flat row per image
    Analysis,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    acquaplan_lib::init_tracing(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(model) = &cli.model {
        settings.vision_model = model.clone();
    }
    if let Some(url) = &cli.ollama_url {
        settings.ollama_url = url.clone();
    }
    if let Some(manifest) = &cli.manifest {
        settings.manifest_path = Some(manifest.clone());
    }

    tracing::debug!(version = config::APP_VERSION, model = %settings.vision_model, "Starting");

    match cli.command {
        Command::Local {
            folder,
            catalog,
            collection,
            contributor,
            run,
        } => {
            let source_tag = if contributor {
                SourceTag::Contributor
            } else {
                SourceTag::FirstPartyArchive
            };
            let items = match (folder, catalog) {
                (_, Some(catalog)) => catalog_items(&catalog, collection.as_deref(), source_tag)?,
                (Some(folder), None) => scan_folder(&folder, RAW_EXTENSIONS, source_tag)?,
                (None, None) => bail!("Give a folder or --catalog"),
            };
            let engine = build_engine(&settings, run.pull)?;
            let sink = XmpSidecarSink::new(&settings.exiftool_path, settings.thresholds);
            let report = run_batch(&settings, &engine, &items, &LocalFileSource, &sink, &run, source_tag);
            print_report(&report)?;
        }

        Command::Drive {
            folder_ids,
            token,
            min_description_len,
            run,
        } => {
            let token = token
                .or_else(|| settings.drive_token.clone())
                .context("No Drive token: pass --token or set ACQUAPLAN_DRIVE_TOKEN")?;
            let client = DriveClient::new(&token, settings.drive_page_size)?;

            let mut items = Vec::new();
            for folder_id in &folder_ids {
                let files = client.list_image_files(folder_id)?;
                items.extend(select_for_processing(&files, min_description_len));
            }

            let engine = build_engine(&settings, run.pull)?;
            let source = DriveSource::new(&client);
            let sink = DriveDescriptionSink::new(&client, settings.thresholds);
            let report = run_batch(&settings, &engine, &items, &source, &sink, &run, SourceTag::CloudStorage);
            print_report(&report)?;
        }

        Command::Analyze { image } => {
            let engine = build_engine(&settings, false)?;
            let record = engine.process_path(&image, SourceTag::FirstPartyArchive)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::Verify { pull } => verify(&settings, pull)?,

        Command::Stats { json } => {
            let log = ManifestLog::load(&settings.manifest_path())?;
            let stats = log.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats, log.skipped_lines());
            }
        }

        Command::Filter {
            habitat,
            species,
            min_confidence,
            archaeology,
            output,
        } => {
            let log = ManifestLog::load(&settings.manifest_path())?;
            let mut selected: Vec<_> = log.entries().iter().collect();
            if let Some(habitat) = &habitat {
                let keep = log.filter_by_habitat(habitat);
                selected.retain(|e| keep.iter().any(|k| std::ptr::eq(*k, *e)));
            }
            if let Some(name) = &species {
                let keep = log.filter_by_species(name, min_confidence);
                selected.retain(|e| keep.iter().any(|k| std::ptr::eq(*k, *e)));
            }
            if archaeology {
                let keep = log.with_archaeology();
                selected.retain(|e| keep.iter().any(|k| std::ptr::eq(*k, *e)));
            }
            let n = export_filtered(&selected, &output)?;
            println!("{n} entries written to {}", output.display());
        }

        Command::Export {
            format,
            project,
            output,
        } => {
            let log = ManifestLog::load(&settings.manifest_path())?;
            let rows = match format {
                ExportFormat::Exiftool => {
                    log.export_exiftool_csv(&output, project, &settings.thresholds)?
                }
                ExportFormat::Analysis => log.export_analysis_csv(&output)?,
            };
            println!("{rows} rows written to {}", output.display());
            if matches!(format, ExportFormat::Exiftool) {
                println!("Apply with: exiftool -csv={} <photos dir>", output.display());
            }
        }
    }

    Ok(())
}

fn build_engine(settings: &Settings, pull: bool) -> Result<ExtractionEngine> {
    let client = OllamaClient::new(&settings.ollama_url, settings.timeout_secs)?;
    let prompts = PromptBuilder::new(settings.prompt_version, Vocabulary::default())
        .with_keyword_bounds(settings.min_keywords, settings.max_keywords);
    let engine = ExtractionEngine::with_capability_check(
        Arc::new(client),
        &settings.vision_model,
        prompts,
        pull || settings.auto_pull,
    )
    .with_context(|| format!("Vision model {} is not available", settings.vision_model))?;
    Ok(engine)
}

fn run_batch(
    settings: &Settings,
    engine: &ExtractionEngine,
    items: &[SourceItem],
    source: &dyn ImageSource,
    sink: &dyn MetadataSink,
    run: &RunArgs,
    source_tag: SourceTag,
) -> BatchReport {
    let manifest_path = settings.manifest_path();
    let manifest = ManifestWriter::new(&manifest_path);
    let mut cache = CompletionCache::for_source(&manifest_path, source_tag);

    let driver = BatchDriver::new(engine, source, sink, &manifest, run.options());
    let progress = |event: BatchEvent| match event {
        BatchEvent::Progress {
            completed,
            total,
            current,
        } => eprintln!("[{}/{}] {}", completed + 1, total, current),
        BatchEvent::ItemFailed { id, error } => eprintln!("  failed {id}: {error}"),
        _ => {}
    };
    driver.run(items, &mut cache, Some(&progress))
}

/// Prints the summary; a failed cache flush becomes the command's error.
fn print_report(report: &BatchReport) -> Result<()> {
    println!(
        "Processed {} of {} ({} skipped, {} failed) in {:.1}s",
        report.succeeded,
        report.attempted,
        report.skipped,
        report.failed(),
        report.duration_ms as f64 / 1000.0
    );
    for failure in &report.failures {
        println!("  {}: {}", failure.id, failure.error);
    }
    if let Some(error) = &report.cache_error {
        bail!("Completion cache not saved ({error}); the next run will redo these images");
    }
    Ok(())
}

fn verify(settings: &Settings, pull: bool) -> Result<()> {
    let mut ok = true;

    let client = OllamaClient::new(&settings.ollama_url, settings.timeout_secs)?;
    match client.list_models() {
        Ok(models) => {
            println!("✓ Ollama at {} ({} models)", client.base_url(), models.len());
            match client.ensure_model(&settings.vision_model, pull) {
                Ok(()) => println!("✓ Vision model {}", settings.vision_model),
                Err(e) => {
                    println!("✗ Vision model {}: {e}", settings.vision_model);
                    ok = false;
                }
            }
        }
        Err(e) => {
            println!("✗ Ollama at {}: {e}", client.base_url());
            ok = false;
        }
    }

    match exiftool_version(Path::new(&settings.exiftool_path)) {
        Ok(version) => println!("✓ exiftool {version}"),
        Err(e) => {
            println!("✗ exiftool ({}): {e}", settings.exiftool_path.display());
            ok = false;
        }
    }

    if !ok {
        bail!("Some components are missing");
    }
    println!("All components available");
    Ok(())
}

fn print_stats(stats: &acquaplan_lib::report::ManifestStats, skipped_lines: usize) {
    println!("Entries: {}", stats.total_entries);
    if stats.duplicate_entries > 0 {
        println!("Duplicate entries (re-processed ids): {}", stats.duplicate_entries);
    }
    if skipped_lines > 0 {
        println!("Unreadable lines skipped: {skipped_lines}");
    }
    if let (Some(first), Some(last)) = (&stats.first_timestamp, &stats.last_timestamp) {
        println!("Period: {first} .. {last}");
    }

    println!("\nBy project:");
    for (project, n) in &stats.by_project {
        println!("  {project}: {n}");
    }
    println!("\nHabitats:");
    for (habitat, n) in &stats.habitats {
        println!("  {habitat}: {n}");
    }
    println!("\nSpecies (confidence > 70%):");
    for (name, n) in &stats.top_species {
        println!("  {name}: {n}");
    }
    println!("\nWith archaeology flags: {}", stats.archaeology_entries);
    println!("\nTop keywords:");
    for (kw, n) in &stats.top_keywords {
        println!("  {kw}: {n}");
    }
}
