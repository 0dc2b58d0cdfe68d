use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tierkeep::core::conflict::ResolutionOutcome;
use tierkeep::core::exif::ExifService;
use tierkeep::core::hash::ContentHashService;
use tierkeep::core::perceptual::PerceptualHasher;
use tierkeep::ingest::collect_records;
use tierkeep::{
    BurstGrouper, EngineConfig, IngestPipeline, MediaLibrary, MemoryStore, ResolutionAction,
};

#[derive(Parser, Debug)]
#[command(name = "tierkeep", version, about = "Tiered photo ingest and burst analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest files into a tiered library, screening for duplicates
    Ingest {
        /// Library root directory
        #[arg(short, long, value_name = "DIR")]
        library: PathBuf,
        /// File or directory to ingest
        #[arg(short, long, value_name = "PATH")]
        path: PathBuf,
        /// Apply one action to every conflict instead of listing them
        /// (keep_existing, replace_with_new, keep_both)
        #[arg(long, value_name = "ACTION")]
        resolve: Option<String>,
    },

    /// Screen a file against a library without admitting it
    Check {
        /// Library root directory
        #[arg(short, long, value_name = "DIR")]
        library: PathBuf,
        /// File to screen
        #[arg(short, long, value_name = "FILE")]
        path: PathBuf,
    },

    /// Group a folder of photos into burst sequences
    Bursts {
        /// Directory to analyze
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Print the hashes and EXIF summary of a single file
    Inspect {
        /// File to inspect
        #[arg(short, long, value_name = "FILE")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    colog::init();
    let cli = Cli::parse();
    let config = EngineConfig::default();

    match cli.command {
        Commands::Ingest {
            library,
            path,
            resolve,
        } => {
            let action = resolve
                .as_deref()
                .map(|s| s.parse::<ResolutionAction>())
                .transpose()?;

            let media_library = MediaLibrary::new(&library);
            media_library.init().with_context(|| {
                format!("Failed to initialize library at {}", library.display())
            })?;
            let store = Arc::new(MemoryStore::new());
            let pipeline = IngestPipeline::new(store.clone(), media_library.clone(), &config);

            println!("▶ Ingesting {} into {}", path.display(), library.display());
            let mut report = if path.is_dir() {
                pipeline.ingest_dir(&path)?
            } else {
                pipeline.ingest_file(&path)?
            };

            if let Some(action) = action {
                let resolver =
                    tierkeep::DuplicateConflictResolver::new(store, media_library, &config);
                for (incoming, conflicts) in report.conflicts.drain(..) {
                    let name = incoming.original_filename.clone();
                    let outcome = resolver.resolve(incoming, &conflicts[0].existing.id, action)?;
                    match outcome {
                        ResolutionOutcome::Skipped => println!("   📦 Skipped {name}"),
                        ResolutionOutcome::Replaced(v) => {
                            println!("   🔄 Replaced {} with {name}", v.file_path)
                        }
                        ResolutionOutcome::Admitted(v) => {
                            println!("   ✅ Admitted {name} as {}", v.id)
                        }
                    }
                }
            }

            println!(
                "\n✅ Admitted {} file(s), skipped {} exact duplicate(s)",
                report.admitted.len(),
                report.skipped.len()
            );
            for version in &report.admitted {
                println!("   ▶ {}", version.file_path);
            }
            for (incoming, conflicts) in &report.conflicts {
                println!("\n⚠️  Conflict: {}", incoming.original_filename);
                for conflict in conflicts {
                    println!(
                        "   vs {} ({:.2}% similar, suggested: {:?})",
                        conflict.existing_filename, conflict.similarity, conflict.suggested_action
                    );
                    for reason in &conflict.reasoning {
                        println!("     - {reason}");
                    }
                }
            }
            if !report.failed.is_empty() {
                println!("\n⚠️  {} file(s) failed to prepare:", report.failed.len());
                for (path, error) in &report.failed {
                    println!("   ✗ {}: {error}", path.display());
                }
            }
        }

        Commands::Check { library, path } => {
            let media_library = MediaLibrary::new(&library);
            let store = Arc::new(MemoryStore::new());
            let pipeline = IngestPipeline::new(store, media_library, &config);

            let incoming = pipeline
                .prepare(&path)
                .with_context(|| format!("Failed to prepare {}", path.display()))?;
            let temp = incoming.temp_path.clone();
            let outcome = pipeline.check(&incoming)?;
            std::fs::remove_file(&temp).ok();

            match outcome {
                tierkeep::CheckOutcome::AutoSkipped { existing } => {
                    println!("📦 Exact duplicate of {}", existing.file_path);
                }
                tierkeep::CheckOutcome::ConflictPending(conflicts) => {
                    println!("⚠️  {} conflict(s):", conflicts.len());
                    for conflict in &conflicts {
                        println!(
                            "   vs {} ({:.2}% similar, suggested: {:?})",
                            conflict.existing_filename,
                            conflict.similarity,
                            conflict.suggested_action
                        );
                        for reason in &conflict.reasoning {
                            println!("     - {reason}");
                        }
                    }
                }
                tierkeep::CheckOutcome::AutoAdmitted => {
                    println!("✅ No duplicates; would be admitted");
                }
            }
        }

        Commands::Bursts { path } => {
            println!("▶ Scanning for burst sequences in: {}", path.display());
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            spinner.set_message("Reading photos…");
            spinner.enable_steady_tick(Duration::from_millis(100));
            let records = collect_records(&path);
            spinner.finish_with_message(format!("Read {} photo(s)", records.len()));

            let grouper = BurstGrouper::new(&config);
            let analysis = grouper.analyze(&records);
            if analysis.groups.is_empty() {
                println!("No burst sequences found.");
                return Ok(());
            }

            println!("Found {} burst group(s):", analysis.groups.len());
            for (i, group) in analysis.groups.iter().enumerate() {
                println!("\n✨ Group {} ({}):", i + 1, group.group_reason);
                for member in &group.members {
                    let marker = if member.version.id == group.suggested_best {
                        "🏆"
                    } else {
                        "▶"
                    };
                    println!("   {marker} {}", member.original_filename);
                }
            }
        }

        Commands::Inspect { path } => {
            let content = ContentHashService::new();
            let hash = content
                .compute_content_hash(&path)
                .with_context(|| format!("Failed to hash {}", path.display()))?;
            println!("▶ {}", path.display());
            println!("   sha256: {hash}");

            if let Some(phash) = PerceptualHasher::default().hash_path(&path) {
                println!("   perceptual: {phash}");
            }
            match ExifService::new().extract(&path) {
                Ok(Some(exif)) => {
                    if let Some(taken) = exif.date_time_original {
                        println!("   taken: {taken}");
                    }
                    if let (Some(make), Some(model)) = (&exif.make, &exif.model) {
                        println!("   camera: {make} {model}");
                    }
                    if let Some(software) = &exif.software {
                        println!("   software: {software}");
                    }
                }
                Ok(None) => println!("   no EXIF data"),
                Err(e) => println!("   ⚠️  EXIF read failed: {e}"),
            }
        }
    }

    Ok(())
}
