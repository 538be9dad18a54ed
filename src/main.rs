use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pruner::core::export::export_photos;
use pruner::core::policy::{HeuristicConfig, DEFAULT_THRESHOLD};
use pruner::core::review::{keep_first, pick_group_photo, ReviewSummary};
use pruner::core::scanner::{ScanPhase, ScannerService};
use pruner::{
    diff_collection, Database, DuplicateGroupBuilder, EngineConfig, Group, GroupKind, Photo,
    PhotoId, PhotoStatus, PolicyConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "pruner", version, about = "Find duplicate photos and curate what to keep")]
struct Cli {
    /// JSON config file (default: ~/Documents/Pruner/config.json if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the config)
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a folder and reconcile it with the stored collection
    Sync {
        #[arg(short, long, value_name = "ID")]
        collection: String,
        /// Folder holding the collection's photos
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Duplicate detection
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },

    /// Inspect stored groups
    Groups {
        #[command(subcommand)]
        command: GroupsCmd,
    },

    /// Record keep/maybe/discard decisions
    Review {
        #[command(subcommand)]
        command: ReviewCmd,
    },

    /// Copy every kept photo into a folder
    Export {
        #[arg(short, long, value_name = "ID")]
        collection: String,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// Group byte-identical photos
    Exact {
        #[arg(short, long, value_name = "ID")]
        collection: String,
    },

    /// Group visually similar photos
    Similar {
        #[arg(short, long, value_name = "ID")]
        collection: String,
        /// Similarity policy (default: the one in the config)
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        /// Maximum differing fingerprint bits for the perceptual policy
        #[arg(long)]
        threshold: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum GroupsCmd {
    /// List groups with their members
    List {
        #[arg(short, long, value_name = "ID")]
        collection: String,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
}

#[derive(Subcommand, Debug)]
enum ReviewCmd {
    /// Keep one photo of a group
    Pick {
        #[arg(long, value_name = "GROUP_ID")]
        group: Uuid,
        /// Photo to keep (default: the group's first photo, discarding the rest)
        #[arg(long, value_name = "PHOTO_ID")]
        keep: Option<String>,
        /// Mark the other members for discard
        #[arg(long)]
        reject_others: bool,
    },

    /// Set the status of one photo
    Set {
        #[arg(long, value_name = "PHOTO_ID")]
        photo: String,
        #[arg(long, value_enum)]
        status: StatusArg,
    },

    /// Show review progress for a collection
    Summary {
        #[arg(short, long, value_name = "ID")]
        collection: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Perceptual,
    Heuristic,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Exact,
    Similar,
}

impl From<KindArg> for GroupKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Exact => GroupKind::Exact,
            KindArg::Similar => GroupKind::Similar,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Unreviewed,
    Keep,
    Maybe,
    Discard,
}

impl From<StatusArg> for PhotoStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Unreviewed => PhotoStatus::Unreviewed,
            StatusArg::Keep => PhotoStatus::Keep,
            StatusArg::Maybe => PhotoStatus::Maybe,
            StatusArg::Discard => PhotoStatus::Discard,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let db_path = match &cli.database {
        Some(path) => path.clone(),
        None => config.database_path()?,
    };
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match cli.command {
        Commands::Sync { collection, path } => {
            println!("▶ Syncing {} from {}", collection, path.display());
            let report = scan_with_progress(&config, &collection, path).await?;

            let stored = db.photos().stored_records(&collection)?;
            let diff = diff_collection(&report.photos, &stored);
            let result = db.photos().apply_sync(&collection, &diff)?;

            println!(
                "✅ {} added, {} removed, {} restored, {} total",
                result.added, result.removed, result.restored, result.total
            );
            if report.missing_file_count > 0 || report.unsupported_count > 0 {
                println!(
                    "⚠️  {} unreadable file(s) skipped, {} photo(s) without fingerprint",
                    report.missing_file_count, report.unsupported_count
                );
            }
        }

        Commands::Duplicates { command } => match command {
            Dups::Exact { collection } => {
                let mut photos = load_present_photos(&db, &collection)?;
                println!("▶ Looking for exact duplicates among {} photos", photos.len());

                let builder = DuplicateGroupBuilder::new();
                cancel_on_ctrl_c(builder.get_cancellation_token());
                let analysis =
                    benchmark("exact grouping", || builder.build_exact_groups(&mut photos))?;

                let hashes: HashMap<PhotoId, &str> = photos
                    .iter()
                    .filter_map(|p| p.content_hash.as_deref().map(|h| (p.id, h)))
                    .collect();
                for id in &analysis.newly_hashed {
                    if let Some(hash) = hashes.get(id) {
                        db.photos().update_content_hash(id, hash)?;
                    }
                }
                db.groups()
                    .replace_groups(&collection, GroupKind::Exact, &analysis.groups)?;

                print_groups(&analysis.groups, &photos);
                println!(
                    "\n✅ {} group(s), {} duplicate photo(s); {} hashed, {} missing",
                    analysis.groups.len(),
                    analysis.duplicate_photo_count,
                    analysis.hashed_count,
                    analysis.missing_file_count
                );
            }

            Dups::Similar {
                collection,
                policy,
                threshold,
            } => {
                let policy_config = resolve_policy(policy, threshold, &config)?;
                let policy = policy_config.build();
                let photos = load_present_photos(&db, &collection)?;
                println!(
                    "▶ Looking for similar photos among {} photos ({} policy)",
                    photos.len(),
                    policy.name()
                );

                let builder = DuplicateGroupBuilder::new();
                cancel_on_ctrl_c(builder.get_cancellation_token());
                let analysis = benchmark("similar grouping", || {
                    builder.build_similar_groups(&photos, policy.as_ref())
                })?;
                db.groups()
                    .replace_groups(&collection, GroupKind::Similar, &analysis.groups)?;

                print_groups(&analysis.groups, &photos);
                println!(
                    "\n✅ {} group(s), {} photo(s); {} candidate(s), {} skipped, {} compared",
                    analysis.groups.len(),
                    analysis.candidate_photo_count,
                    analysis.candidate_count,
                    analysis.skipped_count,
                    analysis.compared_pairs
                );
            }
        },

        Commands::Groups { command } => match command {
            GroupsCmd::List { collection, kind } => {
                let groups = db.groups().load_groups(&collection, kind.map(GroupKind::from))?;
                if groups.is_empty() {
                    println!("No groups found.");
                } else {
                    let photos = db.photos().load_photos(&collection)?;
                    print_groups(&groups, &photos);
                }
            }
        },

        Commands::Review { command } => match command {
            ReviewCmd::Pick {
                group,
                keep,
                reject_others,
            } => {
                let group = db
                    .groups()
                    .find_group(&group)?
                    .with_context(|| format!("No group {}", group))?;

                let updates = match keep {
                    Some(keep) => {
                        let keep_id = parse_photo_id(&keep)?;
                        pick_group_photo(&group, keep_id, reject_others)?
                    }
                    None => keep_first(&group)?,
                };
                db.photos().set_statuses(&updates)?;

                for (id, status) in &updates {
                    println!("   {} → {}", id, status.as_str());
                }
            }

            ReviewCmd::Set { photo, status } => {
                let id = parse_photo_id(&photo)?;
                let status = PhotoStatus::from(status);
                db.photos().set_status(&id, status)?;
                println!("✅ {} → {}", id, status.as_str());
            }

            ReviewCmd::Summary { collection } => {
                let photos = db.photos().load_photos(&collection)?;
                let groups = db.groups().load_groups(&collection, None)?;
                let summary = ReviewSummary::from_photos(&photos, &groups);

                println!("🗂️  {}: {} photos", collection, summary.total);
                println!(
                    "   reviewed {} (keep {}, maybe {}, discard {}), unreviewed {}",
                    summary.reviewed(),
                    summary.keep,
                    summary.maybe,
                    summary.discard,
                    summary.unreviewed
                );
                println!(
                    "   {} exact group(s), {} similar group(s), {} missing file(s)",
                    summary.exact_groups, summary.similar_groups, summary.missing
                );
            }
        },

        Commands::Export { collection, output } => {
            let photos = db.photos().load_photos(&collection)?;
            let result = export_photos(&photos, &output)?;
            println!(
                "✅ Exported {} photo(s) to {} ({} skipped, {} failed)",
                result.exported,
                output.display(),
                result.skipped,
                result.failed
            );
        }
    }

    Ok(())
}

/// Scan on a blocking worker while rendering its progress.
async fn scan_with_progress(
    config: &EngineConfig,
    collection: &str,
    path: PathBuf,
) -> Result<pruner::core::scanner::ScanReport> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scanner = ScannerService::new(config.scan.clone()).with_progress_sender(tx);
    cancel_on_ctrl_c(scanner.get_cancellation_token());
    let collection = collection.to_string();
    let scan = tokio::task::spawn_blocking(move || scanner.scan_collection(&collection, &path));

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    bar.enable_steady_tick(Duration::from_millis(100));

    while let Some(progress) = rx.recv().await {
        match progress.phase {
            ScanPhase::Discovery => bar.set_message(progress.current_file),
            ScanPhase::Processing => {
                if bar.length() != Some(progress.total_files as u64) {
                    bar.set_length(progress.total_files as u64);
                    bar.set_style(ProgressStyle::with_template(
                        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}",
                    )?);
                }
                bar.set_position(progress.files_processed as u64);
                bar.set_message(progress.current_file);
            }
            ScanPhase::Complete => bar.finish_with_message("Scan complete"),
        }
    }

    let report = scan.await.context("Scan worker failed")??;
    Ok(report)
}

/// Turn Ctrl-C into a cancellation request so a long pass stops before
/// anything is written to the database.
fn cancel_on_ctrl_c(token: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹ Cancelling...");
            token.store(true, Ordering::Relaxed);
        }
    });
}

/// Photos of the collection whose files are still on disk.
fn load_present_photos(db: &Database, collection: &str) -> Result<Vec<Photo>> {
    let mut photos = db.photos().load_photos(collection)?;
    photos.retain(|p| p.file_exists);
    Ok(photos)
}

fn resolve_policy(
    policy: Option<PolicyArg>,
    threshold: Option<u32>,
    config: &EngineConfig,
) -> Result<PolicyConfig> {
    // A policy named on the command line reuses the config's tuning when the
    // config selects the same policy.
    let selected = match (policy, config.similarity_policy.clone()) {
        (Some(PolicyArg::Perceptual), Some(configured @ PolicyConfig::Perceptual { .. })) => {
            configured
        }
        (Some(PolicyArg::Perceptual), _) => PolicyConfig::Perceptual {
            threshold: DEFAULT_THRESHOLD,
        },
        (Some(PolicyArg::Heuristic), Some(configured @ PolicyConfig::Heuristic(_))) => configured,
        (Some(PolicyArg::Heuristic), _) => PolicyConfig::Heuristic(HeuristicConfig::default()),
        (None, Some(configured)) => configured,
        (None, None) => bail!("Select a similarity policy with --policy or in the config file"),
    };

    let resolved = match (selected, threshold) {
        (PolicyConfig::Perceptual { .. }, Some(threshold)) => {
            PolicyConfig::Perceptual { threshold }
        }
        (PolicyConfig::Heuristic(_), Some(_)) => {
            bail!("--threshold only applies to the perceptual policy")
        }
        (selected, None) => selected,
    };
    resolved.validate()?;
    Ok(resolved)
}

fn parse_photo_id(value: &str) -> Result<PhotoId> {
    PhotoId::parse(value).with_context(|| format!("Invalid photo id {:?}", value))
}

fn print_groups(groups: &[Group], photos: &[Photo]) {
    let by_id: HashMap<PhotoId, &Photo> = photos.iter().map(|p| (p.id, p)).collect();

    for (i, group) in groups.iter().enumerate() {
        println!(
            "\n✨ Group {} [{}] {} (confidence {:.2}):",
            i + 1,
            group.kind.as_str(),
            group.id,
            group.confidence
        );
        for member in &group.members {
            let marker = if member.rank == 0 { "🏆" } else { "▶" };
            match by_id.get(&member.photo_id) {
                Some(photo) => println!(
                    "   {} {} {} [{}]",
                    marker,
                    member.photo_id,
                    photo.source_path.display(),
                    photo.status.as_str()
                ),
                None => println!("   {} {}", marker, member.photo_id),
            }
        }
    }
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
