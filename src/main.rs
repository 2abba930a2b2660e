use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use triago_assign::{
    AssignmentEngine, AssignmentOutcome, CapacityGate, CoefficientGrid, Confusion, GridSearch,
    PrecisionMode,
};
use triago_cache::{CacheIndex, IssueCache};
use triago_core::{OutputFormat, TriagoConfig};
use triago_store::IssueStore;
use triago_tracker::{BugzillaClient, RunMode};

#[derive(Parser)]
#[command(
    name = "triago",
    version,
    about = "Bugzilla triage analytics — who should fix this bug?",
    long_about = "Triago scores every open, unassigned bug against the developers who have\n\
                   historically touched the same component and priority, and recommends an\n\
                   assignee per bug.\n\n\
                   The pipeline is three separable steps: scrape the tracker into a local\n\
                   cache, import the cache into SQLite, then assign from the aggregates.\n\n\
                   Examples:\n  \
                     triago init                     Create a .triago.toml config file\n  \
                     triago scrape                   Sweep the tracker into the cache\n  \
                     triago scrape --test-mode       Sweep with held-out ground truth\n  \
                     triago import                   Load the cache into SQLite\n  \
                     triago assign --evaluate        Recommend assignees and score them\n  \
                     triago tune --grid-step 0.25    Grid-search the scoring weights"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .triago.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text  Human-readable tables and summaries (default)\n  \
                         json  Machine-readable JSON with camelCase keys"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,

    /// Path to the issue database (default: .triago/issues.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for cached scrape results
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep the bug tracker into the local cache
    #[command(long_about = "Sweep the bug tracker into the local cache.\n\n\
        Fetches recently fixed bugs, open unassigned bugs, and open assigned bugs,\n\
        prunes open bugs whose dependencies are unresolved, then pulls attachments,\n\
        comments, and history for the remaining bugs. Everything lands in the cache\n\
        as JSON keyed by source URL; no database is touched.\n\n\
        Examples:\n  triago scrape\n  triago scrape --test-mode")]
    Scrape {
        /// Hold out a third of historically fixed bugs as ground truth
        #[arg(
            long,
            long_help = "Evaluation sweep.\n\nFetches fixed bugs from the period before the open\n\
                window and re-opens a third of them, recording their real assignee.\n\
                Use 'triago assign --evaluate' afterwards to score the recommendations."
        )]
        test_mode: bool,
    },
    /// Import cached scrape results into the issue database
    #[command(long_about = "Import cached scrape results into the issue database.\n\n\
        Re-registers the project (dropping any earlier import), seeds the placeholder\n\
        developer, derives priority/severity ordinals, and bulk-loads bugs, cc lists,\n\
        relations, attachments, comments, and history.\n\n\
        Example:\n  triago import")]
    Import,
    /// Recommend an assignee for every open, unassigned bug
    #[command(long_about = "Recommend an assignee for every open, unassigned bug.\n\n\
        Scores each bug's candidate developers on availability, collaborativity,\n\
        competency, productivity, and reliability, gates them on remaining capacity,\n\
        and greedily assigns the best-ranked candidate. Picks are written back to\n\
        the database.\n\n\
        Examples:\n  triago assign\n  triago assign --evaluate\n  triago assign --evaluate --conventional-metrics")]
    Assign {
        /// Score the picks against held-out real assignees
        #[arg(long)]
        evaluate: bool,
        /// Use textbook precision/recall instead of the legacy orientation
        #[arg(
            long,
            long_help = "Use the textbook precision/recall orientation.\n\nThe default legacy mode\n\
                computes precision as tp/(tp+fn) and recall as tp/(tp+fp), matching the\n\
                tool's historical reports. F-measure is unaffected by the choice."
        )]
        conventional_metrics: bool,
    },
    /// Grid-search the scoring weights against held-out assignees
    #[command(long_about = "Grid-search the scoring weights against held-out assignees.\n\n\
        Enumerates the full Cartesian product of candidate weight values, re-runs the\n\
        assignment pass for each vector, and keeps the best F-measure. A vector that\n\
        leaves any bug unassigned scores 0. Requires an import from a --test-mode\n\
        scrape.\n\n\
        Examples:\n  triago tune\n  triago tune --grid-step 0.1\n  triago tune --values 0.0,0.2,0.5,1.0")]
    Tune {
        /// Step between candidate values in [0, 1] (default: 0.25)
        #[arg(long, default_value = "0.25")]
        grid_step: f64,
        /// Explicit comma-separated candidate values for every weight
        #[arg(long, value_delimiter = ',')]
        values: Vec<f64>,
        /// Use textbook precision/recall instead of the legacy orientation
        #[arg(long)]
        conventional_metrics: bool,
    },
    /// Create a default .triago.toml configuration file
    #[command(long_about = "Create a default .triago.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .triago.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[33m⚡\x1b[0m \x1b[1mtriago\x1b[0m v{version} — who should fix this bug?\n");

        println!("Quick start:");
        println!("  \x1b[36mtriago init\x1b[0m                Create a .triago.toml config file");
        println!("  \x1b[36mtriago scrape\x1b[0m              Sweep the tracker into the cache");
        println!("  \x1b[36mtriago import\x1b[0m              Load the cache into SQLite");
        println!("  \x1b[36mtriago assign\x1b[0m              Recommend an assignee per bug\n");

        println!("All commands:");
        println!("  \x1b[32mscrape\x1b[0m   Sweep the bug tracker into the local cache");
        println!("  \x1b[32mimport\x1b[0m   Import cached results into the issue database");
        println!("  \x1b[32massign\x1b[0m   Recommend assignees, optionally scored vs ground truth");
        println!("  \x1b[32mtune\x1b[0m     Grid-search the scoring weights");
        println!("  \x1b[32minit\x1b[0m     Create default configuration\n");
    } else {
        println!("triago v{version} — who should fix this bug?\n");

        println!("Quick start:");
        println!("  triago init                Create a .triago.toml config file");
        println!("  triago scrape              Sweep the tracker into the cache");
        println!("  triago import              Load the cache into SQLite");
        println!("  triago assign              Recommend an assignee per bug\n");

        println!("All commands:");
        println!("  scrape   Sweep the bug tracker into the local cache");
        println!("  import   Import cached results into the issue database");
        println!("  assign   Recommend assignees, optionally scored vs ground truth");
        println!("  tune     Grid-search the scoring weights");
        println!("  init     Create default configuration\n");
    }

    println!("Run 'triago <command> --help' for details.");
}

const DEFAULT_CONFIG: &str = r#"# Triago Configuration
# See: https://github.com/triago-dev/triago

[tracker]
# base_url = "https://bugzilla.mozilla.org/"
# product = "Firefox"
# project_name = "firefox"
# unassigned_login = "nobody@mozilla.org"
# fetch_limit = 200

[scoring]
# time_increment = 1.1
# bug_opened_days = 60
# bug_fixed_days = 90

[scoring.weights]
# availability = 0.2
# collaborativity = 0.15
# competency = 0.15
# productivity = 0.3
# reliability = 0.2

[ranks]
# priorities = ["P1", "P2"]
# severities = ["blocker", "critical", "major", "normal", "minor", "trivial"]

[cache]
# directory = "/home/me/.triago/cache"
"#;

fn load_config(path: &Option<PathBuf>) -> Result<TriagoConfig> {
    let config = match path {
        Some(path) => TriagoConfig::from_file(path).into_diagnostic()?,
        None => {
            let default_path = Path::new(".triago.toml");
            if default_path.exists() {
                TriagoConfig::from_file(default_path).into_diagnostic()?
            } else {
                TriagoConfig::default()
            }
        }
    };
    config.validate().into_diagnostic()?;
    Ok(config)
}

fn resolve_cache_dir(flag: &Option<PathBuf>, config: &TriagoConfig) -> PathBuf {
    flag.clone()
        .or_else(|| config.cache.directory.clone())
        .or_else(|| dirs::home_dir().map(|home| home.join(".triago/cache")))
        .unwrap_or_else(|| PathBuf::from(".triago/cache"))
}

fn resolve_db_path(flag: &Option<PathBuf>) -> PathBuf {
    flag.clone()
        .unwrap_or_else(|| PathBuf::from(".triago/issues.db"))
}

/// Project name the import is registered under; falls back to the
/// product when the config names no project.
fn project_name(config: &TriagoConfig) -> String {
    if config.tracker.project_name.is_empty() {
        config.tracker.product.clone()
    } else {
        config.tracker.project_name.clone()
    }
}

fn section_url<'a>(index: &'a CacheIndex, section: &str) -> Result<&'a str> {
    index
        .url_for(section)
        .ok_or_else(|| miette::miette!("cache index is missing the '{section}' section"))
}

fn open_project(store: &IssueStore, config: &TriagoConfig) -> Result<i64> {
    let name = project_name(config);
    store
        .project_id(&config.tracker.base_url, &name)
        .into_diagnostic()?
        .ok_or_else(|| {
            miette::miette!(
                help = "run 'triago scrape' and 'triago import' first",
                "project '{name}' has not been imported yet"
            )
        })
}

fn print_assign_summary(
    outcome: &AssignmentOutcome,
    project_id: i64,
    evaluation: Option<(PrecisionMode, triago_assign::Evaluation)>,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let mut body = serde_json::json!({
                "projectId": project_id,
                "biddableBugs": outcome.biddable_bugs,
                "assigned": outcome.assignments.len(),
                "assignments": outcome.assignments,
            });
            if let Some((mode, eval)) = evaluation {
                body["evaluation"] = serde_json::json!({
                    "mode": mode,
                    "precision": eval.precision,
                    "recall": eval.recall,
                    "fMeasure": eval.f_measure,
                });
            }
            println!("{}", serde_json::to_string_pretty(&body).into_diagnostic()?);
        }
        OutputFormat::Text => {
            println!(
                "Assigned {} of {} biddable bugs.",
                outcome.assignments.len(),
                outcome.biddable_bugs
            );
            for (bug_id, ranked) in &outcome.assignments {
                println!(
                    "  #{bug_id}  →  {}  (rank {:.3})",
                    ranked.developer, ranked.rank
                );
            }
            if let Some((mode, eval)) = evaluation {
                let label = match mode {
                    PrecisionMode::Legacy => "legacy",
                    PrecisionMode::Conventional => "conventional",
                };
                println!(
                    "\nEvaluation ({label}): precision {:.3}, recall {:.3}, F {:.3}",
                    eval.precision, eval.recall, eval.f_measure
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    if cli.verbose {
        eprintln!("format: {}", cli.format);
        eprintln!(
            "tracker: {} product '{}'",
            config.tracker.base_url, config.tracker.product
        );
        eprintln!(
            "windows: {} days open, {} days fixed, increment {}",
            config.scoring.bug_opened_days,
            config.scoring.bug_fixed_days,
            config.scoring.time_increment
        );
    }

    match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Scrape { test_mode }) => {
            if config.tracker.product.is_empty() {
                miette::bail!(miette::miette!(
                    help = "set product in .triago.toml under [tracker]",
                    "no product configured for the tracker sweep"
                ));
            }

            let mode = if test_mode {
                RunMode::Test
            } else {
                RunMode::Analysis
            };
            let client = BugzillaClient::new(&config);
            eprintln!("Sweeping {} ...", config.tracker.base_url);
            let snapshot = client.snapshot(mode).await.into_diagnostic()?;

            let cache = IssueCache::new(resolve_cache_dir(&cli.cache_dir, &config));
            let mut index = CacheIndex::default();

            // Sections that needed no fetch carry an empty source URL, so
            // the section name goes into the key to keep them distinct.
            let key = |section: &str, url: &str| format!("{section}:{url}");

            let bugs_key = key("bugs", &snapshot.urls.bugs);
            cache.put(&bugs_key, &snapshot.bugs).into_diagnostic()?;
            index.insert("bugs", bugs_key);
            let developers_key = key("developers", &snapshot.urls.developers);
            cache
                .put(&developers_key, &snapshot.developers)
                .into_diagnostic()?;
            index.insert("developers", developers_key);
            let attachments_key = key("attachments", &snapshot.urls.attachments);
            cache
                .put(&attachments_key, &snapshot.attachments)
                .into_diagnostic()?;
            index.insert("attachments", attachments_key);
            let comments_key = key("comments", &snapshot.urls.comments);
            cache
                .put(&comments_key, &snapshot.comments)
                .into_diagnostic()?;
            index.insert("comments", comments_key);
            let history_key = key("history", &snapshot.urls.history);
            cache
                .put(&history_key, &snapshot.history)
                .into_diagnostic()?;
            index.insert("history", history_key);
            let relations_key = key("relations", &snapshot.urls.relations);
            cache
                .put(&relations_key, &snapshot.relations)
                .into_diagnostic()?;
            index.insert("relations", relations_key);
            cache.write_index(&index).into_diagnostic()?;

            eprintln!(
                "Cached {} bugs, {} developers, {} attachments, {} comments, {} history entries.",
                snapshot.bugs.len(),
                snapshot.developers.len(),
                snapshot.attachments.len(),
                snapshot.comments.len(),
                snapshot.history.len(),
            );
        }
        Some(Command::Import) => {
            let cache = IssueCache::new(resolve_cache_dir(&cli.cache_dir, &config));
            if !cache.index_exists() {
                miette::bail!(miette::miette!(
                    help = "run 'triago scrape' first",
                    "no cached scrape results at {}",
                    cache.root().display()
                ));
            }
            let index = cache.read_index().into_diagnostic()?;

            use std::collections::BTreeMap;
            use triago_core::{Attachment, Bug, BugRelation, Comment, Developer, HistoryChange};
            let bugs: BTreeMap<i64, Bug> =
                cache.get(section_url(&index, "bugs")?).into_diagnostic()?;
            let developers: BTreeMap<String, Developer> =
                cache.get(section_url(&index, "developers")?).into_diagnostic()?;
            let attachments: Vec<Attachment> =
                cache.get(section_url(&index, "attachments")?).into_diagnostic()?;
            let comments: Vec<Comment> =
                cache.get(section_url(&index, "comments")?).into_diagnostic()?;
            let history: Vec<HistoryChange> =
                cache.get(section_url(&index, "history")?).into_diagnostic()?;
            let relations: Vec<BugRelation> =
                cache.get(section_url(&index, "relations")?).into_diagnostic()?;

            let mut store = IssueStore::open(&resolve_db_path(&cli.db)).into_diagnostic()?;
            let project_id = store
                .upsert_project(
                    &config.tracker.base_url,
                    &project_name(&config),
                    &config.tracker.unassigned_login,
                )
                .into_diagnostic()?;

            let developers: Vec<Developer> = developers.into_values().collect();
            store
                .add_developers(project_id, &developers, &config.tracker.unassigned_login)
                .into_diagnostic()?;
            let bugs: Vec<Bug> = bugs.into_values().collect();
            store
                .add_bugs(project_id, &bugs, &config.ranks, Utc::now())
                .into_diagnostic()?;
            store
                .add_relations(project_id, &relations)
                .into_diagnostic()?;
            store
                .add_attachments(project_id, &attachments)
                .into_diagnostic()?;
            store.add_comments(project_id, &comments).into_diagnostic()?;
            store.add_history(project_id, &history).into_diagnostic()?;

            eprintln!(
                "Imported {} bugs, {} developers, {} attachments, {} comments, {} history entries (project {project_id}).",
                bugs.len(),
                developers.len(),
                attachments.len(),
                comments.len(),
                history.len(),
            );
        }
        Some(Command::Assign {
            evaluate,
            conventional_metrics,
        }) => {
            let mut store = IssueStore::open(&resolve_db_path(&cli.db)).into_diagnostic()?;
            let project_id = open_project(&store, &config)?;

            let input = store.assignment_input(project_id).into_diagnostic()?;
            let gate = CapacityGate::new(&config.scoring).into_diagnostic()?;
            let engine = AssignmentEngine::new(input, gate);
            let outcome = engine.run(&config.scoring.weights);

            store
                .add_assignments(&outcome.to_rows(project_id))
                .into_diagnostic()?;

            let evaluation = if evaluate {
                let truth = store.ground_truth(project_id).into_diagnostic()?;
                if truth.is_empty() {
                    miette::bail!(miette::miette!(
                        help = "scrape with --test-mode to hold out ground truth",
                        "project {project_id} has no held-out assignees to evaluate against"
                    ));
                }
                let mode = if conventional_metrics {
                    PrecisionMode::Conventional
                } else {
                    PrecisionMode::Legacy
                };
                let eval = Confusion::from_assignments(&outcome.picks(), &truth).evaluate(mode);
                Some((mode, eval))
            } else {
                None
            };

            print_assign_summary(&outcome, project_id, evaluation, cli.format)?;
        }
        Some(Command::Tune {
            grid_step,
            ref values,
            conventional_metrics,
        }) => {
            let store = IssueStore::open(&resolve_db_path(&cli.db)).into_diagnostic()?;
            let project_id = open_project(&store, &config)?;

            let truth = store.ground_truth(project_id).into_diagnostic()?;
            if truth.is_empty() {
                miette::bail!(miette::miette!(
                    help = "scrape with --test-mode, then import, before tuning",
                    "project {project_id} has no held-out assignees to tune against"
                ));
            }

            let input = store.assignment_input(project_id).into_diagnostic()?;
            let gate = CapacityGate::new(&config.scoring).into_diagnostic()?;
            let engine = AssignmentEngine::new(input, gate);

            let grid = if values.is_empty() {
                CoefficientGrid::with_step(grid_step).into_diagnostic()?
            } else {
                CoefficientGrid::uniform(values.clone())
            };
            let total = grid.vector_count();
            if total == 0 {
                miette::bail!("the coefficient grid is empty");
            }

            let mode = if conventional_metrics {
                PrecisionMode::Conventional
            } else {
                PrecisionMode::Legacy
            };
            let search = GridSearch::new(&engine, &truth, mode);

            let is_tty = std::io::stderr().is_terminal();
            let bar = if is_tty {
                let pb = indicatif::ProgressBar::new(total as u64);
                pb.set_style(
                    indicatif::ProgressStyle::with_template(
                        "{bar:40.cyan/blue} {pos}/{len} vectors ({elapsed})",
                    )
                    .unwrap(),
                );
                Some(pb)
            } else {
                None
            };

            let result = search.run(&grid, |done, _total| {
                if let Some(pb) = &bar {
                    pb.set_position(done as u64);
                }
            });
            if let Some(pb) = bar {
                pb.finish_and_clear();
            }

            let Some(result) = result else {
                miette::bail!("the coefficient grid is empty");
            };

            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&result).into_diagnostic()?
                    );
                }
                OutputFormat::Text => {
                    let w = &result.best_weights;
                    println!("Tried {} weight vectors.", result.vectors_tried);
                    println!(
                        "Best F-measure {:.3} (precision {:.3}, recall {:.3}) with:",
                        result.best_score,
                        result.best_evaluation.precision,
                        result.best_evaluation.recall
                    );
                    println!("  availability     = {}", w.availability);
                    println!("  collaborativity  = {}", w.collaborativity);
                    println!("  competency       = {}", w.competency);
                    println!("  productivity     = {}", w.productivity);
                    println!("  reliability      = {}", w.reliability);
                }
            }
        }
        Some(Command::Init) => {
            let path = Path::new(".triago.toml");
            if path.exists() {
                miette::bail!(".triago.toml already exists. Remove it first to regenerate.");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .triago.toml");
            println!("Edit it to set your tracker URL and product, then run 'triago scrape'.");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}
