use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};

use classpulse_core::{PulseConfig, Semester};
use classpulse_metrics::ChartDataset;
use classpulse_pipeline::stages::keys;
use classpulse_pipeline::{GitHubClient, Pipeline, RemoteCollector, Stage, StageReport, WorkerPool};
use classpulse_store::{JsonFileStore, SnapshotStore, SnapshotStoreExt};

const CONFIG_FILE: &str = ".classpulse.toml";

#[derive(Parser)]
#[command(
    name = "classpulse",
    version,
    about = "Team-repository analytics for classroom software projects",
    long_about = "Classpulse collects the git history and hosting-platform activity of\n\
                   student team repositories, resolves commit authors to roster accounts,\n\
                   and aggregates per-semester chart data.\n\n\
                   Examples:\n  \
                     classpulse init                      Create a .classpulse.toml config file\n  \
                     classpulse run                       Run every stage for every semester\n  \
                     classpulse run --from reconcile      Re-run from stored snapshots\n  \
                     classpulse stage local -s 25spring   Re-extract one semester's clones\n  \
                     classpulse charts --format json      Print the chart dataset\n  \
                     classpulse assignments --classroom 1 Find a semester's assignment id\n  \
                     classpulse doctor                    Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .classpulse.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline from a stage to the end
    #[command(long_about = "Run the pipeline from a stage to the end.\n\n\
        Stages run in order: roster, teams, local, authors, activity, reconcile, charts.\n\
        Each stage saves its output to the snapshot store, so --from can resume a\n\
        run without repeating earlier collection.\n\n\
        Examples:\n  classpulse run\n  classpulse run --from authors --semester 24spring")]
    Run {
        /// First stage to run (default: roster)
        #[arg(long, default_value = "roster")]
        from: Stage,

        /// Semesters to process (default: all configured)
        #[arg(long, short)]
        semester: Vec<String>,
    },
    /// Run exactly one stage
    #[command(long_about = "Run exactly one stage.\n\n\
        Inputs are read from the snapshot store; the command fails with a hint\n\
        when a producing stage has not run yet.\n\n\
        Examples:\n  classpulse stage local\n  classpulse stage charts -s 25spring")]
    Stage {
        /// Stage to run
        stage: Stage,

        /// Semesters to process (default: all configured)
        #[arg(long, short)]
        semester: Vec<String>,
    },
    /// Print the stored chart dataset
    Charts {
        /// Print only these semesters
        #[arg(long, short)]
        semester: Vec<String>,
    },
    /// List classrooms, or one classroom's assignments
    #[command(long_about = "List classrooms, or one classroom's assignments.\n\n\
        Without --classroom, prints every classroom the token can see. With it,\n\
        prints that classroom's assignments; a group assignment's id is the\n\
        assignment_id a semester table needs.\n\n\
        Examples:\n  classpulse assignments\n  classpulse assignments --classroom 1296269")]
    Assignments {
        /// Classroom whose assignments to list
        #[arg(long, short)]
        classroom: Option<u64>,
    },
    /// Create a default .classpulse.toml configuration file
    #[command(long_about = "Create a default .classpulse.toml configuration file.\n\n\
        Generates a template with the default semester table.\n\
        Fails if .classpulse.toml already exists.")]
    Init,
    /// Check your setup and environment
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable summaries (default)
    Text,
    /// Machine-readable JSON
    Json,
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
        println!("\x1b[1mclasspulse\x1b[0m v{version} — team-repository analytics\n");
        println!("Quick start:");
        println!("  \x1b[36mclasspulse init\x1b[0m      Create a .classpulse.toml config file");
        println!("  \x1b[36mclasspulse doctor\x1b[0m    Check token, clones and store");
        println!("  \x1b[36mclasspulse run\x1b[0m       Collect and aggregate every semester\n");
    } else {
        println!("classpulse v{version} — team-repository analytics\n");
        println!("Quick start:");
        println!("  classpulse init      Create a .classpulse.toml config file");
        println!("  classpulse doctor    Check token, clones and store");
        println!("  classpulse run       Collect and aggregate every semester\n");
    }

    println!("Run 'classpulse <command> --help' for details.");
}

fn load_config(explicit: Option<&Path>) -> Result<PulseConfig> {
    match explicit {
        Some(path) => PulseConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("loading {}", path.display())),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                PulseConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err(format!("loading {CONFIG_FILE}"))
            } else {
                Ok(PulseConfig::default())
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn github_client(config: &PulseConfig) -> Result<GitHubClient> {
    let token = config.github_token().map_err(|e| {
        miette::miette!(
            help = "Set GITHUB_TOKEN or add github_token to .classpulse.toml",
            "{e}"
        )
    })?;
    GitHubClient::new(
        &token,
        &config.organization,
        Duration::from_secs(config.pipeline.request_timeout_secs),
    )
    .into_diagnostic()
}

/// Build the pipeline; the token is only demanded when a remote stage will run.
fn build_pipeline(config: &PulseConfig, stages: &[Stage]) -> Result<Pipeline> {
    let collector: Option<Arc<dyn RemoteCollector>> =
        if stages.iter().any(|s| s.needs_remote()) {
            Some(Arc::new(github_client(config)?))
        } else {
            None
        };

    let store = JsonFileStore::open(&config.store_dir)
        .into_diagnostic()
        .wrap_err(format!("opening store at {}", config.store_dir.display()))?;
    let pool = WorkerPool::new(
        config.pipeline.workers,
        Duration::from_secs(config.pipeline.repo_timeout_secs),
    );
    Ok(Pipeline::new(config.clone(), Arc::new(store), collector, pool))
}

async fn execute(
    pipeline: &Pipeline,
    stages: &[Stage],
    semesters: &[Semester],
) -> Result<Vec<StageReport>> {
    let token = pipeline.pool().cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });

    let mut reports = Vec::new();
    for stage in stages {
        reports.extend(pipeline.run_stage(*stage, semesters).await.into_diagnostic()?);
    }
    Ok(reports)
}

fn print_reports(reports: &[StageReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = reports
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "stage": r.stage.name(),
                        "semester": r.semester,
                        "completed": r.completed,
                        "failed": r.failed,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows).into_diagnostic()?);
        }
        OutputFormat::Text => {
            for r in reports {
                let scope = r.semester.as_deref().unwrap_or("-");
                println!(
                    "  {:<10} {:<10} {:>5} ok {:>5} failed",
                    r.stage.name(),
                    scope,
                    r.completed,
                    r.failed
                );
            }
        }
    }
    Ok(())
}

fn print_charts(config: &PulseConfig, semesters: &[String], format: OutputFormat) -> Result<()> {
    let store = JsonFileStore::open(&config.store_dir).into_diagnostic()?;
    let Some(mut dataset) = store.load_as::<ChartDataset>(keys::CHARTS).into_diagnostic()? else {
        miette::bail!(miette::miette!(
            help = "run `classpulse stage charts` first",
            "no chart dataset in {}",
            config.store_dir.display()
        ));
    };
    if !semesters.is_empty() {
        dataset.retain(|key, _| semesters.contains(key));
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&dataset).into_diagnostic()?);
        }
        OutputFormat::Text => {
            for (key, charts) in &dataset {
                let commits = &charts.commit_count_per_repo;
                let diff = &charts.contribution_difference;
                println!("{key}");
                println!("  repositories      {}", commits.group_names.len());
                println!("  avg commits       {}", commits.average_commit_count);
                println!("  avg lines         {}", charts.code_line_per_repo.average_lines);
                println!(
                    "  pull requests     {} merged, {} closed, {} open",
                    charts.pr_status_distribution.merged,
                    charts.pr_status_distribution.closed,
                    charts.pr_status_distribution.open
                );
                if let (Some(first), Some(last)) = (
                    charts.commit_time_distribution_date.full_dates.first(),
                    charts.commit_time_distribution_date.full_dates.last(),
                ) {
                    println!("  active days       {first} .. {last}");
                }
                let mean = |v: &[f64]| {
                    if v.is_empty() {
                        0.0
                    } else {
                        v.iter().sum::<f64>() / v.len() as f64
                    }
                };
                println!("  mean gini commits {:.3}", mean(&diff.gini_commit));
                println!("  mean gini lines   {:.3}", mean(&diff.gini_add_lines));
            }
        }
    }
    Ok(())
}

async fn print_assignments(
    collector: &dyn RemoteCollector,
    classroom: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    match classroom {
        None => {
            let classrooms = collector.list_classrooms().await.into_diagnostic()?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&classrooms).into_diagnostic()?);
                }
                OutputFormat::Text => {
                    for c in &classrooms {
                        let archived = if c.archived { "  (archived)" } else { "" };
                        println!("  {:>10}  {}{archived}", c.id, c.name);
                    }
                }
            }
        }
        Some(id) => {
            let assignments = collector.list_assignments(id).await.into_diagnostic()?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&assignments).into_diagnostic()?);
                }
                OutputFormat::Text => {
                    for a in &assignments {
                        println!(
                            "  {:>10}  {:<10} {:>4} accepted  {}",
                            a.id,
                            a.kind.as_deref().unwrap_or("-"),
                            a.accepted,
                            a.title
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

fn run_doctor(config: &PulseConfig, format: OutputFormat, use_color: bool) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    if Path::new(CONFIG_FILE).exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{CONFIG_FILE} found ({} semesters)", config.semesters.len()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{CONFIG_FILE} not found, using defaults"),
            "run 'classpulse init' to create a default config",
        ));
    }

    // 2. Token
    match config.github_token() {
        Ok(_) => checks.push(CheckResult::pass(
            "github_token",
            format!("configured for {}", config.organization),
        )),
        Err(_) => checks.push(CheckResult::fail(
            "github_token",
            "no token found",
            "export GITHUB_TOKEN or set github_token in .classpulse.toml",
        )),
    }

    // 3. Local clones per semester
    for semester in config.select_semesters(&[]).into_diagnostic()? {
        let dir = semester.submissions_path(&config.repos_dir);
        match classpulse_pipeline::mining::discover_repositories(&dir, &semester) {
            Ok(found) => checks.push(CheckResult::pass(
                "submissions",
                format!("{}: {} repositories in {}", semester.key, found.len(), dir.display()),
            )),
            Err(_) => checks.push(CheckResult::fail(
                "submissions",
                format!("{}: {} does not exist", semester.key, dir.display()),
                "clone the team repositories or set submissions_dir",
            )),
        }
    }

    // 4. Snapshot store
    if config.store_dir.is_dir() {
        let store = JsonFileStore::open(&config.store_dir).into_diagnostic()?;
        let count = store.keys().into_diagnostic()?.len();
        checks.push(CheckResult::info(
            "snapshot_store",
            format!("{count} snapshots in {}", config.store_dir.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "snapshot_store",
            format!("{} will be created on first run", config.store_dir.display()),
        ));
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Text => {
            let version = env!("CARGO_PKG_VERSION");
            println!("classpulse v{version} — Environment Check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<16} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Classpulse Configuration

# organization = "sustech-cs304"
# repos_dir = "./repos"
# store_dir = "./.classpulse"
# github_token = ""          # prefer the GITHUB_TOKEN environment variable

[pipeline]
# workers = 16
# repo_timeout_secs = 60
# request_timeout_secs = 15
# single_file_line_limit = 2000
# extensions = [".py", ".java", ".js", ".jsx", ".ts", ".tsx", ".c", ".cpp", ".h", ".html", ".css", ".md"]
# target_utc_offset_hours = 8
# message_length_limit = 100
# message_length_bin_width = 5

[semesters.23spring]
start = "2023-02-01"
end = "2023-06-30"
repo_pattern = '^team-project-(\d+)$'
assignment_id = "403123"

[semesters.24spring]
start = "2024-02-01"
end = "2024-06-30"
repo_pattern = '^team-project-24spring-(team[_-]?\d+|\d+)$'
assignment_id = "558214"

[semesters.25spring]
start = "2025-02-01"
end = "2025-06-30"
repo_pattern = '^team-project-25spring-(team[_-]?\d+|\d+)$'
assignment_id = "749620"
# submissions_dir = "team-project-25spring-submissions"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "classpulse", &mut std::io::stdout());
        }
        Some(Command::Doctor) => {
            let config = load_config(cli.config.as_deref())?;
            run_doctor(&config, cli.format, use_color)?;
        }
        Some(Command::Assignments { classroom }) => {
            let config = load_config(cli.config.as_deref())?;
            let client = github_client(&config)?;
            print_assignments(&client, classroom, cli.format).await?;
        }
        Some(Command::Charts { ref semester }) => {
            let config = load_config(cli.config.as_deref())?;
            print_charts(&config, semester, cli.format)?;
        }
        Some(Command::Run { from, ref semester }) => {
            let config = load_config(cli.config.as_deref())?;
            let semesters = config.select_semesters(semester).into_diagnostic()?;
            let stages = Stage::from_stage(from);
            let pipeline = build_pipeline(&config, &stages)?;
            let reports = execute(&pipeline, &stages, &semesters).await?;
            print_reports(&reports, cli.format)?;
        }
        Some(Command::Stage { stage, ref semester }) => {
            let config = load_config(cli.config.as_deref())?;
            let semesters = config.select_semesters(semester).into_diagnostic()?;
            let stages = [stage];
            let pipeline = build_pipeline(&config, &stages)?;
            let reports = execute(&pipeline, &stages, &semesters).await?;
            print_reports(&reports, cli.format)?;
        }
    }

    Ok(())
}
