use std::fs;
use std::process::ExitCode;

use anyhow::{bail, Context};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use patchup_backends::{default_backend, GitBackend, GitBackendOptions, TerminalPrompt};
use patchup_core::pipeline::render_missing_csv;
use patchup_core::{ApplyMode, Config, PatchBackend, Pipeline, PickOutcome};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "patchup",
    version,
    about = "Carry upstream mirror commits into a downstream plugin repository",
    long_about = "patchup rewrites an upstream commit's diff onto the downstream tree layout,\n\
        wraps it in a mailbox patch recording the upstream id, and applies it,\n\
        falling back from a three-way merge to reject files when needed.\n\n\
        Quick start:\n  \
        patchup missing <last-synced-commit>\n  \
        patchup patch <commit>"
)]
struct Cli {
    /// Downstream repository (default: current directory)
    #[arg(long, global = true, env = "PATCHUP_REPO", default_value = ".")]
    repo: Utf8PathBuf,

    /// Config file layered over <repo>/.patchup.toml
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an upstream commit to the working tree
    ///
    /// Tries a three-way apply first and falls back to reject files. On
    /// conflicts you are asked whether to continue after fixing them or to
    /// abort. With --output the patch is written to a file instead.
    ///
    /// Examples:
    ///   patchup patch 1a2b3c4
    ///   patchup patch 1a2b3c4 --output fix.patch --mode reject
    Patch {
        /// Upstream commit
        commit: String,

        /// Write the patch here instead of applying it
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,

        /// Variant to write with --output
        #[arg(long, value_enum, default_value_t = ModeArg::ThreeWay)]
        mode: ModeArg,
    },
    /// Rewrite upstream build references in every file under a directory
    Remap {
        /// Directory to rewrite in place
        path: Utf8PathBuf,
    },
    /// List upstream commits touching the subtree since a commit
    ///
    /// Writes one spreadsheet row per commit, oldest first.
    Missing {
        /// Last upstream commit already synced
        since: String,

        /// Output file
        #[arg(short, long, default_value = "missing.csv")]
        output: Utf8PathBuf,
    },
    /// Compare a picked commit with the upstream commit it records
    ///
    /// Prints per file how many diff lines the downstream commit added (+)
    /// or dropped (-) relative to the rewritten upstream change.
    ///
    /// Examples:
    ///   patchup review
    ///   patchup review 1a2b3c4
    Review {
        /// Downstream revision (default: HEAD)
        #[arg(default_value = "HEAD")]
        revision: String,
    },
    /// Print the upstream commit recorded in a commit message
    Provenance {
        /// Downstream revision (default: HEAD)
        #[arg(default_value = "HEAD")]
        revision: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    ThreeWay,
    Reject,
}

impl From<ModeArg> for ApplyMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::ThreeWay => Self::ThreeWay,
            ModeArg::Reject => Self::Reject,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(
        cli.repo.as_std_path(),
        cli.config.as_deref().map(Utf8Path::as_std_path),
    )
    .context("failed to load configuration")?;

    let filter = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Remap { path } => {
            let table = config.reference_table()?;
            let changed = table
                .remap_tree(path.as_std_path())
                .with_context(|| format!("failed to remap {path}"))?;
            info!(%path, changed, "remap complete");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Patch {
            commit,
            output,
            mode,
        } => {
            let backend = open_backend(&cli.repo, &config)?;
            let prompt = TerminalPrompt;
            let pipeline = Pipeline::new(config, &backend, &prompt)?;

            if let Some(output) = output {
                let patch = pipeline.prepare(&commit)?;
                fs::write(&output, patch.text(mode.into()))
                    .with_context(|| format!("failed to write {output}"))?;
                info!(%output, commit = %patch.commit, "wrote patch");
                return Ok(ExitCode::SUCCESS);
            }

            match pipeline.pick(&commit)? {
                PickOutcome::Applied | PickOutcome::AlreadyApplied => Ok(ExitCode::SUCCESS),
                PickOutcome::NotApplied => Ok(ExitCode::FAILURE),
            }
        }
        Commands::Missing { since, output } => {
            let backend = open_backend(&cli.repo, &config)?;
            let prompt = TerminalPrompt;
            let pipeline = Pipeline::new(config, &backend, &prompt)?;

            let commits = pipeline.missing(&since)?;
            let csv = render_missing_csv(&commits, &pipeline.config().upstream.browse_url);
            fs::write(&output, csv)
                .with_context(|| format!("failed to write {output}"))?;
            info!(%output, count = commits.len(), "wrote missing commits");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Review { revision } => {
            let backend = open_backend(&cli.repo, &config)?;
            let prompt = TerminalPrompt;
            let pipeline = Pipeline::new(config, &backend, &prompt)?;

            let report = pipeline
                .review(&revision)
                .with_context(|| format!("failed to review {revision}"))?;
            println!("{} <- {}", report.downstream, report.upstream);
            for file in &report.files {
                println!(
                    "{:>6} {:>6}  {}",
                    format!("+{}", file.deviation.additions),
                    format!("-{}", file.deviation.deletions),
                    file.path
                );
            }
            let total = report.deviation();
            println!(
                "STAT: {} insertions(+), {} deletions(-)",
                total.additions, total.deletions
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Provenance { revision } => {
            let backend = open_backend(&cli.repo, &config)?;
            let prompt = TerminalPrompt;
            let pipeline = Pipeline::new(config, &backend, &prompt)?;

            let Some(id) = pipeline.provenance_of(&revision)? else {
                bail!("{revision} does not record an upstream commit");
            };
            println!("{id}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_backend(repo: &Utf8PathBuf, config: &Config) -> anyhow::Result<GitBackend> {
    let options = GitBackendOptions {
        binary: config.git.binary.clone().into(),
        timeout: config.git_timeout(),
        reject_suffix: config.patch.reject_suffix.clone(),
    };
    let backend = default_backend(repo.as_std_path(), options)
        .with_context(|| format!("failed to open repository at {repo}"))?;
    info!(work_tree = %backend.summary().work_tree.display(), "opened repository");
    Ok(backend)
}
