//! `research-maid` command line interface.
//!
//! Every command resolves its configuration first, then works on one
//! project under the configured projects directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use maid_retrieval::{
    DocumentSplitter, DuplicatePolicy, FileSplitter, Project, Projects, RetrievalConfig,
    ReviewLimits, ReviewPayload, Session,
};

#[derive(Debug, Parser)]
#[command(
    name = "research-maid",
    version,
    about = "Index reference documents per project and find citations for a draft"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty project.
    Create { project: String },

    /// List projects.
    List,

    /// Copy a document into a project and index it.
    Add {
        project: String,
        file: PathBuf,

        /// What to do if the project already has a document with this name.
        #[arg(long, value_enum)]
        on_duplicate: Option<OnDuplicate>,
    },

    /// Index a document in place without copying it into the project.
    Ingest { project: String, file: PathBuf },

    /// Find passages in a project that match each chunk of a target document.
    Cite {
        project: String,
        target: PathBuf,

        /// Neighbours per target chunk.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Drop matches farther than this distance.
        #[arg(long)]
        max_distance: Option<f32>,

        /// Output directory. Defaults to `<target stem>_citation_review`.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Compare a project's vector index with its chunk store.
    Status { project: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnDuplicate {
    Error,
    Rename,
    Overwrite,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::Error => DuplicatePolicy::Error,
            OnDuplicate::Rename => DuplicatePolicy::Rename,
            OnDuplicate::Overwrite => DuplicatePolicy::Overwrite,
        }
    }
}

/// Log filter for a `-v` count.
pub fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Resolve the configuration for this invocation.
pub fn load_config(path: Option<&Path>) -> Result<RetrievalConfig> {
    match path {
        Some(path) => RetrievalConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => RetrievalConfig::discover().context("failed to load configuration"),
    }
}

/// Run a parsed command, writing user-facing output to `out`.
pub fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let projects = Projects::new(&config.projects_dir);

    match cli.command {
        Command::Create { project } => {
            let project = projects.create(&project)?;
            writeln!(
                out,
                "Created project '{}' at {}",
                project.name(),
                project.root().display()
            )?;
        }
        Command::List => {
            for name in projects.list()? {
                writeln!(out, "{name}")?;
            }
        }
        Command::Add {
            project,
            file,
            on_duplicate,
        } => {
            let project = open_project(&projects, &project)?;
            let policy = on_duplicate.map_or(config.ingest.on_duplicate, DuplicatePolicy::from);
            let (copied, count) = add_file(config, &project, &file, policy)?;
            writeln!(out, "Added {} ({count} chunks)", copied.display())?;
        }
        Command::Ingest { project, file } => {
            let project = open_project(&projects, &project)?;
            let count = ingest_file(config, &project, &file)?;
            writeln!(out, "Ingested {} ({count} chunks)", file.display())?;
        }
        Command::Cite {
            project,
            target,
            top_k,
            max_distance,
            out: out_dir,
        } => {
            let project = open_project(&projects, &project)?;
            let mut config = config;
            if let Some(max_distance) = max_distance {
                config.query.max_distance = Some(max_distance);
            }
            let path = cite(config, &project, &target, top_k, out_dir)?;
            writeln!(out, "{}", path.display())?;
        }
        Command::Status { project } => {
            let project = open_project(&projects, &project)?;
            let manifest = project.manifest()?;
            let mut session = Session::from_config(config)?;
            let report = session.check(&project)?;

            writeln!(out, "project:        {}", project.name())?;
            writeln!(out, "documents:      {}", manifest.num_documents)?;
            writeln!(out, "index entries:  {}", report.index_size)?;
            writeln!(out, "chunk rows:     {}", report.row_count)?;
            if report.is_consistent() {
                writeln!(out, "consistent:     yes")?;
            } else {
                writeln!(out, "consistent:     no")?;
                writeln!(out, "missing rows:   {:?}", report.missing_rows)?;
                writeln!(out, "unindexed rows: {:?}", report.unindexed_rows)?;
                bail!("project '{}' is inconsistent", project.name());
            }
        }
    }
    Ok(())
}

fn open_project(projects: &Projects, name: &str) -> Result<Project> {
    projects
        .open(name)
        .with_context(|| format!("cannot open project '{name}'"))
}

/// Copy `file` into the project and ingest the copy.
///
/// The copy is only kept once its chunks are committed.
fn add_file(
    config: RetrievalConfig,
    project: &Project,
    file: &Path,
    policy: DuplicatePolicy,
) -> Result<(PathBuf, usize)> {
    let splitter = FileSplitter::new(&config.splitter);
    let mut session = Session::from_config(config)?;
    let staged = project
        .stage_document(file, policy)
        .with_context(|| format!("failed to add {}", file.display()))?;

    match ingest_chunks(&splitter, &mut session, project, staged.path()) {
        Ok(count) => Ok((staged.commit()?, count)),
        Err(err) => {
            if let Err(discard_err) = staged.discard() {
                warn!("Failed to remove staged copy of {}: {discard_err}", file.display());
            }
            Err(err)
        }
    }
}

fn ingest_file(config: RetrievalConfig, project: &Project, file: &Path) -> Result<usize> {
    let splitter = FileSplitter::new(&config.splitter);
    let mut session = Session::from_config(config)?;
    ingest_chunks(&splitter, &mut session, project, file)
}

fn ingest_chunks(
    splitter: &FileSplitter,
    session: &mut Session,
    project: &Project,
    file: &Path,
) -> Result<usize> {
    let chunks = splitter
        .split(file)
        .with_context(|| format!("failed to split {}", file.display()))?;
    if chunks.is_empty() {
        bail!("no text found in {}", file.display());
    }

    let report = session
        .ingest(project, &chunks)
        .with_context(|| format!("failed to ingest {}", file.display()))?;
    Ok(report.len())
}

fn cite(
    config: RetrievalConfig,
    project: &Project,
    target: &Path,
    top_k: Option<usize>,
    out_dir: Option<PathBuf>,
) -> Result<PathBuf> {
    let splitter = FileSplitter::new(&config.splitter);
    let queries: Vec<String> = splitter
        .split(target)
        .with_context(|| format!("failed to split {}", target.display()))?
        .into_iter()
        .map(|chunk| chunk.text)
        .collect();

    let k = top_k.unwrap_or(config.query.top_k);
    if k == 0 {
        bail!("-k must be at least 1");
    }
    let limits = ReviewLimits::from_config(&config.query);

    let mut session = Session::from_config(config)?;
    let results = session.query(project, &queries, k)?;
    info!(
        "Matched {} target chunks against project '{}'",
        queries.len(),
        project.name()
    );

    let payload = ReviewPayload::build(
        project.name(),
        &target.to_string_lossy(),
        &queries,
        &results,
        limits,
    )?;
    let out_dir = out_dir.unwrap_or_else(|| ReviewPayload::default_output_dir(target));
    Ok(payload.write(&out_dir)?)
}
