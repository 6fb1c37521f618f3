use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use report_tools::pipeline::{self, ReportOptions, ReshapeOutput};
use report_tools::profile::{self, BUILTIN_PROFILES, ToolProfile};
use report_tools::reconcile::CollisionPolicy;
use report_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_level)?;
    match cli.command {
        Command::Reshape(args) => execute_reshape(args),
        Command::Summarize(args) => {
            args.ensure_input()?;
            let output = pipeline::summarize_file(&args.input)?;
            finish(&output, args.output)
        }
        Command::Border(args) => {
            args.ensure_input()?;
            let output = pipeline::border_file(&args.input)?;
            finish(&output, args.output)
        }
        Command::Profiles => {
            list_profiles();
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn execute_reshape(args: ReshapeArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }

    let profile = resolve_profile(&args)?;
    let options = ReportOptions {
        title: args.title,
        from_date: args.from_date,
        to_date: args.to_date,
        collision: args.collision.map(CollisionPolicy::from),
    };

    let output = pipeline::reshape_file(&args.input, &profile, &options)?;
    finish(&output, args.output)
}

fn resolve_profile(args: &ReshapeArgs) -> Result<ToolProfile> {
    match (&args.profile, &args.profile_file) {
        (_, Some(path)) => profile::load_profile(path),
        (Some(name), None) => profile::builtin(name),
        (None, None) => Err(ToolError::InvalidProfile(
            "either --profile or --profile-file is required".into(),
        )),
    }
}

fn finish(output: &ReshapeOutput, target: Option<PathBuf>) -> Result<()> {
    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }
    let path = pipeline::write_output(output, target.as_deref())?;
    println!("{}", path.display());
    Ok(())
}

fn list_profiles() {
    for name in BUILTIN_PROFILES {
        match profile::builtin(name) {
            Ok(profile) => println!("{name}\t{}", profile.description),
            Err(_) => println!("{name}"),
        }
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Turn raw spreadsheet exports into formatted reports."
)]
struct Cli {
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reshape an export with a built-in or custom tool profile.
    Reshape(ReshapeArgs),
    /// Build the party/karat pivot of a goods-receipt report.
    Summarize(FileArgs),
    /// Copy a workbook adding borders to every cell.
    Border(FileArgs),
    /// List the built-in tool profiles.
    Profiles,
}

#[derive(clap::Args)]
struct ReshapeArgs {
    /// Built-in profile name.
    #[arg(long, conflicts_with = "profile_file")]
    profile: Option<String>,

    /// JSON file describing a custom profile.
    #[arg(long)]
    profile_file: Option<PathBuf>,

    /// Input workbook path.
    #[arg(long)]
    input: PathBuf,

    /// Output path; defaults to the profile's file name in the current directory.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Report title, replacing any detected title.
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    from_date: Option<String>,

    #[arg(long)]
    to_date: Option<String>,

    /// How a label matching several columns is resolved.
    #[arg(long, value_enum)]
    collision: Option<CollisionKind>,
}

#[derive(clap::Args)]
struct FileArgs {
    /// Input workbook path.
    #[arg(long)]
    input: PathBuf,

    /// Output path; defaults to the tool's file name in the current directory.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl FileArgs {
    fn ensure_input(&self) -> Result<()> {
        if self.input.exists() {
            Ok(())
        } else {
            Err(ToolError::MissingInput(self.input.clone()))
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CollisionKind {
    First,
    Longest,
}

impl From<CollisionKind> for CollisionPolicy {
    fn from(kind: CollisionKind) -> Self {
        match kind {
            CollisionKind::First => CollisionPolicy::FirstDeclared,
            CollisionKind::Longest => CollisionPolicy::LongestFragment,
        }
    }
}
