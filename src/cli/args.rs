//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Stencil - fingerprinted build cache for generated projects
///
/// Runs a generator once per distinct request and serves the zipped result
/// from a shared cache afterwards.
#[derive(Parser, Debug)]
#[command(name = "stencil")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STENCIL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate (or reuse) an artifact and print its path
    Generate(GenerateArgs),

    /// Start a build and print its fingerprint
    Start(StartArgs),

    /// Check whether an artifact is ready
    Poll(PollArgs),

    /// Print the fingerprint of a request without building
    Fingerprint(RequestArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Inputs that make up a generation request
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Generator name, `<package>[:<subgenerator>]`
    #[arg(required_unless_present = "request", conflicts_with = "request")]
    pub generator: Option<String>,

    /// Generator option (KEY=VALUE, repeatable)
    #[arg(short, long = "option", value_parser = parse_key_val)]
    pub options: Vec<(String, String)>,

    /// Prompt answer (KEY=VALUE, repeatable)
    #[arg(short, long = "answer", value_parser = parse_key_val)]
    pub answers: Vec<(String, String)>,

    /// Read the request from a JSON file (`-` for stdin); --option, --answer
    /// and trailing arguments are added on top
    #[arg(short, long)]
    pub request: Option<PathBuf>,

    /// Positional arguments passed to the generator
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the generate command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Give up waiting after SECS (the build keeps running); overrides
    /// cache.generate_timeout_secs
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Arguments for the start command
#[derive(Args, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Exit right after printing the fingerprint instead of waiting for the build
    #[arg(short, long)]
    pub detach: bool,
}

/// Arguments for the poll command
#[derive(Args, Debug)]
pub struct PollArgs {
    /// Fingerprint printed by `stencil start`
    pub fingerprint: String,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
