// ABOUTME: Main entry point for the mkslides-server program.
// ABOUTME: Provides CLI interface to run the MCP server or a one-shot build.

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use mkslides_server::{BuildRequest, Config, ConfigDefaults, McpServer, SlideGenerator};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, BufReader};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// mkslides executable to run
    #[arg(long, global = true)]
    mkslides_bin: Option<String>,

    /// Build timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Directory for per-request workspaces
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,

    /// YAML file with the default mkslides configuration
    #[arg(long, global = true)]
    defaults: Option<PathBuf>,

    /// Directory containing README.md and docs/
    #[arg(long, global = true)]
    docs_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP protocol on stdin/stdout (default)
    Serve,

    /// Build slides once from a markdown file
    Build(BuildArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Path to the markdown file
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Slides theme
    #[arg(long)]
    theme: Option<String>,

    /// Code highlighting theme
    #[arg(long)]
    highlight_theme: Option<String>,

    /// Reveal.js option as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "revealjs", value_name = "KEY=VALUE")]
    revealjs: Vec<String>,

    /// YAML config file used instead of the generated configuration
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Treat mkslides warnings as errors
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries protocol messages, so logs go to stderr
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();

    let config = load_config(&cli)?;
    let generator = SlideGenerator::new(config);

    match &cli.command {
        None | Some(Commands::Serve) => {
            let server = McpServer::new(generator);
            let stdin = io::stdin();
            server.serve(BufReader::new(stdin.lock()), io::stdout())?;
            Ok(())
        }
        Some(Commands::Build(args)) => {
            let request = build_request(args)?;
            let result = generator.generate_slides(&request);

            println!("{}", serde_json::to_string_pretty(&result)?);

            if !result.success {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;

    if let Some(bin) = &cli.mkslides_bin {
        config.mkslides_bin = bin.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(dir) = &cli.temp_dir {
        config.temp_root = dir.clone();
    }
    if let Some(dir) = &cli.docs_dir {
        config.docs_dir = Some(dir.clone());
    }
    if let Some(path) = &cli.defaults {
        config.defaults = ConfigDefaults::from_file(path)?;
    }

    Ok(config)
}

fn build_request(args: &BuildArgs) -> anyhow::Result<BuildRequest> {
    let markdown = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read markdown file {:?}", args.input))?;

    let mut request = BuildRequest::new(markdown).with_strict(args.strict);

    if let Some(dir) = &args.output {
        request = request.with_output_dir(dir);
    }
    if let Some(theme) = &args.theme {
        request = request.with_theme(theme);
    }
    if let Some(theme) = &args.highlight_theme {
        request = request.with_highlight_theme(theme);
    }

    if !args.revealjs.is_empty() {
        let mut options = Map::new();
        for pair in &args.revealjs {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected KEY=VALUE for --revealjs, got {:?}", pair))?;
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            options.insert(key.to_string(), value);
        }
        request = request.with_revealjs_options(Value::Object(options));
    }

    if let Some(path) = &args.config {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        let document: Value =
            serde_yaml_ng::from_str(&text).with_context(|| format!("Failed to parse config file {:?}", path))?;
        request = request.with_config_override(document);
    }

    Ok(request)
}
