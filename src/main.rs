use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};

use vmtrans::{
    project::{self, Project},
    translator::TranslatorConfig,
};

/// Translates VM code into Hack assembly.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// A `.vm` file, or a directory whose `.vm` files form one program
    input: PathBuf,

    /// Output file; defaults to `<file>.asm`, or `<dir>/<dir>.asm` for a directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Function the bootstrap calls; a directory containing Sys.vm defaults to Sys.init
    #[arg(long, value_name = "NAME")]
    init: Option<String>,

    /// Address the stack pointer starts at
    #[arg(long, default_value_t = 256, value_parser = clap::value_parser!(u16).range(16..=0x7FFF))]
    stack_base: u16,

    /// Do not annotate the output with the VM commands
    #[arg(long)]
    no_comments: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let project = Project::discover(&cli.input)
        .with_context(|| format!("Cannot read {}", cli.input.display()))?;
    let outfilename = cli.output.unwrap_or_else(|| project.output.clone());
    for filename in &project.files {
        info!("translating {}", filename.display());
    }

    let config = TranslatorConfig {
        stack_base: cli.stack_base,
        init_function: cli.init.or_else(|| project.init_function.clone()),
        comments: !cli.no_comments,
    };
    let lines = project::build(&project, config, &outfilename)
        .with_context(|| format!("Error while translating {}", cli.input.display()))?;

    info!("wrote {} lines to {}", lines, outfilename.display());
    Ok(())
}
