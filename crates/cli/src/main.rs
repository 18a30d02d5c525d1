use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use monocle::commands::{decompile_command, find_command, script_command, FindArgs, Overrides};
use monocle::init_tracing;
use monocle_core::services::process::kill_children_on_interrupt;

/// Rank the functions of native binaries against a plain-language description.
///
/// Every function is decompiled with Ghidra's headless analyzer, then a
/// language model scores how well it matches what you are looking for.
#[derive(Parser, Debug)]
#[command(name = "monocle", version, about = "Search decompiled functions with a language model", long_about = None)]
struct Cli {
    /// Log level filter (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DecompilerArgs {
    /// Config file (.json, .yaml or .yml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to analyzeHeadless. Overrides config and environment lookup.
    #[arg(long)]
    headless: Option<PathBuf>,

    /// Number of binaries decompiled in parallel.
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decompile a binary (or every file in a folder) and rank its functions.
    Find {
        /// Binary file or folder of binaries.
        #[arg(long)]
        binary: PathBuf,

        /// What to look for, e.g. "RC4 key scheduling".
        #[arg(long)]
        find: String,

        #[command(flatten)]
        decompiler: DecompilerArgs,

        /// Base URL of an OpenAI-compatible API.
        #[arg(long)]
        endpoint: Option<String>,

        /// Model name sent to the API.
        #[arg(long)]
        model: Option<String>,

        /// Score with a local program instead of the API. It receives the prompt on stdin.
        #[arg(long)]
        model_command: Option<String>,

        /// Print the run summary as JSON instead of the live table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Keep decompiled functions in this directory. It must be empty or not exist yet.
        #[arg(long)]
        keep_output: Option<PathBuf>,
    },

    /// Decompile only, writing one .c file per function.
    Decompile {
        /// Binary file or folder of binaries.
        #[arg(long)]
        input: PathBuf,

        /// Directory receiving the decompiled functions.
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        decompiler: DecompilerArgs,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the Ghidra export script rendered for an output directory.
    Script {
        #[arg(long)]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    kill_children_on_interrupt().context("Failed to install interrupt handler")?;

    match cli.command {
        Command::Find {
            binary,
            find,
            decompiler,
            endpoint,
            model,
            model_command,
            json,
            keep_output,
        } => {
            let args = FindArgs {
                binary,
                find,
                config: decompiler.config,
                overrides: Overrides {
                    headless: decompiler.headless,
                    jobs: decompiler.jobs,
                    endpoint,
                    model,
                    model_command,
                },
                json,
                keep_output,
            };
            let summary = find_command(&args)?;
            if summary.nothing_decompiled() {
                bail!("no binary could be decompiled");
            }
        }
        Command::Decompile { input, output, decompiler, json } => {
            let overrides = Overrides {
                headless: decompiler.headless,
                jobs: decompiler.jobs,
                ..Default::default()
            };
            decompile_command(&input, &output, decompiler.config.as_deref(), &overrides, json)?
        }
        Command::Script { output_dir } => script_command(&output_dir)?,
    }

    Ok(())
}
