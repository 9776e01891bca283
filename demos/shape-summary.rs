// SPDX-FileCopyrightText: 2025 University of Rochester
//
// SPDX-License-Identifier: MIT

// Loads a JSON-encoded IR module, abstracts every function, and prints the
// simplified shape constraints.
use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Target};
use shape_helper::ir::{AcyclicCfg, Module};
use shape_helper::{check_module, LogSink};
use std::{fs::File, path::PathBuf};

#[derive(Parser)]
struct Cli {
    /// The json path to the IR module
    path: PathBuf,
    /// Only report this function. Defaults to every function in the module.
    #[arg(long)]
    function: Option<String>,
    /// The log file to write to. Defaults to stdout.
    #[arg(long, short)]
    log: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let mut builder = Builder::new();
    builder.filter_level(log::LevelFilter::Info);
    if let Some(log_path) = args.log {
        // Log to the specified file
        let log_file = File::create(log_path).with_context(|| "Failed to create log file")?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        // Default to logging to stdout
        builder.target(Target::Stdout);
    }
    builder.parse_default_env().init();

    let contents = std::fs::read_to_string(&args.path)
        .with_context(|| format!("could not read file `{}`", args.path.display()))?;
    let module: Module = serde_json::from_str(&contents)
        .with_context(|| format!("could not parse module `{}`", args.path.display()))?;

    if module.functions.is_empty() {
        return Err(anyhow::anyhow!("No functions found in the module"));
    }
    if let Some(wanted) = &args.function {
        if !module.functions.iter().any(|f| &f.name == wanted) {
            return Err(anyhow::anyhow!("No function named `{wanted}` in the module"));
        }
    }

    let mut sink = LogSink;
    let checked = check_module(&module, &AcyclicCfg, &mut sink)
        .map_err(|e| anyhow::anyhow!("constraint extraction failed: {e}"))?;

    for (name, constraints) in &checked {
        if args.function.as_ref().is_some_and(|wanted| wanted != name) {
            continue;
        }
        println!("{name}: {} constraints", constraints.len());
        for c in constraints {
            println!("  {c}    [{}]", c.stack);
        }
    }
    Ok(())
}
