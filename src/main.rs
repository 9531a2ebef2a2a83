//=====================================================
// File: main.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: GuardScript CLI entry point
// Objective: Command-line interface for checking and executing .gjs source
//            files with whitelisted modules and runtime options
//=====================================================

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use guardscript::pipeline::{compile, Options, RunResult};

#[derive(Parser, Debug)]
#[command(name = "guardscript", about = "GuardScript CLI")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a .gjs source file.
    Run(RunArgs),
    /// Check a .gjs source file and report diagnostics without running it.
    Check(CheckArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Path to the script to execute.
    pub script: PathBuf,

    /// Print the parsed AST before execution.
    #[arg(long = "print-ast")]
    pub print_ast: bool,

    /// Silent mode: log diagnostics and check failures, keep executing.
    #[arg(long = "silent")]
    pub silent: bool,

    /// Per-test time limit for the test harness, in milliseconds.
    #[arg(long = "test-timeout-ms", default_value_t = 5000)]
    pub test_timeout_ms: u64,

    /// Whitelisted module as name=path; may be repeated.
    #[arg(long = "module")]
    pub modules: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CheckArgs {
    /// Path to the script to check.
    pub script: PathBuf,

    /// Emit diagnostics as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run(run_args) => run_script(run_args),
        Command::Check(check_args) => check_script(check_args),
    }
}

fn run_script(args: RunArgs) -> Result<()> {
    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read {}", args.script.display()))?;

    let mut whitelist = HashMap::new();
    for module in &args.modules {
        let Some((name, path)) = module.split_once('=') else {
            return Err(anyhow!("--module expects name=path, got '{}'", module));
        };
        let code = fs::read_to_string(path)
            .with_context(|| format!("failed to read module '{}' from {}", name, path))?;
        whitelist.insert(name.to_string(), code);
    }

    if args.print_ast {
        let program = guardscript::parser::parse_source(&source)
            .map_err(|err| anyhow!("{}: {}", args.script.display(), err))?;
        println!("{:#?}", program);
    }

    let opts = Options {
        console_log: Rc::new(|text| println!("{}", text)),
        version: None,
        whitelist_code: whitelist,
        silent: args.silent,
    };
    let compiled = match compile(&source, opts) {
        Ok(compiled) => compiled,
        Err(err) => {
            for diagnostic in &err.errors {
                eprintln!("{}", diagnostic);
            }
            return Err(anyhow!("{} error(s)", err.errors.len()));
        }
    };

    compiled.enable_tests(true, args.test_timeout_ms);
    let mut failed = false;
    compiled.run(|result| match result {
        RunResult::Normal { .. } => {}
        RunResult::Exception { value, stack } => {
            eprintln!("runtime error: {}", value);
            for frame in &stack {
                eprintln!("    {}", frame);
            }
            failed = true;
        }
    });
    if failed {
        return Err(anyhow!("runtime error"));
    }
    Ok(())
}

fn check_script(args: CheckArgs) -> Result<()> {
    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read {}", args.script.display()))?;
    match compile(&source, Options::default()) {
        Ok(_) => {
            if args.json {
                println!("[]");
            } else {
                println!("{}: no problems found", args.script.display());
            }
            Ok(())
        }
        Err(err) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&err.errors)?);
            } else {
                for diagnostic in &err.errors {
                    println!("{}", diagnostic);
                }
            }
            Err(anyhow!("{} error(s)", err.errors.len()))
        }
    }
}

//=====================================================
// End of file
//=====================================================
