// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey CLI - inspect how the module loader resolves and loads specifiers

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_loader::{LoaderConfig, ModuleRuntime, ModuleSource, ResolveContext, VERSION};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "spacey",
    about = "Module resolution and loading for the Spacey JavaScript runtime",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Override a loader setting (e.g. `allowed=esm.sh,unpkg.com`)
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", global = true)]
    settings: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a specifier to a URL
    Resolve {
        /// Module specifier
        specifier: String,

        /// URL or path of the importing module
        #[arg(short, long)]
        parent: Option<String>,

        /// Export condition (repeatable; replaces the defaults)
        #[arg(short = 'C', long = "condition")]
        conditions: Vec<String>,
    },

    /// Resolve and load a specifier, printing its source
    Load {
        /// Module specifier
        specifier: String,

        /// URL or path of the importing module
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Parse a package.json file
    PackageJson {
        /// Path to package.json
        path: PathBuf,
    },

    /// Find the package.json that governs a specifier
    FindPackageJson {
        /// Module specifier
        specifier: String,

        /// URL or path to resolve from
        #[arg(short, long)]
        base: Option<String>,
    },

    /// List runtime-provided modules
    Builtins,

    /// Print the effective loader configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_loader=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_loader=warn")
            .init();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = loader_config(&cli.settings)?;

    if let Command::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let runtime = ModuleRuntime::new(config)?;

    match cli.command {
        Command::Resolve {
            specifier,
            parent,
            conditions,
        } => {
            let mut ctx = runtime.context(parent.as_deref());
            if !conditions.is_empty() {
                ctx = ResolveContext::new(ctx.parent_url, conditions);
            }
            let resolved = runtime.resolve(&specifier, ctx).await?;
            println!("{}", resolved.url().green());
            if let Some(format) = resolved.format() {
                println!("{} {}", "format:".dimmed(), format);
            }
        }

        Command::Load { specifier, parent } => {
            let record = runtime.import(&specifier, runtime.context(parent.as_deref())).await?;
            println!(
                "{} {}",
                record.url.cyan().bold(),
                format!("({})", record.format.as_deref().unwrap_or("unknown")).dimmed()
            );
            match &record.source {
                ModuleSource::Text(text) => println!("{}", text),
                ModuleSource::Binary(bytes) => {
                    println!("{}", format!("<{} bytes of binary source>", bytes.len()).yellow())
                }
            }
        }

        Command::PackageJson { path } => {
            let json = runtime.parse_package_json(&path)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }

        Command::FindPackageJson { specifier, base } => {
            match runtime.find_package_json(&specifier, base.as_deref())? {
                Some(path) => println!("{}", path.display()),
                None => println!("{}", "undefined".dimmed()),
            }
        }

        Command::Builtins => {
            for name in runtime.builtin_modules() {
                println!("{}", name);
            }
        }

        Command::Config => {}
    }

    Ok(())
}

/// Environment configuration with `--set` overrides applied on top
fn loader_config(settings: &[String]) -> anyhow::Result<LoaderConfig> {
    let mut config = LoaderConfig::load();
    for setting in settings {
        let Some((key, value)) = setting.split_once('=') else {
            anyhow::bail!("expected KEY=VALUE, got '{}'", setting);
        };
        config.set(key.trim(), value);
    }
    Ok(config)
}
