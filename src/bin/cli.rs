// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! autoinstance CLI

use anyhow::{bail, Result};
use autoinstance::cli::Reporter;
use autoinstance::scene::demo;
use autoinstance::{io, AssemblyMode, AutoInstancer, InstancerConfig};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autoinstance")]
#[command(about = "Find duplicate geometry in a scene and turn it into instances", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instance duplicates in a scene file
    Run {
        /// Input scene (JSON)
        input: PathBuf,

        /// Where to write the instanced scene
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: MatchOptions,

        /// Split combined meshes into shells first
        #[arg(long)]
        separate: bool,

        /// Assembly reconstruction: none, hierarchy or cluster
        #[arg(long)]
        assemblies: Option<AssemblyMode>,

        /// Cluster count for --assemblies cluster
        #[arg(long)]
        clusters: Option<usize>,

        /// Merge each assembly into one mesh before matching
        #[arg(long)]
        combine: bool,

        /// Peer-body search radius multiplier
        #[arg(long)]
        radius_mult: Option<f64>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List duplicate groups without changing anything
    Groups {
        /// Input scene (JSON)
        input: PathBuf,

        #[command(flatten)]
        options: MatchOptions,

        /// Print the groups as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a seeded demo scene
    Demo {
        /// Output scene file
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "canisters")]
        kind: DemoKind,

        /// Number of repeated objects
        #[arg(short, long, default_value = "6")]
        count: usize,

        /// One-off junk meshes (clutter only)
        #[arg(long, default_value = "4")]
        junk: usize,

        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Print or save the default configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct MatchOptions {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Geometric tolerance
    #[arg(short, long)]
    tolerance: Option<f64>,

    /// Match regardless of material
    #[arg(long)]
    ignore_materials: bool,

    /// Compare UVs as well as positions
    #[arg(long)]
    check_uvs: bool,

    /// Match whole hierarchies instead of single meshes
    #[arg(long)]
    check_hierarchy: bool,
}

impl MatchOptions {
    fn config(&self) -> Result<InstancerConfig> {
        let mut config = InstancerConfig::load(self.config.as_deref())?;
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if self.ignore_materials {
            config.require_same_material = false;
        }
        config.check_uvs |= self.check_uvs;
        config.check_hierarchy |= self.check_hierarchy;
        Ok(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoKind {
    Cubes,
    Canisters,
    Clutter,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            options,
            separate,
            assemblies,
            clusters,
            combine,
            radius_mult,
            json,
        } => {
            let mut config = options.config()?;
            config.separate_combined |= separate;
            if let Some(mode) = assemblies {
                config.assembly_mode = mode;
            }
            if let Some(count) = clusters {
                config.cluster_count = count;
            }
            config.combine_assemblies |= combine;
            if let Some(mult) = radius_mult {
                config.search_radius_mult = mult;
            }
            run_command(&input, output.as_deref(), config, json, cli.verbose)
        }
        Commands::Groups { input, options, json } => groups_command(&input, options.config()?, json),
        Commands::Demo {
            output,
            kind,
            count,
            junk,
            seed,
        } => demo_command(&output, kind, count, junk, seed),
        Commands::Config { output } => config_command(output.as_deref()),
    };

    if let Err(err) = result {
        Reporter::report_error(&format!("{err:#}"));
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(input: &Path, output: Option<&Path>, config: InstancerConfig, json: bool, verbose: bool) -> Result<()> {
    config.validate()?;
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    let mut scene = io::load_scene(input)?;

    let start = Instant::now();
    let mut instancer = AutoInstancer::new(config);
    instancer.run(&mut scene, None);
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(instancer.report())?);
    } else {
        Reporter::report_run(&input.display().to_string(), instancer.report(), elapsed, verbose);
    }

    match output {
        Some(output) => {
            io::save_scene(&scene, output)?;
            if !json {
                Reporter::success(&format!("Scene written to {}", output.display()));
            }
        }
        None if !json => Reporter::report_info("No --output given, scene not saved"),
        None => {}
    }
    Ok(())
}

fn groups_command(input: &Path, config: InstancerConfig, json: bool) -> Result<()> {
    config.validate()?;
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    let scene = io::load_scene(input)?;

    let mut instancer = AutoInstancer::new(config);
    let groups = instancer.find_instance_groups(&scene, None);

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else {
        Reporter::report_groups(&input.display().to_string(), &groups);
    }
    Ok(())
}

fn demo_command(output: &Path, kind: DemoKind, count: usize, junk: usize, seed: u64) -> Result<()> {
    let scene = match kind {
        DemoKind::Cubes => demo::cubes(count, seed).0,
        DemoKind::Canisters => demo::canisters(count, seed).0,
        DemoKind::Clutter => demo::clutter(count, junk, seed).0,
    };
    io::save_scene(&scene, output)?;
    Reporter::success(&format!("Demo scene written to {}", output.display()));
    Ok(())
}

fn config_command(output: Option<&Path>) -> Result<()> {
    let config = InstancerConfig::default();
    match output {
        Some(path) => {
            config.save(path)?;
            Reporter::success(&format!("Configuration written to {}", path.display()));
        }
        None => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}
