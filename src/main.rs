// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;

use fleetsh::{cli::Cli, ui, utils::init_logging, Fleet, FleetConfig, Fleetfile};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Some(dir) = &cli.cwd {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
    }

    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
    let path = match &cli.fleetfile {
        Some(path) => path.clone(),
        None => Fleetfile::discover(&cwd).with_context(|| {
            format!(
                "No fleetfile found in {} (looked for {})",
                cwd.display(),
                fleetsh::config::FLEETFILE_NAMES.join(", ")
            )
        })?,
    };
    tracing::info!("Using fleetfile {}", path.display());
    let fleetfile = Fleetfile::load(&path).await?;

    let mut config = FleetConfig::from_env();
    fleetfile.settings.apply(&mut config);
    cli.apply(&mut config);

    let fleet = Fleet::new(config);
    fleet.add_fleetfile(&fleetfile);

    if cli.list {
        let tasks = fleet.task_list();
        ui::print_task_list(
            tasks
                .iter()
                .map(|(name, deps, description)| (name.as_str(), deps.as_slice(), description.as_deref())),
        );
        return Ok(());
    }

    fleet.start(&cli.tasks).await?;
    Ok(())
}
