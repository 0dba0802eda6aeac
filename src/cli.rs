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

use clap::Parser;
use std::path::PathBuf;

use crate::config::FleetConfig;

#[derive(Parser, Debug)]
#[command(
    name = "fleetsh",
    version,
    about = "Run declarative SSH pipelines across a fleet of hosts",
    long_about = "fleetsh reads a Fleetfile from the working directory and runs the requested tasks.\nEach task streams its nodes through steps such as connect, exec, package, save and disconnect,\nreporting every node's result as it finishes and a summary once the whole batch is done.",
    after_help = "EXAMPLES:\n  Run the default task:         fleetsh\n  Run named tasks:              fleetsh web db\n  Use another fleetfile:        fleetsh -f deploy/Fleetfile.yaml\n  List tasks:                   fleetsh --list"
)]
pub struct Cli {
    #[arg(help = "Tasks to run [default: default]")]
    pub tasks: Vec<String>,

    #[arg(
        short = 'f',
        long = "file",
        help = "Fleetfile path\nSearched in the working directory when omitted: Fleetfile.yaml, Fleetfile.yml, fleetfile.yaml"
    )]
    pub fleetfile: Option<PathBuf>,

    #[arg(short = 'C', long = "cwd", help = "Change to this directory before doing anything")]
    pub cwd: Option<PathBuf>,

    #[arg(short = 'l', long, help = "List tasks and their dependencies, then exit")]
    pub list: bool,

    #[arg(short = 'u', long, help = "Default username for SSH connections")]
    pub user: Option<String>,

    #[arg(short = 'i', long, help = "Default SSH private key file")]
    pub identity: Option<PathBuf>,

    #[arg(short = 'p', long, help = "Maximum concurrent operations per step")]
    pub parallel: Option<usize>,

    #[arg(long, help = "Directory for persisted node state [default: .ops]")]
    pub state_dir: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v info, -vv debug, -vvv trace)"
    )]
    pub verbose: u8,
}

impl Cli {
    /// Apply command line overrides, which take precedence over the fleetfile.
    pub fn apply(&self, config: &mut FleetConfig) {
        if let Some(user) = &self.user {
            config.default_username = Some(user.clone());
        }
        if let Some(identity) = &self.identity {
            config.default_identity_path = Some(crate::config::expand_tilde(identity));
        }
        if let Some(parallel) = self.parallel {
            config.parallel = Some(parallel);
        }
        if let Some(state_dir) = &self.state_dir {
            config.state_dir = state_dir.clone();
        }
    }
}
