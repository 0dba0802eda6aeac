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

//! Remote command execution over interactive shells.
//!
//! A command is written to a fresh shell channel after a directive that
//! blanks the prompt, followed by `exit` so the channel closes once the
//! command returns. Output is framed into lines and filtered by
//! [`NoiseFilter`] before it is aggregated.

mod filter;
mod framer;
mod package;
mod session;

use std::fmt;
use std::str::FromStr;

pub use filter::NoiseFilter;
pub use framer::LineFramer;
pub use package::PackageSpec;
pub use session::{run, ExecutionSession, END_DIRECTIVE, PROMPT_DIRECTIVE};

use crate::error::InputError;

/// A command to run on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShellCommand {
    /// Text typed into the remote shell
    Shell(String),
}

impl ShellCommand {
    pub fn new(text: impl Into<String>) -> Result<Self, InputError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(InputError::EmptyCommand);
        }
        Ok(Self::Shell(text))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Shell(text) => text,
        }
    }
}

impl FromStr for ShellCommand {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Terminal result of an exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Filtered stdout, one `\n` terminated entry per delivered line
    pub stdout: String,
    pub exit_code: Option<u32>,
    /// Name of the signal that terminated the shell, if any
    pub signal: Option<String>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && self.signal.is_none()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}
