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

//! Terminal reporting of stage results.

use owo_colors::OwoColorize;

use crate::error::NodeError;
use crate::exec::ExecOutput;
use crate::pipeline::BatchSummary;

/// Print one node's exec result, prefixing every output line with the node.
pub fn print_node_result(node: &str, result: &Result<ExecOutput, NodeError>) {
    match result {
        Ok(output) => {
            let status = if output.success() {
                "●".green().to_string()
            } else {
                "●".red().to_string()
            };
            println!("{} {}", status, node.bold());
            for line in output.lines() {
                println!("  {} {}", "│".dimmed(), line);
            }
            if let Some(signal) = &output.signal {
                println!("  {} {}", "terminated by".red(), signal);
            } else if let Some(code) = output.exit_code.filter(|&c| c != 0) {
                println!("  {} {}", "exit code".red(), code);
            }
        }
        Err(e) => {
            println!("{} {} {}", "●".red(), node.bold(), format!("{e}").red());
        }
    }
}

/// Print the summary line of a finished batch.
pub fn print_batch_summary(summary: &BatchSummary) {
    let counts = format!(
        "{} succeeded, {} failed",
        summary.succeeded(),
        summary.failed
    );
    if summary.failed == 0 {
        println!("{} {}: {}", "✓".green(), summary.label.bold(), counts.green());
    } else {
        println!("{} {}: {}", "✗".red(), summary.label.bold(), counts.red());
    }
}

/// Print task names with their dependencies.
pub fn print_task_list<'a>(tasks: impl IntoIterator<Item = (&'a str, &'a [String], Option<&'a str>)>) {
    for (name, deps, description) in tasks {
        let mut line = format!("{}", name.cyan().bold());
        if !deps.is_empty() {
            line.push_str(&format!(" {} {}", "←".dimmed(), deps.join(", ")));
        }
        if let Some(description) = description {
            line.push_str(&format!("  {}", description.dimmed()));
        }
        println!("{line}");
    }
}
