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

//! Removal of connection noise from interactive shell output.

/// Lines a shell prints when the session is told to end.
const SESSION_END_LINES: &[&str] = &["exit", "logout"];

/// Decides which lines of a shell session belong to the command's output.
///
/// A line is suppressed when it is
/// - the first line of the session (login banner or prompt acknowledgment),
/// - any line before the command's own echo (the rest of the banner and
///   the echo of the prompt directive),
/// - a line equal to a line of the sent command (its echo), or
/// - `exit` or `logout` once the command has been echoed.
///
/// Lines are compared with trailing whitespace removed.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    command_lines: Vec<String>,
    seen: usize,
    echoed: bool,
}

impl NoiseFilter {
    pub fn new(command: &str) -> Self {
        Self {
            command_lines: command
                .lines()
                .map(|line| line.trim_end().to_string())
                .filter(|line| !line.is_empty())
                .collect(),
            seen: 0,
            echoed: false,
        }
    }

    /// Returns `true` if `line` should be delivered.
    pub fn accept(&mut self, line: &str) -> bool {
        self.seen += 1;
        let line = line.trim_end();

        if self.seen == 1 {
            return false;
        }
        if self.command_lines.iter().any(|c| c == line) {
            self.echoed = true;
            return false;
        }
        if !self.echoed {
            return false;
        }
        !SESSION_END_LINES.contains(&line)
    }

    /// Number of lines inspected so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Whether the command echo has been observed.
    pub fn passed_window(&self) -> bool {
        self.echoed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(command: &str, lines: &[&str]) -> Vec<String> {
        let mut filter = NoiseFilter::new(command);
        lines
            .iter()
            .filter(|line| filter.accept(line))
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn test_banner_echo_and_exit_are_removed() {
        let out = run(
            "uname -a",
            &[
                "Last login: Mon Jan 1 00:00:00 2024",
                "Welcome to Ubuntu",
                "user@host:~$ export PS1=\"\"",
                "uname -a",
                "Linux host 6.1.0",
                "exit",
            ],
        );
        assert_eq!(out, vec!["Linux host 6.1.0"]);
    }

    #[test]
    fn test_output_equal_to_exit_after_echo_is_removed() {
        let out = run("echo done", &["ack", "echo done", "done", "logout"]);
        assert_eq!(out, vec!["done"]);
    }

    #[test]
    fn test_multiline_command_echo() {
        let out = run(
            "cd /tmp\nls",
            &["banner", "cd /tmp", "ls", "a.txt", "b.txt", "exit"],
        );
        assert_eq!(out, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_no_output_lines() {
        let out = run("true", &["banner", "true", "exit"]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_trailing_whitespace_ignored_for_echo() {
        let mut filter = NoiseFilter::new("hostname");
        assert!(!filter.accept("banner"));
        assert!(!filter.accept("hostname   "));
        assert!(filter.passed_window());
        assert!(filter.accept("web-1"));
        assert_eq!(filter.seen(), 3);
    }
}
