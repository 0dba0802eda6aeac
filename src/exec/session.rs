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

//! One command run over an interactive shell channel.

use super::filter::NoiseFilter;
use super::framer::LineFramer;
use super::{ExecOutput, ShellCommand};
use crate::connection::{ShellEvent, Transport};
use crate::events::{NodeEvent, Observers};
use crate::ssh;

/// Blanks the prompt so only the banner and the echo remain to filter.
pub const PROMPT_DIRECTIVE: &[u8] = b"export PS1=\"\"\n";
/// Ends the shell once the command returns so the channel closes.
pub const END_DIRECTIVE: &[u8] = b"exit\n";

/// State of a single exec, from shell open to channel close.
pub struct ExecutionSession<'a> {
    framer: LineFramer,
    filter: NoiseFilter,
    stdout: String,
    exit_code: Option<u32>,
    signal: Option<String>,
    events: &'a Observers<NodeEvent>,
}

impl<'a> ExecutionSession<'a> {
    pub fn new(command: &ShellCommand, events: &'a Observers<NodeEvent>) -> Self {
        Self {
            framer: LineFramer::new(),
            filter: NoiseFilter::new(command.text()),
            stdout: String::new(),
            exit_code: None,
            signal: None,
            events,
        }
    }

    pub fn handle(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Stdout(bytes) => {
                let lines = self.framer.push(&bytes);
                self.events.emit(NodeEvent::Data(bytes));
                for line in lines {
                    self.line(line);
                }
            }
            ShellEvent::Stderr(bytes) => self.events.emit(NodeEvent::Stderr(bytes)),
            ShellEvent::ExitStatus(code) => self.exit_code = Some(code),
            ShellEvent::ExitSignal(signal) => self.signal = Some(signal),
        }
    }

    fn line(&mut self, line: String) {
        if self.filter.accept(&line) {
            self.stdout.push_str(&line);
            self.stdout.push('\n');
            self.events.emit(NodeEvent::Line(line));
        } else {
            tracing::trace!("Suppressed shell line {:?}", line);
        }
    }

    /// Flush any partial line and produce the terminal result.
    pub fn finish(mut self) -> ExecOutput {
        if let Some(rest) = self.framer.finish() {
            self.line(rest);
        }
        let output = ExecOutput {
            stdout: self.stdout,
            exit_code: self.exit_code,
            signal: self.signal,
        };
        self.events.emit(NodeEvent::ExecComplete(output.clone()));
        output
    }
}

/// Run `command` in a fresh shell on `transport` and wait for the channel
/// to close.
pub async fn run(
    transport: &dyn Transport,
    command: &ShellCommand,
    events: &Observers<NodeEvent>,
) -> Result<ExecOutput, ssh::Error> {
    let mut shell = transport.open_shell().await?;

    shell.send(PROMPT_DIRECTIVE).await?;
    shell.send(format!("{}\n", command.text()).as_bytes()).await?;
    shell.send(END_DIRECTIVE).await?;

    let mut session = ExecutionSession::new(command, events);
    while let Some(event) = shell.recv().await {
        session.handle(event);
    }
    Ok(session.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(command: &str, chunks: &[&[u8]]) -> (ExecOutput, Vec<NodeEvent>) {
        let events = Observers::new();
        let mut rx = events.subscribe();
        let command = ShellCommand::new(command).unwrap();
        let mut session = ExecutionSession::new(&command, &events);
        for chunk in chunks {
            session.handle(ShellEvent::Stdout(chunk.to_vec()));
        }
        session.handle(ShellEvent::ExitStatus(0));
        let output = session.finish();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        (output, seen)
    }

    #[test]
    fn test_noise_is_removed_from_aggregate() {
        let (output, _) = feed(
            "cat /etc/hostname",
            &[b"ack\nbanner\ncat /etc/hostname\nreal line 1\nreal line 2\nexit\n"],
        );
        assert_eq!(output.stdout, "real line 1\nreal line 2\n");
        assert_eq!(output.exit_code, Some(0));
        assert!(output.success());
    }

    #[test]
    fn test_lines_and_completion_are_notified() {
        let (output, events) = feed("hostname", &[b"banner\r\nhost", b"name\r\nweb-1\r\n", b"exit"]);
        assert_eq!(output.stdout, "web-1\n");

        let lines: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                NodeEvent::Line(line) => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["web-1"]);
        assert_eq!(
            events.iter().filter(|e| matches!(e, NodeEvent::Data(_))).count(),
            3
        );
        assert_eq!(events.last(), Some(&NodeEvent::ExecComplete(output)));
    }

    #[test]
    fn test_stderr_does_not_reach_stdout() {
        let events = Observers::new();
        let mut rx = events.subscribe();
        let command = ShellCommand::new("false").unwrap();
        let mut session = ExecutionSession::new(&command, &events);
        session.handle(ShellEvent::Stderr(b"warning\n".to_vec()));
        session.handle(ShellEvent::ExitStatus(1));
        let output = session.finish();

        assert_eq!(output.stdout, "");
        assert_eq!(output.exit_code, Some(1));
        assert_eq!(rx.try_recv().unwrap(), NodeEvent::Stderr(b"warning\n".to_vec()));
    }
}
