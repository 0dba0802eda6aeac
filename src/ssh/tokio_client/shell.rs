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

//! Interactive shell channels.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty};

use super::connection::Client;
use crate::connection::{ShellChannel, ShellEvent};

/// Terminal type requested for exec shells. Keeps remote programs from
/// emitting color and cursor control sequences.
const SHELL_TERM: &str = "dumb";
/// Wide enough that long commands are echoed back on a single line.
const SHELL_COLUMNS: u32 = 4096;
const SHELL_ROWS: u32 = 24;

/// Input is echoed so the command's own echo is always present and can be
/// filtered deterministically.
const SHELL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 1),
    (Pty::ICANON, 1),
    (Pty::ONLCR, 1),
    (Pty::TTY_OP_ISPEED, 38400),
    (Pty::TTY_OP_OSPEED, 38400),
];

/// A shell running on a remote PTY.
pub struct SshShell {
    channel: Channel<Msg>,
}

impl Client {
    /// Open a session channel, allocate a PTY and start the login shell.
    pub async fn open_shell(&self) -> Result<SshShell, super::Error> {
        let channel = self.handle.channel_open_session().await?;
        channel
            .request_pty(
                false,
                SHELL_TERM,
                SHELL_COLUMNS,
                SHELL_ROWS,
                0,
                0,
                SHELL_MODES,
            )
            .await?;
        channel.request_shell(false).await?;
        Ok(SshShell { channel })
    }
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn send(&mut self, data: &[u8]) -> Result<(), super::Error> {
        self.channel.data(data).await.map_err(super::Error::SshError)
    }

    async fn recv(&mut self) -> Option<ShellEvent> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { ref data } => return Some(ShellEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    return Some(ShellEvent::Stderr(data.to_vec()))
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ShellEvent::ExitStatus(exit_status))
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    return Some(ShellEvent::ExitSignal(format!("{signal_name:?}")))
                }
                // EOF may precede trailing data; only channel close ends the stream.
                _ => continue,
            }
        }
    }
}
