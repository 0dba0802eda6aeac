//! In-process stand-ins for SSH hosts.

#![allow(dead_code)]

use async_trait::async_trait;
use fleetsh::connection::{ConnectRequest, Connector, ShellChannel, ShellEvent, Transport};
use fleetsh::ssh::Error as SshError;
use fleetsh::{Fleet, FleetConfig};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

/// What a host prints for a command.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: u32,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
pub struct Stats {
    pub resolves: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub shells: AtomicUsize,
}

impl Stats {
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn shells(&self) -> usize {
        self.shells.load(Ordering::SeqCst)
    }
}

type Handler = Arc<dyn Fn(&str, &str) -> Reply + Send + Sync>;

/// A fleet of fake hosts. Every host echoes input, prints a banner line
/// and answers commands through `handler`.
pub struct MockConnector {
    pub stats: Arc<Stats>,
    pub requests: Mutex<Vec<ConnectRequest>>,
    unresolvable: Mutex<HashSet<String>>,
    refuse: AtomicBool,
    handler: Mutex<Handler>,
    sessions: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stats: Arc::default(),
            requests: Mutex::new(Vec::new()),
            unresolvable: Mutex::new(HashSet::new()),
            refuse: AtomicBool::new(false),
            handler: Mutex::new(Arc::new(|host: &str, command: &str| {
                Reply::ok(&format!("{host}: {command}\n"))
            })),
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn respond<F>(&self, handler: F)
    where
        F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Arc::new(handler);
    }

    pub fn unresolvable(&self, host: &str) {
        self.unresolvable.lock().unwrap().insert(host.to_string());
    }

    pub fn refuse_sessions(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Every session opened so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<MockTransport>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ConnectRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        self.stats.resolves.fetch_add(1, Ordering::SeqCst);
        if self.unresolvable.lock().unwrap().contains(host) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "name not known"));
        }
        Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))])
    }

    async fn open(&self, request: ConnectRequest) -> Result<Arc<dyn Transport>, SshError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        let host = request.host.clone();
        self.requests.lock().unwrap().push(request);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SshError::PasswordWrong);
        }
        let (closed, _) = watch::channel(false);
        let transport = Arc::new(MockTransport {
            host,
            closed,
            stats: self.stats.clone(),
            handler: self.handler.lock().unwrap().clone(),
        });
        self.sessions.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}

/// One fake session. Closing it ends every shell opened on it.
pub struct MockTransport {
    host: String,
    closed: watch::Sender<bool>,
    stats: Arc<Stats>,
    handler: Handler,
}

impl MockTransport {
    /// The server drops the connection.
    pub fn hang_up(&self) {
        self.closed.send_replace(true);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_shell(&self) -> Result<Box<dyn ShellChannel>, SshError> {
        self.stats.shells.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockShell {
            host: self.host.clone(),
            input: Vec::new(),
            output: None,
            held: None,
            closed: self.closed.subscribe(),
            handler: self.handler.clone(),
        }))
    }

    async fn close(&self) -> Result<(), SshError> {
        self.closed.send_replace(true);
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Replays a login session once the full input has been typed.
///
/// The banner, echoes and stdout arrive at once. The reply's delay is spent
/// before stderr, `exit` and the exit status; closing the session during
/// that delay ends the channel.
pub struct MockShell {
    host: String,
    input: Vec<u8>,
    output: Option<VecDeque<ShellEvent>>,
    held: Option<(Duration, VecDeque<ShellEvent>)>,
    closed: watch::Receiver<bool>,
    handler: Handler,
}

impl MockShell {
    fn session(&self) -> (VecDeque<ShellEvent>, Duration, VecDeque<ShellEvent>) {
        let typed = String::from_utf8_lossy(&self.input).into_owned();
        let lines: Vec<&str> = typed.lines().collect();
        // export PS1="" / command lines / exit
        let command = lines[1..lines.len() - 1].join("\n");
        let reply = (self.handler)(&self.host, &command);

        let mut now = VecDeque::new();
        now.push_back(ShellEvent::Stdout(
            format!("Welcome to {}\r\n", self.host).into_bytes(),
        ));
        now.push_back(ShellEvent::Stdout(format!("{}\r\n", lines[0]).into_bytes()));
        // Split the echo across chunks to exercise line framing.
        let echo = format!("{command}\r\n").into_bytes();
        let (head, tail) = echo.split_at(echo.len() / 2);
        now.push_back(ShellEvent::Stdout(head.to_vec()));
        now.push_back(ShellEvent::Stdout(tail.to_vec()));
        if !reply.stdout.is_empty() {
            now.push_back(ShellEvent::Stdout(reply.stdout.replace('\n', "\r\n").into_bytes()));
        }

        let mut later = VecDeque::new();
        if !reply.stderr.is_empty() {
            later.push_back(ShellEvent::Stderr(reply.stderr.into_bytes()));
        }
        later.push_back(ShellEvent::Stdout(b"exit\r\n".to_vec()));
        later.push_back(ShellEvent::ExitStatus(reply.exit_code));
        (now, reply.delay, later)
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        if *closed.borrow_and_update() {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn send(&mut self, data: &[u8]) -> Result<(), SshError> {
        self.input.extend_from_slice(data);
        Ok(())
    }

    async fn recv(&mut self) -> Option<ShellEvent> {
        if self.output.is_none() {
            let (now, delay, later) = self.session();
            self.output = Some(now);
            self.held = Some((delay, later));
        }
        if *self.closed.borrow() {
            return None;
        }
        if let Some(event) = self.output.as_mut()?.pop_front() {
            return Some(event);
        }

        let (delay, later) = self.held.take()?;
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_closed(&mut self.closed) => return None,
            }
        }
        self.output = Some(later);
        self.output.as_mut()?.pop_front()
    }
}

/// Settings for tests: state in `dir`, agent auth, fixed username.
pub fn test_config(dir: &TempDir) -> FleetConfig {
    FleetConfig {
        use_agent: true,
        ..FleetConfig::default()
            .with_state_dir(dir.path().join(".ops"))
            .with_username("tester")
    }
}

pub fn fleet(dir: &TempDir) -> (Arc<Fleet>, Arc<MockConnector>) {
    fleet_with(test_config(dir))
}

pub fn fleet_with(config: FleetConfig) -> (Arc<Fleet>, Arc<MockConnector>) {
    let connector = MockConnector::new();
    let fleet = Fleet::with_connector(config, connector.clone());
    (fleet, connector)
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}
