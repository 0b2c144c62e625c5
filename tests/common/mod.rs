//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use restic_exporter::client::ResticClient;
use restic_exporter::error::{CommandStatus, ExporterError, Result};
use restic_exporter::runner::{CommandOutput, CommandRunner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

pub const VERSION_OUTPUT: &str = "restic 0.17.3 compiled with go1.22.5 on linux/amd64\n";

/// Two groups: server1 (modern client, two snapshots) and server2 (legacy
/// client, one snapshot).
pub const SNAPSHOTS_JSON: &str = r#"[
  {
    "time": "2024-01-11T06:59:33+01:00",
    "hostname": "server1",
    "username": "root",
    "paths": ["/home", "/etc"],
    "tags": ["daily"],
    "program_version": "restic 0.17.3",
    "id": "1111111111111111111111111111111111111111111111111111111111111111",
    "short_id": "11111111",
    "summary": {
      "backup_start": "2024-01-11T06:59:00+01:00",
      "backup_end": "2024-01-11T06:59:30+01:00",
      "files_new": 1, "files_changed": 2, "files_unmodified": 3,
      "dirs_new": 0, "dirs_changed": 1, "dirs_unmodified": 5,
      "data_added": 1024, "total_bytes_processed": 4096
    }
  },
  {
    "time": "2024-01-12T06:59:33+01:00",
    "hostname": "server1",
    "username": "root",
    "paths": ["/home", "/etc"],
    "tags": ["daily", "automated"],
    "program_version": "restic 0.17.3",
    "id": "2222222222222222222222222222222222222222222222222222222222222222",
    "short_id": "22222222",
    "summary": {
      "backup_start": "2024-01-12T06:59:00+01:00",
      "backup_end": "2024-01-12T06:59:33+01:00",
      "files_new": 10, "files_changed": 20, "files_unmodified": 30,
      "dirs_new": 1, "dirs_changed": 2, "dirs_unmodified": 3,
      "data_added": 2048, "total_bytes_processed": 8192
    }
  },
  {
    "time": "2023-02-01T14:14:19Z",
    "hostname": "server2",
    "username": "backup",
    "paths": ["/var"],
    "program_version": "restic 0.16.4",
    "id": "3333333333333333333333333333333333333333333333333333333333333333",
    "short_id": "33333333"
  }
]"#;

pub const SNAPSHOT_STATS_JSON: &str = r#"{"total_size": 1073741824, "total_file_count": 1000}"#;

pub const RAW_DATA_STATS_JSON: &str = r#"{
  "total_size": 38573452,
  "total_uncompressed_size": 44077773,
  "compression_ratio": 1.1426926864485195,
  "total_blob_count": 1522,
  "snapshots_count": 3
}"#;

pub const LOCKS_OUTPUT: &str = "\
a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90
0f9e8d7c6b5a49382716f5e4d3c2b1a00f9e8d7c6b5a49382716f5e4d3c2b1a0
";

/// Scripted reply for one invocation.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(String),
    /// Output delivered after a delay
    Slow(Duration, String),
    Exit(i32, String),
    Timeout,
}

/// Command runner answering from a script and recording every call.
///
/// Keys are the sub-command followed by its arguments, joined by spaces
/// (e.g. `"stats --json --mode raw-data"`). The longest key that is a
/// prefix of the invocation wins.
#[derive(Default)]
pub struct FakeRunner {
    replies: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner answering every sub-command successfully.
    pub fn healthy() -> Self {
        let runner = Self::new();
        runner.reply("version", Reply::Output(VERSION_OUTPUT.to_string()));
        runner.reply("snapshots --json", Reply::Output(SNAPSHOTS_JSON.to_string()));
        runner.reply(
            "stats --json --mode raw-data",
            Reply::Output(RAW_DATA_STATS_JSON.to_string()),
        );
        runner.reply("stats --json", Reply::Output(SNAPSHOT_STATS_JSON.to_string()));
        runner.reply("check", Reply::Output("no errors were found\n".to_string()));
        runner.reply("list locks", Reply::Output(LOCKS_OUTPUT.to_string()));
        runner
    }

    /// Script a reply. Replies added later take precedence.
    pub fn reply(&self, key: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(0, (key.to_string(), reply));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// Highest number of invocations that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        subcommand: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut invocation = vec![subcommand];
        invocation.extend_from_slice(args);
        let invocation = invocation.join(" ");
        self.calls.lock().unwrap().push(invocation.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(key, _)| invocation.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, reply)| reply.clone());

        let failure = |status: CommandStatus, stderr: &str| ExporterError::Execution {
            subcommand: subcommand.to_string(),
            status,
            stderr_excerpt: stderr.to_string(),
        };

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(Reply::Slow(delay, _)) = &reply {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Output(stdout)) | Some(Reply::Slow(_, stdout)) => {
                Ok(CommandOutput::new(stdout))
            }
            Some(Reply::Exit(code, stderr)) => Err(failure(CommandStatus::Exited(code), &stderr)),
            Some(Reply::Timeout) => Err(failure(CommandStatus::TimedOut(timeout), "")),
            None => Err(failure(CommandStatus::Exited(1), "unscripted invocation")),
        }
    }
}

/// A client over the given fake runner.
pub fn client(runner: &Arc<FakeRunner>) -> ResticClient {
    ResticClient::new(runner.clone(), Duration::from_secs(30))
}

/// Log output captured from a `tracing` subscriber.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Install a subscriber writing into this capture for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Number of captured lines at the given level (e.g. `"ERROR"`).
    pub fn count_level(&self, level: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.split_whitespace().nth(1) == Some(level))
            .count()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
