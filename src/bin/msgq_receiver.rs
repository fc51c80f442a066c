// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Demo receiver.
//
// Usage:
//   msgq_receiver [--create --capacity N] [--wait block|try|timed] [--sleep-ms MS]
//
// Receives `{pid, val, stop}` messages and prints one line per message:
//   msg <pid> <val>
// until a message with the stop flag arrives. A receiver started with
// --create owns the queue and destroys it on exit.

use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use msgqx::{MessageQueue, WaitMode};

const MESSAGE_SIZE: usize = 12;

#[derive(Parser)]
#[command(name = "msgq_receiver", about = "Receive demo messages from a named queue", version)]
struct Cli {
    /// Queue name
    #[arg(short, long, env = "MSGQX_NAME", default_value = "msgqx-demo")]
    name: String,

    /// Create the queue (and destroy it on exit) instead of opening it
    #[arg(long)]
    create: bool,

    /// Queue capacity when creating
    #[arg(long, default_value_t = 12)]
    capacity: usize,

    /// How to wait for messages
    #[arg(short, long, value_enum, default_value = "block")]
    wait: WaitKind,

    /// Budget of each timed receive, in milliseconds
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    /// Pause after each received message, in milliseconds
    #[arg(long, default_value_t = 0)]
    sleep_ms: u64,

    /// Default log level when RUST_LOG is not set
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WaitKind {
    Block,
    Try,
    Timed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

struct DemoMessage {
    pid: i32,
    val: i32,
    stop: bool,
}

impl DemoMessage {
    fn decode(buf: &[u8; MESSAGE_SIZE]) -> Self {
        let field = |i: usize| i32::from_ne_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Self {
            pid: field(0),
            val: field(4),
            stop: field(8) != 0,
        }
    }
}

fn receive_loop(queue: &MessageQueue, cli: &Cli) -> anyhow::Result<()> {
    let mode = match cli.wait {
        WaitKind::Block => WaitMode::Block,
        WaitKind::Try => WaitMode::Try,
        WaitKind::Timed => WaitMode::Timeout(Duration::from_millis(cli.timeout_ms)),
    };
    let mut buf = [0u8; MESSAGE_SIZE];

    loop {
        match queue.receive_with(&mut buf, mode) {
            Ok(()) => {
                let msg = DemoMessage::decode(&buf);
                if msg.stop {
                    info!(from = msg.pid, "stop message received");
                    return Ok(());
                }
                println!("msg {} {}", msg.pid, msg.val);
                if cli.sleep_ms > 0 {
                    thread::sleep(Duration::from_millis(cli.sleep_ms));
                }
            }
            Err(e) if e.is_retryable() => {
                debug!(error = %e, "nothing to receive yet, retrying");
                if matches!(mode, WaitMode::Try) {
                    thread::yield_now();
                }
            }
            Err(e) => return Err(e).context("receive failed"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level: Level = cli.log_level.into();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(pid = std::process::id(), queue = %cli.name, "receiver starting");

    let mut queue = if cli.create {
        MessageQueue::create(&cli.name, MESSAGE_SIZE, cli.capacity)
            .with_context(|| format!("cannot create queue {:?}", cli.name))?
    } else {
        MessageQueue::open_expecting(&cli.name, MESSAGE_SIZE)
            .with_context(|| format!("cannot open queue {:?}", cli.name))?
    };

    let received = receive_loop(&queue, &cli);

    let closed = queue.close().context("close failed");
    let destroyed = if cli.create {
        MessageQueue::destroy(&cli.name).context("destroy failed")
    } else {
        Ok(())
    };

    received?;
    closed?;
    destroyed?;
    Ok(())
}
