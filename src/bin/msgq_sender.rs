// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Demo sender.
//
// Usage:
//   msgq_sender --count N --start V [--stop] [--sleep-ms MS]
//
// Opens an existing queue and sends N `{pid, val, stop}` messages with
// consecutive values starting at V: the first third with blocking sends,
// the second third with try-sends retried until they succeed, the rest
// with timed sends retried on timeout. With --stop, a final message carrying
// the stop flag tells one receiver to quit.

use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use msgqx::{MessageQueue, WaitMode};

const MESSAGE_SIZE: usize = 12;

#[derive(Parser)]
#[command(name = "msgq_sender", about = "Send demo messages to a named queue", version)]
struct Cli {
    /// Queue name
    #[arg(short, long, env = "MSGQX_NAME", default_value = "msgqx-demo")]
    name: String,

    /// Number of messages to send
    #[arg(short, long, default_value_t = 12)]
    count: u32,

    /// Value carried by the first message
    #[arg(short, long, default_value_t = 0)]
    start: i32,

    /// Send a stop message after the batch
    #[arg(long)]
    stop: bool,

    /// Budget of each timed send, in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Pause after each sent message, in milliseconds
    #[arg(long, default_value_t = 0)]
    sleep_ms: u64,

    /// Default log level when RUST_LOG is not set
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,
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
    fn encode(&self) -> [u8; MESSAGE_SIZE] {
        let mut buf = [0u8; MESSAGE_SIZE];
        buf[0..4].copy_from_slice(&self.pid.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.val.to_ne_bytes());
        buf[8..12].copy_from_slice(&(self.stop as i32).to_ne_bytes());
        buf
    }
}

/// Send one message, retrying for as long as `mode` reports a retryable
/// outcome.
fn send_retrying(queue: &MessageQueue, msg: &DemoMessage, mode: WaitMode) -> anyhow::Result<()> {
    let bytes = msg.encode();
    loop {
        match queue.send_with(&bytes, mode) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() => {
                debug!(val = msg.val, ?mode, "queue full, retrying");
                thread::yield_now();
            }
            Err(e) => return Err(e).with_context(|| format!("send of value {} failed", msg.val)),
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

    let pid = std::process::id() as i32;
    info!(pid, queue = %cli.name, count = cli.count, start = cli.start, "sender starting");

    let mut queue = MessageQueue::open_expecting(&cli.name, MESSAGE_SIZE)
        .with_context(|| format!("cannot open queue {:?}", cli.name))?;

    let third = cli.count / 3;
    let timed = WaitMode::Timeout(Duration::from_millis(cli.timeout_ms));
    for i in 0..cli.count {
        let mode = match i {
            i if i < third => WaitMode::Block,
            i if i < 2 * third => WaitMode::Try,
            _ => timed,
        };
        let msg = DemoMessage {
            pid,
            val: cli.start.wrapping_add(i as i32),
            stop: false,
        };
        send_retrying(&queue, &msg, mode)?;
        if cli.sleep_ms > 0 {
            thread::sleep(Duration::from_millis(cli.sleep_ms));
        }
    }

    if cli.stop {
        info!("sending stop message");
        let msg = DemoMessage {
            pid,
            val: cli.start.wrapping_add(cli.count as i32),
            stop: true,
        };
        send_retrying(&queue, &msg, WaitMode::Block)?;
    }

    queue.close().context("close failed")?;
    Ok(())
}
