// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Many producers and consumers on one queue, first as threads and then as
// separate processes running the demo binaries. Every message must arrive
// exactly once.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use msgqx::{Error, MessageQueue};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = format!("stress_{tag}_{n}_{}", std::process::id());
    let _ = MessageQueue::destroy(&name);
    name
}

fn encode(tag: u32, stop: bool) -> [u8; 8] {
    let mut msg = [0u8; 8];
    msg[..4].copy_from_slice(&tag.to_le_bytes());
    msg[4] = stop as u8;
    msg
}

fn run_threads(tag: &str, producers: u32, consumers: usize, per_producer: u32, capacity: usize) {
    let name = unique_name(tag);
    let creator = MessageQueue::create(&name, 8, capacity).expect("create");
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|_| {
            let name = name.clone();
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let q = MessageQueue::open(&name).expect("open consumer");
                let mut buf = [0u8; 8];
                let mut local = Vec::new();
                loop {
                    match q.timed_receive(&mut buf, Duration::from_millis(100)) {
                        Ok(()) if buf[4] != 0 => break,
                        Ok(()) => local.push(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
                        Err(Error::TimedOut) => continue,
                        Err(e) => panic!("receive failed: {e}"),
                    }
                }
                seen.lock().unwrap().extend(local);
            })
        })
        .collect();

    let producer_handles: Vec<_> = (0..producers)
        .map(|p| {
            let name = name.clone();
            thread::spawn(move || {
                let q = MessageQueue::open(&name).expect("open producer");
                for i in 0..per_producer {
                    q.send(&encode(p * per_producer + i, false)).expect("send");
                }
            })
        })
        .collect();

    for h in producer_handles {
        h.join().unwrap();
    }
    for _ in 0..consumers {
        creator.send(&encode(0, true)).expect("send stop");
    }
    for h in consumer_handles {
        h.join().unwrap();
    }

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    let expected: Vec<u32> = (0..producers * per_producer).collect();
    assert_eq!(seen, expected, "every message must be received exactly once");
    assert!(creator.is_empty().expect("is_empty"));
    MessageQueue::destroy(&name).expect("destroy");
}

#[test]
fn threads_1v1() {
    run_threads("t_1v1", 1, 1, 2000, 4);
}

#[test]
fn threads_1vn() {
    run_threads("t_1vn", 1, 4, 2000, 8);
}

#[test]
fn threads_nv1() {
    run_threads("t_nv1", 4, 1, 500, 8);
}

#[test]
fn threads_nvn() {
    run_threads("t_nvn", 4, 4, 500, 3);
}

#[test]
fn threads_single_slot() {
    run_threads("t_slot", 3, 3, 300, 1);
}

// Payload understood by the demo binaries: native-endian pid, val, stop.
fn demo_stop_message() -> [u8; 12] {
    let mut msg = [0u8; 12];
    msg[0..4].copy_from_slice(&(std::process::id() as i32).to_ne_bytes());
    msg[8..12].copy_from_slice(&1i32.to_ne_bytes());
    msg
}

#[test]
fn processes_nvn() {
    const SENDERS: i32 = 3;
    const RECEIVERS: usize = 3;
    const PER_SENDER: i32 = 60;

    let name = unique_name("p_nvn");
    let creator = MessageQueue::create(&name, 12, 5).expect("create");

    let receivers: Vec<_> = (0..RECEIVERS)
        .map(|_| {
            Command::new(env!("CARGO_BIN_EXE_msgq_receiver"))
                .args(["--name", &name, "--wait", "timed", "--timeout-ms", "200"])
                .args(["--log-level", "warn"])
                .stdout(Stdio::piped())
                .spawn()
                .expect("spawn receiver")
        })
        .collect();

    let senders: Vec<_> = (0..SENDERS)
        .map(|s| {
            Command::new(env!("CARGO_BIN_EXE_msgq_sender"))
                .args(["--name", &name])
                .args(["--count", &PER_SENDER.to_string()])
                .args(["--start", &(s * PER_SENDER).to_string()])
                .args(["--log-level", "warn"])
                .spawn()
                .expect("spawn sender")
        })
        .collect();

    for mut sender in senders {
        let status = sender.wait().expect("wait sender");
        assert!(status.success(), "sender exited with {status}");
    }

    let start = Instant::now();
    for _ in 0..RECEIVERS {
        creator
            .timed_send(&demo_stop_message(), Duration::from_secs(10))
            .expect("send stop");
    }

    let mut counts: HashMap<i32, usize> = HashMap::new();
    for mut receiver in receivers {
        let stdout = receiver.stdout.take().expect("receiver stdout");
        for line in BufReader::new(stdout).lines() {
            let line = line.expect("read line");
            let mut fields = line.split_whitespace();
            assert_eq!(fields.next(), Some("msg"), "unexpected line {line:?}");
            let _pid: i32 = fields.next().and_then(|f| f.parse().ok()).expect("pid");
            let val: i32 = fields.next().and_then(|f| f.parse().ok()).expect("val");
            *counts.entry(val).or_default() += 1;
        }
        let status = receiver.wait().expect("wait receiver");
        assert!(status.success(), "receiver exited with {status}");
    }
    assert!(start.elapsed() < Duration::from_secs(30));

    assert_eq!(counts.len(), (SENDERS * PER_SENDER) as usize);
    for val in 0..SENDERS * PER_SENDER {
        assert_eq!(counts.get(&val), Some(&1), "value {val}");
    }
    MessageQueue::destroy(&name).expect("destroy");
}

#[test]
fn receiver_binary_creates_and_destroys() {
    let name = unique_name("p_owner");
    let mut receiver = Command::new(env!("CARGO_BIN_EXE_msgq_receiver"))
        .args(["--name", &name, "--create", "--capacity", "4"])
        .args(["--log-level", "warn"])
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn receiver");

    // Wait for the receiver to publish the queue.
    let deadline = Instant::now() + Duration::from_secs(10);
    let queue = loop {
        match MessageQueue::open_expecting(&name, 12) {
            Ok(q) => break q,
            Err(e) if (e.is_not_found() || e.is_retryable()) && Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("queue never appeared: {e}"),
        }
    };

    let status = Command::new(env!("CARGO_BIN_EXE_msgq_sender"))
        .args(["--name", &name, "--count", "9", "--start", "100", "--stop"])
        .args(["--log-level", "warn"])
        .status()
        .expect("run sender");
    assert!(status.success(), "sender exited with {status}");

    let output = receiver.wait_with_output().expect("receiver output");
    assert!(output.status.success());
    let vals: Vec<i32> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.split_whitespace().nth(2)?.parse().ok())
        .collect();
    assert_eq!(vals, (100..109).collect::<Vec<_>>());

    drop(queue);
    assert!(MessageQueue::open(&name).unwrap_err().is_not_found());
}
