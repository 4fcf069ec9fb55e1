//! Shared helpers for integration tests
//!
//! `FakeRedis` is an in-process server speaking enough RESP2 for the
//! commands a Redis stash sends: PING, CLIENT, SELECT, GET, MGET, SET (EX,
//! XX, NX), DEL, EXISTS and SCAN MATCH.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stash::ConnectionConfig;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

// == Fake Redis ==

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    entries: Mutex<HashMap<String, Entry>>,
    /// Command name that is read but never answered
    stall_on: Mutex<Option<String>>,
}

pub struct FakeRedis {
    addr: SocketAddr,
    state: Arc<State>,
}

impl FakeRedis {
    /// Starts a server on an ephemeral local port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, shared.clone()));
            }
        });

        Self { addr, state }
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", self.addr.port(), false, None)
            .with_connect_timeout_ms(500)
            .with_borrow_wait_ms(500)
    }

    /// Stops answering `command` (e.g. "GET") until called again with `None`.
    pub fn stall_on(&self, command: Option<&str>) {
        *self.state.stall_on.lock() = command.map(str::to_ascii_uppercase);
    }

    /// Writes a value directly, bypassing any stash.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.state.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.state.entries.lock().get(key).map(|e| e.value.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

async fn serve(socket: TcpStream, state: Arc<State>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    while let Some(args) = read_command(&mut reader).await {
        let stalled = match (&*state.stall_on.lock(), args.first()) {
            (Some(stalled), Some(name)) => name.eq_ignore_ascii_case(stalled),
            _ => false,
        };
        if stalled {
            continue;
        }

        let reply = state.execute(&args);
        if write.write_all(&reply).await.is_err() {
            break;
        }
    }
}

async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
    let header = read_line(reader).await?;
    let count: usize = header.strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let length_line = read_line(reader).await?;
        let length: usize = length_line.strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; length + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(length);
        args.push(String::from_utf8(buf).ok()?);
    }
    Some(args)
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches("\r\n").to_string()),
    }
}

impl State {
    fn execute(&self, args: &[String]) -> Vec<u8> {
        let Some(name) = args.first() else {
            return error("empty command");
        };
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));

        match name.to_ascii_uppercase().as_str() {
            "PING" => match args.get(1) {
                Some(echo) => bulk(Some(echo.as_str())),
                None => simple("PONG"),
            },
            "CLIENT" | "SELECT" => simple("OK"),
            "GET" if args.len() == 2 => bulk(entries.get(&args[1]).map(|e| e.value.as_str())),
            "MGET" => array(
                args[1..]
                    .iter()
                    .map(|key| bulk(entries.get(key).map(|e| e.value.as_str())))
                    .collect(),
            ),
            "SET" if args.len() >= 3 => {
                let mut expires_at = None;
                let mut only_existing = false;
                let mut only_absent = false;
                let mut options = args[3..].iter();
                while let Some(option) = options.next() {
                    match option.to_ascii_uppercase().as_str() {
                        "EX" => {
                            let secs: u64 = match options.next().and_then(|s| s.parse().ok()) {
                                Some(secs) => secs,
                                None => return error("invalid expire time"),
                            };
                            expires_at = Some(now + Duration::from_secs(secs));
                        }
                        "XX" => only_existing = true,
                        "NX" => only_absent = true,
                        _ => return error("syntax error"),
                    }
                }

                let exists = entries.contains_key(&args[1]);
                if (only_existing && !exists) || (only_absent && exists) {
                    return bulk(None);
                }
                entries.insert(
                    args[1].clone(),
                    Entry {
                        value: args[2].clone(),
                        expires_at,
                    },
                );
                simple("OK")
            }
            "DEL" => integer(args[1..].iter().filter(|k| entries.remove(*k).is_some()).count()),
            "EXISTS" => integer(args[1..].iter().filter(|k| entries.contains_key(*k)).count()),
            "SCAN" => {
                let pattern = args
                    .iter()
                    .position(|a| a.eq_ignore_ascii_case("MATCH"))
                    .and_then(|i| args.get(i + 1))
                    .map(String::as_str)
                    .unwrap_or("*");
                let mut keys: Vec<&String> = entries
                    .keys()
                    .filter(|key| glob_match(pattern.as_bytes(), key.as_bytes()))
                    .collect();
                keys.sort();

                array(vec![
                    bulk(Some("0")),
                    array(keys.into_iter().map(|k| bulk(Some(k.as_str()))).collect()),
                ])
            }
            other => error(&format!("unknown command '{}'", other)),
        }
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'*') => (0..=text.len()).any(|i| glob_match(&pattern[1..], &text[i..])),
        Some(b'?') => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        Some(b'\\') if pattern.len() > 1 => {
            text.first() == Some(&pattern[1]) && glob_match(&pattern[2..], &text[1..])
        }
        Some(c) => text.first() == Some(c) && glob_match(&pattern[1..], &text[1..]),
    }
}

// == Replies ==

fn simple(text: &str) -> Vec<u8> {
    format!("+{}\r\n", text).into_bytes()
}

fn error(text: &str) -> Vec<u8> {
    format!("-ERR {}\r\n", text).into_bytes()
}

fn integer(n: usize) -> Vec<u8> {
    format!(":{}\r\n", n).into_bytes()
}

fn bulk(value: Option<&str>) -> Vec<u8> {
    match value {
        Some(value) => format!("${}\r\n{}\r\n", value.len(), value).into_bytes(),
        None => b"$-1\r\n".to_vec(),
    }
}

fn array(items: Vec<Vec<u8>>) -> Vec<u8> {
    let mut reply = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        reply.extend(item);
    }
    reply
}
