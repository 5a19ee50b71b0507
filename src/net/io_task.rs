//! Async client I/O task: reactor-driven JSON-lines transport.
//!
//! Runs in a dedicated thread using `edge-executor` for cooperative
//! scheduling and `async-io-mini` for readiness-driven sockets.
//!
//! 1. **Accept**: awaits new TCP connections and spawns a reader each
//! 2. **Read**: one task per client, decodes lines into [`Inbound`]
//! 3. **Fan-out**: wakes on `OUTBOUND.receive().await` and queues each
//!    line on its targets without awaiting any socket
//! 4. **Write**: one task per client drains that client's queue
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────────┐
//!  │  Net I/O thread                                            │
//!  │  ┌──────────────────────────────────────────────────────┐  │
//!  │  │  futures_lite::future::block_on                      │  │
//!  │  │  ┌──────────────────────────────────────────────────┐│  │
//!  │  │  │  edge_executor::LocalExecutor                    ││  │
//!  │  │  │  ┌────────┐ ┌───────────┐ ┌───────┐ ┌──────────┐││  │
//!  │  │  │  │ Accept │ │ Read ×    │ │Fan-out│ │ Write ×  │││  │
//!  │  │  │  │        │ │ client    │ │       │ │ client   │││  │
//!  │  │  │  └────────┘ └───────────┘ └───────┘ └──────────┘││  │
//!  │  │  └──────────────────────────────────────────────────┘│  │
//!  │  └──────────────────────────────────────────────────────┘  │
//!  └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection ids are allocated here, in accept order.  Each reader
//! owns a token bucket; intents past it are dropped before they reach
//! the control loop.  Each writer owns a bounded queue, so a stalled
//! socket only backs up its own client; one that falls
//! [`CLIENT_QUEUE_DEPTH`] lines behind is disconnected.

use core::cell::RefCell;
use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::rc::Rc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use async_io_mini::Async;
use burster::Limiter;
use edge_executor::LocalExecutor;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, info, warn};

use crate::access::ConnectionId;
use crate::app::events::ClientEvent;
use crate::config::ServerConfig;

use super::channels::{INBOUND, Inbound, OUTBOUND, Outbound, Target};
use super::lines::LineDecoder;
use super::protocol::{self, HELLO_EXPECTED, MALFORMED, RATE_LIMITED};

const READ_BUF_SIZE: usize = 1024;

/// Connected clients beyond this are refused at accept.
pub const MAX_CLIENTS: usize = 32;

/// Lines a client may fall behind before it is dropped.
pub const CLIENT_QUEUE_DEPTH: usize = 64;

/// Run-queue capacity: accept, fan-out, and a reader and a writer per
/// client.
const EXECUTOR_CAPACITY: usize = 2 + 2 * MAX_CLIENTS;

type Executor = LocalExecutor<'static, EXECUTOR_CAPACITY>;

// ── Client queues ────────────────────────────────────────────

/// Lines waiting for one client's writer.
#[derive(Debug, Default)]
struct ClientQueue {
    lines: VecDeque<Rc<str>>,
    close_after: bool,
    shut: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Next {
    Line(Rc<str>),
    Close,
    Idle,
}

impl ClientQueue {
    /// Queue a line.  Returns `false` when the client is already
    /// [`CLIENT_QUEUE_DEPTH`] lines behind.
    fn push(&mut self, line: Rc<str>) -> bool {
        if self.shut || self.close_after {
            return true;
        }
        if self.lines.len() >= CLIENT_QUEUE_DEPTH {
            return false;
        }
        self.lines.push_back(line);
        true
    }

    /// Close once the lines already queued are written.
    fn close_after_drain(&mut self) {
        self.close_after = true;
    }

    /// Close now, dropping whatever is queued.
    fn shut(&mut self) {
        self.shut = true;
        self.lines.clear();
    }

    fn next(&mut self) -> Next {
        if self.shut {
            return Next::Close;
        }
        match self.lines.pop_front() {
            Some(line) => Next::Line(line),
            None if self.close_after => Next::Close,
            None => Next::Idle,
        }
    }
}

/// Writer half of a client: its queue and the writer's wake-up.
struct ClientOut {
    queue: RefCell<ClientQueue>,
    ready: Signal<NoopRawMutex, ()>,
}

impl ClientOut {
    fn new() -> Self {
        Self {
            queue: RefCell::new(ClientQueue::default()),
            ready: Signal::new(),
        }
    }

    fn push(&self, line: Rc<str>) -> bool {
        let queued = self.queue.borrow_mut().push(line);
        self.ready.signal(());
        queued
    }

    fn close_after_drain(&self) {
        self.queue.borrow_mut().close_after_drain();
        self.ready.signal(());
    }

    fn shut(&self) {
        self.queue.borrow_mut().shut();
        self.ready.signal(());
    }
}

// ── Client table ─────────────────────────────────────────────

struct ClientSlot {
    stream: Rc<Async<TcpStream>>,
    out: Rc<ClientOut>,
    /// Set once the control loop has addressed this client directly;
    /// broadcasts skip clients still waiting for their welcome.
    answered: bool,
}

type SharedSlots = Rc<RefCell<BTreeMap<ConnectionId, ClientSlot>>>;

type IntentBucket = burster::TokenBucket<fn() -> Duration>;

#[derive(Debug, Clone, Copy)]
struct RateLimit {
    per_sec: u64,
    burst: u64,
}

impl RateLimit {
    fn bucket(self) -> IntentBucket {
        burster::TokenBucket::new_with_time_provider(
            self.per_sec,
            self.burst,
            monotonic_now as fn() -> Duration,
        )
    }
}

fn monotonic_now() -> Duration {
    use std::sync::OnceLock;
    use std::time::Instant;
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

fn close(slots: &SharedSlots, id: ConnectionId) {
    if let Some(slot) = slots.borrow_mut().remove(&id) {
        slot.out.shut();
        // Wakes the reader with EOF; it reports the close.
        let _ = slot.stream.get_ref().shutdown(Shutdown::Both);
    }
}

async fn write_all(stream: &Async<TcpStream>, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        let n = stream.write_with(|mut s| s.write(data)).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        data = &data[n..];
    }
    Ok(())
}

async fn reply(id: ConnectionId, event: &ClientEvent, close: bool) {
    match protocol::encode_event(event) {
        Ok(line) => {
            OUTBOUND
                .send(Outbound {
                    target: Target::One(id),
                    line,
                    close,
                })
                .await;
        }
        Err(e) => warn!("net: cannot encode reply: {e}"),
    }
}

// ── Tasks ────────────────────────────────────────────────────

async fn accept_loop(
    listener: Async<TcpListener>,
    executor: Rc<Executor>,
    slots: SharedSlots,
    limit: RateLimit,
) {
    let mut next_id: ConnectionId = 1;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("net: accept failed: {e}");
                continue;
            }
        };
        if slots.borrow().len() >= MAX_CLIENTS {
            warn!("net: refusing {peer}, {MAX_CLIENTS} clients connected");
            let _ = stream.get_ref().shutdown(Shutdown::Both);
            continue;
        }

        let id = next_id;
        next_id = next_id.wrapping_add(1).max(1);
        info!("net: client {id} connected from {peer}");

        let stream = Rc::new(stream);
        let out = Rc::new(ClientOut::new());
        slots.borrow_mut().insert(
            id,
            ClientSlot {
                stream: stream.clone(),
                out: out.clone(),
                answered: false,
            },
        );
        executor
            .spawn(writer_loop(id, stream.clone(), out, slots.clone()))
            .detach();
        executor
            .spawn(client_loop(id, stream, slots.clone(), limit.bucket()))
            .detach();
    }
}

/// Read lines from one client until it closes.  The first line must be
/// a hello frame.
async fn client_loop(
    id: ConnectionId,
    stream: Rc<Async<TcpStream>>,
    slots: SharedSlots,
    mut bucket: IntentBucket,
) {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut greeted = false;
    // One notice per run of dropped intents.
    let mut throttled = false;

    'read: loop {
        let n = match stream.read_with(|mut s| s.read(&mut buf)).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("net: client {id} read error: {e}");
                break;
            }
        };

        for line in decoder.feed(&buf[..n]) {
            if !greeted {
                match protocol::parse_hello(&line) {
                    Ok(request) => {
                        greeted = true;
                        INBOUND.send(Inbound::Hello { id, request }).await;
                    }
                    Err(e) => {
                        debug!("net: client {id} bad hello: {e}");
                        reply(id, &ClientEvent::Error(HELLO_EXPECTED.into()), true).await;
                        break 'read;
                    }
                }
                continue;
            }
            if bucket.try_consume(1).is_err() {
                if !throttled {
                    throttled = true;
                    debug!("net: client {id} over its intent rate, dropping");
                    reply(id, &ClientEvent::Error(RATE_LIMITED.into()), false).await;
                }
                continue;
            }
            throttled = false;
            match protocol::parse_intent(&line) {
                Ok(intent) => INBOUND.send(Inbound::Intent { id, intent }).await,
                Err(e) => {
                    debug!("net: client {id} malformed line: {e}");
                    reply(id, &ClientEvent::Error(MALFORMED.into()), false).await;
                }
            }
        }
    }

    info!("net: client {id} disconnected");
    close(&slots, id);
    if greeted {
        INBOUND.send(Inbound::Closed { id }).await;
    }
}

/// Route each outbound line onto its targets' queues.
async fn fan_out_loop(slots: SharedSlots) {
    loop {
        let msg = OUTBOUND.receive().await;
        let line: Rc<str> = msg.line.into();

        let mut lagging = Vec::new();
        {
            let mut table = slots.borrow_mut();
            match msg.target {
                Target::All => {
                    for (&id, slot) in table.iter().filter(|(_, slot)| slot.answered) {
                        if !slot.out.push(line.clone()) {
                            lagging.push(id);
                        }
                    }
                }
                Target::One(id) => {
                    if let Some(slot) = table.get_mut(&id) {
                        slot.answered = true;
                        if !slot.out.push(line) {
                            lagging.push(id);
                        } else if msg.close {
                            slot.out.close_after_drain();
                        }
                    }
                }
            }
        }

        for id in lagging {
            warn!("net: client {id} is {CLIENT_QUEUE_DEPTH} lines behind, closing");
            close(&slots, id);
        }
    }
}

/// Write one client's queued lines until it closes.
async fn writer_loop(
    id: ConnectionId,
    stream: Rc<Async<TcpStream>>,
    out: Rc<ClientOut>,
    slots: SharedSlots,
) {
    loop {
        let next = out.queue.borrow_mut().next();
        match next {
            Next::Line(line) => {
                if let Err(e) = write_all(&stream, line.as_bytes()).await {
                    warn!("net: write to client {id} failed: {e}");
                    break;
                }
            }
            Next::Close => break,
            Next::Idle => out.ready.wait().await,
        }
    }
    close(&slots, id);
}

// ── Thread spawn ─────────────────────────────────────────────

fn run_io_loop(listener: TcpListener, limit: RateLimit) {
    let listener = match Async::new(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!("net: cannot register listener: {e}");
            return;
        }
    };

    let executor: Rc<Executor> = Rc::new(LocalExecutor::new());
    let slots: SharedSlots = Rc::default();

    executor
        .spawn(accept_loop(listener, executor.clone(), slots.clone(), limit))
        .detach();
    executor.spawn(fan_out_loop(slots)).detach();

    info!("net: I/O task started ({MAX_CLIENTS} max clients)");
    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Bind the configured address and serve clients from a dedicated thread.
pub fn spawn(config: &ServerConfig) -> Result<JoinHandle<()>> {
    let listen = &config.listen;
    let listener = TcpListener::bind(listen).with_context(|| format!("binding {listen}"))?;
    info!("net: listening on {listen}");
    let limit = RateLimit {
        per_sec: config.intents_per_sec,
        burst: config.intent_burst,
    };
    std::thread::Builder::new()
        .name("net-io".into())
        .spawn(move || run_io_loop(listener, limit))
        .context("spawning net I/O thread")
}
