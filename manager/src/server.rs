//! Manager-side control-plane server.
//!
//! Grounded on `manager/communicator.py`'s `ServerConnection`: a single
//! listener plus a growing client set, multiplexed with a readiness
//! primitive (there, `select.select`; here, `mio::Poll`) rather than a
//! thread per client. When the last client disconnects the server raises a
//! terminal exit, matching the original's `SystemExit("All Workers exited.")`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use mio::net::{UnixListener, UnixStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{info, warn};
use vmfuzz_symbolic::SymbolicQueue;
use vmfuzz_wire::{Message, Value, MAX_FRAME_SIZE};

use crate::error::ManagerError;

const LISTENER_TOKEN: Token = Token(0);
const BACKLOG_HINT: usize = 1000;

struct ClientConn {
    stream: UnixStream,
    read_buf: Vec<u8>,
    worker_id: Option<u64>,
    is_symbolic: bool,
}

impl ClientConn {
    /// Pulls as many complete frames as are currently available without
    /// blocking; `mio` sockets are always non-blocking, so partial frames
    /// are buffered across calls instead of blocking mid-read. The `bool`
    /// reports whether the peer has closed its end.
    fn drain_frames(&mut self) -> std::io::Result<(Vec<Message>, bool)> {
        use std::io::Read;
        let mut chunk = [0u8; 65536];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok((self.take_complete_frames()?, true)),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Ok((self.take_complete_frames()?, false))
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Same length-prefix cap as `framed_recv_blocking`: a bogus or malicious
    /// length prefix must not be allowed to drive an unbounded buffer grow.
    fn take_complete_frames(&mut self) -> std::io::Result<Vec<Message>> {
        let mut out = Vec::new();
        loop {
            if self.read_buf.len() < 4 {
                break;
            }
            let len = u32::from_le_bytes(self.read_buf[0..4].try_into().unwrap());
            if len > MAX_FRAME_SIZE {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("frame length {len} exceeds {MAX_FRAME_SIZE}"),
                ));
            }
            let len = len as usize;
            if self.read_buf.len() < 4 + len {
                break;
            }
            let body = self.read_buf[4..4 + len].to_vec();
            self.read_buf.drain(0..4 + len);
            match rmpv::decode::read_value(&mut &body[..]).ok().and_then(|v| Message::decode(&v).ok())
            {
                Some(msg) => out.push(msg),
                None => warn!(target = "vmfuzz::manager", "dropped undecodable frame"),
            }
        }
        Ok(out)
    }

    fn send(&mut self, msg: &Message) -> Result<(), ManagerError> {
        vmfuzz_wire::framed_send_blocking(&mut self.stream, msg).map_err(Into::into)
    }
}

/// A message paired with the identity of the client that sent it, as
/// returned by `Server::wait`.
pub struct Inbound {
    pub token: Token,
    pub worker_id: Option<u64>,
    pub message: Message,
}

pub struct Server {
    listener: UnixListener,
    poll: Poll,
    events: Events,
    clients: HashMap<Token, ClientConn>,
    next_token: usize,
    clients_seen: usize,
    pub symbolic_queue: SymbolicQueue,
}

impl Server {
    pub fn bind(socket_path: &Path) -> std::io::Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        let mut listener = UnixListener::bind(socket_path)?;
        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        info!(target = "vmfuzz::manager", path = %socket_path.display(), backlog_hint = BACKLOG_HINT, "manager listening");
        Ok(Self {
            listener,
            poll,
            events: Events::with_capacity(1024),
            clients: HashMap::new(),
            next_token: 1,
            clients_seen: 0,
            symbolic_queue: SymbolicQueue::new(),
        })
    }

    fn accept_all(&mut self) -> std::io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, _addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poll.registry().register(&mut stream, token, Interest::READABLE)?;
                    self.clients.insert(
                        token,
                        ClientConn { stream, read_buf: Vec::new(), worker_id: None, is_symbolic: false },
                    );
                    self.clients_seen += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Multiplexes a readiness wait over the listener and all connected
    /// clients, returning every complete message received this round.
    /// Raises `AllWorkersExited` once at least one client has ever connected
    /// and the set is now empty.
    pub fn wait(&mut self, timeout: Duration) -> Result<Vec<Inbound>, ManagerError> {
        self.poll.poll(&mut self.events, Some(timeout))?;
        let mut inbound = Vec::new();
        let mut dead = Vec::new();

        let tokens: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
        for token in tokens {
            if token == LISTENER_TOKEN {
                self.accept_all()?;
                continue;
            }
            let Some(client) = self.clients.get_mut(&token) else { continue };
            match client.drain_frames() {
                Ok((msgs, eof)) => {
                    for msg in msgs {
                        if let Message::Ready { worker_id } = &msg {
                            client.worker_id = Some(*worker_id);
                        }
                        if matches!(msg, Message::SymWait) {
                            client.is_symbolic = true;
                        }
                        inbound.push(Inbound { token, worker_id: client.worker_id, message: msg });
                    }
                    if eof {
                        dead.push(token);
                    }
                }
                Err(_) => dead.push(token),
            }
        }

        for token in dead {
            if let Some(mut client) = self.clients.remove(&token) {
                let _ = self.poll.registry().deregister(&mut client.stream);
            }
        }

        if self.clients.is_empty() && self.clients_seen > 0 {
            return Err(ManagerError::AllWorkersExited);
        }

        Ok(inbound)
    }

    pub fn send_import(&mut self, token: Token, task: Value) -> Result<(), ManagerError> {
        self.send_to(token, &Message::Import { task })
    }

    pub fn send_import_syx(&mut self, token: Token, task: Value) -> Result<(), ManagerError> {
        self.send_to(token, &Message::ImportSyx { task })
    }

    pub fn send_node(&mut self, token: Token, task: Value) -> Result<(), ManagerError> {
        self.send_to(token, &Message::RunNode { task })
    }

    pub fn send_busy(&mut self, token: Token) -> Result<(), ManagerError> {
        self.send_to(token, &Message::Busy)
    }

    pub fn send_sym_request(&mut self, token: Token, request: Value) -> Result<(), ManagerError> {
        self.send_to(token, &Message::SymRequest { request })
    }

    fn send_to(&mut self, token: Token, msg: &Message) -> Result<(), ManagerError> {
        match self.clients.get_mut(&token) {
            Some(client) => client.send(msg),
            None => Ok(()),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
