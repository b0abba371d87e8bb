//! Worker-side control-plane client.
//!
//! Grounded on `manager/communicator.py`'s `ClientConnection`: connects to
//! the manager's socket and immediately announces its role — `READY` for an
//! ordinary fuzz worker, `SYM_WAIT` for a symbolic worker — based on a flag
//! fixed at construction time. Unlike the manager's side, this socket is
//! used purely synchronously: a worker process has exactly one thing to do
//! at a time, so blocking I/O needs no event loop here.

use std::os::unix::net::UnixStream;
use std::path::Path;

use vmfuzz_wire::{framed_recv_blocking, framed_send_blocking, Message, Value};

use crate::error::WorkerError;

pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub fn connect(socket_path: &Path, worker_id: u64, is_symbolic: bool) -> Result<Self, WorkerError> {
        let mut stream = UnixStream::connect(socket_path)?;
        let hello = if is_symbolic { Message::SymWait } else { Message::Ready { worker_id } };
        framed_send_blocking(&mut stream, &hello)?;
        Ok(Self { stream })
    }

    pub fn recv(&mut self) -> Result<Message, WorkerError> {
        framed_recv_blocking(&mut self.stream).map_err(Into::into)
    }

    fn send(&mut self, msg: &Message) -> Result<(), WorkerError> {
        framed_send_blocking(&mut self.stream, msg).map_err(Into::into)
    }

    pub fn send_new_input(&mut self, payload: Vec<u8>, bitmap: Vec<u8>, info: Value) -> Result<(), WorkerError> {
        self.send(&Message::NewInput { payload, bitmap, info })
    }

    pub fn send_node_done(
        &mut self,
        node_id: u64,
        results: Value,
        new_payload: Vec<u8>,
    ) -> Result<(), WorkerError> {
        self.send(&Message::NodeDone { node_id, results, new_payload })
    }

    pub fn send_node_abort(&mut self, node_id: u64, results: Value) -> Result<(), WorkerError> {
        self.send(&Message::NodeAbort { node_id, results })
    }

    pub fn send_print(&mut self, msg: impl Into<String>) -> Result<(), WorkerError> {
        self.send(&Message::Print { msg: msg.into() })
    }

    pub fn send_sym_new(&mut self, requests: Vec<Value>) -> Result<(), WorkerError> {
        self.send(&Message::SymNew { requests })
    }

    pub fn send_sym_wait(&mut self) -> Result<(), WorkerError> {
        self.send(&Message::SymWait)
    }

    pub fn send_sym_result(&mut self, results: Value) -> Result<(), WorkerError> {
        self.send(&Message::SymResult { results })
    }
}
