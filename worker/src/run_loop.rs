//! Ties the control-plane [`Client`], the [`vmfuzz_vm_driver::Driver`], and
//! (for symbolic workers) the [`vmfuzz_symbolic::SymbolicResultReader`]
//! together into the two worker run loops described in the system overview:
//! an ordinary fuzz worker mutates and executes; a symbolic worker executes
//! concolically and forwards newly-derived inputs back as fresh candidates.

use std::time::Duration;

use tracing::{info, warn};
use vmfuzz_symbolic::{pack, unpack, SymbolicResultReader};
use vmfuzz_vm_driver::{Driver, Mode, SendOutcome};
use vmfuzz_wire::{Message, Value};

use crate::client::Client;
use crate::error::WorkerError;
use crate::mutation::MutationStage;

const SYM_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
pub const LOG_TARGET: &str = "vmfuzz::worker";

fn task_seed(task: &Value) -> Vec<u8> {
    task.as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("seed")))
        .and_then(|(_, v)| v.as_slice())
        .map(|s| s.to_vec())
        .unwrap_or_default()
}

fn task_node_id(task: &Value) -> u64 {
    task.as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("node_id")))
        .and_then(|(_, v)| v.as_u64())
        .unwrap_or(0)
}

fn result_summary(outcome: vmfuzz_common::Outcome, runtime: Duration, bb_seen: u32) -> Value {
    Value::Map(vec![
        (Value::from("outcome"), Value::from(outcome.as_str())),
        (Value::from("runtime_ms"), Value::from(runtime.as_millis() as u64)),
        (Value::from("bb_seen"), Value::from(bb_seen)),
    ])
}

/// An ordinary fuzz worker: receive a task, mutate the seed it carries,
/// execute it, and report back.
pub struct FuzzWorkerLoop<M: MutationStage> {
    client: Client,
    driver: Driver,
    mutation: M,
    worker_id: u64,
}

impl<M: MutationStage> FuzzWorkerLoop<M> {
    pub fn new(client: Client, driver: Driver, mutation: M, worker_id: u64) -> Self {
        Self { client, driver, mutation, worker_id }
    }

    pub fn run(&mut self) -> Result<(), WorkerError> {
        self.driver.start()?;
        loop {
            let msg = self.client.recv()?;
            match msg {
                Message::Import { task } | Message::RunNode { task } => {
                    self.handle_task(task)?;
                }
                Message::Busy => continue,
                other => {
                    warn!(target: LOG_TARGET, worker_id = self.worker_id, "unexpected message {:?}", other);
                }
            }
        }
    }

    fn handle_task(&mut self, task: Value) -> Result<(), WorkerError> {
        let node_id = task_node_id(&task);
        let seed = task_seed(&task);
        let payload = self.mutation.mutate(&task, &seed);
        self.driver.set_payload(&payload)?;

        match self.driver.send_payload() {
            Ok(SendOutcome::Result(result)) => {
                if !result.symbolic_requests.is_empty() {
                    let packed: Vec<Value> = result.symbolic_requests.iter().map(pack).collect();
                    self.client.send_sym_new(packed)?;
                }
                if !matches!(result.outcome, vmfuzz_common::Outcome::Regular) {
                    let stamp = format!("{}", self.worker_id);
                    let _ = self.driver.store_crashlogs(result.outcome.as_str(), &stamp);
                }
                let summary = result_summary(result.outcome, result.runtime, result.bb_seen);
                self.client.send_node_done(node_id, summary, payload)?;
                Ok(())
            }
            Ok(SendOutcome::SymWait) | Ok(SendOutcome::SymFlush) => {
                // Never produced in ordinary mode; a driver bug if it is.
                Err(WorkerError::Vm(vmfuzz_vm_driver::VmError::ProtocolViolation(
                    vmfuzz_common::ExecCode::SyxSymWait,
                )))
            }
            Err(e) => {
                warn!(target: LOG_TARGET, worker_id = self.worker_id, "run aborted: {e}");
                self.client.send_node_abort(node_id, Value::from(e.to_string()))?;
                Ok(())
            }
        }
    }
}

/// A symbolic-executor worker: receive a concrete symbolic request, drive the
/// VM in symbolic mode, and forward every newly-derived concrete input the
/// result FIFO yields back to the manager as a fresh candidate.
pub struct SymbolicWorkerLoop {
    client: Client,
    driver: Driver,
    result_reader: SymbolicResultReader,
    worker_id: u64,
}

impl SymbolicWorkerLoop {
    pub fn new(client: Client, driver: Driver, result_reader: SymbolicResultReader, worker_id: u64) -> Self {
        assert_eq!(driver.mode(), Mode::Symbolic);
        Self { client, driver, result_reader, worker_id }
    }

    pub fn run(&mut self) -> Result<(), WorkerError> {
        self.driver.start()?;
        loop {
            let msg = self.client.recv()?;
            match msg {
                Message::SymRequest { request } => self.handle_request(request)?,
                Message::Busy => continue,
                other => {
                    warn!(target: LOG_TARGET, worker_id = self.worker_id, "unexpected message {:?}", other);
                }
            }
        }
    }

    fn handle_request(&mut self, request: Value) -> Result<(), WorkerError> {
        let Some(req) = unpack(&request) else {
            warn!(target: LOG_TARGET, worker_id = self.worker_id, "undecodable symbolic request");
            return Ok(());
        };

        self.driver.set_payload(&req.payload)?;
        self.result_reader.new_run(&req.payload, req.fuzzer_input_offset as usize, req.length as usize);

        let mut outcome = self.driver.send_payload()?;
        loop {
            match outcome {
                SendOutcome::SymFlush => {
                    let records = self.result_reader.collect(SYM_FLUSH_TIMEOUT)?;
                    for input in self.result_reader.get_new_inputs(&records) {
                        self.client.send_new_input(input, Vec::new(), Value::Nil)?;
                    }
                    outcome = self.driver.resume_payload()?;
                }
                SendOutcome::SymWait => {
                    info!(target: LOG_TARGET, worker_id = self.worker_id, "symbolic vm idle, waiting for next request");
                    self.client.send_sym_wait()?;
                    return Ok(());
                }
                SendOutcome::Result(result) => {
                    let summary = result_summary(result.outcome, result.runtime, result.bb_seen);
                    self.client.send_sym_result(summary)?;
                    return Ok(());
                }
            }
        }
    }
}
