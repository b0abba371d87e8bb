use vmfuzz_wire::Value;

/// Seam standing in for the out-of-scope corpus scheduler: decides which
/// task (mutation stage + seed) a newly-ready or newly-idle worker receives
/// next, and is told about interesting inputs workers report back.
///
/// A full implementation would rank the corpus and pick an energy-weighted
/// seed; this core only needs something that can hand out an opaque `task`
/// blob and record findings.
pub trait TaskSource: Send {
    fn next_task(&mut self) -> Option<Value>;
    fn next_symbolic_task(&mut self) -> Option<Value>;
    fn record_new_input(&mut self, payload: Vec<u8>, bitmap: Vec<u8>, info: Value);
}

/// Minimal `TaskSource` that never has work and drops every finding; useful
/// for driving the `Server` in isolation (tests, `debug` CLI mode) without a
/// real scheduler wired in.
#[derive(Default)]
pub struct NullTaskSource;

impl TaskSource for NullTaskSource {
    fn next_task(&mut self) -> Option<Value> {
        None
    }
    fn next_symbolic_task(&mut self) -> Option<Value> {
        None
    }
    fn record_new_input(&mut self, _payload: Vec<u8>, _bitmap: Vec<u8>, _info: Value) {}
}
