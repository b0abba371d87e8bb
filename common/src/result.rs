/// Classification of a single VM execution, exactly as surfaced to the
/// control plane (no `Symbolic*` variants ever escape the driver).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Regular,
    Crash,
    Timeout,
    Kasan,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Regular => "regular",
            Outcome::Crash => "crash",
            Outcome::Timeout => "timeout",
            Outcome::Kasan => "kasan",
        }
    }
}

/// Raw exec-code values reported by the VM through the aux buffer.
///
/// Mirrors the guest agent's wire-level constants; never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecCode {
    Success = 0,
    Crash = 1,
    Timeout = 2,
    Sanitizer = 3,
    Starved = 4,
    Abort = 5,
    Hprintf = 6,
    SyxSymNew = 7,
    SyxSymWait = 8,
    SyxSymFlush = 9,
}

impl ExecCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => ExecCode::Success,
            1 => ExecCode::Crash,
            2 => ExecCode::Timeout,
            3 => ExecCode::Sanitizer,
            4 => ExecCode::Starved,
            5 => ExecCode::Abort,
            6 => ExecCode::Hprintf,
            7 => ExecCode::SyxSymNew,
            8 => ExecCode::SyxSymWait,
            9 => ExecCode::SyxSymFlush,
            _ => return None,
        })
    }

    /// Maps a terminal exec code onto its control-plane outcome. Panics on
    /// the internal `Syx*`/`Hprintf`/`Abort` codes, which callers must have
    /// already handled as side channels before reaching this point.
    pub fn classify(&self) -> Outcome {
        match self {
            ExecCode::Crash => Outcome::Crash,
            ExecCode::Timeout => Outcome::Timeout,
            ExecCode::Sanitizer => Outcome::Kasan,
            ExecCode::Success | ExecCode::Starved => Outcome::Regular,
            other => panic!("{other:?} is not a terminal exec code"),
        }
    }
}

/// A full snapshot of a symbolic-execution candidate region, taken at the
/// moment the VM requested it.
#[derive(Debug, Clone)]
pub struct SymbolicRequest {
    pub fuzzer_input_offset: u64,
    pub length: u64,
    pub payload: Vec<u8>,
}

impl SymbolicRequest {
    pub fn new(fuzzer_input_offset: u64, length: u64, payload: &[u8]) -> Self {
        Self { fuzzer_input_offset, length, payload: payload.to_vec() }
    }
}

/// Dedup key: equality (and therefore the `SymbolicQueue`'s notion of
/// "already have this one") is by offset and length only, never payload
/// content.
impl PartialEq for SymbolicRequest {
    fn eq(&self, other: &Self) -> bool {
        self.fuzzer_input_offset == other.fuzzer_input_offset && self.length == other.length
    }
}
impl Eq for SymbolicRequest {}

/// Immutable summary of one VM execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub bitmap: Vec<u8>,
    pub bitmap_size: usize,
    pub outcome: Outcome,
    pub runtime: std::time::Duration,
    pub symbolic_requests: Vec<SymbolicRequest>,
    pub bb_seen: u32,
    pub starved: bool,
}

impl ExecutionResult {
    /// `starved` is only ever true alongside `Outcome::Regular`.
    pub fn is_consistent(&self) -> bool {
        !self.starved || self.outcome == Outcome::Regular
    }
}

pub type WorkerId = usize;
