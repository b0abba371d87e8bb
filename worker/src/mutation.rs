use vmfuzz_wire::Value;

/// Seam standing in for the out-of-scope mutation engines (havoc,
/// deterministic bit-flip, Radamsa, Grimoire, Redqueen). Given the task blob
/// handed out by the manager and the current seed, produces the next
/// concrete payload to execute.
///
/// A real implementation picks a strategy per `task` and may be stateful
/// across calls (e.g. deterministic bit-flip walks the seed left to right);
/// this trait only fixes the boundary the worker run loop calls through.
pub trait MutationStage: Send {
    fn mutate(&mut self, task: &Value, seed: &[u8]) -> Vec<u8>;
}

/// Identity stage: returns the seed unchanged. Useful for `debug`-style
/// single-payload runs and for exercising the run loop in tests without a
/// real mutation engine.
#[derive(Default)]
pub struct IdentityMutationStage;

impl MutationStage for IdentityMutationStage {
    fn mutate(&mut self, _task: &Value, seed: &[u8]) -> Vec<u8> {
        seed.to_vec()
    }
}
