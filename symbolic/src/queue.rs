use vmfuzz_common::SymbolicRequest;

/// Dedup queue for symbolic requests: a FIFO of not-yet-issued requests plus
/// the full history of everything ever issued, so a request already handed
/// out is never offered again.
///
/// Grounded on `technique/syx/queue.py`'s `SyxQueue`.
#[derive(Debug, Default)]
pub struct SymbolicQueue {
    pending: Vec<SymbolicRequest>,
    issued: Vec<SymbolicRequest>,
}

impl SymbolicQueue {
    pub fn new() -> Self {
        Self { pending: Vec::new(), issued: Vec::new() }
    }

    fn is_interesting(&self, req: &SymbolicRequest) -> bool {
        !self.pending.contains(req) && !self.issued.contains(req)
    }

    /// Appends `req` to the pending queue if no equal (by offset+length)
    /// request is already pending or issued. Returns whether it was added.
    pub fn offer(&mut self, req: SymbolicRequest) -> bool {
        if self.is_interesting(&req) {
            self.pending.push(req);
            true
        } else {
            false
        }
    }

    /// Removes and returns the head of the pending queue, moving it to
    /// `issued`. `None` on an empty queue; callers must check `is_empty()`
    /// first if they need the original's "undefined on empty" behavior.
    pub fn take(&mut self) -> Option<SymbolicRequest> {
        if self.pending.is_empty() {
            return None;
        }
        let req = self.pending.remove(0);
        self.issued.push(req.clone());
        Some(req)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(offset: u64, length: u64) -> SymbolicRequest {
        SymbolicRequest::new(offset, length, b"xx")
    }

    #[test]
    fn duplicate_offer_is_rejected() {
        let mut q = SymbolicQueue::new();
        assert!(q.offer(req(4, 8)));
        assert!(!q.offer(req(4, 8)));
        assert_eq!(q.pending_len(), 1);
    }

    #[test]
    fn issued_requests_stay_deduped() {
        let mut q = SymbolicQueue::new();
        q.offer(req(4, 8));
        let taken = q.take().unwrap();
        assert_eq!(taken, req(4, 8));
        assert!(q.is_empty());
        assert!(!q.offer(req(4, 8)));
    }

    #[test]
    fn fifo_order() {
        let mut q = SymbolicQueue::new();
        q.offer(req(0, 1));
        q.offer(req(8, 1));
        assert_eq!(q.take().unwrap(), req(0, 1));
        assert_eq!(q.take().unwrap(), req(8, 1));
    }
}
