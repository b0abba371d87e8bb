//! Typed view over the memory-mapped command/result channel shared between a
//! [`vmfuzz_vm_driver`] and the VM it drives.
//!
//! Grounded on the original `qemu.py`'s `ctypes`/`mmap`-based aux buffer
//! access: the mapping is read and written through explicit little-endian
//! field accessors over a `memmap2::MmapMut`, never through a struct cast,
//! since the layout is owned by the out-of-scope guest agent.

mod error;
mod header;

pub use error::AuxBufferError;
pub use header::{VmState, AUX_BUFFER_SIZE, MISC_BUF_SIZE};

use std::fs::OpenOptions;
use std::path::Path;

use header::offset;
use memmap2::MmapMut;
use vmfuzz_common::ExecCode;

/// Decoded result section of the aux buffer, as read after a `run_qemu()`
/// round-trip.
#[derive(Debug, Clone)]
pub struct AuxResult {
    pub exec_code: ExecCode,
    pub exec_done: bool,
    pub page_fault: bool,
    pub page_fault_addr: u64,
    pub pt_overflow: bool,
    pub bb_cov: u32,
    pub syx_fuzzer_input_offset: u64,
    pub syx_len: u64,
}

pub struct AuxBuffer {
    mmap: MmapMut,
}

impl AuxBuffer {
    /// Opens (creating and truncating if necessary) the aux-buffer file at
    /// `path` and validates its header.
    pub fn open(path: &Path) -> Result<Self, AuxBufferError> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        file.set_len(header::AUX_BUFFER_SIZE as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let mut buf = Self { mmap };
        buf.validate_or_init_header()?;
        Ok(buf)
    }

    fn validate_or_init_header(&mut self) -> Result<(), AuxBufferError> {
        let magic = self.read_u32(offset::MAGIC);
        if magic == 0 {
            // Freshly truncated file; this host side owns initialization.
            self.write_u32(offset::MAGIC, header::MAGIC);
            self.write_u32(offset::VERSION, header::VERSION);
            self.write_u32(offset::STATE, VmState::Initializing as u32);
            return Ok(());
        }
        if magic != header::MAGIC {
            return Err(AuxBufferError::BadMagic { expected: header::MAGIC, found: magic });
        }
        let version = self.read_u32(offset::VERSION);
        if version != header::VERSION {
            return Err(AuxBufferError::BadVersion { expected: header::VERSION, found: version });
        }
        Ok(())
    }

    fn read_u32(&self, off: usize) -> u32 {
        u32::from_le_bytes(self.mmap[off..off + 4].try_into().unwrap())
    }
    fn write_u32(&mut self, off: usize, v: u32) {
        self.mmap[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }
    fn read_u64(&self, off: usize) -> u64 {
        u64::from_le_bytes(self.mmap[off..off + 8].try_into().unwrap())
    }
    fn write_u64(&mut self, off: usize, v: u64) {
        self.mmap[off..off + 8].copy_from_slice(&v.to_le_bytes());
    }
    fn read_f64(&self, off: usize) -> f64 {
        f64::from_le_bytes(self.mmap[off..off + 8].try_into().unwrap())
    }
    fn write_f64(&mut self, off: usize, v: f64) {
        self.mmap[off..off + 8].copy_from_slice(&v.to_le_bytes());
    }
    fn read_bool(&self, off: usize) -> bool {
        self.read_u32(off) != 0
    }
    fn write_bool(&mut self, off: usize, v: bool) {
        self.write_u32(off, v as u32);
    }

    // --- Controls (driver writes) ---

    pub fn set_reload_mode(&mut self, on: bool) {
        self.write_bool(offset::RELOAD_MODE, on);
    }

    pub fn set_timeout(&mut self, seconds: f64) {
        self.write_f64(offset::TIMEOUT_SEC_BITS, seconds);
    }

    pub fn set_trace_mode(&mut self, on: bool) {
        self.write_bool(offset::TRACE_MODE, on);
    }

    pub fn set_syx_mode(&mut self, on: bool) {
        self.write_bool(offset::SYX_MODE, on);
    }

    pub fn set_syx_params(&mut self, phys_addr: u64, virt_addr: u64, length: u64) {
        self.write_u64(offset::SYX_PHYS_ADDR, phys_addr);
        self.write_u64(offset::SYX_VIRT_ADDR, virt_addr);
        self.write_u64(offset::SYX_LENGTH, length);
    }

    pub fn set_agent_flags(&mut self, flags: u32) {
        self.write_u32(offset::AGENT_FLAGS, flags);
    }

    // --- Status (driver reads) ---

    pub fn get_state(&self) -> Result<VmState, AuxBufferError> {
        let raw = self.read_u32(offset::STATE);
        VmState::from_u32(raw).ok_or(AuxBufferError::BadState(raw))
    }

    pub fn get_result(&self) -> Result<AuxResult, AuxBufferError> {
        let raw_code = self.read_u32(offset::EXEC_CODE);
        let exec_code = ExecCode::from_u8(raw_code as u8)
            .ok_or(AuxBufferError::BadExecCode(raw_code))?;
        Ok(AuxResult {
            exec_code,
            exec_done: self.read_bool(offset::EXEC_DONE),
            page_fault: self.read_bool(offset::PAGE_FAULT),
            page_fault_addr: self.read_u64(offset::PAGE_FAULT_ADDR),
            pt_overflow: self.read_bool(offset::PT_OVERFLOW),
            bb_cov: self.read_u32(offset::BB_COV),
            syx_fuzzer_input_offset: self.read_u64(offset::RESULT_SYX_OFFSET),
            syx_len: self.read_u64(offset::RESULT_SYX_LEN),
        })
    }

    pub fn get_misc_buf(&self) -> &[u8] {
        let len = (self.read_u32(offset::MISC_LEN) as usize).min(header::MISC_BUF_SIZE);
        &self.mmap[offset::MISC_BUF..offset::MISC_BUF + len]
    }

    /// Requests the VM dump the page containing `addr` into the misc buffer
    /// on its next yield; the driver re-reads `get_misc_buf` afterwards.
    pub fn dump_page(&mut self, addr: u64) {
        self.write_u64(offset::PAGE_FAULT_ADDR, addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_buffer_initializes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aux_buffer_0");
        let buf = AuxBuffer::open(&path).unwrap();
        assert_eq!(buf.get_state().unwrap(), VmState::Initializing);
    }

    #[test]
    fn reopen_validates_existing_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aux_buffer_0");
        {
            let _ = AuxBuffer::open(&path).unwrap();
        }
        let buf = AuxBuffer::open(&path).unwrap();
        assert_eq!(buf.get_state().unwrap(), VmState::Initializing);
    }

    #[test]
    fn controls_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aux_buffer_0");
        let mut buf = AuxBuffer::open(&path).unwrap();
        buf.set_reload_mode(true);
        buf.set_timeout(5.5);
        buf.set_syx_params(0x1000, 0x2000, 16);
        assert_eq!(buf.read_bool(offset::RELOAD_MODE), true);
        assert_eq!(buf.read_f64(offset::TIMEOUT_SEC_BITS), 5.5);
        assert_eq!(buf.read_u64(offset::SYX_PHYS_ADDR), 0x1000);
    }
}
