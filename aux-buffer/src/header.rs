/// Byte offsets into the mapped aux-buffer file.
///
/// Fields are read and written as explicit little-endian primitives rather
/// than through a `#[repr(C)]` struct cast: the layout belongs to the guest
/// agent on the other side of the mapping and must not be assumed to match
/// whatever layout rules the host's Rust compiler would pick.
pub(crate) mod offset {
    pub const MAGIC: usize = 0;
    pub const VERSION: usize = 4;
    pub const STATE: usize = 8;
    pub const RELOAD_MODE: usize = 12;
    pub const TIMEOUT_SEC_BITS: usize = 16; // f64, 8 bytes
    pub const TRACE_MODE: usize = 24;
    pub const SYX_MODE: usize = 28;
    pub const SYX_PHYS_ADDR: usize = 32;
    pub const SYX_VIRT_ADDR: usize = 40;
    pub const SYX_LENGTH: usize = 48;
    pub const AGENT_FLAGS: usize = 56;

    pub const EXEC_CODE: usize = 64;
    pub const EXEC_DONE: usize = 68;
    pub const PAGE_FAULT: usize = 72;
    pub const PAGE_FAULT_ADDR: usize = 80;
    pub const PT_OVERFLOW: usize = 88;
    pub const BB_COV: usize = 92;
    pub const RESULT_SYX_OFFSET: usize = 96;
    pub const RESULT_SYX_LEN: usize = 104;
    pub const MISC_LEN: usize = 112;
    pub const MISC_BUF: usize = 116;
}

pub const MAGIC: u32 = 0x6b61_666c; // "kafl"
pub const VERSION: u32 = 1;
pub const MISC_BUF_SIZE: usize = 3980;
pub const AUX_BUFFER_SIZE: usize = offset::MISC_BUF + MISC_BUF_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Initializing = 1,
    Booting = 2,
    Fuzzing = 3,
}

impl VmState {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => VmState::Initializing,
            2 => VmState::Booting,
            3 => VmState::Fuzzing,
            _ => return None,
        })
    }
}
