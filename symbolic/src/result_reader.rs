//! Reads variable-length symbolic-execution result records from a FIFO and
//! reconstructs new concrete payloads from them.
//!
//! Grounded on `technique/syx/results.py`'s `Results`: a FIFO opened
//! non-blocking, an 8-byte little-endian batch count, then `count` records
//! of `(rip: u64, replacement: [u8; N])` where `N` is fixed for the active
//! run by the request's length.

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode as StatMode;
use nix::unistd::{close, mkfifo, read};

use crate::error::SymbolicError;

/// One decoded replacement record. `rip` is retained on the struct (the
/// guest instruction pointer at the point of replacement) but is not
/// currently consulted by `get_new_inputs` — see the symbolic-result-decoding
/// open question.
#[derive(Debug, Clone)]
pub struct SymbolicResultRecord {
    pub rip: u64,
    pub replacement: Vec<u8>,
}

pub struct SymbolicResultReader {
    fifo_path: PathBuf,
    fd: RawFd,
    initial_payload: Vec<u8>,
    offset: usize,
    replace_len: usize,
}

impl SymbolicResultReader {
    /// Creates the FIFO at `<syx_workdir>/sym_results` if it does not exist
    /// yet and opens it for non-blocking reads.
    pub fn open(syx_workdir: &Path) -> Result<Self, SymbolicError> {
        std::fs::create_dir_all(syx_workdir)?;
        let fifo_path = syx_workdir.join("sym_results");
        if !fifo_path.exists() {
            mkfifo(&fifo_path, StatMode::S_IRUSR | StatMode::S_IWUSR)?;
        }
        let fd = open(&fifo_path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, StatMode::empty())?;
        Ok(Self { fifo_path, fd, initial_payload: Vec::new(), offset: 0, replace_len: 0 })
    }

    /// Fixes the record format for the next `collect()` call: the payload
    /// being mutated, the offset of the symbolic region within it, and the
    /// expected replacement length (the active request's `length`).
    pub fn new_run(&mut self, initial_payload: &[u8], offset: usize, replace_len: usize) {
        self.initial_payload = initial_payload.to_vec();
        self.offset = offset;
        self.replace_len = replace_len;
    }

    fn read_exact_nonblocking(&self, buf: &mut [u8], timeout: Duration) -> Result<(), SymbolicError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;
        while filled < buf.len() {
            match read(self.fd, &mut buf[filled..]) {
                Ok(0) => {
                    if Instant::now() > deadline {
                        return Err(SymbolicError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "symbolic result fifo: no writer / no data",
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(n) => filled += n,
                Err(nix::Error::EAGAIN) => {
                    if Instant::now() > deadline {
                        return Err(SymbolicError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "symbolic result fifo: read timed out",
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => return Err(SymbolicError::Errno(e)),
            }
        }
        Ok(())
    }

    /// Reads one batch: an 8-byte count, then that many
    /// `(rip, replacement[replace_len])` records.
    pub fn collect(&mut self, timeout: Duration) -> Result<Vec<SymbolicResultRecord>, SymbolicError> {
        let mut count_buf = [0u8; 8];
        self.read_exact_nonblocking(&mut count_buf, timeout)?;
        let count = u64::from_le_bytes(count_buf);

        let record_len = 8 + self.replace_len;
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut buf = vec![0u8; record_len];
            self.read_exact_nonblocking(&mut buf, timeout)?;
            let rip = u64::from_le_bytes(buf[0..8].try_into().unwrap());
            let replacement = buf[8..].to_vec();
            if replacement.len() != self.replace_len {
                return Err(SymbolicError::LengthMismatch {
                    expected: self.replace_len,
                    found: replacement.len(),
                });
            }
            records.push(SymbolicResultRecord { rip, replacement });
        }
        Ok(records)
    }

    /// Splices each collected replacement into a copy of the initial payload
    /// at the fixed offset, producing one new concrete input per record.
    pub fn get_new_inputs(&self, records: &[SymbolicResultRecord]) -> Vec<Vec<u8>> {
        records
            .iter()
            .map(|r| {
                let mut out = self.initial_payload.clone();
                out[self.offset..self.offset + r.replacement.len()].copy_from_slice(&r.replacement);
                out
            })
            .collect()
    }

    pub fn fifo_path(&self) -> &Path {
        &self.fifo_path
    }
}

impl Drop for SymbolicResultReader {
    fn drop(&mut self) {
        let _ = close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn decodes_a_batch_and_splices_replacements() {
        let dir = tempdir().unwrap();
        let mut reader = SymbolicResultReader::open(dir.path()).unwrap();
        reader.new_run(b"AAAAAAAA", 2, 3);

        let fifo_path = reader.fifo_path().to_path_buf();
        let writer_thread = std::thread::spawn(move || {
            let mut f = std::fs::OpenOptions::new().write(true).open(&fifo_path).unwrap();
            f.write_all(&2u64.to_le_bytes()).unwrap();
            f.write_all(&0x400000u64.to_le_bytes()).unwrap();
            f.write_all(b"XYZ").unwrap();
            f.write_all(&0x400010u64.to_le_bytes()).unwrap();
            f.write_all(b"QRS").unwrap();
        });

        let records = reader.collect(Duration::from_secs(2)).unwrap();
        writer_thread.join().unwrap();
        assert_eq!(records.len(), 2);
        let inputs = reader.get_new_inputs(&records);
        assert_eq!(inputs, vec![b"AAXYZAAA".to_vec(), b"AAQRSAAA".to_vec()]);
    }
}
