use std::path::PathBuf;

/// Immutable configuration threaded by reference into every component.
///
/// Constructed once by the `vmfuzz` binary from its CLI surface. No component
/// reads ambient/global state or re-parses arguments; they all take a
/// `&Config` (or a cheap clone of one) at construction time instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: PathBuf,
    pub purge: bool,
    pub processes: usize,
    pub syx_processes: usize,
    pub seed_dir: Option<PathBuf>,

    pub qemu_path: PathBuf,
    pub qemu_image: Option<PathBuf>,
    pub qemu_kernel: Option<PathBuf>,
    pub qemu_initrd: Option<PathBuf>,
    pub qemu_bios: Option<PathBuf>,
    pub qemu_append: Option<String>,
    pub memory_mb: u32,
    pub reload: u32,
    pub ip_filters: [Option<(u64, u64)>; 4],
    pub t_hard: f64,
    pub t_soft: f64,
    pub t_check: bool,
    pub payload_size: usize,
    pub bitmap_size: usize,
    pub trace: bool,

    pub log: bool,
    pub log_hprintf: bool,
    pub log_crashes: bool,
    pub verbose: bool,
    pub quiet: bool,

    pub abort_time: Option<f64>,
    pub abort_exec: Option<u64>,
}

impl Config {
    pub const DEFAULT_PAYLOAD_SIZE: usize = 131_072;
    pub const DEFAULT_BITMAP_SIZE: usize = 65_536;
    pub const PAYLOAD_HEADER_SIZE: usize = 8;
    pub const IJON_SIZE: usize = 4096;

    /// Usable payload capacity after the 8-byte header.
    pub fn payload_limit(&self) -> usize {
        self.payload_size - Self::PAYLOAD_HEADER_SIZE
    }

    /// True if pid 0 (or the reserved legacy sentinel) is the snapshot creator.
    pub fn is_snapshot_creator(pid: usize) -> bool {
        pid == 0 || pid == 1337
    }

    /// Serializes the full config to a dynamic value for handoff to worker
    /// OS processes, which cannot inherit it by reference the way the
    /// original's forked `multiprocessing.Process` children do.
    pub fn to_value(&self) -> rmpv::Value {
        use rmpv::Value;
        fn path_opt(p: &Option<PathBuf>) -> Value {
            match p {
                Some(p) => Value::from(p.to_string_lossy().into_owned()),
                None => Value::Nil,
            }
        }
        fn ip_filter(f: &Option<(u64, u64)>) -> Value {
            match f {
                Some((a, b)) => Value::Array(vec![Value::from(*a), Value::from(*b)]),
                None => Value::Nil,
            }
        }
        Value::Map(vec![
            (Value::from("work_dir"), Value::from(self.work_dir.to_string_lossy().into_owned())),
            (Value::from("purge"), Value::from(self.purge)),
            (Value::from("processes"), Value::from(self.processes as u64)),
            (Value::from("syx_processes"), Value::from(self.syx_processes as u64)),
            (Value::from("seed_dir"), path_opt(&self.seed_dir)),
            (Value::from("qemu_path"), Value::from(self.qemu_path.to_string_lossy().into_owned())),
            (Value::from("qemu_image"), path_opt(&self.qemu_image)),
            (Value::from("qemu_kernel"), path_opt(&self.qemu_kernel)),
            (Value::from("qemu_initrd"), path_opt(&self.qemu_initrd)),
            (Value::from("qemu_bios"), path_opt(&self.qemu_bios)),
            (
                Value::from("qemu_append"),
                self.qemu_append.clone().map(Value::from).unwrap_or(Value::Nil),
            ),
            (Value::from("memory_mb"), Value::from(self.memory_mb)),
            (Value::from("reload"), Value::from(self.reload)),
            (Value::from("ip_filters"), Value::Array(self.ip_filters.iter().map(ip_filter).collect())),
            (Value::from("t_hard"), Value::F64(self.t_hard)),
            (Value::from("t_soft"), Value::F64(self.t_soft)),
            (Value::from("t_check"), Value::from(self.t_check)),
            (Value::from("payload_size"), Value::from(self.payload_size as u64)),
            (Value::from("bitmap_size"), Value::from(self.bitmap_size as u64)),
            (Value::from("trace"), Value::from(self.trace)),
            (Value::from("log"), Value::from(self.log)),
            (Value::from("log_hprintf"), Value::from(self.log_hprintf)),
            (Value::from("log_crashes"), Value::from(self.log_crashes)),
            (Value::from("verbose"), Value::from(self.verbose)),
            (Value::from("quiet"), Value::from(self.quiet)),
            (
                Value::from("abort_time"),
                self.abort_time.map(Value::F64).unwrap_or(Value::Nil),
            ),
            (
                Value::from("abort_exec"),
                self.abort_exec.map(Value::from).unwrap_or(Value::Nil),
            ),
        ])
    }

    pub fn from_value(value: &rmpv::Value) -> Option<Self> {
        let map = value.as_map()?;
        let get = |name: &str| map.iter().find(|(k, _)| k.as_str() == Some(name)).map(|(_, v)| v);
        let path = |name: &str| get(name).and_then(|v| v.as_str()).map(PathBuf::from);
        let ip_filters: [Option<(u64, u64)>; 4] = {
            let arr = get("ip_filters")?.as_array()?;
            let mut out = [None, None, None, None];
            for (i, v) in arr.iter().enumerate().take(4) {
                if let Some(pair) = v.as_array() {
                    if pair.len() == 2 {
                        out[i] = Some((pair[0].as_u64()?, pair[1].as_u64()?));
                    }
                }
            }
            out
        };

        Some(Self {
            work_dir: path("work_dir")?,
            purge: get("purge")?.as_bool()?,
            processes: get("processes")?.as_u64()? as usize,
            syx_processes: get("syx_processes")?.as_u64()? as usize,
            seed_dir: path("seed_dir"),
            qemu_path: path("qemu_path")?,
            qemu_image: path("qemu_image"),
            qemu_kernel: path("qemu_kernel"),
            qemu_initrd: path("qemu_initrd"),
            qemu_bios: path("qemu_bios"),
            qemu_append: get("qemu_append").and_then(|v| v.as_str()).map(String::from),
            memory_mb: get("memory_mb")?.as_u64()? as u32,
            reload: get("reload")?.as_u64()? as u32,
            ip_filters,
            t_hard: get("t_hard")?.as_f64()?,
            t_soft: get("t_soft")?.as_f64()?,
            t_check: get("t_check")?.as_bool()?,
            payload_size: get("payload_size")?.as_u64()? as usize,
            bitmap_size: get("bitmap_size")?.as_u64()? as usize,
            trace: get("trace")?.as_bool()?,
            log: get("log")?.as_bool()?,
            log_hprintf: get("log_hprintf")?.as_bool()?,
            log_crashes: get("log_crashes")?.as_bool()?,
            verbose: get("verbose")?.as_bool()?,
            quiet: get("quiet")?.as_bool()?,
            abort_time: get("abort_time").and_then(|v| v.as_f64()),
            abort_exec: get("abort_exec").and_then(|v| v.as_u64()),
        })
    }

    /// Writes the config to `<work_dir>/config.msgpack` for worker OS
    /// processes to pick up (they cannot inherit it by reference the way
    /// forked children would).
    pub fn write_to_work_dir(&self) -> std::io::Result<()> {
        let path = self.work_dir.join("config.msgpack");
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &self.to_value())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, buf)
    }

    pub fn read_from_work_dir(work_dir: &std::path::Path) -> std::io::Result<Self> {
        let path = work_dir.join("config.msgpack");
        let buf = std::fs::read(path)?;
        let value = rmpv::decode::read_value(&mut &buf[..])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        Self::from_value(&value)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed config.msgpack"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            work_dir: PathBuf::from("/tmp/wd"),
            purge: true,
            processes: 4,
            syx_processes: 1,
            seed_dir: Some(PathBuf::from("/tmp/seeds")),
            qemu_path: PathBuf::from("/usr/bin/qemu-system-x86_64"),
            qemu_image: None,
            qemu_kernel: None,
            qemu_initrd: None,
            qemu_bios: None,
            qemu_append: Some("console=ttyS0".into()),
            memory_mb: 512,
            reload: 1,
            ip_filters: [Some((0x1000, 0x2000)), None, None, None],
            t_hard: 2.0,
            t_soft: 0.25,
            t_check: false,
            payload_size: Config::DEFAULT_PAYLOAD_SIZE,
            bitmap_size: Config::DEFAULT_BITMAP_SIZE,
            trace: false,
            log: true,
            log_hprintf: false,
            log_crashes: true,
            verbose: false,
            quiet: false,
            abort_time: Some(3600.0),
            abort_exec: None,
        }
    }

    #[test]
    fn config_round_trips_through_its_wire_value() {
        let cfg = sample();
        let value = cfg.to_value();
        let decoded = Config::from_value(&value).unwrap();
        assert_eq!(decoded.work_dir, cfg.work_dir);
        assert_eq!(decoded.processes, cfg.processes);
        assert_eq!(decoded.ip_filters, cfg.ip_filters);
        assert_eq!(decoded.qemu_append, cfg.qemu_append);
        assert_eq!(decoded.abort_time, cfg.abort_time);
    }
}
