//! Syscall argument decoding
//!
//! Every function here is a pure function of the raw register value, the
//! [`DecodeConfig`] and a [`MemoryReader`]. Nothing is cached, so decoding the
//! same argument twice yields the same text, and an argument that is never
//! rendered is never read.

use crate::config::DecodeConfig;
use crate::port::MemoryReader;
use crate::syscalls::{ArgKind, ArgSpec, ArgType, SyscallInfo};

/// Decoded text of memory that could not be read
pub const UNREADABLE: &str = "<unreadable>";
/// Decoded text when the config failed validation
pub const INVALID_CONFIG: &str = "<invalid-config>";
/// Appended when a string or array was cut at its bound
pub const TRUNCATION_MARKER: &str = "...";

const POINTER_SIZE: usize = std::mem::size_of::<u64>();

/// One raw syscall argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument {
    /// Register value
    pub raw: u64,
    /// Parameter spec; `None` for syscalls missing from the table
    pub spec: Option<ArgSpec>,
    /// Byte length of a buffer argument, taken from its size argument
    pub size: Option<u64>,
}

impl Argument {
    pub fn new(raw: u64, spec: Option<ArgSpec>) -> Self {
        Self {
            raw,
            spec,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn arg_type(&self) -> ArgType {
        self.spec.map(|s| s.ty).unwrap_or(ArgType::Raw)
    }

    pub fn kind(&self) -> ArgKind {
        self.arg_type().kind()
    }

    pub fn name(&self) -> Option<&'static str> {
        self.spec.map(|s| s.name)
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.arg_type().c_name()
    }

    /// Decoded value without name or type prefix
    pub fn decode(&self, config: &DecodeConfig, memory: &dyn MemoryReader) -> String {
        decode_value(self, config, memory)
    }
}

/// Pair the argument registers of `syscall` with their specs
///
/// Buffer arguments pick up their length from the register of the size
/// argument they name.
pub fn arguments(syscall: &SyscallInfo, registers: &[u64]) -> Vec<Argument> {
    let count = syscall.arg_count().min(registers.len());
    registers[..count]
        .iter()
        .enumerate()
        .map(|(idx, &raw)| {
            let arg = Argument::new(raw, syscall.arg_spec(idx));
            match arg.arg_type() {
                ArgType::Bytes(len) => match registers.get(len) {
                    Some(&size) => arg.with_size(size),
                    None => arg,
                },
                _ => arg,
            }
        })
        .collect()
}

/// Decode the value of an argument
pub fn decode_value(arg: &Argument, config: &DecodeConfig, memory: &dyn MemoryReader) -> String {
    if !config.is_valid() {
        return INVALID_CONFIG.to_string();
    }

    let ty = arg.arg_type();
    match ty.kind() {
        ArgKind::Scalar => match ty {
            ArgType::Raw => format!("{:#x}", arg.raw),
            _ => ty.format_scalar(arg.raw),
        },
        ArgKind::Opaque => format_pointer(arg.raw),
        ArgKind::String => {
            if arg.raw == 0 {
                return "NULL".to_string();
            }
            let text = decode_string(memory, arg.raw, config.string_max_length);
            with_address(config, arg.raw, text)
        }
        ArgKind::Buffer => {
            if arg.raw == 0 {
                return "NULL".to_string();
            }
            let text = match arg.size {
                Some(size) => decode_buffer(memory, arg.raw, size, config.string_max_length),
                None => decode_string(memory, arg.raw, config.string_max_length),
            };
            with_address(config, arg.raw, text)
        }
        ArgKind::StringArray => {
            if arg.raw == 0 {
                return "NULL".to_string();
            }
            let text = decode_string_array(memory, arg.raw, config);
            with_address(config, arg.raw, text)
        }
    }
}

/// Decode an argument with its optional type and name prefix
///
/// `int fd=1`, `fd=1`, `int 1` or `1` depending on the config.
pub fn render_argument(arg: &Argument, config: &DecodeConfig, memory: &dyn MemoryReader) -> String {
    label_argument(arg, config, decode_value(arg, config, memory))
}

/// Prefix an already decoded value with the argument's type and name
pub fn label_argument(arg: &Argument, config: &DecodeConfig, value: String) -> String {
    if !config.is_valid() {
        return value;
    }

    let ty = config.include_types.then(|| arg.type_name()).flatten();
    let name = config.include_argument_names.then(|| arg.name()).flatten();

    let mut out = String::new();
    if let Some(ty) = ty {
        out.push_str(ty);
        if !ty.ends_with('*') {
            out.push(' ');
        }
    }
    if let Some(name) = name {
        out.push_str(name);
        out.push('=');
    }
    out.push_str(&value);
    out
}

fn format_pointer(raw: u64) -> String {
    if raw == 0 {
        "NULL".to_string()
    } else {
        format!("{:#x}", raw)
    }
}

fn with_address(config: &DecodeConfig, raw: u64, text: String) -> String {
    if config.include_addresses {
        format!("{:#x} {}", raw, text)
    } else {
        text
    }
}

/// Read a NUL-terminated string of at most `max_len` bytes
///
/// Returns the bytes before the NUL and whether the bound (or the end of
/// readable memory) was hit before finding one.
pub fn read_c_string(
    memory: &dyn MemoryReader,
    addr: u64,
    max_len: usize,
) -> Option<(Vec<u8>, bool)> {
    // One extra byte tells "exactly max_len" apart from "longer than max_len"
    let mut bytes = memory.read_memory(addr, max_len + 1).ok()?;
    bytes.truncate(max_len + 1);
    match bytes.iter().position(|&b| b == 0) {
        Some(nul) => {
            bytes.truncate(nul);
            Some((bytes, false))
        }
        None => {
            bytes.truncate(max_len);
            Some((bytes, true))
        }
    }
}

/// Decode a string pointer into quoted, escaped text
pub fn decode_string(memory: &dyn MemoryReader, addr: u64, max_len: usize) -> String {
    match read_c_string(memory, addr, max_len) {
        Some((bytes, truncated)) => {
            let mut out = quote(&bytes);
            if truncated {
                out.push_str(TRUNCATION_MARKER);
            }
            out
        }
        None => UNREADABLE.to_string(),
    }
}

/// Decode the first `size` bytes at `addr`, showing at most `max_len`
///
/// Unlike strings, buffers keep NUL bytes; they are quoted as `\x00`.
pub fn decode_buffer(memory: &dyn MemoryReader, addr: u64, size: u64, max_len: usize) -> String {
    let want = usize::try_from(size).unwrap_or(usize::MAX).min(max_len);
    if want == 0 {
        return quote(&[]);
    }
    match memory.read_memory(addr, want) {
        Ok(mut bytes) => {
            bytes.truncate(want);
            let mut out = quote(&bytes);
            if (bytes.len() as u64) < size {
                out.push_str(TRUNCATION_MARKER);
            }
            out
        }
        Err(_) => UNREADABLE.to_string(),
    }
}

fn decode_string_array(memory: &dyn MemoryReader, addr: u64, config: &DecodeConfig) -> String {
    let want = (config.max_array_count + 1) * POINTER_SIZE;
    let table = match memory.read_memory(addr, want) {
        Ok(bytes) if bytes.len() >= POINTER_SIZE => bytes,
        _ => return UNREADABLE.to_string(),
    };

    let mut pointers = table
        .chunks_exact(POINTER_SIZE)
        .map(|chunk| {
            let mut word = [0u8; POINTER_SIZE];
            word.copy_from_slice(chunk);
            u64::from_ne_bytes(word)
        })
        .take(config.max_array_count + 1);

    let mut elements = Vec::new();
    let mut terminated = false;
    for _ in 0..config.max_array_count {
        match pointers.next() {
            Some(0) => {
                terminated = true;
                break;
            }
            Some(ptr) => elements.push(decode_string(memory, ptr, config.string_max_length)),
            None => break,
        }
    }
    if !terminated && elements.len() == config.max_array_count {
        terminated = pointers.next() == Some(0);
    }

    let mut out = String::from("[");
    out.push_str(&elements.join(", "));
    if !terminated {
        if !elements.is_empty() {
            out.push_str(", ");
        }
        out.push_str(TRUNCATION_MARKER);
    }
    out.push(']');
    out
}

/// Quote bytes C-style, escaping anything that is not printable ASCII
pub fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('"');
    out
}
