//! Host function registry and implementations.
//!
//! `print`, `printf`, `read`, `write` and `exit` are the only ways a program
//! touches the outside world. Every host call can be recorded by a
//! `TraceEmitter` as one JSONL effect record: operation, inputs, output
//! (with SHA-256 hashing) and duration.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use thiserror::Error;

use crate::value::Value;

/// Errors from host function execution.
#[derive(Debug, Error)]
pub enum HostError {
    /// Host function name not found in registry
    #[error("unknown host function: {0}")]
    UnknownFunction(String),
    /// Argument type mismatch at runtime
    #[error("type error: {0}")]
    TypeError(String),
    /// Bad `printf` format string or argument count
    #[error("format error: {0}")]
    Format(String),
    /// I/O error from host operation
    #[error("I/O error: {0}")]
    IoError(String),
    /// Trace write failure; execution must abort
    #[error("trace write error (execution aborted): {0}")]
    TraceWriteError(String),
    /// `exit(code)`: not a failure, unwinds to the runner
    #[error("exit({0})")]
    Exit(i32),
}

// ---------------------------------------------------------------------------
// Trace data types
// ---------------------------------------------------------------------------

/// Tagged trace value. Compound values are recorded by their printed form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum TraceValue {
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Bool(bool),
    Unit,
    Repr(String),
}

impl TraceValue {
    pub fn from_value(val: &Value) -> Self {
        match val {
            Value::Int(n) => TraceValue::Int(*n),
            Value::Float(f) => TraceValue::Float(*f),
            Value::Char(c) => TraceValue::Char(*c),
            Value::Str(s) => TraceValue::Str(s.clone()),
            Value::Bool(b) => TraceValue::Bool(*b),
            Value::Unit => TraceValue::Unit,
            other => TraceValue::Repr(other.repr()),
        }
    }

    /// Serialize to a string for hashing purposes.
    fn to_hash_string(&self) -> String {
        match self {
            TraceValue::Int(n) => n.to_string(),
            TraceValue::Float(f) => format!("{f:?}"),
            TraceValue::Char(c) => c.to_string(),
            TraceValue::Str(s) | TraceValue::Repr(s) => s.clone(),
            TraceValue::Bool(b) => b.to_string(),
            TraceValue::Unit => "()".to_string(),
        }
    }
}

/// A single trace entry recording one host function call.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TraceEntry {
    pub seq: u64,
    pub timestamp: String,
    pub operation: String,
    pub inputs: Vec<TraceValue>,
    pub output: TraceOutput,
    pub duration_ms: u64,
}

/// Output section of a trace entry.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TraceOutput {
    /// "ok", "error" or "exit"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TraceValue>,
    pub value_hash: String,
    pub value_size: usize,
}

/// Current trace schema version.
pub const TRACE_SCHEMA_VERSION: &str = "1";

/// Values whose printed form exceeds this many bytes are recorded by hash only.
pub const INLINE_VALUE_LIMIT: usize = 1024;

/// A trace record in the JSONL stream.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "record")]
pub enum TraceRecord {
    /// First line: schema version and program.
    #[serde(rename = "header")]
    Header(TraceHeader),
    /// Effect entry: one host function call.
    #[serde(rename = "effect")]
    Effect(TraceEntry),
    /// Last line: summary and completion status.
    #[serde(rename = "footer")]
    Footer(TraceFooter),
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TraceHeader {
    pub schema_version: String,
    pub timestamp: String,
    pub program: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TraceFooter {
    pub timestamp: String,
    pub effect_count: u64,
    /// "success", "error" or "exit"
    pub program_status: String,
}

// ---------------------------------------------------------------------------
// TraceEmitter
// ---------------------------------------------------------------------------

/// Emits structured JSONL trace entries for host function calls.
///
/// Call `finalize()` when the program completes to write the footer.
pub struct TraceEmitter {
    seq: u64,
    writer: Option<Box<dyn Write>>,
}

impl std::fmt::Debug for TraceEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceEmitter")
            .field("seq", &self.seq)
            .field("enabled", &self.writer.is_some())
            .finish()
    }
}

impl Default for TraceEmitter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TraceEmitter {
    /// Create a trace emitter writing JSONL; the header is written immediately.
    pub fn new(mut writer: Box<dyn Write>, program: &str) -> Result<Self, HostError> {
        let header = TraceRecord::Header(TraceHeader {
            schema_version: TRACE_SCHEMA_VERSION.to_string(),
            timestamp: now_iso8601(),
            program: program.to_string(),
        });
        write_record(&mut writer, &header)?;
        Ok(Self {
            seq: 0,
            writer: Some(writer),
        })
    }

    /// Create a disabled trace emitter (no output).
    pub fn disabled() -> Self {
        Self {
            seq: 0,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    fn next_seq(&mut self) -> u64 {
        let s = self.seq;
        self.seq += 1;
        s
    }

    pub fn emit(&mut self, entry: TraceEntry) -> Result<(), HostError> {
        match self.writer.as_mut() {
            Some(w) => write_record(w, &TraceRecord::Effect(entry)),
            None => Ok(()),
        }
    }

    /// Write the footer record and flush.
    pub fn finalize(&mut self, program_status: &str) -> Result<(), HostError> {
        if let Some(w) = self.writer.as_mut() {
            let footer = TraceRecord::Footer(TraceFooter {
                timestamp: now_iso8601(),
                effect_count: self.seq,
                program_status: program_status.to_string(),
            });
            write_record(w, &footer)?;
            w.flush()
                .map_err(|e| HostError::TraceWriteError(format!("flush trace: {e}")))?;
        }
        Ok(())
    }
}

fn write_record(w: &mut Box<dyn Write>, record: &TraceRecord) -> Result<(), HostError> {
    let json = serde_json::to_string(record)
        .map_err(|e| HostError::TraceWriteError(format!("serialize record: {e}")))?;
    writeln!(w, "{json}").map_err(|e| HostError::TraceWriteError(format!("write record: {e}")))
}

// ---------------------------------------------------------------------------
// Output capture
// ---------------------------------------------------------------------------

/// Shared in-memory writer; clones append to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HostRegistry
// ---------------------------------------------------------------------------

/// Type alias for host function signatures.
pub type HostFnImpl = fn(&[Value], &mut dyn Write) -> Result<Value, HostError>;

/// Registry mapping host function names to Rust implementations.
pub struct HostRegistry {
    functions: HashMap<String, HostFnImpl>,
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRegistry {
    /// Create a new registry with all built-in host functions.
    pub fn new() -> Self {
        let mut reg = Self {
            functions: HashMap::new(),
        };
        reg.register("print", host_print);
        reg.register("printf", host_printf);
        reg.register("read", host_read);
        reg.register("write", host_write);
        reg.register("exit", host_exit);
        reg
    }

    pub fn register(&mut self, name: &str, f: HostFnImpl) {
        self.functions.insert(name.to_string(), f);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Dispatch a host call and record it on `tracer`.
    pub fn dispatch_traced(
        &self,
        name: &str,
        args: &[Value],
        out: &mut dyn Write,
        tracer: &mut TraceEmitter,
    ) -> Result<Value, HostError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| HostError::UnknownFunction(name.to_string()))?;

        let start = std::time::Instant::now();
        let result = f(args, out);
        let duration = start.elapsed();

        if !tracer.is_enabled() {
            return result;
        }

        let (status, output_value) = match &result {
            Ok(val) => ("ok", TraceValue::from_value(val)),
            Err(HostError::Exit(code)) => ("exit", TraceValue::Int(i64::from(*code))),
            Err(e) => ("error", TraceValue::Str(e.to_string())),
        };
        let hash_str = output_value.to_hash_string();
        let size = hash_str.len();
        let value = (size <= INLINE_VALUE_LIMIT).then_some(output_value);

        // large inputs are recorded by hash
        let inputs = args
            .iter()
            .map(|a| {
                let tv = TraceValue::from_value(a);
                let s = tv.to_hash_string();
                if s.len() > INLINE_VALUE_LIMIT {
                    TraceValue::Str(sha256_hex(&s))
                } else {
                    tv
                }
            })
            .collect();

        let seq = tracer.next_seq();
        tracer.emit(TraceEntry {
            seq,
            timestamp: now_iso8601(),
            operation: name.to_string(),
            inputs,
            output: TraceOutput {
                status: status.to_string(),
                value,
                value_hash: sha256_hex(&hash_str),
                value_size: size,
            },
            duration_ms: duration.as_millis() as u64,
        })?;

        result
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Compute SHA-256 hex digest of a string, prefixed with "sha256:".
fn sha256_hex(data: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Produce an ISO 8601 UTC timestamp without external dependencies.
///
/// Uses the standard civil-from-days algorithm to convert epoch seconds
/// to year-month-day.
fn now_iso8601() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let millis = now.subsec_millis();

    // Civil date from days since epoch (algorithm from Howard Hinnant)
    let days = (secs / 86400) as i64;
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64; // day of era [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    let rem = secs % 86400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
        millis
    )
}

fn io_err(op: &str, e: std::io::Error) -> HostError {
    HostError::IoError(format!("{op}: {e}"))
}

/// Render a `printf` format string.
///
/// Directives: `%d %i` Int, `%f %.Nf` Float (Int promoted), `%s %v` any value,
/// `%c` Char, `%%` literal percent.
pub fn format_printf(fmt: &str, args: &[Value]) -> Result<String, HostError> {
    let mut out = String::with_capacity(fmt.len());
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();

    let mut next_arg = |directive: &str| {
        args.next()
            .ok_or_else(|| HostError::Format(format!("missing argument for `{directive}`")))
    };

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            precision = Some(
                digits
                    .parse()
                    .map_err(|_| HostError::Format("expected digits after `%.`".into()))?,
            );
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(d @ ('d' | 'i')) => match next_arg(&format!("%{d}"))? {
                Value::Int(n) => out.push_str(&n.to_string()),
                other => {
                    return Err(HostError::TypeError(format!(
                        "`%{d}` expects Int, got {}",
                        other.type_tag()
                    )))
                }
            },
            Some('f') => {
                let x = match next_arg("%f")? {
                    Value::Float(x) => *x,
                    Value::Int(n) => *n as f64,
                    other => {
                        return Err(HostError::TypeError(format!(
                            "`%f` expects Float, got {}",
                            other.type_tag()
                        )))
                    }
                };
                out.push_str(&format!("{:.*}", precision.unwrap_or(6), x));
            }
            Some('c') => match next_arg("%c")? {
                Value::Char(ch) => out.push(*ch),
                other => {
                    return Err(HostError::TypeError(format!(
                        "`%c` expects Char, got {}",
                        other.type_tag()
                    )))
                }
            },
            Some(d @ ('s' | 'v')) => out.push_str(&next_arg(&format!("%{d}"))?.to_string()),
            Some(other) => {
                return Err(HostError::Format(format!("unknown directive `%{other}`")))
            }
            None => return Err(HostError::Format("dangling `%` at end of format".into())),
        }
    }

    let extra = args.count();
    if extra > 0 {
        return Err(HostError::Format(format!("{extra} argument(s) not used by format")));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Host function implementations
// ---------------------------------------------------------------------------

fn host_print(args: &[Value], out: &mut dyn Write) -> Result<Value, HostError> {
    let line: Vec<String> = args.iter().map(ToString::to_string).collect();
    writeln!(out, "{}", line.join(" ")).map_err(|e| io_err("print", e))?;
    Ok(Value::Unit)
}

fn host_printf(args: &[Value], out: &mut dyn Write) -> Result<Value, HostError> {
    let fmt = match args.first() {
        Some(Value::Str(s)) => s,
        _ => return Err(HostError::TypeError("printf: expected String format".into())),
    };
    let text = format_printf(fmt, &args[1..])?;
    write!(out, "{text}").map_err(|e| io_err("printf", e))?;
    Ok(Value::Unit)
}

fn host_read(args: &[Value], _out: &mut dyn Write) -> Result<Value, HostError> {
    let path = match args {
        [Value::Str(s)] => s,
        _ => return Err(HostError::TypeError("read: expected String path".into())),
    };
    std::fs::read_to_string(path)
        .map(Value::Str)
        .map_err(|e| io_err("read", e))
}

fn host_write(args: &[Value], _out: &mut dyn Write) -> Result<Value, HostError> {
    let (data, path) = match args {
        [data, Value::Str(path)] => (data, path),
        _ => {
            return Err(HostError::TypeError(
                "write: expected (data, String path)".into(),
            ))
        }
    };
    std::fs::write(path, data.to_string()).map_err(|e| io_err("write", e))?;
    Ok(Value::Unit)
}

fn host_exit(args: &[Value], out: &mut dyn Write) -> Result<Value, HostError> {
    let code = match args {
        [] => 0,
        [Value::Int(n)] => i32::try_from(*n)
            .map_err(|_| HostError::TypeError(format!("exit: code {n} out of range")))?,
        _ => return Err(HostError::TypeError("exit: expected Int code".into())),
    };
    out.flush().map_err(|e| io_err("exit", e))?;
    Err(HostError::Exit(code))
}
