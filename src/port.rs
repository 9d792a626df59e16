//! Port (SPEC_FULL.md §3, §4.3).
//!
//! Every pipeline stage exposes a byte half and a value half on both its
//! input and output. Internal (pipeline-to-pipeline) wiring uses an
//! in-process `tokio::sync::mpsc` channel for each half rather than a literal
//! OS pipe fd (see SPEC_FULL.md §3's implementation note); a frame's
//! standard ports (real stdio, or a file from a redirection) are backed by a
//! real file/handle instead. The channels are unbounded: full backpressure
//! bookkeeping is left to the OS-file case, which is where it actually
//! matters (an unbounded in-process channel between two cooperating tasks
//! cannot itself exhaust memory inside one pipeline run in any of this
//! evaluator's own workloads).

use std::fs::File;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

/// The write half of a byte port.
#[derive(Clone)]
pub enum ByteWriter {
    Discard,
    Collect(Arc<Mutex<Vec<u8>>>),
    Chan(mpsc::UnboundedSender<Vec<u8>>),
    File(Arc<Mutex<File>>),
    Stdout,
    Stderr,
    Closed,
}

impl ByteWriter {
    pub fn write(&self, bytes: &[u8]) -> EvalResult<()> {
        match self {
            ByteWriter::Discard => Ok(()),
            ByteWriter::Collect(buf) => {
                buf.lock().unwrap().extend_from_slice(bytes);
                Ok(())
            }
            ByteWriter::Chan(tx) => tx
                .send(bytes.to_vec())
                .map_err(|_| Exception::new(Cause::IOError("broken pipe".into()))),
            ByteWriter::File(f) => f
                .lock()
                .unwrap()
                .write_all(bytes)
                .map_err(|e| Exception::new(Cause::IOError(e.to_string()))),
            ByteWriter::Stdout => std::io::stdout()
                .write_all(bytes)
                .map_err(|e| Exception::new(Cause::IOError(e.to_string()))),
            ByteWriter::Stderr => std::io::stderr()
                .write_all(bytes)
                .map_err(|e| Exception::new(Cause::IOError(e.to_string()))),
            ByteWriter::Closed => Err(Exception::new(Cause::IOError(
                "write to closed port".into(),
            ))),
        }
    }

    /// Close only the write half, signalling EOF to the corresponding reader.
    pub fn close(&mut self) {
        *self = ByteWriter::Closed;
    }
}

/// The read half of a byte port.
pub enum ByteReader {
    Empty,
    Fixed(Mutex<std::io::Cursor<Vec<u8>>>),
    Chan(Mutex<mpsc::UnboundedReceiver<Vec<u8>>>),
    File(Arc<Mutex<File>>),
}

impl ByteReader {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ByteReader::Fixed(Mutex::new(std::io::Cursor::new(bytes)))
    }

    /// Read everything available until EOF (§4.2 `slurp`).
    pub fn read_to_end(&self) -> EvalResult<Vec<u8>> {
        match self {
            ByteReader::Empty => Ok(Vec::new()),
            ByteReader::Fixed(cur) => {
                let mut out = Vec::new();
                cur.lock()
                    .unwrap()
                    .read_to_end(&mut out)
                    .map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;
                Ok(out)
            }
            ByteReader::Chan(rx) => {
                let mut out = Vec::new();
                let mut guard = rx.lock().unwrap();
                while let Some(chunk) = guard.blocking_recv() {
                    out.extend(chunk);
                }
                Ok(out)
            }
            ByteReader::File(f) => {
                let mut out = Vec::new();
                f.lock()
                    .unwrap()
                    .read_to_end(&mut out)
                    .map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;
                Ok(out)
            }
        }
    }
}

/// The write half of a value channel. A producer closes it by dropping the
/// sender; readers never close (§5).
#[derive(Clone)]
pub enum ValueWriter {
    Discard,
    Collect(Arc<Mutex<Vec<Value>>>),
    Chan(mpsc::UnboundedSender<Value>),
}

impl ValueWriter {
    pub fn put(&self, v: Value) -> EvalResult<()> {
        match self {
            ValueWriter::Discard => Ok(()),
            ValueWriter::Collect(buf) => {
                buf.lock().unwrap().push(v);
                Ok(())
            }
            ValueWriter::Chan(tx) => tx
                .send(v)
                .map_err(|_| Exception::new(Cause::IOError("broken pipe (value channel)".into()))),
        }
    }
}

/// The read half of a value channel.
pub enum ValueReader {
    Empty,
    Fixed(Mutex<std::vec::IntoIter<Value>>),
    Chan(Mutex<mpsc::UnboundedReceiver<Value>>),
}

impl ValueReader {
    pub fn from_values(values: Vec<Value>) -> Self {
        ValueReader::Fixed(Mutex::new(values.into_iter()))
    }

    /// Blocking receive of the next value, or `None` at EOF.
    pub fn recv(&self) -> Option<Value> {
        match self {
            ValueReader::Empty => None,
            ValueReader::Fixed(it) => it.lock().unwrap().next(),
            ValueReader::Chan(rx) => rx.lock().unwrap().blocking_recv(),
        }
    }

    pub fn drain_all(&self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(v) = self.recv() {
            out.push(v);
        }
        out
    }
}

/// The input side of a frame's ports triple.
pub struct InPort {
    pub bytes: ByteReader,
    pub values: ValueReader,
}

impl InPort {
    pub fn closed() -> Self {
        InPort {
            bytes: ByteReader::Empty,
            values: ValueReader::Empty,
        }
    }
}

/// The output side of a frame's ports triple.
#[derive(Clone)]
pub struct OutPort {
    pub bytes: ByteWriter,
    pub values: ValueWriter,
}

impl OutPort {
    pub fn discard() -> Self {
        OutPort {
            bytes: ByteWriter::Discard,
            values: ValueWriter::Discard,
        }
    }

    pub fn collecting() -> (Self, Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<Value>>>) {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let values = Arc::new(Mutex::new(Vec::new()));
        (
            OutPort {
                bytes: ByteWriter::Collect(Arc::clone(&bytes)),
                values: ValueWriter::Collect(Arc::clone(&values)),
            },
            bytes,
            values,
        )
    }
}

/// The standard three ports every frame executes with: stdin, stdout, stderr.
pub struct Ports {
    pub stdin: InPort,
    pub stdout: OutPort,
    pub stderr: OutPort,
}

impl Ports {
    /// Root ports wired to the real process stdio.
    pub fn inherited() -> Self {
        Ports {
            stdin: InPort {
                bytes: ByteReader::Empty,
                values: ValueReader::Empty,
            },
            stdout: OutPort {
                bytes: ByteWriter::Stdout,
                values: ValueWriter::Discard,
            },
            stderr: OutPort {
                bytes: ByteWriter::Stderr,
                values: ValueWriter::Discard,
            },
        }
    }
}

/// A connection between two pipeline stages: the write half feeds the
/// previous stage's output, the read half feeds the next stage's input.
pub struct Connection {
    pub byte_tx: mpsc::UnboundedSender<Vec<u8>>,
    pub byte_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    pub value_tx: mpsc::UnboundedSender<Value>,
    pub value_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl Connection {
    pub fn new() -> Self {
        let (byte_tx, byte_rx) = mpsc::unbounded_channel();
        let (value_tx, value_rx) = mpsc::unbounded_channel();
        Connection {
            byte_tx,
            byte_rx: Mutex::new(Some(byte_rx)),
            value_tx,
            value_rx: Mutex::new(Some(value_rx)),
        }
    }

    pub fn take_in_port(&self) -> InPort {
        let byte_rx = self.byte_rx.lock().unwrap().take().expect("in port taken twice");
        let value_rx = self.value_rx.lock().unwrap().take().expect("in port taken twice");
        InPort {
            bytes: ByteReader::Chan(Mutex::new(byte_rx)),
            values: ValueReader::Chan(Mutex::new(value_rx)),
        }
    }

    pub fn out_port(&self) -> OutPort {
        OutPort {
            bytes: ByteWriter::Chan(self.byte_tx.clone()),
            values: ValueWriter::Chan(self.value_tx.clone()),
        }
    }
}

/// A script-level `Pipe` value (§3): an explicit read/write handle pair
/// created by the `pipe` built-in, with its own independent close state so
/// `prclose`/`pwclose` on an already-closed end surfaces an `IOError` (§7).
pub struct PipeHandle {
    buffer: Mutex<std::collections::VecDeque<u8>>,
    read_open: Mutex<bool>,
    write_open: Mutex<bool>,
}

impl PipeHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(PipeHandle {
            buffer: Mutex::new(std::collections::VecDeque::new()),
            read_open: Mutex::new(true),
            write_open: Mutex::new(true),
        })
    }

    pub fn write(&self, bytes: &[u8]) -> EvalResult<()> {
        if !*self.write_open.lock().unwrap() {
            return Err(Exception::new(Cause::IOError("pipe write end closed".into())));
        }
        self.buffer.lock().unwrap().extend(bytes.iter().copied());
        Ok(())
    }

    pub fn read_all(&self) -> Vec<u8> {
        self.buffer.lock().unwrap().drain(..).collect()
    }

    pub fn close_read(&self) -> EvalResult<()> {
        let mut open = self.read_open.lock().unwrap();
        if !*open {
            return Err(Exception::new(Cause::IOError("pipe read end already closed".into())));
        }
        *open = false;
        Ok(())
    }

    pub fn close_write(&self) -> EvalResult<()> {
        let mut open = self.write_open.lock().unwrap();
        if !*open {
            return Err(Exception::new(Cause::IOError("pipe write end already closed".into())));
        }
        *open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_writer_collect_accumulates() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let w = ByteWriter::Collect(Arc::clone(&buf));
        w.write(b"hello ").unwrap();
        w.write(b"world").unwrap();
        assert_eq!(&*buf.lock().unwrap(), b"hello world");
    }

    #[test]
    fn closed_writer_errors() {
        let w = ByteWriter::Closed;
        assert!(w.write(b"x").is_err());
    }

    #[test]
    fn connection_carries_bytes_and_values_independently() {
        let conn = Connection::new();
        let out = conn.out_port();
        out.bytes.write(b"chunk").unwrap();
        out.values.put(Value::str("v")).unwrap();
        drop(out);
        let inp = conn.take_in_port();
        assert_eq!(inp.bytes.read_to_end().unwrap(), b"chunk");
        assert_eq!(inp.values.recv(), Some(Value::str("v")));
        assert_eq!(inp.values.recv(), None);
    }

    #[test]
    fn pipe_handle_double_close_errors() {
        let p = PipeHandle::new();
        p.close_write().unwrap();
        assert!(p.close_write().is_err());
    }
}
