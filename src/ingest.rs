//! Ingestion of a work batch over the line-oriented text protocol.
//!
//! Header `N Z`, then up to `N` lines of `x y`, optionally cut short by `END`.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::MAX_ITEMS;
use crate::error::{EngineError, Result};
use crate::types::Item;

/// Terminator line that ends ingestion early.
pub const END_MARKER: &str = "END";

/// Longest accepted protocol line, not counting its terminator.
pub const MAX_LINE_BYTES: usize = 4096;

/// How often a waiting listener or idle connection checks for an interrupt.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully ingested batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Always `declared` long; rows never received stay at (0, 0).
    pub items: Vec<Item>,
    pub declared: usize,
    pub received: usize,
    /// Container side announced by the header, if positive.
    pub container_side: Option<f64>,
}

impl Batch {
    pub fn is_degraded(&self) -> bool {
        self.received < self.declared
    }
}

fn parse_header(line: &str) -> Result<(usize, Option<f64>)> {
    let mut fields = line.split_whitespace();
    let count = fields
        .next()
        .and_then(|f| f.parse::<i64>().ok())
        .ok_or_else(|| EngineError::Protocol(format!("malformed header: {line:?}")))?;
    if count < 1 || count > MAX_ITEMS as i64 {
        return Err(EngineError::Protocol(format!(
            "N={count} out of range [1, {MAX_ITEMS}]"
        )));
    }
    let side = match fields.next() {
        Some(f) => f
            .parse::<f64>()
            .map_err(|_| EngineError::Protocol(format!("malformed header: {line:?}")))?,
        None => 0.0,
    };
    let side = (side.is_finite() && side > 0.0).then_some(side);
    Ok((count as usize, side))
}

fn parse_item(line: &str) -> Option<Item> {
    let mut fields = line.split_whitespace();
    let x = fields.next()?.parse::<f64>().ok()?;
    let y = fields.next()?.parse::<f64>().ok()?;
    Some(Item::new(x, y))
}

/// Line reader over the ingestion stream with a length cap.
///
/// Read timeouts on the underlying stream surface as `WouldBlock` or
/// `TimedOut`; each one is a chance to notice an interrupt.
struct LineReader<'a, R> {
    reader: R,
    interrupt: &'a AtomicBool,
    buf: Vec<u8>,
}

impl<'a, R: BufRead> LineReader<'a, R> {
    fn new(reader: R, interrupt: &'a AtomicBool) -> Self {
        Self {
            reader,
            interrupt,
            buf: Vec::with_capacity(64),
        }
    }

    /// Next line without its terminator, or `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        loop {
            let budget = (MAX_LINE_BYTES + 1).saturating_sub(self.buf.len()) as u64;
            match (&mut self.reader).take(budget).read_until(b'\n', &mut self.buf) {
                Ok(0) if self.buf.is_empty() => return Ok(None),
                Ok(0) => break,
                Ok(_) if self.buf.ends_with(b"\n") => break,
                Ok(_) if self.buf.len() > MAX_LINE_BYTES => {
                    return Err(EngineError::Protocol(format!(
                        "line longer than {MAX_LINE_BYTES} bytes"
                    )));
                }
                // End of stream mid-line; the next read returns 0.
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if self.interrupt.load(Ordering::SeqCst) {
                        return Err(EngineError::Interrupted);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        let line = std::str::from_utf8(&self.buf)
            .map_err(|_| EngineError::Protocol("line is not valid UTF-8".to_string()))?;
        Ok(Some(line.trim().to_string()))
    }
}

/// Read one batch from a buffered stream that is never interrupted.
pub fn read_batch<R: BufRead>(reader: R) -> Result<Batch> {
    read_batch_until(reader, &AtomicBool::new(false))
}

/// Read one batch, giving up with [`EngineError::Interrupted`] when
/// `interrupt` is set while the stream is idle.
///
/// Lines are reassembled across arbitrary chunk boundaries, so the sender
/// may split them anywhere.
pub fn read_batch_until<R: BufRead>(reader: R, interrupt: &AtomicBool) -> Result<Batch> {
    let mut lines = LineReader::new(reader, interrupt);
    let header = loop {
        match lines.next_line()? {
            Some(line) if !line.is_empty() => break line,
            Some(_) => {}
            None => {
                return Err(EngineError::Protocol(
                    "connection closed before header".to_string(),
                ));
            }
        }
    };
    let (declared, container_side) = parse_header(&header)?;
    info!(declared, ?container_side, "header received");

    let mut items = vec![Item::default(); declared];
    let mut received = 0usize;
    while received < declared {
        let Some(line) = lines.next_line()? else {
            return Err(EngineError::Protocol(format!(
                "connection closed after {received} of {declared} items"
            )));
        };
        if line.is_empty() {
            continue;
        }
        if line.starts_with(END_MARKER) {
            warn!(received, declared, "END before all items arrived");
            break;
        }
        match parse_item(&line) {
            Some(item) => {
                items[received] = item;
                received += 1;
            }
            None => debug!(line = %line, "skipping malformed data line"),
        }
    }

    Ok(Batch {
        items,
        declared,
        received,
        container_side,
    })
}

/// Listen on `port`, accept a single connection, and ingest its batch.
///
/// Both the wait for a client and the reads poll `interrupt` every
/// [`POLL_INTERVAL`].
pub fn accept_batch(port: u16, interrupt: &AtomicBool) -> Result<Batch> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .map_err(|e| EngineError::Resource(format!("bind port {port}: {e}")))?;
    listener.set_nonblocking(true)?;
    info!(port, "listening for item batch");
    let (stream, peer) = loop {
        if interrupt.load(Ordering::SeqCst) {
            return Err(EngineError::Interrupted);
        }
        match listener.accept() {
            Ok(accepted) => break accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    };
    info!(%peer, "connection accepted");
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    read_batch_until(BufReader::new(stream), interrupt)
}
