//! Random batch generator speaking the ingestion protocol (the "vision" side).

use std::io::{BufWriter, Write};
use std::net::TcpStream;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::ingest::END_MARKER;
use crate::types::Item;

/// `n` items uniformly placed in a `side` x `side` container centered on the origin.
pub fn generate_batch(n: usize, side: f64, seed: u64) -> Vec<Item> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let x = (rng.gen_range(0.0..1.0) - 0.5) * side;
            let y = (rng.gen_range(0.0..1.0) - 0.5) * side;
            Item::new(x, y)
        })
        .collect()
}

/// Write header, one line per item, and the terminator.
pub fn write_batch<W: Write>(out: &mut W, side: f64, items: &[Item]) -> std::io::Result<()> {
    writeln!(out, "{} {:.6}", items.len(), side)?;
    for item in items {
        writeln!(out, "{:.6} {:.6}", item.x, item.y)?;
    }
    writeln!(out, "{END_MARKER}")?;
    out.flush()
}

/// Connect to the engine and send a freshly generated batch.
pub fn send_batch(host: &str, port: u16, n: usize, side: f64, seed: u64) -> Result<()> {
    if n == 0 || !(side.is_finite() && side > 0.0) {
        return Err(EngineError::Configuration(format!(
            "N and Z must be > 0, got N={n} Z={side}"
        )));
    }
    let items = generate_batch(n, side, seed);
    let stream = TcpStream::connect((host, port))
        .map_err(|e| EngineError::Resource(format!("connect {host}:{port}: {e}")))?;
    let mut writer = BufWriter::new(stream);
    write_batch(&mut writer, side, &items)?;
    info!(items = n, host, port, side, "batch sent");
    Ok(())
}
