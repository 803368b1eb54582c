//! Sampled trajectory records and the buffered CSV writer both engines stream into.

use crate::error::{Result, TrajectoryError};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Default number of samples held in memory before a batch is written.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// A row type with a fixed CSV header.
pub trait TrajectoryRecord: Serialize + DeserializeOwned {
    const HEADER: &'static [&'static str];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonianSample {
    pub time: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl TrajectoryRecord for NewtonianSample {
    const HEADER: &'static [&'static str] = &["time", "x1", "y1", "x2", "y2"];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativisticSample {
    #[serde(rename = "Time (s)")]
    pub time: f64,
    #[serde(rename = "x (m)")]
    pub x: f64,
    #[serde(rename = "y (m)")]
    pub y: f64,
    #[serde(rename = "Lorentz Factor")]
    pub lorentz_factor: f64,
    /// Set when the local speed had to be clipped below c. Not persisted.
    #[serde(skip)]
    pub clamped: bool,
}

impl TrajectoryRecord for RelativisticSample {
    const HEADER: &'static [&'static str] = &["Time (s)", "x (m)", "y (m)", "Lorentz Factor"];
}

/// Destination for the samples an engine emits.
pub trait SampleSink<R> {
    fn append(&mut self, sample: R) -> Result<()>;

    /// Make everything appended so far durable. Called once at the end of a
    /// run, on both success and failure paths.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<R> SampleSink<R> for Vec<R> {
    fn append(&mut self, sample: R) -> Result<()> {
        self.push(sample);
        Ok(())
    }
}

/// Discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl<R> SampleSink<R> for NullSink {
    fn append(&mut self, _sample: R) -> Result<()> {
        Ok(())
    }
}

/// Buffers samples and writes them to CSV in batches of `capacity`.
///
/// The header is written when the writer is opened, so even a run that
/// fails before its first sample leaves a well-formed file behind.
pub struct TrajectoryWriter<R: TrajectoryRecord, W: Write> {
    wtr: Option<csv::Writer<W>>,
    buffer: Vec<R>,
    capacity: usize,
    written: u64,
    batches: u64,
}

impl<R: TrajectoryRecord> TrajectoryWriter<R, BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        debug!("opened trajectory file {}", path.as_ref().display());
        Self::from_writer(BufWriter::new(file), capacity)
    }
}

impl<R: TrajectoryRecord, W: Write> TrajectoryWriter<R, W> {
    pub fn from_writer(writer: W, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(R::HEADER)?;
        Ok(Self {
            wtr: Some(wtr),
            buffer: Vec::with_capacity(capacity),
            capacity,
            written: 0,
            batches: 0,
        })
    }

    pub fn append(&mut self, sample: R) -> Result<()> {
        self.buffer.push(sample);
        if self.buffer.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the buffered samples as one batch.
    pub fn flush(&mut self) -> Result<()> {
        let wtr = self.wtr.as_mut().ok_or_else(closed)?;
        if !self.buffer.is_empty() {
            let n = self.buffer.len();
            for sample in self.buffer.drain(..) {
                wtr.serialize(sample)?;
            }
            self.written += n as u64;
            self.batches += 1;
            debug!("flushed batch of {n} samples ({} total)", self.written);
        }
        wtr.flush()?;
        Ok(())
    }

    /// Flush what is left and hand back the underlying writer.
    pub fn close(mut self) -> Result<W> {
        self.flush()?;
        let wtr = self.wtr.take().ok_or_else(closed)?;
        wtr.into_inner()
            .map_err(|e| TrajectoryError::Io(e.into_error()))
    }

    /// Samples written to the stream so far, excluding those still buffered.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl<R: TrajectoryRecord, W: Write> SampleSink<R> for TrajectoryWriter<R, W> {
    fn append(&mut self, sample: R) -> Result<()> {
        TrajectoryWriter::append(self, sample)
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()
    }
}

impl<R: TrajectoryRecord, W: Write> Drop for TrajectoryWriter<R, W> {
    fn drop(&mut self) {
        if self.wtr.is_some() {
            if let Err(e) = self.flush() {
                warn!("dropping trajectory writer with unflushed samples: {e}");
            }
        }
    }
}

fn closed() -> TrajectoryError {
    TrajectoryError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "trajectory writer already closed",
    ))
}

/// Read a whole trajectory file back into memory.
pub fn read_trajectory<R: TrajectoryRecord, P: AsRef<Path>>(path: P) -> Result<Vec<R>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut samples = Vec::new();
    for record in rdr.deserialize() {
        samples.push(record?);
    }
    Ok(samples)
}
