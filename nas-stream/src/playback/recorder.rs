//! Raw stream recorder
//!
//! Appends every packet payload dispatched to the renderer to a file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Append-only output file for dispatched packet payloads
#[derive(Debug)]
pub struct FileOutput {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl FileOutput {
    /// Open (creating if needed) `path` for appending
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Recording stream to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            bytes_written: 0,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
