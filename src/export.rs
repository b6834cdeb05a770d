use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use crate::parser::Record;

/// Hands a finished batch of records to some destination.
pub trait Publisher {
    /// Returns how many records the destination accepted.
    fn publish(&mut self, source: &str, records: &[Record]) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// One JSON array, pretty-printed.
    Json,
    /// One JSON object per line.
    Jsonl,
    /// `number,date,title,content` rows under a header line.
    Csv,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Csv => "csv",
        }
    }
}

pub fn write_records<W: Write>(mut out: W, format: ExportFormat, records: &[Record]) -> Result<()> {
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, records)?;
            writeln!(out)?;
        }
        ExportFormat::Jsonl => {
            for r in records {
                serde_json::to_writer(&mut out, r)?;
                writeln!(out)?;
            }
        }
        // An empty batch leaves an empty file, without a header.
        ExportFormat::Csv if records.is_empty() => {}
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(&mut out);
            for r in records {
                wtr.serialize(r)?;
            }
            wtr.flush()?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Writes each batch to `<dir>/<source>-<timestamp>.<ext>`.
pub struct FileExporter {
    dir: PathBuf,
    format: ExportFormat,
    written: Vec<PathBuf>,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>, format: ExportFormat) -> Self {
        FileExporter {
            dir: dir.into(),
            format,
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn path_for(&self, source: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let mut path = self.dir.join(format!("{}-{}.{}", source, stamp, self.format.extension()));
        let mut n = 1;
        while path.exists() {
            n += 1;
            path = self
                .dir
                .join(format!("{}-{}-{}.{}", source, stamp, n, self.format.extension()));
        }
        path
    }
}

impl Publisher for FileExporter {
    fn publish(&mut self, source: &str, records: &[Record]) -> Result<usize> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(source);
        write_file(&path, self.format, records)?;
        info!(path = %path.display(), records = records.len(), "exported records");
        self.written.push(path);
        Ok(records.len())
    }
}

fn write_file(path: &Path, format: ExportFormat, records: &[Record]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_records(BufWriter::new(file), format, records)
}
