//! JSON-lines dataset files.
//!
//! One record per line. A sink writes to `<name>.partial` and renames it to
//! `<name>` only on `close()`, so a worker that dies mid-run never leaves a
//! file that looks complete.

use jpsi_env::{DatasetMerger, EnvError, RecordSink};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A sealed dataset on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFile {
    /// Final path of the file
    pub path: PathBuf,
    
    /// Number of records (lines) it holds
    pub records: u64,
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Creates the parent directory and an empty `.partial` file for `path`.
fn create_partial(path: &Path) -> Result<(PathBuf, BufWriter<File>), EnvError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);
    let file = File::create(&partial)?;
    Ok((partial, BufWriter::new(file)))
}

/// Flushes, syncs and renames a `.partial` file to its final name.
fn seal(writer: BufWriter<File>, partial: &Path, path: &Path) -> Result<(), EnvError> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    fs::rename(partial, path)?;
    Ok(())
}

/// Record sink writing one JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    partial: PathBuf,
    writer: Option<BufWriter<File>>,
    records: u64,
    sealed: Option<DatasetFile>,
}

impl JsonLinesSink {
    /// Opens a new dataset that will be sealed at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, EnvError> {
        let path = path.into();
        let (partial, writer) = create_partial(&path)?;
        debug!(path = %partial.display(), "opened dataset");
        
        Ok(Self {
            path,
            partial,
            writer: Some(writer),
            records: 0,
            sealed: None,
        })
    }
    
    pub fn path(&self) -> &Path {
        &self.path
    }
    
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl<R: Serialize> RecordSink<R> for JsonLinesSink {
    type Dataset = DatasetFile;
    
    fn write(&mut self, record: &R) -> Result<(), EnvError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(EnvError::SinkClosed(self.path.display().to_string()));
        };
        serde_json::to_writer(&mut *writer, record).map_err(EnvError::serialization)?;
        writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }
    
    fn close(&mut self) -> Result<DatasetFile, EnvError> {
        if let Some(dataset) = &self.sealed {
            return Ok(dataset.clone());
        }
        let writer = self
            .writer
            .take()
            .ok_or_else(|| EnvError::SinkClosed(self.path.display().to_string()))?;
        seal(writer, &self.partial, &self.path)?;
        
        let dataset = DatasetFile {
            path: self.path.clone(),
            records: self.records,
        };
        self.sealed = Some(dataset.clone());
        Ok(dataset)
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        // Best effort only; an unsealed file keeps its .partial name.
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

/// Concatenates sealed JSON-lines datasets into one file.
#[derive(Debug, Clone)]
pub struct JsonLinesMerger {
    output: PathBuf,
}

impl JsonLinesMerger {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self { output: output.into() }
    }
    
    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl DatasetMerger<DatasetFile> for JsonLinesMerger {
    type Output = DatasetFile;
    
    fn merge(&self, inputs: Vec<DatasetFile>) -> Result<DatasetFile, EnvError> {
        let (partial, mut writer) = create_partial(&self.output)?;
        let mut total = 0;
        
        for input in &inputs {
            let reader = BufReader::new(File::open(&input.path)?);
            let mut copied = 0;
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
                copied += 1;
            }
            
            if copied != input.records {
                return Err(EnvError::Merge(format!(
                    "{} holds {} records, expected {}",
                    input.path.display(),
                    copied,
                    input.records
                )));
            }
            total += copied;
        }
        
        seal(writer, &partial, &self.output)?;
        info!("Merged {} datasets ({} records) into {}", inputs.len(), total, self.output.display());
        
        Ok(DatasetFile {
            path: self.output.clone(),
            records: total,
        })
    }
}

/// Reads every record of a JSON-lines file.
pub fn read_records<R: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<R>, EnvError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(EnvError::serialization)?);
    }
    Ok(records)
}

/// Writes any serializable value as pretty JSON (run summaries).
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), EnvError> {
    let json = serde_json::to_string_pretty(value).map_err(EnvError::serialization)?;
    let mut file = File::create(path.as_ref())?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
