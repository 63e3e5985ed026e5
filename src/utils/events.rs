//! Scalar and figure event log
//!
//! Each run appends one JSON object per line to `events.jsonl`, tagged the way
//! a dashboard would group them (`Train/loss`, `Val/f1_score`, ...).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::{MaskClassifierError, Result};

pub const EVENTS_FILE: &str = "events.jsonl";

/// One logged event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Scalar {
        tag: String,
        value: f64,
        step: usize,
        wall_time: DateTime<Utc>,
    },
    Figure {
        tag: String,
        path: PathBuf,
        captions: Vec<String>,
        step: usize,
        wall_time: DateTime<Utc>,
    },
}

impl Event {
    pub fn tag(&self) -> &str {
        match self {
            Event::Scalar { tag, .. } | Event::Figure { tag, .. } => tag,
        }
    }

    pub fn step(&self) -> usize {
        match self {
            Event::Scalar { step, .. } | Event::Figure { step, .. } => *step,
        }
    }
}

/// Append-only writer for the run's event log
pub struct EventWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl EventWriter {
    /// Open (or create) `events.jsonl` inside `dir`
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(EVENTS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                MaskClassifierError::Resource(format!("cannot open {}: {}", path.display(), e))
            })?;

        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.write(&Event::Scalar {
            tag: tag.to_string(),
            value,
            step,
            wall_time: Utc::now(),
        })
    }

    pub fn add_figure(
        &mut self,
        tag: &str,
        path: &Path,
        captions: Vec<String>,
        step: usize,
    ) -> Result<()> {
        self.write(&Event::Figure {
            tag: tag.to_string(),
            path: path.to_path_buf(),
            captions,
            step,
            wall_time: Utc::now(),
        })
    }

    fn write(&mut self, event: &Event) -> Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.out, "{}", line)
            .and_then(|_| self.out.flush())
            .map_err(|e| {
                MaskClassifierError::Resource(format!("cannot write {}: {}", self.path.display(), e))
            })
    }
}

/// Read every event back from an `events.jsonl` file
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let file = File::open(path)?;
    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}
