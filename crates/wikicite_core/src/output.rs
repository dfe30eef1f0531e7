use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

/// Lowercase a page title into a filesystem-safe stem: alphanumerics,
/// dashes, dots and underscores survive; every other run of characters
/// collapses to a single underscore, stripped at both ends.
pub fn sanitize_filename(title: &str) -> String {
    let mut output = String::new();
    let mut previous_underscore = false;
    for ch in title.to_lowercase().chars() {
        if ch != '_' && (ch.is_alphanumeric() || matches!(ch, '-' | '.')) {
            output.push(ch);
            previous_underscore = false;
        } else if !previous_underscore && !output.is_empty() {
            output.push('_');
            previous_underscore = true;
        }
    }
    while output.ends_with('_') {
        output.pop();
    }
    output
}

pub fn record_filename(title: &str) -> String {
    format!("{}.ris", sanitize_filename(title))
}

/// Name of the combined output file, second-resolution timestamp.
pub fn combined_filename(now: NaiveDateTime) -> String {
    format!("all_citations_{}.ris", now.format("%Y%m%d_%H%M%S"))
}

/// Destination for produced records. The driver writes each record as it is
/// produced plus one combined payload at the end of the batch.
pub trait CitationSink {
    fn write_record(&mut self, filename: &str, payload: &str) -> Result<()>;
}

/// Writes records into an output directory, created on first write.
pub struct DirSink {
    dir: PathBuf,
    created: bool,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            created: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CitationSink for DirSink {
    fn write_record(&mut self, filename: &str, payload: &str) -> Result<()> {
        if !self.created {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("failed to create {}", self.dir.display()))?;
            self.created = true;
        }
        let path = self.dir.join(filename);
        fs::write(&path, payload).with_context(|| format!("failed to write {}", path.display()))
    }
}
