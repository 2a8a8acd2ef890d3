// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Output Emitter
 * Stdout finding lines plus one append-only file per host with
 * whole-line deduplication, pre-seeded from any existing file content.
 */
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::stringset::StringFilter;

/// One JSON line per finding when `--json` is set. Empty fields are
/// omitted from the serialised object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpiderOutput {
    pub input: String,
    pub source: String,
    #[serde(rename = "type")]
    pub output_type: String,
    pub output: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub status: u16,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub length: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub param: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub payload: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub confidence: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub snippet: String,
}

fn is_zero(v: &u16) -> bool {
    *v == 0
}

fn is_zero_usize(v: &usize) -> bool {
    *v == 0
}

impl SpiderOutput {
    pub fn to_json_line(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Append-only finding file with whole-line dedup.
pub struct Output {
    file: Mutex<File>,
    filter: StringFilter,
}

impl Output {
    /// Opens `<folder>/<host-with-dots-to-underscores>`.
    pub fn per_host(folder: &str, hostname: &str) -> Result<Self> {
        let filename = hostname.replace('.', "_");
        Self::open(Path::new(folder).join(filename))
    }

    /// Opens an arbitrary file path, creating parent directories.
    pub fn at_path(path: &str) -> Result<Self> {
        let abspath = PathBuf::from(path);
        if let Some(parent) = abspath.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output directory {}", parent.display()))?;
            }
        }
        Self::open(abspath)
    }

    fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("open output file {}", path.display()))?;
        let output = Self {
            file: Mutex::new(file),
            filter: StringFilter::new(),
        };
        output.load_existing(&path);
        Ok(output)
    }

    fn load_existing(&self, path: &Path) {
        let Ok(reader) = File::open(path) else {
            return;
        };
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                let _ = self.filter.duplicate(line);
            }
        }
    }

    /// Writes one line unless the exact line was already written.
    pub fn write_line(&self, msg: &str) {
        if msg.trim().is_empty() {
            return;
        }
        if self.filter.duplicate(msg) {
            return;
        }
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(file, "{}", msg);
    }

    pub fn flush(&self) {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let _ = file.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_line_omits_empty_fields() {
        let out = SpiderOutput {
            input: "https://t/".into(),
            source: "body".into(),
            output_type: "url".into(),
            output: "https://t/a".into(),
            status: 200,
            ..Default::default()
        };
        let line = out.to_json_line().unwrap();
        assert!(line.contains("\"status\":200"));
        assert!(!line.contains("param"));
        assert!(!line.contains("payload"));
    }

    #[test]
    fn write_line_dedupes_and_persists() {
        let dir = std::env::temp_dir().join(format!("verkko-out-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let output = Output::per_host(dir.to_str().unwrap(), "example.com").unwrap();
        output.write_line("[url] - https://example.com/a");
        output.write_line("[url] - https://example.com/a");
        output.write_line("[url] - https://example.com/b");
        output.flush();

        let content = std::fs::read_to_string(dir.join("example_com")).unwrap();
        assert_eq!(content.lines().count(), 2);

        // Re-opening seeds the filter with existing lines.
        let reopened = Output::per_host(dir.to_str().unwrap(), "example.com").unwrap();
        reopened.write_line("[url] - https://example.com/a");
        reopened.flush();
        let content = std::fs::read_to_string(dir.join("example_com")).unwrap();
        assert_eq!(content.lines().count(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
