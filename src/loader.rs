//! Label collection loader.
//!
//! Reads the labeling stage's output: JSON Lines, a JSON array of objects, or a
//! stream of concatenated objects, optionally with `//` comment lines (JSONC).
//! Invalid records are dropped and counted; duplicate conversation ids keep the
//! last record seen.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{RecordError, TaxonomyError, TaxonomyResult};
use crate::models::Label;

/// Counters reported in the taxonomy metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Records read, valid or not
    pub total_records: usize,
    /// Records rejected by validation
    pub dropped: usize,
    /// Valid records replaced by a later record with the same conversation id
    pub duplicates: usize,
}

/// Validated, deduplicated labels ready for clustering
#[derive(Debug, Clone)]
pub struct LabelSet {
    pub labels: Vec<Label>,
    pub stats: LoadStats,
    /// SHA-256 of the raw input bytes, in load order
    pub input_digest: String,
    pub sources: Vec<PathBuf>,
}

impl LabelSet {
    pub fn valid(&self) -> usize {
        self.labels.len()
    }
}

/// Accumulates records from one or more sources.
///
/// Dedup keeps the position of the first occurrence and the content of the last.
pub struct LabelCollector {
    labels: Vec<Label>,
    by_id: HashMap<String, usize>,
    stats: LoadStats,
    hasher: Sha256,
    sources: Vec<PathBuf>,
}

impl Default for LabelCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelCollector {
    pub fn new() -> Self {
        Self {
            labels: Vec::new(),
            by_id: HashMap::new(),
            stats: LoadStats::default(),
            hasher: Sha256::new(),
            sources: Vec::new(),
        }
    }

    /// Parse one source's content and fold its records into the collection.
    pub fn ingest_str(&mut self, source: &Path, content: &str) -> TaxonomyResult<()> {
        self.hasher.update(content.as_bytes());
        self.sources.push(source.to_path_buf());

        let records = split_records(content).map_err(|reason| TaxonomyError::InvalidInput {
            path: source.to_path_buf(),
            reason,
        })?;

        for (idx, record) in records.into_iter().enumerate() {
            self.stats.total_records += 1;
            match record.and_then(|value| parse_record(&value)) {
                Ok(label) => self.insert(label),
                Err(reason) => {
                    self.stats.dropped += 1;
                    debug!(source = %source.display(), record = idx, %reason, "dropped label record");
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, label: Label) {
        match self.by_id.get(&label.conversation_id) {
            Some(&pos) => {
                self.stats.duplicates += 1;
                debug!(conversation_id = %label.conversation_id, "replacing earlier label");
                self.labels[pos] = label;
            }
            None => {
                self.by_id.insert(label.conversation_id.clone(), self.labels.len());
                self.labels.push(label);
            }
        }
    }

    pub fn finish(self) -> LabelSet {
        LabelSet {
            labels: self.labels,
            stats: self.stats,
            input_digest: hex::encode(self.hasher.finalize()),
            sources: self.sources,
        }
    }
}

/// Load a label file, or every matching file of a directory in path order.
pub fn load_labels(path: &Path, patterns: &[&str]) -> TaxonomyResult<LabelSet> {
    let files = if path.is_dir() {
        collect_input_files(path, patterns)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut collector = LabelCollector::new();
    for file in &files {
        let content = fs::read_to_string(file).map_err(|e| TaxonomyError::io(file, e))?;
        collector.ingest_str(file, &content)?;
    }

    let set = collector.finish();
    info!(
        files = files.len(),
        records = set.stats.total_records,
        valid = set.valid(),
        dropped = set.stats.dropped,
        duplicates = set.stats.duplicates,
        "loaded labels"
    );
    if set.stats.dropped > 0 {
        warn!("{} malformed label records dropped", set.stats.dropped);
    }
    Ok(set)
}

/// Regular files in `dir` whose name matches any of `patterns`, sorted by path.
pub fn collect_input_files(dir: &Path, patterns: &[&str]) -> TaxonomyResult<Vec<PathBuf>> {
    let globs = patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| TaxonomyError::InvalidConfig(format!("bad file pattern '{}': {}", p, e)))
        })
        .collect::<TaxonomyResult<Vec<_>>>()?;

    let entries = fs::read_dir(dir).map_err(|e| TaxonomyError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TaxonomyError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if globs.iter().any(|g| g.matches(name)) {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(TaxonomyError::NoInputFiles {
            dir: dir.to_path_buf(),
            pattern: patterns.join(","),
        });
    }
    files.sort();
    Ok(files)
}

/// Split raw content into JSON values, one per record.
///
/// Returns Err only when the whole source is unusable: a single-line top-level
/// array that does not parse.
fn split_records(content: &str) -> Result<Vec<Result<Value, RecordError>>, String> {
    let cleaned = strip_comment_lines(content);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(items) => return Ok(items.into_iter().map(Ok).collect()),
            Err(e) if !trimmed.contains('\n') => {
                return Err(format!("failed to parse label array: {}", e));
            }
            // A JSON Lines file whose first record happens to open with '['
            Err(e) => debug!(error = %e, "not a label array, reading records one by one"),
        }
    }

    Ok(split_stream(trimmed))
}

/// Concatenated or line-delimited objects. A syntax error costs one record:
/// parsing resumes at the next line that opens an object, after the line where
/// the bad value began.
fn split_stream(content: &str) -> Vec<Result<Value, RecordError>> {
    let mut records = Vec::new();
    let mut rest = content;
    loop {
        let resume = {
            let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
            loop {
                let value_start = stream.byte_offset();
                match stream.next() {
                    None => break None,
                    Some(Ok(value)) => records.push(Ok(value)),
                    Some(Err(e)) => {
                        records.push(Err(RecordError::InvalidJson(e.to_string())));
                        break next_record_start(rest, value_start);
                    }
                }
            }
        };
        match resume {
            Some(offset) => rest = &rest[offset..],
            None => return records,
        }
    }
}

/// Byte offset of the first line after the one holding the value that begins at
/// or after `from` whose first non-blank character is `{`.
fn next_record_start(content: &str, from: usize) -> Option<usize> {
    let tail = &content[from..];
    let bad_value = from + (tail.len() - tail.trim_start().len());
    let mut offset = bad_value + content[bad_value..].find('\n')? + 1;
    for line in content[offset..].split_inclusive('\n') {
        if line.trim_start().starts_with('{') {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn strip_comment_lines(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Validate one record and build its Label.
pub fn parse_record(value: &Value) -> Result<Label, RecordError> {
    let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

    let conversation_id = match obj.get("conversation_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(RecordError::MissingField("conversation_id")),
    };

    let theme = obj
        .get("theme")
        .and_then(Value::as_str)
        .ok_or(RecordError::MissingField("theme"))?;

    let category = obj
        .get("category")
        .or_else(|| obj.get("categorie"))
        .and_then(Value::as_str)
        .ok_or(RecordError::MissingField("category"))?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or(RecordError::MissingField("confidence"))?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(RecordError::ConfidenceOutOfRange(confidence));
    }

    let use_cases = match obj.get("use_cases") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(use_case_text).collect(),
        Some(_) => return Err(RecordError::MissingField("use_cases")),
    };

    Ok(Label::new(conversation_id, theme, category, confidence, use_cases))
}

/// A use case is either a plain string or an object carrying a `besoin` (need).
fn use_case_text(item: &Value) -> Option<String> {
    let text = match item {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("besoin").and_then(Value::as_str)?,
        _ => return None,
    };
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
