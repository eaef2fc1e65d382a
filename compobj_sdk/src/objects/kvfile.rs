//! `KEY VALUE` line files
//!
//! The first whitespace run separates the key from its value. Lines starting
//! with `#` are comments. A key may appear on several lines; every line is one
//! value. Unmatched lines are kept verbatim on rewrite.

use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueFile {
    lines: Vec<String>,
}

fn split_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    match trimmed.find(char::is_whitespace) {
        Some(pos) => Some((&trimmed[..pos], trimmed[pos..].trim())),
        None => Some((trimmed, "")),
    }
}

impl KeyValueFile {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Read `path`; a missing file is empty
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn render(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Every value of `key`, in file order
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| split_line(line))
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .collect()
    }

    fn positions(&self, key: &str) -> Vec<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(split_line(line), Some((k, _)) if k == key))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn append(&mut self, key: &str, value: &str) {
        self.lines.push(format_line(key, value));
    }

    /// Drop every line for `key`; returns how many were dropped
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(split_line(line), Some((k, _)) if k == key));
        before - self.lines.len()
    }

    /// Rewrite the lines of `key` so they carry exactly `values`, in order
    ///
    /// The first matching lines are rewritten in place, surplus lines are
    /// dropped and missing ones appended.
    pub fn set_values(&mut self, key: &str, values: &[String]) {
        let positions = self.positions(key);
        for (pos, value) in positions.iter().zip(values) {
            self.lines[*pos] = format_line(key, value);
        }
        for pos in positions.iter().skip(values.len()).rev() {
            self.lines.remove(*pos);
        }
        for value in values.iter().skip(positions.len()) {
            self.append(key, value);
        }
    }
}

fn format_line(key: &str, value: &str) -> String {
    if value.is_empty() {
        key.to_string()
    } else {
        format!("{} {}", key, value)
    }
}
