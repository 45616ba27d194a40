//! Line-preserving reader and writer for `[Section]` / `Key=Value` files.
//!
//! Desktop entries and systemd units share this shape. Only entries whose
//! value was changed are re-rendered; every other line, including comments,
//! blank lines and lines that are not understood, is written back exactly
//! as it was read.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: String,
    value: String,
    /// Original text, possibly spanning continuation lines. Cleared when the
    /// value changes.
    raw: Option<String>,
}

impl Entry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value != self.value {
            self.value = value;
            self.raw = None;
        }
    }

    pub fn is_modified(&self) -> bool {
        self.raw.is_none()
    }

    fn render(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => format!("{}={}", self.key, self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Raw(String),
    Section { name: String, raw: String },
    Entry(Entry),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryFile {
    lines: Vec<Line>,
    trailing_newline: bool,
}

fn section_name(trimmed: &str) -> Option<&str> {
    trimmed.strip_prefix('[')?.strip_suffix(']')
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';')
}

impl EntryFile {
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut physical = text.lines();

        while let Some(line) = physical.next() {
            let trimmed = line.trim();
            if is_comment(trimmed) {
                lines.push(Line::Raw(line.to_owned()));
                continue;
            }
            if let Some(name) = section_name(trimmed) {
                lines.push(Line::Section {
                    name: name.to_owned(),
                    raw: line.to_owned(),
                });
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                lines.push(Line::Raw(line.to_owned()));
                continue;
            };

            let mut raw = line.to_owned();
            let mut value = value.trim_start().to_owned();
            // A trailing backslash continues the value on the next line.
            while value.ends_with('\\') {
                let Some(next) = physical.next() else { break };
                value.pop();
                value.push(' ');
                value.push_str(next.trim_start());
                raw.push('\n');
                raw.push_str(next);
            }
            lines.push(Line::Entry(Entry {
                key: key.trim().to_owned(),
                value,
                raw: Some(raw),
            }));
        }

        Self {
            lines,
            trailing_newline: text.ends_with('\n'),
        }
    }

    pub fn sections(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Section { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every `(section, entry)` pair in file order. Entries before the
    /// first section header belong to the empty section.
    pub fn entries(&self) -> Vec<(&str, &Entry)> {
        let mut section = "";
        let mut out = Vec::new();
        for line in &self.lines {
            match line {
                Line::Section { name, .. } => section = name.as_str(),
                Line::Entry(entry) => out.push((section, entry)),
                Line::Raw(_) => {}
            }
        }
        out
    }

    /// First value of `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.entries()
            .into_iter()
            .find(|(s, e)| *s == section && e.key == key)
            .map(|(_, e)| e.value.as_str())
    }

    /// Visit every entry mutably, with the name of its section.
    pub fn for_each_entry_mut(&mut self, mut f: impl FnMut(&str, &mut Entry)) {
        let mut section = String::new();
        for line in &mut self.lines {
            match line {
                Line::Section { name, .. } => section.clone_from(name),
                Line::Entry(entry) => f(section.as_str(), entry),
                Line::Raw(_) => {}
            }
        }
    }

    /// Set `key` in `section`. A missing key is added after the last entry
    /// of the section, a missing section at the end of the file.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let mut current = "";
        let mut existing = None;
        let mut insert_at = None;
        for (i, line) in self.lines.iter().enumerate() {
            match line {
                Line::Section { name, .. } => {
                    current = name.as_str();
                    if current == section && insert_at.is_none() {
                        insert_at = Some(i + 1);
                    }
                }
                Line::Entry(entry) if current == section => {
                    if entry.key == key && existing.is_none() {
                        existing = Some(i);
                    }
                    insert_at = Some(i + 1);
                }
                _ => {}
            }
        }
        if let Some(Line::Entry(entry)) = existing.and_then(|i| self.lines.get_mut(i)) {
            entry.set_value(value);
            return;
        }
        let entry = Line::Entry(Entry {
            key: key.to_owned(),
            value,
            raw: None,
        });
        match insert_at {
            Some(i) => self.lines.insert(i, entry),
            None => {
                self.lines.push(Line::Section {
                    name: section.to_owned(),
                    raw: format!("[{section}]"),
                });
                self.lines.push(entry);
            }
        }
    }

    pub fn is_modified(&self) -> bool {
        self.lines
            .iter()
            .any(|line| matches!(line, Line::Entry(e) if e.is_modified()))
    }
}

impl fmt::Display for EntryFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            match line {
                Line::Raw(raw) | Line::Section { raw, .. } => f.write_str(raw)?,
                Line::Entry(entry) => f.write_str(&entry.render())?,
            }
        }
        if self.trailing_newline {
            f.write_str("\n")?;
        }
        Ok(())
    }
}
