//! Main attributes of `META-INF/MANIFEST.MF`.

use classcloak_utils::errors::LoadError;
use serde::{Deserialize, Serialize};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const MAIN_CLASS: &str = "Main-Class";
const MANIFEST_VERSION: &str = "Manifest-Version";

/// Ordered attributes with case-insensitive key lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: Vec<(String, String)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the main section. Per-entry sections after the first blank line are ignored.
    pub fn parse(data: &[u8]) -> Result<Self, LoadError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| LoadError::Manifest(format!("invalid UTF-8: {e}")))?;

        let mut lines: Vec<String> = Vec::new();
        for raw in text.split('\n') {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            match (line.strip_prefix(' '), lines.last_mut()) {
                (Some(cont), Some(last)) => last.push_str(cont),
                _ => lines.push(line.to_string()),
            }
        }

        let mut manifest = Self::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            manifest.set(key.trim(), value.trim_start());
        }
        Ok(manifest)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces a matching key (case-insensitive) or appends a new one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the output manifest: `Manifest-Version: 1.0` first, then every
    /// other attribute in input order.
    pub fn render(&self) -> String {
        let mut out = format!("{MANIFEST_VERSION}: 1.0\r\n");
        for (k, v) in self
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case(MANIFEST_VERSION))
        {
            out.push_str(&wrap_line(&format!("{k}: {v}")));
        }
        out.push_str("\r\n");
        out
    }
}

/// Splits a header line at 72 bytes with single-space continuations.
fn wrap_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 8);
    let mut width = 0;
    let mut limit = 72;
    for ch in line.chars() {
        if width + ch.len_utf8() > limit {
            out.push_str("\r\n ");
            width = 0;
            limit = 71;
        }
        out.push(ch);
        width += ch.len_utf8();
    }
    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_continuations_and_ignores_sections() {
        let raw = b"Manifest-Version: 1.0\r\nMain-Class: com.example.Very\r\n LongMain\r\nCreated-By: x\r\n\r\nName: a/B.class\r\nSHA: 1\r\n";
        let m = Manifest::parse(raw).unwrap();
        assert_eq!(m.get("main-class"), Some("com.example.VeryLongMain"));
        assert_eq!(m.get("Created-By"), Some("x"));
        assert_eq!(m.get("SHA"), None);
    }

    #[test]
    fn render_puts_version_first() {
        let mut m = Manifest::new();
        m.set("Main-Class", "a.B");
        m.set("Manifest-Version", "2.0");
        let text = m.render();
        assert!(text.starts_with("Manifest-Version: 1.0\r\nMain-Class: a.B\r\n"));
        assert_eq!(text.matches("Manifest-Version").count(), 1);
    }

    #[test]
    fn long_values_wrap_and_reparse() {
        let mut m = Manifest::new();
        let long = "x".repeat(150);
        m.set("Class-Path", long.clone());
        let reparsed = Manifest::parse(m.render().as_bytes()).unwrap();
        assert_eq!(reparsed.get("Class-Path"), Some(long.as_str()));
    }
}
