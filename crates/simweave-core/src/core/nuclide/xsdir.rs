use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum XsdirError {
    #[error("Failed to read nuclide index '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Nuclide index has no 'directory' section")]
    MissingDirectory,
    #[error("Malformed nuclide index entry on line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// One data table listed in the `directory` section of an xsdir file.
#[derive(Debug, Clone, PartialEq)]
pub struct XsdirEntry {
    /// Full identifier including suffix, lowercased (`26056.70c`).
    pub zaid: String,
    /// Atomic weight ratio relative to the neutron mass.
    pub awr: f64,
    /// File name of the library holding the table.
    pub library: String,
}

/// Read-only lookup of the tables available in a cross-section directory.
///
/// Built once and shared (typically behind an `Arc`) by every renderer that
/// needs natural-element expansion.
#[derive(Debug, Clone, Default)]
pub struct NuclideIndex {
    datapath: Option<PathBuf>,
    entries: HashMap<String, XsdirEntry>,
}

impl NuclideIndex {
    pub fn load(path: &Path) -> Result<Self, XsdirError> {
        let content = std::fs::read_to_string(path).map_err(|e| XsdirError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let index = Self::parse(&content)?;
        debug!(
            path = %path.display(),
            entries = index.len(),
            "Loaded nuclide index."
        );
        Ok(index)
    }

    pub fn parse(content: &str) -> Result<Self, XsdirError> {
        let mut lines = content.lines().enumerate();
        let mut datapath = None;

        loop {
            let Some((_, line)) = lines.next() else {
                return Err(XsdirError::MissingDirectory);
            };
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("directory") {
                break;
            }
            if let Some(rest) = strip_prefix_ignore_case(trimmed, "datapath") {
                let value = rest.trim_start().trim_start_matches('=').trim();
                if !value.is_empty() {
                    datapath = Some(PathBuf::from(value));
                }
            }
        }

        let mut entries = HashMap::new();
        let mut continued = false;
        for (idx, line) in lines {
            let trimmed = line.trim();
            let was_continued = continued;
            continued = trimmed.ends_with('+');
            if was_continued || trimmed.is_empty() {
                continue;
            }

            let mut tokens = trimmed.split_whitespace();
            let (Some(zaid), Some(awr)) = (tokens.next(), tokens.next()) else {
                return Err(XsdirError::Malformed {
                    line: idx + 1,
                    reason: "expected at least an identifier and an atomic weight ratio".into(),
                });
            };
            let awr = awr.parse::<f64>().map_err(|_| XsdirError::Malformed {
                line: idx + 1,
                reason: format!("invalid atomic weight ratio '{}'", awr),
            })?;
            let library = tokens
                .next()
                .filter(|t| *t != "+")
                .unwrap_or_default()
                .to_string();
            let zaid = zaid.to_ascii_lowercase();
            entries.insert(
                zaid.clone(),
                XsdirEntry {
                    zaid,
                    awr,
                    library,
                },
            );
        }

        Ok(Self { datapath, entries })
    }

    /// Whether a table for `za` (`ZZZAAA`) exists under the given suffix.
    pub fn contains(&self, za: u32, suffix: &str) -> bool {
        self.entries
            .contains_key(&format!("{}.{}", za, suffix.to_ascii_lowercase()))
    }

    pub fn get(&self, zaid: &str) -> Option<&XsdirEntry> {
        self.entries.get(&zaid.to_ascii_lowercase())
    }

    pub fn datapath(&self) -> Option<&Path> {
        self.datapath.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}
