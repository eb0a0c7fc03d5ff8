use anyhow::{Result, anyhow};
use log::warn;
use std::{cell::RefCell, collections::HashSet, fs, path::Path};

use crate::voter::ClassId;

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Human-readable class names, indexed by class id.
#[derive(Debug, Clone, Default)]
pub struct LabelCatalog {
    labels: Vec<String>,
    // ids already reported as missing
    warned: RefCell<HashSet<ClassId>>,
}

impl LabelCatalog {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            warned: RefCell::default(),
        }
    }

    /// One label per line; a UTF-8 BOM, surrounding whitespace and blank lines are dropped.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read labels {}: {e}", path.display()))?;
        let catalog = Self::parse(&txt);
        if catalog.is_empty() {
            return Err(anyhow!("label file {} is empty", path.display()));
        }
        Ok(catalog)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, id: ClassId) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Label for `id`, or [`UNKNOWN_LABEL`] when the catalog is too short.
    pub fn label(&self, id: ClassId) -> &str {
        match self.get(id) {
            Some(l) => l,
            None => {
                if self.warned.borrow_mut().insert(id) {
                    warn!(
                        "class id {id} has no label (catalog has {} entries)",
                        self.labels.len()
                    );
                }
                UNKNOWN_LABEL
            }
        }
    }

    pub fn position(&self, label: &str) -> Option<ClassId> {
        self.labels.iter().position(|l| l == label)
    }
}

#[cfg(test)]
impl LabelCatalog {
    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_bom_and_blank_lines() {
        let c = LabelCatalog::parse("\u{feff}Open\n\n  Close \nPointer\n");
        assert_eq!(c.len(), 3);
        assert_eq!(c.label(0), "Open");
        assert_eq!(c.label(1), "Close");
        assert_eq!(c.position("Pointer"), Some(2));
    }

    #[test]
    fn missing_ids_resolve_to_unknown() {
        let c = LabelCatalog::new(vec!["Stop".into()]);
        assert_eq!(c.label(0), "Stop");
        assert_eq!(c.label(5), UNKNOWN_LABEL);
        assert_eq!(c.label(5), UNKNOWN_LABEL);
        assert_eq!(c.get(5), None);
    }

    #[test]
    fn load_rejects_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("labels.csv");
        fs::write(&p, "\n\n").unwrap();
        assert!(LabelCatalog::load(&p).is_err());
        fs::write(&p, "Stop\nClockwise\n").unwrap();
        assert_eq!(LabelCatalog::load(&p).unwrap().label(1), "Clockwise");
    }
}
