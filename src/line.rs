//! ProductionLine — spec §3.
//!
//! A line owns an ordered sequence of equipment codes reflecting physical
//! position (first-to-last along the line). Lines are loaded once at
//! startup (from a TOML file or built directly by a caller, e.g. the
//! `plc-simulator` binary) and handed to the Poller; there is no runtime
//! API for adding/removing lines (spec §1: schedule/line CRUD is an
//! external collaborator's concern).

use crate::ids::{EquipmentCode, LineId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LineConfigError {
    #[error("failed to read line config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse line config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionLine {
    pub id: LineId,
    pub line_code: String,
    pub name: String,
    pub equipment_codes: Vec<EquipmentCode>,
    pub target_speed: f64,
    pub enabled: bool,
}

impl ProductionLine {
    pub fn new(line_code: impl Into<String>, name: impl Into<String>, target_speed: f64) -> Self {
        Self {
            id: LineId::new(),
            line_code: line_code.into(),
            name: name.into(),
            equipment_codes: Vec::new(),
            target_speed,
            enabled: true,
        }
    }

    pub fn with_equipment(mut self, codes: impl IntoIterator<Item = EquipmentCode>) -> Self {
        self.equipment_codes = codes.into_iter().collect();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Static in-memory registry of configured lines, read by the Poller at
/// startup. Grounded on `config::get()`'s load-once-then-read posture,
/// scoped here to the line topology rather than scalar settings.
#[derive(Debug, Default)]
pub struct LineRegistry {
    lines: Vec<ProductionLine>,
}

impl LineRegistry {
    pub fn new(lines: Vec<ProductionLine>) -> Self {
        Self { lines }
    }

    pub fn enabled_lines(&self) -> impl Iterator<Item = &ProductionLine> {
        self.lines.iter().filter(|l| l.enabled)
    }

    pub fn all(&self) -> &[ProductionLine] {
        &self.lines
    }

    pub fn find(&self, line_id: LineId) -> Option<&ProductionLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn find_by_code(&self, line_code: &str) -> Option<&ProductionLine> {
        self.lines.iter().find(|l| l.line_code == line_code)
    }

    /// Loads `[[line]]` tables from a TOML file (mirrors the fault
    /// catalog's `[[fault]]` convention). Each line gets a fresh `LineId`
    /// on load; the TOML only names operator-facing identity (`line_code`,
    /// equipment codes, target speed).
    pub fn load(path: &str) -> Result<Self, LineConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| LineConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let file: LinesFile = toml::from_str(&contents)?;
        let lines = file
            .line
            .into_iter()
            .map(|entry| {
                ProductionLine::new(entry.line_code, entry.name, entry.target_speed)
                    .with_equipment(entry.equipment_codes.into_iter().map(EquipmentCode::from))
                    .enabled(entry.enabled.unwrap_or(true))
            })
            .collect();
        Ok(Self::new(lines))
    }
}

#[derive(Debug, Deserialize)]
struct LinesFile {
    #[serde(default)]
    line: Vec<LineEntry>,
}

#[derive(Debug, Deserialize)]
struct LineEntry {
    line_code: String,
    name: String,
    equipment_codes: Vec<String>,
    target_speed: f64,
    enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equipment_codes_preserve_insertion_order() {
        let line = ProductionLine::new("L1", "Packaging Line 1", 100.0)
            .with_equipment([EquipmentCode::from("E1"), EquipmentCode::from("E2")]);
        assert_eq!(line.equipment_codes, vec![EquipmentCode::from("E1"), EquipmentCode::from("E2")]);
    }

    #[test]
    fn registry_filters_disabled_lines() {
        let mut l1 = ProductionLine::new("L1", "Line 1", 1.0);
        l1.enabled = false;
        let l2 = ProductionLine::new("L2", "Line 2", 1.0);
        let l2_id = l2.id;
        let registry = LineRegistry::new(vec![l1, l2]);
        let enabled: Vec<_> = registry.enabled_lines().collect();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, l2_id);
    }

    #[test]
    fn find_by_code_locates_a_line() {
        let line = ProductionLine::new("L9", "Line 9", 1.0);
        let registry = LineRegistry::new(vec![line]);
        assert!(registry.find_by_code("L9").is_some());
        assert!(registry.find_by_code("MISSING").is_none());
    }
}
