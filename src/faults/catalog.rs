//! Fault bit → {name, description, origin, severity} table.
//!
//! Loaded from a TOML file at startup (spec §6: "fault-catalog path").
//! Following the teacher's `config::get()` load-once convention, the
//! catalog itself is a plain immutable value owned by the caller (the
//! Poller holds an `Arc<FaultCatalog>`) rather than a second global — only
//! one process-wide singleton (`config::ENGINE_CONFIG`) is warranted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaultCatalogError {
    #[error("failed to read fault catalog at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fault catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("fault bit index {0} is out of range (catalog width {1})")]
    BitOutOfRange(usize, usize),
}

/// Where a fault condition originates, relative to the equipment raising it
/// (spec §2 "C2 Fault Catalog").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOrigin {
    Internal,
    Upstream,
    Downstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultDefinition {
    pub bit: usize,
    pub name: String,
    pub description: String,
    pub origin: FaultOrigin,
    pub severity: FaultSeverity,
}

/// On-disk representation: `[[fault]]` tables in a TOML file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "fault", default)]
    faults: Vec<FaultDefinition>,
}

/// The loaded, immutable fault catalog.
#[derive(Debug, Clone)]
pub struct FaultCatalog {
    by_bit: HashMap<usize, FaultDefinition>,
}

impl FaultCatalog {
    /// Load from a TOML file on disk.
    pub fn load(path: &str) -> Result<Self, FaultCatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| FaultCatalogError::Io {
            path: path.to_string(),
            source,
        })?;
        let file: CatalogFile = toml::from_str(&contents)?;
        Ok(Self::from_definitions(file.faults))
    }

    pub fn from_definitions(defs: Vec<FaultDefinition>) -> Self {
        let by_bit = defs.into_iter().map(|d| (d.bit, d)).collect();
        Self { by_bit }
    }

    /// The built-in default catalog used when no file is configured, loosely
    /// matching the bit assignments implied by spec §8 scenario S1
    /// ("fault_bits[2]=true (Motor Overload)").
    pub fn default_catalog() -> Self {
        Self::from_definitions(vec![
            FaultDefinition {
                bit: 0,
                name: "E_STOP".to_string(),
                description: "Emergency stop engaged".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::Critical,
            },
            FaultDefinition {
                bit: 1,
                name: "BEARING_FAILURE".to_string(),
                description: "Bearing over-temperature / vibration".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::Critical,
            },
            FaultDefinition {
                bit: 2,
                name: "MOTOR_FAILURE".to_string(),
                description: "Motor overload".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::High,
            },
            FaultDefinition {
                bit: 3,
                name: "BELT_FAILURE".to_string(),
                description: "Belt slip or breakage".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::High,
            },
            FaultDefinition {
                bit: 4,
                name: "GEAR_FAILURE".to_string(),
                description: "Gearbox fault".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::High,
            },
            FaultDefinition {
                bit: 5,
                name: "SENSOR_FAULT".to_string(),
                description: "Sensor reading out of range or disconnected".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::Medium,
            },
            FaultDefinition {
                bit: 6,
                name: "PLC_FAULT".to_string(),
                description: "PLC internal fault".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::High,
            },
            FaultDefinition {
                bit: 7,
                name: "POWER_FAULT".to_string(),
                description: "Power supply fault".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::Critical,
            },
            FaultDefinition {
                bit: 8,
                name: "WIRING_FAULT".to_string(),
                description: "Wiring / I-O fault".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::Medium,
            },
            FaultDefinition {
                bit: 9,
                name: "QUALITY_REJECT".to_string(),
                description: "Inline quality gate rejected part".to_string(),
                origin: FaultOrigin::Internal,
                severity: FaultSeverity::Medium,
            },
            FaultDefinition {
                bit: 10,
                name: "UPSTREAM_STARVED".to_string(),
                description: "Upstream equipment not supplying material".to_string(),
                origin: FaultOrigin::Upstream,
                severity: FaultSeverity::Low,
            },
            FaultDefinition {
                bit: 11,
                name: "DOWNSTREAM_BLOCKED".to_string(),
                description: "Downstream equipment blocked / backed up".to_string(),
                origin: FaultOrigin::Downstream,
                severity: FaultSeverity::Low,
            },
        ])
    }

    pub fn lookup(&self, bit: usize) -> Option<&FaultDefinition> {
        self.by_bit.get(&bit)
    }

    /// All active bits in `bits` (up to `width`) resolved to their
    /// definitions, in ascending bit order, skipping unknown bits.
    pub fn active_faults(&self, bits: &FixedBitVec) -> Vec<&FaultDefinition> {
        let mut out: Vec<&FaultDefinition> = bits
            .set_bits()
            .filter_map(|b| self.by_bit.get(&b))
            .collect();
        out.sort_by_key(|d| d.bit);
        out
    }

    pub fn len(&self) -> usize {
        self.by_bit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_bit.is_empty()
    }
}

/// A fixed-width bit vector read from a PLC snapshot (spec §3
/// `fault_bits: bit-vector of fixed length F`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedBitVec {
    bits: Vec<bool>,
}

impl FixedBitVec {
    pub fn zeroed(width: usize) -> Self {
        Self {
            bits: vec![false; width],
        }
    }

    pub fn from_set_bits(width: usize, set: &[usize]) -> Self {
        let mut v = Self::zeroed(width);
        for &b in set {
            v.set(b, true);
        }
        v
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn get(&self, bit: usize) -> bool {
        self.bits.get(bit).copied().unwrap_or(false)
    }

    pub fn set(&mut self, bit: usize, value: bool) {
        if bit >= self.bits.len() {
            self.bits.resize(bit + 1, false);
        }
        self.bits[bit] = value;
    }

    pub fn any_set(&self) -> bool {
        self.bits.iter().any(|&b| b)
    }

    pub fn set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| if b { Some(i) } else { None })
    }

    /// Bitwise union, widening to the larger of the two vectors (spec §4.3
    /// "merges ... union of fault bits").
    pub fn union(&self, other: &FixedBitVec) -> FixedBitVec {
        let width = self.width().max(other.width());
        let mut out = FixedBitVec::zeroed(width);
        for b in self.set_bits().chain(other.set_bits()) {
            out.set(b, true);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_resolves_motor_overload() {
        let catalog = FaultCatalog::default_catalog();
        let def = catalog.lookup(2).unwrap();
        assert_eq!(def.name, "MOTOR_FAILURE");
        assert_eq!(def.severity, FaultSeverity::Critical);
        assert_eq!(def.origin, FaultOrigin::Internal);
    }

    #[test]
    fn active_faults_sorted_by_bit() {
        let catalog = FaultCatalog::default_catalog();
        let bits = FixedBitVec::from_set_bits(64, &[5, 2, 0]);
        let active = catalog.active_faults(&bits);
        assert_eq!(active.iter().map(|d| d.bit).collect::<Vec<_>>(), vec![0, 2, 5]);
    }

    #[test]
    fn union_merges_and_widens() {
        let a = FixedBitVec::from_set_bits(4, &[1]);
        let b = FixedBitVec::from_set_bits(8, &[1, 6]);
        let merged = a.union(&b);
        assert_eq!(merged.width(), 8);
        assert!(merged.get(1));
        assert!(merged.get(6));
        assert!(!merged.get(2));
    }

    #[test]
    fn unknown_bit_lookup_is_none() {
        let catalog = FaultCatalog::default_catalog();
        assert!(catalog.lookup(999).is_none());
    }
}
