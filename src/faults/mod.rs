//! Fault Catalog (C2)
//!
//! Static mapping from a fault-bit index to its name, origin and severity,
//! loaded once at startup and immutable thereafter (spec §4.1, §9 "the
//! fault catalog is immutable after load").

mod catalog;

pub use catalog::{FaultCatalog, FaultCatalogError, FaultDefinition, FaultOrigin, FaultSeverity, FixedBitVec};
