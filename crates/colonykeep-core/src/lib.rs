//! colonykeep core - settlement bookkeeping on a fixed tick
//!
//! Tracks the units living in each settlement, derives colony-wide happiness
//! trends, and records which settlement owns or has an interest in each cell
//! of the world grid. The host world supplies cell residency and storage and
//! delivers the queued updates; everything else runs here, synchronously,
//! one tick at a time.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`broadcast`] | Updates queued for observers |
//! | [`buildings`] | Homes, workplaces, guard posts; housing ceiling |
//! | [`cell`] | Grid coordinates and box iteration |
//! | [`config`] | Numeric knobs, loaded from JSON |
//! | [`coordinator`] | Tick-gated cleanup, respawn and happiness checks |
//! | [`happiness`] | Housing / saturation / guard trends |
//! | [`persistence`] | bincode and JSON save/load |
//! | [`population`] | Unit registry with lowest-free id reuse |
//! | [`settlement`] | Per-settlement context and observer sync |
//! | [`territory`] | Cell ownership, interest and the claim backlog |
//!
//! # Example
//!
//! ```rust,no_run
//! use colonykeep_core::prelude::*;
//!
//! let mut store = MemoryCellStore::new();
//! store.load_box(CellPos::ORIGIN, 32);
//!
//! let mut coordinator = TickCoordinator::new(ColonyConfig::default(), store, 0)?;
//! let id = coordinator.found_settlement("Riverside", CellPos::ORIGIN);
//! coordinator
//!     .settlement_mut(id)
//!     .unwrap()
//!     .buildings
//!     .insert(Building::new(1, BuildingKind::Anchor, 1, CellPos::ORIGIN));
//!
//! for _ in 0..1200 {
//!     let report = coordinator.step();
//!     for envelope in coordinator.flush_updates() {
//!         // hand to the host's network layer
//!         let _ = envelope;
//!     }
//!     assert!(report.errors.is_empty());
//! }
//! # Ok::<(), ConfigError>(())
//! ```

pub mod broadcast;
pub mod buildings;
pub mod cell;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod happiness;
pub mod persistence;
pub mod population;
pub mod settlement;
pub mod territory;
pub mod unit;

/// Population unit identifier, 1-based and reused after removal.
pub type UnitId = u32;
/// Settlement identifier; 0 means "unclaimed".
pub type SettlementId = u32;
pub type BuildingId = u32;
pub type ObserverId = u32;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::broadcast::{Envelope, Outbox, Recipient, Update};
    pub use crate::buildings::{Building, BuildingKind, BuildingRegistry};
    pub use crate::cell::{cells_in_box, CellPos};
    pub use crate::config::ColonyConfig;
    pub use crate::coordinator::{TickCoordinator, TickReport};
    pub use crate::error::{ConfigError, SaveError, TickError};
    pub use crate::happiness::{HappinessTrend, Trend};
    pub use crate::population::{PopulationRegistry, UnitDependents};
    pub use crate::settlement::Settlement;
    pub use crate::territory::{CellStore, ClaimDelta, MemoryCellStore, TerritoryCell, TerritoryClaimMap};
    pub use crate::unit::PopulationUnit;
    pub use crate::{BuildingId, ObserverId, SettlementId, UnitId};
}
