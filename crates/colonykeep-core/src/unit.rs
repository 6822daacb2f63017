//! Population unit record.

use serde::{Deserialize, Serialize};

use crate::{BuildingId, UnitId};

/// Saturation a freshly created unit starts with.
pub const INITIAL_SATURATION: f64 = 10.0;

/// A single population member, owned by its settlement's registry.
///
/// Buildings are referenced by id, never owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationUnit {
    pub id: UnitId,
    pub employment: Option<BuildingId>,
    pub residence: Option<BuildingId>,
    /// Backing presence confirmed by the host. Cleared by `report_lost`.
    pub alive: bool,
    pub child: bool,
    pub female: bool,
    pub saturation: f64,
    pub mourning: bool,
    /// Changed since observers last received a view.
    #[serde(skip)]
    pub dirty: bool,
}

impl PopulationUnit {
    pub fn new(id: UnitId) -> Self {
        Self {
            id,
            employment: None,
            residence: None,
            alive: false,
            child: false,
            female: false,
            saturation: INITIAL_SATURATION,
            mourning: false,
            dirty: true,
        }
    }

    pub fn is_employed(&self) -> bool {
        self.employment.is_some()
    }
}
