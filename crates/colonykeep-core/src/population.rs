//! Population registry - owns a settlement's units and hands out ids.
//!
//! Ids are small integers that get reused: a new unit always takes the lowest
//! free id starting from 1. Iteration is in ascending id order so that
//! "first match" queries are deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::unit::PopulationUnit;
use crate::UnitId;

/// Anything that holds references to units and must drop them when a unit is
/// removed.
pub trait UnitDependents {
    fn unit_removed(&mut self, unit: UnitId);
}

/// A registry with no dependents, for callers that track nothing else.
impl UnitDependents for () {
    fn unit_removed(&mut self, _unit: UnitId) {}
}

/// Rejection reasons for units that come back from persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertRejected {
    ZeroId,
    Duplicate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopulationRegistry {
    units: BTreeMap<UnitId, PopulationUnit>,
    /// Last id handed out (or highest loaded).
    top_id: UnitId,
    /// Ceiling derived from housing; the configured max may lower it further.
    stored_ceiling: u32,
    #[serde(skip)]
    dirty: bool,
}

impl PopulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh unit under the lowest free id.
    pub fn create_unit(&mut self) -> UnitId {
        let upper = self.count() as UnitId + 1;
        // There are only count() records, so one of 1..=count()+1 is free.
        let id = (1..=upper)
            .find(|id| !self.units.contains_key(id))
            .unwrap_or(upper);

        self.top_id = id;
        self.units.insert(id, PopulationUnit::new(id));
        self.dirty = true;
        id
    }

    /// Remove a unit and notify dependents before returning.
    ///
    /// Removing an absent id is a no-op and returns `None`.
    pub fn remove(
        &mut self,
        id: UnitId,
        dependents: &mut dyn UnitDependents,
    ) -> Option<PopulationUnit> {
        let unit = self.units.remove(&id)?;
        dependents.unit_removed(id);
        self.dirty = true;
        Some(unit)
    }

    pub fn get(&self, id: UnitId) -> Option<&PopulationUnit> {
        self.units.get(&id)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut PopulationUnit> {
        self.units.get_mut(&id)
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// Current number of units; may exceed `capacity`.
    pub fn count(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PopulationUnit> {
        self.units.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PopulationUnit> {
        self.units.values_mut()
    }

    pub fn ids(&self) -> Vec<UnitId> {
        self.units.keys().copied().collect()
    }

    /// First adult without a workplace.
    pub fn find_unemployed(&self) -> Option<&PopulationUnit> {
        self.units.values().find(|u| !u.is_employed() && !u.child)
    }

    pub fn top_id(&self) -> UnitId {
        self.top_id
    }

    pub fn stored_ceiling(&self) -> u32 {
        self.stored_ceiling
    }

    pub fn set_stored_ceiling(&mut self, ceiling: u32) {
        self.stored_ceiling = ceiling;
    }

    pub fn capacity(&self, configured_max: u32) -> u32 {
        self.stored_ceiling.min(configured_max)
    }

    pub fn is_full(&self, configured_max: u32) -> bool {
        self.count() as u64 >= self.capacity(configured_max) as u64
    }

    /// Put back a unit read from persistence.
    pub fn insert_loaded(&mut self, unit: PopulationUnit) -> Result<(), InsertRejected> {
        if unit.id == 0 {
            return Err(InsertRejected::ZeroId);
        }
        if self.units.contains_key(&unit.id) {
            return Err(InsertRejected::Duplicate);
        }
        self.top_id = self.top_id.max(unit.id);
        self.units.insert(unit.id, unit);
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
        for unit in self.units.values_mut() {
            unit.dirty = false;
        }
    }
}
