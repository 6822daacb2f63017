//! Buildings that units live and work in.
//!
//! Buildings hold the reverse side of a unit's employment and residence
//! references, so removing a unit has to reach in here too.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cell::CellPos;
use crate::population::UnitDependents;
use crate::{BuildingId, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    /// The settlement's anchor structure; its level drives respawn speed.
    Anchor,
    Home,
    Workplace,
    GuardPost,
    Barracks,
}

impl BuildingKind {
    pub fn is_guard(&self) -> bool {
        matches!(self, BuildingKind::GuardPost)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub kind: BuildingKind,
    pub level: u32,
    pub max_inhabitants: u32,
    pub cell: CellPos,
    pub residents: BTreeSet<UnitId>,
    pub workers: BTreeSet<UnitId>,
}

impl Building {
    pub fn new(id: BuildingId, kind: BuildingKind, level: u32, cell: CellPos) -> Self {
        Self {
            id,
            kind,
            level,
            max_inhabitants: 0,
            cell,
            residents: BTreeSet::new(),
            workers: BTreeSet::new(),
        }
    }

    pub fn with_inhabitants(mut self, max_inhabitants: u32) -> Self {
        self.max_inhabitants = max_inhabitants;
        self
    }

    pub fn has_room(&self) -> bool {
        (self.residents.len() as u32) < self.max_inhabitants
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildingRegistry {
    buildings: BTreeMap<BuildingId, Building>,
}

impl BuildingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a building.
    pub fn insert(&mut self, building: Building) {
        self.buildings.insert(building.id, building);
    }

    pub fn get(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    pub fn get_mut(&mut self, id: BuildingId) -> Option<&mut Building> {
        self.buildings.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// The first anchor building, if one has been placed.
    pub fn anchor(&self) -> Option<&Building> {
        self.buildings.values().find(|b| b.kind == BuildingKind::Anchor)
    }

    /// Housing ceiling: built homes count their beds, built barracks count
    /// whoever is actually stationed there.
    pub fn max_units(&self) -> u32 {
        self.buildings
            .values()
            .filter(|b| b.level > 0)
            .map(|b| match b.kind {
                BuildingKind::Home => b.max_inhabitants,
                BuildingKind::Barracks => b.residents.len() as u32,
                _ => 0,
            })
            .sum()
    }
}

impl UnitDependents for BuildingRegistry {
    fn unit_removed(&mut self, unit: UnitId) {
        for building in self.buildings.values_mut() {
            building.residents.remove(&unit);
            building.workers.remove(&unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_units_counts_built_homes_and_barracks() {
        let mut buildings = BuildingRegistry::new();
        buildings.insert(Building::new(1, BuildingKind::Home, 1, CellPos::ORIGIN).with_inhabitants(3));
        // Unbuilt home contributes nothing.
        buildings.insert(Building::new(2, BuildingKind::Home, 0, CellPos::ORIGIN).with_inhabitants(3));
        let mut barracks = Building::new(3, BuildingKind::Barracks, 2, CellPos::ORIGIN);
        barracks.residents.insert(7);
        barracks.residents.insert(8);
        buildings.insert(barracks);
        buildings.insert(Building::new(4, BuildingKind::Workplace, 3, CellPos::ORIGIN));

        assert_eq!(buildings.max_units(), 5);
    }

    #[test]
    fn test_unit_removed_clears_every_building() {
        let mut buildings = BuildingRegistry::new();
        let mut home = Building::new(1, BuildingKind::Home, 1, CellPos::ORIGIN).with_inhabitants(2);
        home.residents.insert(4);
        let mut work = Building::new(2, BuildingKind::Workplace, 1, CellPos::ORIGIN);
        work.workers.insert(4);
        work.workers.insert(5);
        buildings.insert(home);
        buildings.insert(work);

        buildings.unit_removed(4);

        assert!(buildings.get(1).unwrap().residents.is_empty());
        assert_eq!(buildings.get(2).unwrap().workers.len(), 1);
    }

    #[test]
    fn test_anchor_lookup() {
        let mut buildings = BuildingRegistry::new();
        assert!(buildings.anchor().is_none());
        buildings.insert(Building::new(9, BuildingKind::Anchor, 2, CellPos::new(1, 1)));
        assert_eq!(buildings.anchor().map(|b| b.level), Some(2));
    }
}
