//! Territory claims - which settlement owns or is interested in each cell.
//!
//! A claim covers a square box around the settlement centre. The inner box of
//! `radius` cells becomes owned; the ring out to `radius * 2 + buffer` only
//! registers interest. Cells close to the centre are written straight away
//! when resident. Everything else goes into a backlog of [`ClaimDelta`]s that
//! is applied once the cell is resident.
//!
//! Deltas are set operations, so applying one twice leaves the cell as
//! applying it once did.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::broadcast::{Outbox, Update};
use crate::cell::{cells_in_box, CellPos};
use crate::config::ColonyConfig;
use crate::SettlementId;

/// Claim data stored on one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryCell {
    /// Owning settlement, 0 when unclaimed.
    pub owner: SettlementId,
    /// Settlements close enough to care about this cell.
    pub interested: BTreeSet<SettlementId>,
    /// Building-level claims, keyed by settlement, holding the claiming
    /// building's cell.
    pub building_claims: BTreeMap<SettlementId, BTreeSet<CellPos>>,
}

impl TerritoryCell {
    pub fn is_claimed(&self) -> bool {
        self.effective_owner() != 0
    }

    /// The owner, or failing that the lowest settlement with a building claim.
    pub fn effective_owner(&self) -> SettlementId {
        if self.owner != 0 {
            return self.owner;
        }
        self.building_claims
            .iter()
            .find(|(_, buildings)| !buildings.is_empty())
            .map(|(id, _)| *id)
            .unwrap_or(0)
    }

    /// Drop every trace of a settlement. Returns true if anything changed.
    pub fn release(&mut self, settlement: SettlementId) -> bool {
        let mut changed = self.interested.remove(&settlement);
        if self.owner == settlement {
            self.owner = 0;
            changed = true;
        }
        changed |= self.building_claims.remove(&settlement).is_some();
        changed
    }

    /// Every settlement mentioned on this cell.
    fn mentioned(&self) -> BTreeSet<SettlementId> {
        let mut ids: BTreeSet<SettlementId> = self.interested.clone();
        if self.owner != 0 {
            ids.insert(self.owner);
        }
        ids.extend(self.building_claims.keys().copied());
        ids
    }
}

/// One pending change to one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDelta {
    pub settlement: SettlementId,
    pub add: bool,
    pub dimension: i32,
    /// Inner-box cell: an add makes the settlement the owner.
    pub owning: bool,
    /// Set for building-level claims; holds the claiming building's cell.
    pub building: Option<CellPos>,
}

impl ClaimDelta {
    pub fn settlement(settlement: SettlementId, add: bool, dimension: i32, owning: bool) -> Self {
        Self {
            settlement,
            add,
            dimension,
            owning,
            building: None,
        }
    }

    pub fn building(settlement: SettlementId, add: bool, dimension: i32, building: CellPos) -> Self {
        Self {
            settlement,
            add,
            dimension,
            owning: false,
            building: Some(building),
        }
    }

    /// A later delta with the same key replaces an earlier one in the backlog.
    fn key(&self) -> (SettlementId, Option<CellPos>) {
        (self.settlement, self.building)
    }

    /// Apply to a cell. Returns true if the cell changed.
    pub fn apply(&self, cell: &mut TerritoryCell) -> bool {
        match (self.building, self.add) {
            (Some(building), true) => cell
                .building_claims
                .entry(self.settlement)
                .or_default()
                .insert(building),
            (Some(building), false) => {
                let Some(claims) = cell.building_claims.get_mut(&self.settlement) else {
                    return false;
                };
                let changed = claims.remove(&building);
                if claims.is_empty() {
                    cell.building_claims.remove(&self.settlement);
                }
                changed
            }
            (None, true) => {
                let mut changed = cell.interested.insert(self.settlement);
                if self.owning && cell.owner != self.settlement {
                    cell.owner = self.settlement;
                    changed = true;
                }
                changed
            }
            (None, false) => {
                let mut changed = cell.interested.remove(&self.settlement);
                if cell.owner == self.settlement {
                    cell.owner = 0;
                    changed = true;
                }
                changed
            }
        }
    }
}

/// Backlog for one cell, in arrival order with one delta per key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingClaims {
    pub deltas: Vec<ClaimDelta>,
}

impl PendingClaims {
    pub fn push(&mut self, delta: ClaimDelta) {
        self.deltas.retain(|d| d.key() != delta.key());
        self.deltas.push(delta);
    }
}

/// Residency and per-cell storage supplied by the host world.
pub trait CellStore {
    fn is_resident(&self, pos: CellPos) -> bool;
    /// Stored data for a cell, resident or not.
    fn cell(&self, pos: CellPos) -> Option<&TerritoryCell>;
    /// Writable cell data; `None` unless resident. Creates the cell on first use.
    fn cell_mut(&mut self, pos: CellPos) -> Option<&mut TerritoryCell>;
    fn mark_dirty(&mut self, pos: CellPos);
    fn resident_cells(&self) -> Vec<CellPos>;
}

/// In-process cell store with explicit load/unload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCellStore {
    resident: BTreeSet<CellPos>,
    cells: BTreeMap<CellPos, TerritoryCell>,
    #[serde(skip)]
    dirty: BTreeSet<CellPos>,
}

impl MemoryCellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, pos: CellPos) {
        self.resident.insert(pos);
    }

    pub fn load_box(&mut self, center: CellPos, radius: i32) {
        self.resident.extend(cells_in_box(center, radius));
    }

    pub fn unload(&mut self, pos: CellPos) {
        self.resident.remove(&pos);
    }

    /// Cells written since the last call.
    pub fn take_dirty(&mut self) -> BTreeSet<CellPos> {
        std::mem::take(&mut self.dirty)
    }
}

impl CellStore for MemoryCellStore {
    fn is_resident(&self, pos: CellPos) -> bool {
        self.resident.contains(&pos)
    }

    fn cell(&self, pos: CellPos) -> Option<&TerritoryCell> {
        self.cells.get(&pos)
    }

    fn cell_mut(&mut self, pos: CellPos) -> Option<&mut TerritoryCell> {
        if !self.resident.contains(&pos) {
            return None;
        }
        Some(self.cells.entry(pos).or_default())
    }

    fn mark_dirty(&mut self, pos: CellPos) {
        self.dirty.insert(pos);
    }

    fn resident_cells(&self) -> Vec<CellPos> {
        self.resident.iter().copied().collect()
    }
}

/// Where settlements are, for orphan detection.
pub trait SettlementCenters {
    fn center_of(&self, settlement: SettlementId) -> Option<CellPos>;
}

impl SettlementCenters for BTreeMap<SettlementId, CellPos> {
    fn center_of(&self, settlement: SettlementId) -> Option<CellPos> {
        self.get(&settlement).copied()
    }
}

/// Claim geometry taken from [`ColonyConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaimSettings {
    pub load_immediately_distance: i32,
    pub dynamic_working_range: i32,
    pub orphan_distance: f64,
    pub fix_orphaned_cells: bool,
}

impl From<&ColonyConfig> for ClaimSettings {
    fn from(config: &ColonyConfig) -> Self {
        Self {
            load_immediately_distance: config.load_immediately_distance,
            dynamic_working_range: config.dynamic_working_range,
            orphan_distance: config.orphan_distance(),
            fix_orphaned_cells: config.fix_orphaned_cells,
        }
    }
}

/// What a claim call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimSummary {
    /// Cells written immediately.
    pub written: u32,
    /// Deltas put in the backlog.
    pub queued: u32,
    /// Cells that got their first backlog entry.
    pub newly_pending: u32,
}

/// Backlog as stored by persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimBacklog {
    pub dimension: i32,
    pub pending: Vec<(CellPos, PendingClaims)>,
    pub missing_cells: u32,
}

pub struct TerritoryClaimMap<S: CellStore> {
    store: S,
    pending: BTreeMap<CellPos, PendingClaims>,
    /// Cells with backlog entries waiting to become resident.
    missing_cells: u32,
    settings: ClaimSettings,
    dimension: i32,
}

impl<S: CellStore> TerritoryClaimMap<S> {
    pub fn new(store: S, settings: ClaimSettings, dimension: i32) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
            missing_cells: 0,
            settings,
            dimension,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn dimension(&self) -> i32 {
        self.dimension
    }

    pub fn missing_cells(&self) -> u32 {
        self.missing_cells
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_at(&self, pos: CellPos) -> Option<&PendingClaims> {
        self.pending.get(&pos)
    }

    pub fn cell(&self, pos: CellPos) -> Option<&TerritoryCell> {
        self.store.cell(pos)
    }

    /// Owning settlement of a cell, 0 if unclaimed or never touched.
    pub fn owner_of(&self, pos: CellPos) -> SettlementId {
        self.store.cell(pos).map(|c| c.effective_owner()).unwrap_or(0)
    }

    pub fn is_interested(&self, pos: CellPos, settlement: SettlementId) -> bool {
        self.store
            .cell(pos)
            .map(|c| c.interested.contains(&settlement))
            .unwrap_or(false)
    }

    /// Claim (or release) the box around a settlement centre.
    pub fn claim(
        &mut self,
        settlement: SettlementId,
        center: CellPos,
        radius: i32,
        buffer: i32,
        add: bool,
        outbox: &mut Outbox,
    ) -> ClaimSummary {
        let mut summary = ClaimSummary::default();

        let center_delta = ClaimDelta::settlement(settlement, add, self.dimension, true);
        if self.write_direct(center, &center_delta, outbox) {
            summary.written += 1;
        } else {
            self.enqueue(center, center_delta, &mut summary);
        }

        let max_range = radius * 2 + buffer;
        for pos in cells_in_box(center, max_range) {
            if pos == center {
                continue;
            }

            let owning = pos.within_box(&center, radius);
            let delta = ClaimDelta::settlement(settlement, add, self.dimension, owning);

            if pos.within_box(&center, self.settings.load_immediately_distance)
                && self.write_direct(pos, &delta, outbox)
            {
                summary.written += 1;
                continue;
            }

            self.enqueue(pos, delta, &mut summary);
        }

        self.missing_cells += summary.newly_pending;
        log::debug!(
            "Settlement {} {} around {}: {} written, {} queued",
            settlement,
            if add { "claimed" } else { "released" },
            center,
            summary.written,
            summary.queued
        );
        summary
    }

    /// Building-level claim of a box around one building.
    ///
    /// Cells too far from the settlement centre are skipped unless the
    /// dynamic working range is 0.
    pub fn claim_building_range(
        &mut self,
        settlement: SettlementId,
        settlement_center: CellPos,
        building_cell: CellPos,
        range: i32,
        add: bool,
        outbox: &mut Outbox,
    ) -> ClaimSummary {
        let mut summary = ClaimSummary::default();
        let working_range = self.settings.dynamic_working_range;

        for pos in cells_in_box(building_cell, range) {
            if pos != building_cell
                && working_range != 0
                && pos.distance(&settlement_center) > working_range as f64
            {
                continue;
            }

            let delta = ClaimDelta::building(settlement, add, self.dimension, building_cell);
            if self.write_direct(pos, &delta, outbox) {
                summary.written += 1;
                continue;
            }
            self.enqueue(pos, delta, &mut summary);
        }

        self.missing_cells += summary.newly_pending;
        summary
    }

    /// True if nobody owns (or is about to own) any cell in the box.
    pub fn can_claim_in_range(&self, center: CellPos, range: i32) -> bool {
        cells_in_box(center, range).all(|pos| {
            let mut cell = self.store.cell(pos).cloned().unwrap_or_default();
            if let Some(pending) = self.pending.get(&pos) {
                for delta in pending.deltas.iter().filter(|d| d.dimension == self.dimension) {
                    delta.apply(&mut cell);
                }
            }
            !cell.is_claimed()
        })
    }

    /// Cell became resident: apply its backlog, or clean up orphaned interest.
    ///
    /// Returns true if backlog was applied.
    pub fn on_cell_loaded(
        &mut self,
        pos: CellPos,
        settlements: &dyn SettlementCenters,
        outbox: &mut Outbox,
    ) -> bool {
        if !self.store.is_resident(pos) {
            log::debug!("Cell {} reported loaded but is not resident", pos);
            return false;
        }

        if self.missing_cells > 0 && self.pending.contains_key(&pos) {
            return self.apply_pending(pos, outbox);
        }

        if self.settings.fix_orphaned_cells {
            self.evict_orphans(pos, settlements, outbox);
        }
        false
    }

    /// Apply the backlog of every pending cell that is resident now.
    pub fn drain_resident(&mut self, outbox: &mut Outbox) -> usize {
        let ready: Vec<CellPos> = self
            .pending
            .keys()
            .copied()
            .filter(|pos| self.store.is_resident(*pos))
            .collect();

        ready
            .into_iter()
            .filter(|pos| self.apply_pending(*pos, outbox))
            .count()
    }

    /// Remove claims of settlements that are gone or too far away.
    /// Returns the number of settlements dropped from the cell.
    pub fn evict_orphans(
        &mut self,
        pos: CellPos,
        settlements: &dyn SettlementCenters,
        outbox: &mut Outbox,
    ) -> usize {
        let orphan_distance = self.settings.orphan_distance;
        let Some(cell) = self.store.cell(pos) else {
            return 0;
        };

        let stale: Vec<SettlementId> = cell
            .mentioned()
            .into_iter()
            .filter(|&id| match settlements.center_of(id) {
                None => true,
                Some(center) => center.distance(&pos) > orphan_distance,
            })
            .collect();

        if stale.is_empty() {
            return 0;
        }
        let Some(cell) = self.store.cell_mut(pos) else {
            return 0;
        };

        for id in &stale {
            log::warn!("Removing orphaned claim of settlement {} at {}", id, pos);
            cell.release(*id);
        }
        let snapshot = cell.clone();
        self.store.mark_dirty(pos);
        outbox.broadcast(Update::CellChanged { pos, cell: snapshot });
        stale.len()
    }

    /// Orphan eviction over every resident cell.
    pub fn sweep_orphans(&mut self, settlements: &dyn SettlementCenters, outbox: &mut Outbox) -> usize {
        self.store
            .resident_cells()
            .into_iter()
            .map(|pos| self.evict_orphans(pos, settlements, outbox))
            .sum()
    }

    /// Owned cells in a claim's outer box, logged for debugging.
    pub fn owned_cells_in_range(
        &self,
        center: CellPos,
        radius: i32,
        buffer: i32,
    ) -> Vec<(CellPos, SettlementId)> {
        cells_in_box(center, radius * 2 + buffer)
            .filter_map(|pos| {
                let owner = self.owner_of(pos);
                (owner != 0).then_some((pos, owner))
            })
            .inspect(|(pos, owner)| log::warn!("Has owner {}: {}", owner, pos))
            .collect()
    }

    pub fn backlog(&self) -> ClaimBacklog {
        ClaimBacklog {
            dimension: self.dimension,
            pending: self
                .pending
                .iter()
                .map(|(pos, claims)| (*pos, claims.clone()))
                .collect(),
            missing_cells: self.missing_cells,
        }
    }

    pub fn restore_backlog(&mut self, backlog: ClaimBacklog) {
        if backlog.dimension != self.dimension {
            log::warn!(
                "Restoring claim backlog saved for dimension {} into dimension {}",
                backlog.dimension,
                self.dimension
            );
        }
        self.pending = backlog.pending.into_iter().collect();
        self.missing_cells = backlog.missing_cells;
    }

    /// Write one delta to a resident cell. False if the cell is not resident.
    ///
    /// Older backlog entries for the cell are applied first so they cannot
    /// land on top of this write later.
    fn write_direct(&mut self, pos: CellPos, delta: &ClaimDelta, outbox: &mut Outbox) -> bool {
        if !self.store.is_resident(pos) {
            return false;
        }
        if self.pending.contains_key(&pos) {
            self.apply_pending(pos, outbox);
        }
        let Some(cell) = self.store.cell_mut(pos) else {
            return false;
        };
        if delta.apply(cell) {
            let snapshot = cell.clone();
            self.store.mark_dirty(pos);
            outbox.broadcast(Update::CellChanged { pos, cell: snapshot });
        }
        true
    }

    fn enqueue(&mut self, pos: CellPos, delta: ClaimDelta, summary: &mut ClaimSummary) {
        summary.queued += 1;
        match self.pending.entry(pos) {
            Entry::Occupied(mut entry) => entry.get_mut().push(delta),
            Entry::Vacant(entry) => {
                let mut claims = PendingClaims::default();
                claims.push(delta);
                entry.insert(claims);
                summary.newly_pending += 1;
            }
        }
    }

    /// Apply and drop the backlog of a resident cell.
    fn apply_pending(&mut self, pos: CellPos, outbox: &mut Outbox) -> bool {
        if !self.store.is_resident(pos) {
            return false;
        }
        let Some(claims) = self.pending.remove(&pos) else {
            return false;
        };
        self.missing_cells = self.missing_cells.saturating_sub(1);

        let dimension = self.dimension;
        let Some(cell) = self.store.cell_mut(pos) else {
            return false;
        };
        let mut changed = false;
        for delta in claims.deltas.iter().filter(|d| d.dimension == dimension) {
            changed |= delta.apply(cell);
        }
        if changed {
            let snapshot = cell.clone();
            self.store.mark_dirty(pos);
            outbox.broadcast(Update::CellChanged { pos, cell: snapshot });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ClaimSettings {
        ClaimSettings {
            load_immediately_distance: 1,
            dynamic_working_range: 0,
            orphan_distance: 20.0,
            fix_orphaned_cells: true,
        }
    }

    fn map_with_box(radius: i32) -> TerritoryClaimMap<MemoryCellStore> {
        let mut store = MemoryCellStore::new();
        store.load_box(CellPos::ORIGIN, radius);
        TerritoryClaimMap::new(store, settings(), 0)
    }

    #[test]
    fn test_delta_apply_is_idempotent() {
        let delta = ClaimDelta::settlement(3, true, 0, true);
        let mut once = TerritoryCell::default();
        delta.apply(&mut once);
        let mut twice = once.clone();
        assert!(!delta.apply(&mut twice));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_release_clears_owner_and_interest() {
        let mut cell = TerritoryCell::default();
        ClaimDelta::settlement(2, true, 0, true).apply(&mut cell);
        ClaimDelta::settlement(2, false, 0, true).apply(&mut cell);
        assert_eq!(cell, TerritoryCell::default());
    }

    #[test]
    fn test_remove_keeps_other_owner() {
        let mut cell = TerritoryCell::default();
        ClaimDelta::settlement(1, true, 0, false).apply(&mut cell);
        ClaimDelta::settlement(2, true, 0, true).apply(&mut cell);
        ClaimDelta::settlement(1, false, 0, true).apply(&mut cell);
        assert_eq!(cell.owner, 2);
        assert!(!cell.interested.contains(&1));
    }

    #[test]
    fn test_near_cells_written_far_cells_queued() {
        // Everything within 6 is resident; only distance <= 1 is written directly.
        let mut map = map_with_box(6);
        let mut outbox = Outbox::new();
        let summary = map.claim(1, CellPos::ORIGIN, 1, 1, true, &mut outbox);

        // Outer box is radius 3: 49 cells, 9 of them within distance 1.
        assert_eq!(summary.written, 9);
        assert_eq!(summary.queued, 40);
        assert_eq!(map.missing_cells(), 40);
        assert_eq!(map.owner_of(CellPos::new(1, 1)), 1);
        assert_eq!(map.owner_of(CellPos::new(2, 0)), 0);
        assert_eq!(outbox.len(), 9);
        assert_eq!(map.store_mut().take_dirty().len(), 9);
        assert!(map.store_mut().take_dirty().is_empty());
    }

    #[test]
    fn test_direct_write_supersedes_queued_delta() {
        let mut map = TerritoryClaimMap::new(MemoryCellStore::new(), settings(), 0);
        let mut outbox = Outbox::new();
        map.claim(1, CellPos::ORIGIN, 2, 1, true, &mut outbox);
        let missing = map.missing_cells();

        let pos = CellPos::new(1, 0);
        map.store_mut().load(pos);
        map.claim(1, CellPos::ORIGIN, 2, 1, false, &mut outbox);
        assert!(map.pending_at(pos).is_none());
        assert_eq!(map.missing_cells(), missing - 1);

        map.drain_resident(&mut outbox);
        assert_eq!(map.owner_of(pos), 0);
        assert!(!map.is_interested(pos, 1));
    }

    #[test]
    fn test_drain_applies_backlog_once() {
        let mut map = map_with_box(6);
        let mut outbox = Outbox::new();
        map.claim(1, CellPos::ORIGIN, 1, 1, true, &mut outbox);

        assert_eq!(map.drain_resident(&mut outbox), 40);
        assert_eq!(map.missing_cells(), 0);
        assert_eq!(map.pending_len(), 0);
        // Ring cell at distance 2: interest only.
        assert_eq!(map.owner_of(CellPos::new(2, 0)), 0);
        assert!(map.is_interested(CellPos::new(2, 0), 1));
        assert_eq!(map.drain_resident(&mut outbox), 0);
    }

    #[test]
    fn test_later_delta_replaces_earlier_for_same_settlement() {
        let mut map = TerritoryClaimMap::new(MemoryCellStore::new(), settings(), 0);
        let mut outbox = Outbox::new();
        map.claim(1, CellPos::ORIGIN, 1, 0, true, &mut outbox);
        let missing = map.missing_cells();
        map.claim(1, CellPos::ORIGIN, 1, 0, false, &mut outbox);

        // Same cells, no new backlog entries.
        assert_eq!(map.missing_cells(), missing);
        let pending = map.pending_at(CellPos::new(1, 0)).unwrap();
        assert_eq!(pending.deltas.len(), 1);
        assert!(!pending.deltas[0].add);
    }

    #[test]
    fn test_on_cell_loaded_applies_pending() {
        let mut map = TerritoryClaimMap::new(MemoryCellStore::new(), settings(), 0);
        let mut outbox = Outbox::new();
        let centers: BTreeMap<SettlementId, CellPos> = [(1, CellPos::ORIGIN)].into_iter().collect();
        map.claim(1, CellPos::ORIGIN, 1, 0, true, &mut outbox);
        assert_eq!(map.missing_cells(), 25);

        let pos = CellPos::new(-1, 1);
        assert!(!map.on_cell_loaded(pos, &centers, &mut outbox));
        map.store_mut().load(pos);
        assert!(map.on_cell_loaded(pos, &centers, &mut outbox));
        assert_eq!(map.owner_of(pos), 1);
        assert_eq!(map.missing_cells(), 24);
    }

    #[test]
    fn test_orphan_eviction() {
        let mut map = map_with_box(2);
        let mut outbox = Outbox::new();
        map.claim(1, CellPos::ORIGIN, 1, 0, true, &mut outbox);
        map.claim(2, CellPos::ORIGIN, 0, 0, true, &mut outbox);

        // Settlement 1 moved far away, settlement 2 no longer exists.
        let centers: BTreeMap<SettlementId, CellPos> =
            [(1, CellPos::new(100, 100))].into_iter().collect();
        let removed = map.evict_orphans(CellPos::ORIGIN, &centers, &mut outbox);
        assert_eq!(removed, 2);
        assert_eq!(map.cell(CellPos::ORIGIN), Some(&TerritoryCell::default()));
    }

    #[test]
    fn test_sweep_leaves_untouched_cells_absent() {
        let mut map = map_with_box(3);
        let mut outbox = Outbox::new();
        let centers: BTreeMap<SettlementId, CellPos> = BTreeMap::new();

        assert_eq!(map.sweep_orphans(&centers, &mut outbox), 0);
        assert!(cells_in_box(CellPos::ORIGIN, 3).all(|pos| map.cell(pos).is_none()));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_loaded_cell_without_backlog_drops_orphans() {
        let mut map = map_with_box(2);
        let mut outbox = Outbox::new();
        map.claim(1, CellPos::ORIGIN, 1, 0, true, &mut outbox);
        // Far cells are still waiting; the centre is not.
        assert!(map.missing_cells() > 0);

        let gone: BTreeMap<SettlementId, CellPos> = BTreeMap::new();
        assert!(!map.on_cell_loaded(CellPos::ORIGIN, &gone, &mut outbox));
        assert_eq!(map.owner_of(CellPos::ORIGIN), 0);
        assert!(!map.is_interested(CellPos::ORIGIN, 1));
    }

    #[test]
    fn test_loaded_cell_keeps_orphans_when_fixing_disabled() {
        let mut store = MemoryCellStore::new();
        store.load_box(CellPos::ORIGIN, 2);
        let keep = ClaimSettings {
            fix_orphaned_cells: false,
            ..settings()
        };
        let mut map = TerritoryClaimMap::new(store, keep, 0);
        let mut outbox = Outbox::new();
        map.claim(1, CellPos::ORIGIN, 1, 0, true, &mut outbox);

        let gone: BTreeMap<SettlementId, CellPos> = BTreeMap::new();
        map.on_cell_loaded(CellPos::ORIGIN, &gone, &mut outbox);
        assert_eq!(map.owner_of(CellPos::ORIGIN), 1);
    }

    #[test]
    fn test_building_claim_limited_by_working_range() {
        let mut store = MemoryCellStore::new();
        store.load_box(CellPos::ORIGIN, 6);
        let limited = ClaimSettings {
            dynamic_working_range: 2,
            ..settings()
        };
        let mut map = TerritoryClaimMap::new(store, limited, 0);
        let mut outbox = Outbox::new();
        let building = CellPos::new(3, 0);
        map.claim_building_range(5, CellPos::ORIGIN, building, 1, true, &mut outbox);

        // The building's own cell is claimed even though it is out of range.
        assert_eq!(map.owner_of(building), 5);
        assert_eq!(map.owner_of(CellPos::new(2, 0)), 5);
        assert_eq!(map.owner_of(CellPos::new(4, 0)), 0);
        assert_eq!(map.owner_of(CellPos::new(2, 1)), 0);
    }

    #[test]
    fn test_owned_cells_in_range_lists_owners() {
        let mut map = map_with_box(4);
        let mut outbox = Outbox::new();
        map.claim(1, CellPos::ORIGIN, 1, 0, true, &mut outbox);
        map.drain_resident(&mut outbox);

        let owned = map.owned_cells_in_range(CellPos::ORIGIN, 1, 0);
        assert_eq!(owned.len(), 9);
        assert!(owned.iter().all(|(pos, owner)| *owner == 1 && pos.within_box(&CellPos::ORIGIN, 1)));
    }

    #[test]
    fn test_can_claim_ignores_other_dimension_backlog() {
        let mut map = TerritoryClaimMap::new(MemoryCellStore::new(), settings(), 0);
        let pos = CellPos::new(7, 7);
        let mut claims = PendingClaims::default();
        claims.push(ClaimDelta::settlement(2, true, 1, true));
        map.restore_backlog(ClaimBacklog {
            dimension: 0,
            pending: vec![(pos, claims)],
            missing_cells: 1,
        });

        assert!(map.can_claim_in_range(pos, 0));
    }

    #[test]
    fn test_building_claims_override_unowned_cells() {
        let mut map = map_with_box(3);
        let mut outbox = Outbox::new();
        let building = CellPos::new(2, 2);
        map.claim_building_range(5, CellPos::ORIGIN, building, 1, true, &mut outbox);

        assert_eq!(map.owner_of(CellPos::new(3, 3)), 5);
        assert_eq!(map.owner_of(CellPos::new(1, 1)), 5);
        assert!(!map.can_claim_in_range(CellPos::new(3, 3), 0));

        map.claim_building_range(5, CellPos::ORIGIN, building, 1, false, &mut outbox);
        assert_eq!(map.owner_of(CellPos::new(3, 3)), 0);
        assert!(map.can_claim_in_range(CellPos::new(3, 3), 0));
    }

    #[test]
    fn test_can_claim_sees_pending_owner() {
        let mut map = TerritoryClaimMap::new(MemoryCellStore::new(), settings(), 0);
        let mut outbox = Outbox::new();
        map.claim(4, CellPos::ORIGIN, 1, 0, true, &mut outbox);

        assert!(!map.can_claim_in_range(CellPos::new(1, 1), 0));
        assert!(map.can_claim_in_range(CellPos::new(10, 10), 2));
    }

    #[test]
    fn test_backlog_round_trips() {
        let mut map = TerritoryClaimMap::new(MemoryCellStore::new(), settings(), 0);
        let mut outbox = Outbox::new();
        map.claim(4, CellPos::ORIGIN, 1, 1, true, &mut outbox);
        let backlog = map.backlog();

        let mut restored = TerritoryClaimMap::new(MemoryCellStore::new(), settings(), 0);
        restored.restore_backlog(backlog.clone());
        assert_eq!(restored.backlog(), backlog);
        assert_eq!(restored.missing_cells(), map.missing_cells());
    }
}
