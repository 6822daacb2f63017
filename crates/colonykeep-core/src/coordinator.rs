//! Tick coordinator - main entry point, advanced once per host tick.
//!
//! Checks are gated on the tick counter, never on wall-clock time. Within a
//! settlement, cleanup runs before respawn.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::broadcast::{Envelope, Outbox};
use crate::cell::CellPos;
use crate::config::ColonyConfig;
use crate::error::{ConfigError, SaveError, TickError};
use crate::persistence::{self, SaveData};
use crate::settlement::Settlement;
use crate::territory::{CellStore, ClaimSettings, ClaimSummary, TerritoryClaimMap};
use crate::{BuildingId, ObserverId, SettlementId, UnitId};

/// What one call to [`TickCoordinator::advance`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Backlogged cells applied because they became resident.
    pub drained_cells: usize,
    pub purged: Vec<(SettlementId, UnitId)>,
    pub spawned: Vec<(SettlementId, UnitId)>,
    pub happiness_evaluated: Vec<SettlementId>,
    pub orphans_evicted: usize,
    pub errors: Vec<TickError>,
}

pub struct TickCoordinator<S: CellStore> {
    config: ColonyConfig,
    settlements: BTreeMap<SettlementId, Settlement>,
    territory: TerritoryClaimMap<S>,
    outbox: Outbox,
    /// Last tick processed; ticks at or below this are ignored.
    last_tick: u64,
}

impl<S: CellStore> TickCoordinator<S> {
    /// Rejects a config that fails [`ColonyConfig::validate`].
    pub fn new(config: ColonyConfig, store: S, dimension: i32) -> Result<Self, ConfigError> {
        config.validate()?;
        let territory = TerritoryClaimMap::new(store, ClaimSettings::from(&config), dimension);
        Ok(Self {
            config,
            settlements: BTreeMap::new(),
            territory,
            outbox: Outbox::new(),
            last_tick: 0,
        })
    }

    pub fn config(&self) -> &ColonyConfig {
        &self.config
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    pub fn territory(&self) -> &TerritoryClaimMap<S> {
        &self.territory
    }

    pub fn territory_mut(&mut self) -> &mut TerritoryClaimMap<S> {
        &mut self.territory
    }

    pub fn settlements(&self) -> &BTreeMap<SettlementId, Settlement> {
        &self.settlements
    }

    pub fn settlement(&self, id: SettlementId) -> Option<&Settlement> {
        self.settlements.get(&id)
    }

    pub fn settlement_mut(&mut self, id: SettlementId) -> Option<&mut Settlement> {
        self.settlements.get_mut(&id)
    }

    /// Create a settlement and claim the territory around it.
    pub fn found_settlement(&mut self, name: impl Into<String>, center: CellPos) -> SettlementId {
        let id = self.settlements.keys().next_back().copied().unwrap_or(0) + 1;
        let settlement = Settlement::new(id, name, center, self.territory.dimension());
        log::info!("Founded settlement {} ({}) at {}", id, settlement.name, center);
        self.settlements.insert(id, settlement);
        self.territory.claim(
            id,
            center,
            self.config.working_radius,
            self.config.padding,
            true,
            &mut self.outbox,
        );
        id
    }

    /// Release the settlement's territory and drop it.
    pub fn abandon_settlement(&mut self, id: SettlementId) -> Option<Settlement> {
        let settlement = self.settlements.remove(&id)?;
        self.territory.claim(
            id,
            settlement.center,
            self.config.working_radius,
            self.config.padding,
            false,
            &mut self.outbox,
        );
        log::info!("Abandoned settlement {} ({})", id, settlement.name);
        Some(settlement)
    }

    /// Building-level claim around one of a settlement's buildings.
    pub fn claim_building(
        &mut self,
        settlement: SettlementId,
        building: BuildingId,
        range: i32,
        add: bool,
    ) -> Option<ClaimSummary> {
        let Some(owner) = self.settlements.get(&settlement) else {
            log::error!("Building claim for unknown settlement {}", settlement);
            return None;
        };
        let Some(cell) = owner.buildings.get(building).map(|b| b.cell) else {
            log::warn!("Settlement {} has no building {}", settlement, building);
            return None;
        };
        let center = owner.center;
        Some(
            self.territory
                .claim_building_range(settlement, center, cell, range, add, &mut self.outbox),
        )
    }

    /// The host made a cell resident.
    pub fn cell_loaded(&mut self, pos: CellPos) -> bool {
        self.territory
            .on_cell_loaded(pos, &self.settlements, &mut self.outbox)
    }

    pub fn spawn(&mut self, settlement: SettlementId, data: Option<UnitId>, force: bool) -> Option<UnitId> {
        let Some(target) = self.settlements.get_mut(&settlement) else {
            log::warn!("Spawn for unknown settlement {}", settlement);
            return data;
        };
        target.spawn(data, force, self.territory.store(), &self.config)
    }

    pub fn remove_unit(&mut self, settlement: SettlementId, unit: UnitId) -> bool {
        self.settlements
            .get_mut(&settlement)
            .and_then(|s| s.remove_unit(unit, &mut self.outbox))
            .is_some()
    }

    pub fn report_lost(&mut self, settlement: SettlementId, unit: UnitId) -> bool {
        self.settlements
            .get_mut(&settlement)
            .map_or(false, |s| s.report_lost(unit))
    }

    pub fn subscribe(&mut self, settlement: SettlementId, observer: ObserverId) -> bool {
        self.settlements
            .get_mut(&settlement)
            .map_or(false, |s| s.subscribe(observer))
    }

    pub fn unsubscribe(&mut self, settlement: SettlementId, observer: ObserverId) -> bool {
        self.settlements
            .get_mut(&settlement)
            .map_or(false, |s| s.unsubscribe(observer))
    }

    /// Collect per-settlement views and hand over everything queued.
    pub fn flush_updates(&mut self) -> Vec<Envelope> {
        for settlement in self.settlements.values_mut() {
            settlement.collect_updates(&mut self.outbox);
        }
        self.outbox.drain()
    }

    /// Process the next tick.
    pub fn step(&mut self) -> TickReport {
        self.advance(self.last_tick + 1)
    }

    /// Process tick number `tick` (1-based).
    pub fn advance(&mut self, tick: u64) -> TickReport {
        let mut report = TickReport {
            tick,
            ..Default::default()
        };
        if tick <= self.last_tick {
            log::debug!("Ignoring tick {} (already at {})", tick, self.last_tick);
            return report;
        }
        self.last_tick = tick;
        // Ticks elapsed before this one.
        let world_time = tick - 1;
        let config = &self.config;

        report.drained_cells = self.territory.drain_resident(&mut self.outbox);

        let store = self.territory.store();
        for settlement in self.settlements.values_mut() {
            // Cleanup
            if world_time % config.cleanup_tick_increment == 0
                && settlement.has_anchor()
                && settlement.surroundings_resident(store, config.working_radius)
            {
                for unit in settlement.purge_lost(&mut self.outbox) {
                    report.purged.push((settlement.id, unit));
                }
            }

            // Respawn
            if let Some(anchor_level) = settlement.anchor_level() {
                if (settlement.population.count() as u64) < config.initial_unit_amount as u64 {
                    let interval = config.respawn_interval(anchor_level);
                    if interval < 0 {
                        log::error!(
                            "Respawn interval of settlement {} went negative ({})",
                            settlement.name,
                            interval
                        );
                        report.errors.push(TickError::RespawnIntervalUnderflow {
                            settlement: settlement.id,
                            anchor_level,
                            interval,
                        });
                    } else if (world_time + 1) % (interval as u64 + 1) == 0 {
                        if let Some(unit) = respawn(settlement, store, config) {
                            report.spawned.push((settlement.id, unit));
                        }
                    }
                }
            }

            // Happiness
            if world_time % config.happiness_tick_increment == 0 {
                settlement.evaluate_happiness(config, &mut self.outbox);
                report.happiness_evaluated.push(settlement.id);
            }
        }

        if config.fix_orphaned_cells && world_time % config.orphan_sweep_tick_increment == 0 {
            report.orphans_evicted = self
                .territory
                .sweep_orphans(&self.settlements, &mut self.outbox);
        }

        report
    }

    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        persistence::save(writer, &self.snapshot())
    }

    /// Replace settlements and backlog with a save. Nothing changes on error.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), SaveError> {
        let loaded = persistence::load(reader)?;
        self.last_tick = loaded.last_tick;
        self.settlements = loaded.settlements;
        self.territory.restore_backlog(loaded.backlog);
        Ok(())
    }

    pub fn snapshot(&self) -> SaveData {
        SaveData::capture(self.last_tick, &self.settlements, self.territory.backlog())
    }
}

/// Register a unit and spawn it. Units alternate female/male by count.
fn respawn(settlement: &mut Settlement, store: &dyn CellStore, config: &ColonyConfig) -> Option<UnitId> {
    let anchor_cell = settlement.anchor_cell()?;
    if !store.is_resident(anchor_cell) {
        return None;
    }

    let id = settlement.population.create_unit();
    let female = settlement.population.count() % 2 == 0;
    if let Some(unit) = settlement.population.get_mut(id) {
        unit.female = female;
    }
    settlement.spawn(Some(id), true, store, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildings::{Building, BuildingKind};
    use crate::territory::MemoryCellStore;

    fn coordinator() -> TickCoordinator<MemoryCellStore> {
        let mut store = MemoryCellStore::new();
        store.load_box(CellPos::ORIGIN, 40);
        TickCoordinator::new(ColonyConfig::default(), store, 0).unwrap()
    }

    fn with_anchor(coordinator: &mut TickCoordinator<MemoryCellStore>, level: u32) -> SettlementId {
        let id = coordinator.found_settlement("Alpha", CellPos::ORIGIN);
        let settlement = coordinator.settlement_mut(id).unwrap();
        settlement
            .buildings
            .insert(Building::new(1, BuildingKind::Anchor, level, CellPos::ORIGIN));
        id
    }

    #[test]
    fn test_coordinator_creation() {
        let coordinator = coordinator();
        assert_eq!(coordinator.last_tick(), 0);
        assert!(coordinator.settlements().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ColonyConfig {
            cleanup_tick_increment: 0,
            ..Default::default()
        };
        let result = TickCoordinator::new(config, MemoryCellStore::new(), 0);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_orphan_sweep_runs_on_cadence() {
        let mut coordinator = coordinator();
        let pos = CellPos::new(3, 3);
        let plant_orphan = |coordinator: &mut TickCoordinator<MemoryCellStore>| {
            let cell = coordinator.territory_mut().store_mut().cell_mut(pos).unwrap();
            cell.interested.insert(99);
        };

        plant_orphan(&mut coordinator);
        assert_eq!(coordinator.advance(1).orphans_evicted, 1);
        assert!(!coordinator.territory().is_interested(pos, 99));

        plant_orphan(&mut coordinator);
        assert_eq!(coordinator.advance(2).orphans_evicted, 0);
        assert!(coordinator.territory().is_interested(pos, 99));

        let sweep_tick = coordinator.config().orphan_sweep_tick_increment + 1;
        assert_eq!(coordinator.advance(sweep_tick).orphans_evicted, 1);
    }

    #[test]
    fn test_found_settlement_claims_territory() {
        let mut coordinator = coordinator();
        let id = coordinator.found_settlement("Alpha", CellPos::ORIGIN);
        coordinator.step();

        assert_eq!(coordinator.territory().owner_of(CellPos::new(8, -8)), id);
        assert_eq!(coordinator.territory().owner_of(CellPos::new(9, 0)), 0);
        assert!(coordinator.territory().is_interested(CellPos::new(24, 24), id));
        assert_eq!(coordinator.territory().missing_cells(), 0);
    }

    #[test]
    fn test_stale_ticks_are_ignored() {
        let mut coordinator = coordinator();
        coordinator.advance(5);
        let report = coordinator.advance(5);
        assert_eq!(report, TickReport { tick: 5, ..Default::default() });
        assert_eq!(coordinator.last_tick(), 5);
    }

    #[test]
    fn test_respawn_at_interval() {
        let mut coordinator = coordinator();
        let id = with_anchor(&mut coordinator, 0);

        for tick in 1..=600 {
            assert!(coordinator.advance(tick).spawned.is_empty(), "tick {}", tick);
        }
        let report = coordinator.advance(601);
        assert_eq!(report.spawned, vec![(id, 1)]);
        assert_eq!(coordinator.settlement(id).unwrap().population.count(), 1);
    }

    #[test]
    fn test_negative_interval_reported_not_clamped() {
        let mut coordinator = coordinator();
        let id = with_anchor(&mut coordinator, 20);

        let report = coordinator.advance(1);
        assert_eq!(
            report.errors,
            vec![TickError::RespawnIntervalUnderflow {
                settlement: id,
                anchor_level: 20,
                interval: -600,
            }]
        );
        assert!(report.spawned.is_empty());
    }

    #[test]
    fn test_cleanup_before_respawn() {
        let mut coordinator = coordinator();
        let id = with_anchor(&mut coordinator, 0);
        let unit = coordinator.spawn(id, None, true).unwrap();
        for tick in 1..=600 {
            coordinator.advance(tick);
        }
        assert_eq!(coordinator.settlement(id).unwrap().population.count(), 1);

        // Tick 601 is both a cleanup and a respawn tick. Cleanup frees id 1
        // first, so the respawned unit takes it again.
        coordinator.report_lost(id, unit);
        let report = coordinator.advance(601);
        assert_eq!(report.purged, vec![(id, unit)]);
        assert_eq!(report.spawned, vec![(id, unit)]);
        assert_eq!(coordinator.settlement(id).unwrap().population.count(), 1);
    }

    #[test]
    fn test_abandon_releases_cells() {
        let mut coordinator = coordinator();
        let id = coordinator.found_settlement("Alpha", CellPos::ORIGIN);
        coordinator.step();
        coordinator.abandon_settlement(id);
        coordinator.step();

        assert_eq!(coordinator.territory().owner_of(CellPos::ORIGIN), 0);
        assert!(!coordinator.territory().is_interested(CellPos::new(20, 0), id));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut coordinator = coordinator();
        let id = with_anchor(&mut coordinator, 0);
        coordinator.spawn(id, None, true);
        coordinator.advance(10);

        let mut buffer = Vec::new();
        coordinator.save(&mut buffer).expect("Save failed");

        let mut loaded =
            TickCoordinator::new(ColonyConfig::default(), MemoryCellStore::new(), 0).unwrap();
        loaded.load(&buffer[..]).expect("Load failed");
        assert_eq!(loaded.last_tick(), 10);
        assert_eq!(loaded.settlement(id).unwrap().population.count(), 1);
    }
}
