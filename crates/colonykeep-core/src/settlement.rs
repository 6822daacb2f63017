//! A settlement: its population, buildings, happiness snapshot and observers.
//!
//! Each settlement owns its own [`PopulationRegistry`]; nothing here is shared
//! between settlements.

use std::collections::{BTreeMap, BTreeSet};

use crate::broadcast::{Outbox, Update};
use crate::buildings::{BuildingKind, BuildingRegistry};
use crate::cell::{cells_in_box, CellPos};
use crate::config::ColonyConfig;
use crate::happiness::{self, HappinessThresholds, HappinessTrend, UnitHappinessInput};
use crate::population::PopulationRegistry;
use crate::territory::{CellStore, SettlementCenters};
use crate::unit::PopulationUnit;
use crate::{BuildingId, ObserverId, SettlementId, UnitId};

#[derive(Debug, Clone)]
pub struct Settlement {
    pub id: SettlementId,
    pub name: String,
    pub center: CellPos,
    pub dimension: i32,
    pub population: PopulationRegistry,
    pub buildings: BuildingRegistry,
    pub happiness: HappinessTrend,
    pub subscribers: BTreeSet<ObserverId>,
    /// Subscribers that already received a full view.
    synced: BTreeSet<ObserverId>,
}

impl Settlement {
    pub fn new(id: SettlementId, name: impl Into<String>, center: CellPos, dimension: i32) -> Self {
        Self {
            id,
            name: name.into(),
            center,
            dimension,
            population: PopulationRegistry::new(),
            buildings: BuildingRegistry::new(),
            happiness: HappinessTrend::stable(),
            subscribers: BTreeSet::new(),
            synced: BTreeSet::new(),
        }
    }

    pub fn has_anchor(&self) -> bool {
        self.buildings.anchor().is_some()
    }

    pub fn anchor_level(&self) -> Option<u32> {
        self.buildings.anchor().map(|b| b.level)
    }

    pub fn anchor_cell(&self) -> Option<CellPos> {
        self.buildings.anchor().map(|b| b.cell)
    }

    pub fn capacity(&self, config: &ColonyConfig) -> u32 {
        self.population.capacity(config.max_units_per_settlement)
    }

    /// Spawn an existing unit, or a new one when `data` is `None`.
    ///
    /// Returns `data` unchanged when the spawn is refused: no anchor, full
    /// without `force`, anchor cell not resident, or an unknown unit id.
    /// A refused spawn never allocates an id.
    pub fn spawn(
        &mut self,
        data: Option<UnitId>,
        force: bool,
        store: &dyn CellStore,
        config: &ColonyConfig,
    ) -> Option<UnitId> {
        let Some(anchor_cell) = self.anchor_cell() else {
            return data;
        };

        if !force && self.population.is_full(config.max_units_per_settlement) {
            log::warn!(
                "Settlement {} is full ({} units), spawn refused",
                self.name,
                self.population.count()
            );
            return data;
        }

        if !store.is_resident(anchor_cell) {
            log::debug!("Anchor cell {} of settlement {} not resident", anchor_cell, self.name);
            return data;
        }

        let id = match data {
            Some(id) if self.population.contains(id) => id,
            Some(id) => {
                log::warn!("Settlement {} has no unit {} to spawn", self.name, id);
                return data;
            }
            None => {
                let id = self.population.create_unit();
                if !force && self.population.count() as u64 == self.capacity(config) as u64 {
                    log::info!("Settlement {} has reached its maximum size", self.name);
                }
                id
            }
        };

        if let Some(unit) = self.population.get_mut(id) {
            unit.alive = true;
            unit.dirty = true;
        }
        self.population.mark_dirty();
        Some(id)
    }

    /// Remove a unit, clearing it out of every building and telling observers.
    pub fn remove_unit(&mut self, id: UnitId, outbox: &mut Outbox) -> Option<PopulationUnit> {
        let unit = self.population.remove(id, &mut self.buildings)?;
        for observer in &self.subscribers {
            outbox.send(
                *observer,
                Update::UnitRemoved {
                    settlement: self.id,
                    unit: id,
                },
            );
        }
        Some(unit)
    }

    /// The host could not find this unit's presence.
    pub fn report_lost(&mut self, id: UnitId) -> bool {
        match self.population.get_mut(id) {
            Some(unit) => {
                unit.alive = false;
                true
            }
            None => false,
        }
    }

    /// Remove every unit whose presence was not confirmed.
    pub fn purge_lost(&mut self, outbox: &mut Outbox) -> Vec<UnitId> {
        let lost: Vec<UnitId> = self
            .population
            .iter()
            .filter(|u| !u.alive)
            .map(|u| u.id)
            .collect();
        for id in &lost {
            log::info!("Settlement {} lost unit {}", self.name, id);
            self.remove_unit(*id, outbox);
        }
        lost
    }

    /// Move a unit into a home or barracks with a free bed.
    pub fn assign_home(&mut self, unit: UnitId, building: BuildingId) -> bool {
        let fits = self.buildings.get(building).map_or(false, |b| {
            matches!(b.kind, BuildingKind::Home | BuildingKind::Barracks) && b.has_room()
        });
        if !fits {
            return false;
        }
        let Some(record) = self.population.get_mut(unit) else {
            return false;
        };

        if let Some(old) = record.residence.replace(building) {
            if let Some(b) = self.buildings.get_mut(old) {
                b.residents.remove(&unit);
            }
        }
        record.dirty = true;
        if let Some(b) = self.buildings.get_mut(building) {
            b.residents.insert(unit);
        }
        self.population.mark_dirty();
        true
    }

    /// Give a unit a job at a workplace or guard post.
    pub fn assign_work(&mut self, unit: UnitId, building: BuildingId) -> bool {
        let fits = self.buildings.get(building).map_or(false, |b| {
            matches!(b.kind, BuildingKind::Workplace | BuildingKind::GuardPost)
        });
        if !fits {
            return false;
        }
        let Some(record) = self.population.get_mut(unit) else {
            return false;
        };

        if let Some(old) = record.employment.replace(building) {
            if let Some(b) = self.buildings.get_mut(old) {
                b.workers.remove(&unit);
            }
        }
        record.dirty = true;
        if let Some(b) = self.buildings.get_mut(building) {
            b.workers.insert(unit);
        }
        self.population.mark_dirty();
        true
    }

    /// Refresh the stored ceiling from housing. Returns true if it changed.
    pub fn recalculate_capacity(&mut self) -> bool {
        let ceiling = self.buildings.max_units();
        if ceiling == self.population.stored_ceiling() {
            return false;
        }
        self.population.set_stored_ceiling(ceiling);
        true
    }

    fn happiness_inputs(&self) -> Vec<UnitHappinessInput> {
        self.population
            .iter()
            .map(|unit| UnitHappinessInput {
                work: unit
                    .employment
                    .and_then(|id| self.buildings.get(id))
                    .map(|b| (b.level, b.kind.is_guard())),
                home_level: unit
                    .residence
                    .and_then(|id| self.buildings.get(id))
                    .map(|b| b.level),
                saturation: unit.saturation,
            })
            .collect()
    }

    /// Recompute and store the trend, then push it to every observer.
    pub fn evaluate_happiness(&mut self, config: &ColonyConfig, outbox: &mut Outbox) -> HappinessTrend {
        let thresholds = HappinessThresholds::from(config);
        self.happiness = happiness::evaluate(&self.happiness_inputs(), &thresholds);
        for observer in &self.subscribers {
            outbox.send(
                *observer,
                Update::Happiness {
                    settlement: self.id,
                    trend: self.happiness,
                },
            );
        }
        self.happiness
    }

    /// Mourning applies to every present unit except guards.
    pub fn set_mourning(&mut self, mourn: bool) {
        let guards: BTreeSet<BuildingId> = self
            .buildings
            .iter()
            .filter(|b| b.kind.is_guard())
            .map(|b| b.id)
            .collect();

        for unit in self.population.iter_mut() {
            let is_guard = unit.employment.map_or(false, |id| guards.contains(&id));
            if unit.alive && !is_guard && unit.mourning != mourn {
                unit.mourning = mourn;
                unit.dirty = true;
            }
        }
    }

    /// True when the whole working box around the centre is resident.
    pub fn surroundings_resident(&self, store: &dyn CellStore, radius: i32) -> bool {
        cells_in_box(self.center, radius).all(|pos| store.is_resident(pos))
    }

    pub fn subscribe(&mut self, observer: ObserverId) -> bool {
        self.subscribers.insert(observer)
    }

    pub fn unsubscribe(&mut self, observer: ObserverId) -> bool {
        self.synced.remove(&observer);
        self.subscribers.remove(&observer)
    }

    /// Queue unit views for observers.
    ///
    /// Dirty units go to everyone; new subscribers get every present unit and
    /// the current happiness snapshot. Dirty flags are cleared afterwards.
    pub fn collect_updates(&mut self, outbox: &mut Outbox) {
        let fresh: BTreeSet<ObserverId> = self.subscribers.difference(&self.synced).copied().collect();

        if self.population.is_dirty() || !fresh.is_empty() {
            for unit in self.population.iter().filter(|u| u.alive) {
                for observer in &self.subscribers {
                    if unit.dirty || fresh.contains(observer) {
                        outbox.send(
                            *observer,
                            Update::UnitView {
                                settlement: self.id,
                                unit: unit.clone(),
                            },
                        );
                    }
                }
            }

            for observer in &fresh {
                outbox.send(
                    *observer,
                    Update::Happiness {
                        settlement: self.id,
                        trend: self.happiness,
                    },
                );
            }
        }

        self.synced = self.subscribers.clone();
        self.population.clear_dirty();
    }
}

impl SettlementCenters for BTreeMap<SettlementId, Settlement> {
    fn center_of(&self, settlement: SettlementId) -> Option<CellPos> {
        self.get(&settlement).map(|s| s.center)
    }
}
