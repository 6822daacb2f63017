//! Save/Load for settlement populations and the claim backlog.
//!
//! Uses bincode for the binary save and serde_json for a readable document.
//! Territory cells themselves live in the host's cell store and are not saved
//! here.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::buildings::BuildingRegistry;
use crate::cell::CellPos;
use crate::error::SaveError;
use crate::happiness::HappinessTrend;
use crate::population::PopulationRegistry;
use crate::settlement::Settlement;
use crate::territory::ClaimBacklog;
use crate::unit::PopulationUnit;
use crate::{ObserverId, SettlementId};

/// Version number for save file format (increment when format changes)
const SAVE_VERSION: u32 = 1;

/// Serializable snapshot of the coordinator state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    /// Last tick processed
    pub last_tick: u64,
    pub settlements: Vec<SettlementSave>,
    pub backlog: ClaimBacklog,
}

/// One settlement, with units flattened to a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSave {
    pub id: SettlementId,
    pub name: String,
    pub center: CellPos,
    pub dimension: i32,
    pub stored_ceiling: u32,
    pub units: Vec<PopulationUnit>,
    pub buildings: BuildingRegistry,
    pub happiness: HappinessTrend,
    pub subscribers: BTreeSet<ObserverId>,
}

impl From<&Settlement> for SettlementSave {
    fn from(settlement: &Settlement) -> Self {
        Self {
            id: settlement.id,
            name: settlement.name.clone(),
            center: settlement.center,
            dimension: settlement.dimension,
            stored_ceiling: settlement.population.stored_ceiling(),
            units: settlement.population.iter().cloned().collect(),
            buildings: settlement.buildings.clone(),
            happiness: settlement.happiness,
            subscribers: settlement.subscribers.clone(),
        }
    }
}

impl SettlementSave {
    /// Rebuild the settlement, rejecting id 0 and duplicate unit ids.
    pub fn restore(self) -> Result<Settlement, SaveError> {
        let mut population = PopulationRegistry::new();
        population.set_stored_ceiling(self.stored_ceiling);
        for unit in self.units {
            let unit_id = unit.id;
            population
                .insert_loaded(unit)
                .map_err(|_| SaveError::CorruptUnitId {
                    settlement: self.id,
                    unit: unit_id,
                })?;
        }

        let mut settlement = Settlement::new(self.id, self.name, self.center, self.dimension);
        settlement.population = population;
        settlement.buildings = self.buildings;
        settlement.happiness = self.happiness;
        settlement.subscribers = self.subscribers;
        Ok(settlement)
    }
}

/// Result of loading a save.
pub struct LoadedState {
    pub last_tick: u64,
    pub settlements: BTreeMap<SettlementId, Settlement>,
    pub backlog: ClaimBacklog,
}

impl SaveData {
    pub fn capture(
        last_tick: u64,
        settlements: &BTreeMap<SettlementId, Settlement>,
        backlog: ClaimBacklog,
    ) -> Self {
        Self {
            version: SAVE_VERSION,
            last_tick,
            settlements: settlements.values().map(SettlementSave::from).collect(),
            backlog,
        }
    }

    /// Validate and rebuild. Nothing is returned unless every settlement loads.
    pub fn into_state(self) -> Result<LoadedState, SaveError> {
        if self.version != SAVE_VERSION {
            return Err(SaveError::VersionMismatch {
                expected: SAVE_VERSION,
                found: self.version,
            });
        }

        let mut settlements = BTreeMap::new();
        for save in self.settlements {
            let id = save.id;
            let settlement = save.restore()?;
            if settlements.insert(id, settlement).is_some() {
                return Err(SaveError::DuplicateSettlement(id));
            }
        }

        Ok(LoadedState {
            last_tick: self.last_tick,
            settlements,
            backlog: self.backlog,
        })
    }
}

/// Write a save to any writer.
pub fn save<W: Write>(writer: W, data: &SaveData) -> Result<(), SaveError> {
    bincode::serialize_into(writer, data)?;
    Ok(())
}

/// Read a save from any reader.
pub fn load<R: Read>(reader: R) -> Result<LoadedState, SaveError> {
    let data: SaveData = bincode::deserialize_from(reader)?;
    data.into_state()
}

pub fn to_json(data: &SaveData) -> Result<String, SaveError> {
    Ok(serde_json::to_string_pretty(data)?)
}

pub fn from_json(json: &str) -> Result<LoadedState, SaveError> {
    let data: SaveData = serde_json::from_str(json)?;
    data.into_state()
}
