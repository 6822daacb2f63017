//! Outgoing state updates for observers.
//!
//! The core only queues updates; framing and delivery belong to the host.

use serde::{Deserialize, Serialize};

use crate::cell::CellPos;
use crate::happiness::HappinessTrend;
use crate::territory::TerritoryCell;
use crate::unit::PopulationUnit;
use crate::{ObserverId, SettlementId, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    All,
    Observer(ObserverId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Update {
    UnitView {
        settlement: SettlementId,
        unit: PopulationUnit,
    },
    UnitRemoved {
        settlement: SettlementId,
        unit: UnitId,
    },
    Happiness {
        settlement: SettlementId,
        trend: HappinessTrend,
    },
    CellChanged {
        pos: CellPos,
        cell: TerritoryCell,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub to: Recipient,
    pub update: Update,
}

/// Queue of updates waiting for the host to deliver them.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, observer: ObserverId, update: Update) {
        self.queue.push(Envelope {
            to: Recipient::Observer(observer),
            update,
        });
    }

    pub fn broadcast(&mut self, update: Update) {
        self.queue.push(Envelope {
            to: Recipient::All,
            update,
        });
    }

    /// Take everything queued so far.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queue)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
