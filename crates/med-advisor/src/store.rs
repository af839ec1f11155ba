//! Research Store
//!
//! Keyed cache of intermediate tool outputs for one consultation. Each slot
//! holds only its latest value; writes overwrite and no history is kept.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Named slots of the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Latest research report
    Research,
}

impl Slot {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-scoped research results
#[derive(Debug, Default)]
pub struct ResearchStore {
    slots: RwLock<BTreeMap<Slot, String>>,
}

impl ResearchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever the slot held
    pub async fn write(&self, slot: Slot, value: impl Into<String>) {
        let value = value.into();
        tracing::debug!(slot = %slot, len = value.len(), "Store write");
        self.slots.write().await.insert(slot, value);
    }

    /// Latest value of one slot
    pub async fn get(&self, slot: Slot) -> Option<String> {
        self.slots.read().await.get(&slot).cloned()
    }

    /// Owned copy of every populated slot, keyed by slot name
    pub async fn read_all(&self) -> BTreeMap<String, String> {
        self.slots
            .read()
            .await
            .iter()
            .map(|(slot, value)| (slot.as_str().to_string(), value.clone()))
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}
