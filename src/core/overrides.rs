//! Manual-override registry - slot-instances the operator has deliberately emptied.
//!
//! The allocation engine never refills a key held here. Only an explicit operator addition
//! (or a bulk reset) releases it. The set is persisted per scheduling period as a JSON array
//! in the `system_state` table so it survives refreshes and restarts.

use crate::{
    core::{
        dates,
        model::{Period, SlotKey},
    },
    entities::{SystemState, system_state},
    errors::Result,
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use std::collections::BTreeSet;

const STATE_KEY_PREFIX: &str = "manually_emptied";

/// In-memory set of manually emptied slot-instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualOverrides {
    keys: BTreeSet<SlotKey>,
}

impl ManualOverrides {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = SlotKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Returns true if the key was not already marked.
    pub fn mark(&mut self, key: SlotKey) -> bool {
        self.keys.insert(key)
    }

    /// Returns true if the key was marked.
    pub fn clear(&mut self, key: &SlotKey) -> bool {
        self.keys.remove(key)
    }

    pub fn clear_all(&mut self) {
        self.keys.clear();
    }

    #[must_use]
    pub fn contains(&self, key: &SlotKey) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotKey> {
        self.keys.iter()
    }
}

fn state_key(period: &Period) -> String {
    format!(
        "{STATE_KEY_PREFIX}:{}:{}",
        dates::format_date(period.start),
        dates::format_date(period.end)
    )
}

/// Loads the registry stored for `period`, empty if nothing was saved yet.
pub async fn load_overrides<C>(db: &C, period: &Period) -> Result<ManualOverrides>
where
    C: ConnectionTrait,
{
    let stored = SystemState::find()
        .filter(system_state::Column::Key.eq(state_key(period)))
        .one(db)
        .await?;

    match stored {
        Some(state) => {
            let keys: Vec<SlotKey> = serde_json::from_str(&state.value)?;
            Ok(ManualOverrides::new(keys))
        }
        None => Ok(ManualOverrides::default()),
    }
}

/// Replaces the registry stored for `period`.
pub async fn save_overrides<C>(db: &C, period: &Period, overrides: &ManualOverrides) -> Result<()>
where
    C: ConnectionTrait,
{
    let keys: Vec<&SlotKey> = overrides.iter().collect();
    let value = serde_json::to_string(&keys)?;
    let now = Utc::now().naive_utc();
    let key = state_key(period);

    let existing = SystemState::find()
        .filter(system_state::Column::Key.eq(key.clone()))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active_model: system_state::ActiveModel = state.into();
        active_model.value = Set(value);
        active_model.updated_at = Set(now);
        active_model.update(db).await?;
    } else {
        let active_model = system_state::ActiveModel {
            key: Set(key),
            value: Set(value),
            updated_at: Set(now),
            ..Default::default()
        };
        active_model.insert(db).await?;
    }

    tracing::debug!(
        "Saved {} manually emptied slot(s) for {}",
        overrides.len(),
        period
    );
    Ok(())
}
