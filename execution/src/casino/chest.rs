//! Loot chests.
//!
//! A chest has independent drop slots (each trialled on its own) and an optional
//! pool from which a fixed number of distinct rewards is always drawn.

use crate::rng::GameRng;
use crate::sampler::{DropTable, TableError, WeightedTable};
use crate::state::signed;
use mora_types::casino::{
    Currency, EconomicEffect, Reward, CHEST_COMMON, CHEST_EPIC, CHEST_RARE, ITEM_HOT_STREAK,
    ITEM_LUCKY_CHARM, ITEM_PADLOCK,
};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct ChestTable {
    pub chest: String,
    pub drops: DropTable<Reward>,
    /// `(count, pool)`: `count` distinct rewards drawn without replacement.
    pub guaranteed: Option<(usize, WeightedTable<Reward>)>,
    pub exp: u64,
}

/// A reward with its amount rolled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RolledReward {
    Currency { currency: Currency, amount: u64 },
    Item { item: String, quantity: u64 },
    Chest { chest: String, quantity: u64 },
}

impl RolledReward {
    pub(crate) fn roll(reward: &Reward, rng: &mut GameRng) -> Self {
        match reward {
            Reward::Currency { currency, min, max } => RolledReward::Currency {
                currency: *currency,
                amount: rng.between(*min, *max),
            },
            Reward::Item { item, quantity } => RolledReward::Item {
                item: item.clone(),
                quantity: *quantity,
            },
            Reward::Chest { chest, quantity } => RolledReward::Chest {
                chest: chest.clone(),
                quantity: *quantity,
            },
        }
    }

    pub(crate) fn add_to(&self, effect: &mut EconomicEffect) {
        match self {
            RolledReward::Currency { currency, amount } => {
                effect.add_currency(*currency, signed(*amount))
            }
            RolledReward::Item { item, quantity } => effect.add_item(item.clone(), signed(*quantity)),
            RolledReward::Chest { chest, quantity } => {
                effect.add_item(chest.clone(), signed(*quantity))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChestOpening {
    pub chest: String,
    pub rewards: Vec<RolledReward>,
}

impl ChestOpening {
    /// Credits for the rolled rewards plus the chest's EXP. The chest itself is
    /// consumed separately so that a chest dropping its own kind still has to be held.
    pub fn reward_effect(&self, exp: u64) -> EconomicEffect {
        let mut effect = EconomicEffect::new().with_exp(exp);
        for reward in &self.rewards {
            reward.add_to(&mut effect);
        }
        effect
    }
}

pub fn open(table: &ChestTable, rng: &mut GameRng) -> ChestOpening {
    let mut rewards: Vec<RolledReward> = table
        .drops
        .roll(rng)
        .into_iter()
        .map(|reward| RolledReward::roll(reward, rng))
        .collect();
    if let Some((count, pool)) = &table.guaranteed {
        for reward in pool.sample_distinct(*count, rng) {
            rewards.push(RolledReward::roll(reward, rng));
        }
    }
    ChestOpening {
        chest: table.chest.clone(),
        rewards,
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChestCatalog {
    chests: HashMap<String, ChestTable>,
}

impl ChestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Result<Self, TableError> {
        let mut catalog = Self::new();
        catalog.insert(ChestTable {
            chest: CHEST_COMMON.to_string(),
            drops: DropTable::from_f64(vec![
                (Reward::currency(Currency::Mora, 100, 500), 1.0),
                (Reward::currency(Currency::Dust, 10, 50), 0.5),
                (Reward::item(ITEM_LUCKY_CHARM, 1), 0.10),
                (Reward::item(ITEM_PADLOCK, 1), 0.05),
                (Reward::item(ITEM_HOT_STREAK, 1), 0.02),
            ])?,
            guaranteed: None,
            exp: 10,
        });
        catalog.insert(ChestTable {
            chest: CHEST_RARE.to_string(),
            drops: DropTable::from_f64(vec![
                (Reward::currency(Currency::Mora, 1_000, 3_000), 1.0),
                (Reward::currency(Currency::Dust, 50, 150), 1.0),
                (Reward::currency(Currency::Fates, 1, 1), 0.25),
            ])?,
            guaranteed: Some((
                2,
                WeightedTable::new(vec![
                    (Reward::item(ITEM_LUCKY_CHARM, 1), 3),
                    (Reward::item(ITEM_PADLOCK, 1), 3),
                    (Reward::item(ITEM_HOT_STREAK, 1), 2),
                    (Reward::chest(CHEST_COMMON, 1), 2),
                ])?,
            )),
            exp: 25,
        });
        catalog.insert(ChestTable {
            chest: CHEST_EPIC.to_string(),
            drops: DropTable::from_f64(vec![
                (Reward::currency(Currency::Mora, 5_000, 15_000), 1.0),
                (Reward::currency(Currency::Fates, 1, 3), 0.75),
            ])?,
            guaranteed: Some((
                3,
                WeightedTable::new(vec![
                    (Reward::item(ITEM_LUCKY_CHARM, 2), 3),
                    (Reward::item(ITEM_PADLOCK, 2), 3),
                    (Reward::item(ITEM_HOT_STREAK, 2), 2),
                    (Reward::chest(CHEST_RARE, 1), 1),
                    (Reward::currency(Currency::Dust, 200, 500), 2),
                ])?,
            )),
            exp: 60,
        });
        Ok(catalog)
    }

    pub fn insert(&mut self, table: ChestTable) {
        self.chests.insert(table.chest.clone(), table);
    }

    pub fn get(&self, chest: &str) -> Option<&ChestTable> {
        self.chests.get(chest)
    }
}
