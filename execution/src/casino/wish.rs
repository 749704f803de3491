//! Wish banner: a two-stage draw (rarity, then reward) with a persistent pity counter.

use super::chest::RolledReward;
use crate::rng::GameRng;
use crate::sampler::{PityRule, TableError, TieredTable, WeightedTable};
use crate::state::signed;
use mora_types::casino::{
    Currency, EconomicEffect, Reward, CHEST_COMMON, CHEST_EPIC, CHEST_RARE,
    ITEM_HOT_STREAK, ITEM_LUCKY_CHARM, ITEM_PADLOCK, WISH_COST_FATES,
};
use serde::{Deserialize, Serialize};

pub const STANDARD_BANNER: &str = "standard";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    FiveStar,
    FourStar,
    ThreeStar,
}

#[derive(Clone, Debug)]
pub struct Banner {
    pub name: String,
    pub table: TieredTable<Rarity, Reward>,
    pub pity: PityRule,
    pub cost_fates: u64,
    /// Dust granted alongside each pull of a tier.
    pub dust: Vec<(Rarity, u64)>,
}

impl Banner {
    pub fn standard(pity_threshold: u32) -> Result<Self, TableError> {
        let tiers = WeightedTable::from_f64(vec![
            (Rarity::FiveStar, 0.006),
            (Rarity::FourStar, 0.051),
            (Rarity::ThreeStar, 0.943),
        ])?;
        let items = vec![
            (
                Rarity::FiveStar,
                WeightedTable::new(vec![
                    (Reward::chest(CHEST_EPIC, 1), 1),
                    (Reward::currency(Currency::Mora, 50_000, 100_000), 1),
                ])?,
            ),
            (
                Rarity::FourStar,
                WeightedTable::new(vec![
                    (Reward::chest(CHEST_RARE, 1), 2),
                    (Reward::item(ITEM_LUCKY_CHARM, 3), 2),
                    (Reward::item(ITEM_PADLOCK, 2), 1),
                    (Reward::item(ITEM_HOT_STREAK, 2), 1),
                ])?,
            ),
            (
                Rarity::ThreeStar,
                WeightedTable::new(vec![
                    (Reward::currency(Currency::Mora, 500, 1_500), 3),
                    (Reward::chest(CHEST_COMMON, 1), 1),
                ])?,
            ),
        ];
        Ok(Self {
            name: STANDARD_BANNER.to_string(),
            table: TieredTable::new(tiers, items, Rarity::FiveStar)?,
            pity: PityRule {
                threshold: pity_threshold,
            },
            cost_fates: WISH_COST_FATES,
            dust: vec![(Rarity::FourStar, 50), (Rarity::ThreeStar, 15)],
        })
    }

    fn dust_for(&self, rarity: Rarity) -> u64 {
        self.dust
            .iter()
            .find(|(r, _)| *r == rarity)
            .map(|(_, dust)| *dust)
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WishPull {
    pub rarity: Rarity,
    pub reward: RolledReward,
    pub forced: bool,
    pub dust: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WishOutcome {
    pub banner: String,
    pub pulls: Vec<WishPull>,
    /// Counter value stored after the last pull.
    pub pity_after: u32,
}

impl WishOutcome {
    /// Fates charged for these pulls.
    pub fn cost(&self, cost_fates: u64) -> u64 {
        cost_fates.saturating_mul(self.pulls.len() as u64)
    }

    /// Everything the pulls grant. The cost is debited separately, before the
    /// grants, so fates won by a pull never fund the same wish.
    pub fn reward_effect(&self) -> EconomicEffect {
        let mut effect = EconomicEffect::new();
        for pull in &self.pulls {
            pull.reward.add_to(&mut effect);
            effect.add_currency(Currency::Dust, signed(pull.dust));
        }
        effect
    }
}

/// Draw `count` pulls, advancing `counter` (draws since the last top-tier result).
pub fn pull(banner: &Banner, counter: &mut u32, count: u32, rng: &mut GameRng) -> WishOutcome {
    let pulls = (0..count)
        .map(|_| {
            let draw = banner.table.sample_with_pity(counter, banner.pity, rng);
            let rarity = *draw.tier;
            WishPull {
                rarity,
                reward: RolledReward::roll(draw.item, rng),
                forced: draw.forced,
                dust: banner.dust_for(rarity),
            }
        })
        .collect();
    WishOutcome {
        banner: banner.name.clone(),
        pulls,
        pity_after: *counter,
    }
}
