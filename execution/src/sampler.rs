//! Weighted outcome sampling.
//!
//! Weights are stored as fixed-point integers ([`WEIGHT_SCALE`] parts per unit) so that
//! small probabilities such as 0.001 are represented exactly and sampling is a single
//! integer draw over the table total. Supported draw shapes:
//!
//! - [`WeightedTable::sample`]: mutually exclusive single pick.
//! - [`WeightedTable::sample_distinct`]: K picks without replacement.
//! - [`DropTable::roll`]: independent Bernoulli trial per entry (zero or more hits).
//! - [`TieredTable::sample_with_pity`]: two-stage pick with a forced top tier once a
//!   counter reaches its threshold.

use crate::rng::GameRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point parts per unit weight / probability.
pub const WEIGHT_SCALE: u64 = 1_000_000;

/// Invalid sampler configuration. These are programmer errors and are raised when a
/// table is built, never at draw time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("weighted table is empty")]
    Empty,
    #[error("weighted table has no positive weight")]
    AllZeroWeights,
    #[error("weight at index {index} is not a finite non-negative number: {weight}")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("probability must be within [0, 1]: {0}")]
    InvalidProbability(f64),
    #[error("weighted table total overflows")]
    Overflow,
    #[error("tier {0} has positive weight but no item table")]
    MissingTier(String),
}

/// Convert an f64 weight to fixed point, rounding to the nearest part.
pub fn to_fixed(weight: f64) -> Option<u64> {
    if !weight.is_finite() || weight < 0.0 {
        return None;
    }
    let scaled = (weight * WEIGHT_SCALE as f64).round();
    if scaled > u64::MAX as f64 {
        return None;
    }
    Some(scaled as u64)
}

/// Probability in fixed point, always within `[0, WEIGHT_SCALE]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Probability(u64);

impl Probability {
    pub const NEVER: Probability = Probability(0);
    pub const ALWAYS: Probability = Probability(WEIGHT_SCALE);

    pub fn new(p: f64) -> Result<Self, TableError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(TableError::InvalidProbability(p));
        }
        to_fixed(p)
            .map(Probability)
            .ok_or(TableError::InvalidProbability(p))
    }

    /// Parts per [`WEIGHT_SCALE`], clamped to 1.
    pub const fn from_parts(parts: u64) -> Self {
        if parts > WEIGHT_SCALE {
            Probability(WEIGHT_SCALE)
        } else {
            Probability(parts)
        }
    }

    /// Shorthand for percentages in static configuration (`percent(5)` = 0.05).
    pub const fn percent(percent: u64) -> Self {
        Self::from_parts(percent * (WEIGHT_SCALE / 100))
    }

    pub fn parts(&self) -> u64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / WEIGHT_SCALE as f64
    }
}

/// Ordered `(outcome, weight)` entries with a positive total.
#[derive(Clone, Debug)]
pub struct WeightedTable<T> {
    entries: Vec<(T, u64)>,
    total: u64,
}

impl<T> WeightedTable<T> {
    /// Build from fixed-point (or plain integer) weights.
    pub fn new(entries: Vec<(T, u64)>) -> Result<Self, TableError> {
        if entries.is_empty() {
            return Err(TableError::Empty);
        }
        let total = entries
            .iter()
            .try_fold(0u64, |acc, (_, weight)| acc.checked_add(*weight))
            .ok_or(TableError::Overflow)?;
        if total == 0 {
            return Err(TableError::AllZeroWeights);
        }
        Ok(Self { entries, total })
    }

    /// Build from floating-point weights, converted to fixed point.
    pub fn from_f64(entries: Vec<(T, f64)>) -> Result<Self, TableError> {
        let mut fixed = Vec::with_capacity(entries.len());
        for (index, (outcome, weight)) in entries.into_iter().enumerate() {
            let parts = to_fixed(weight).ok_or(TableError::InvalidWeight { index, weight })?;
            fixed.push((outcome, parts));
        }
        Self::new(fixed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn entries(&self) -> impl Iterator<Item = (&T, u64)> {
        self.entries.iter().map(|(outcome, weight)| (outcome, *weight))
    }

    /// Configured probability of the entry at `index`.
    pub fn probability_of(&self, index: usize) -> f64 {
        self.entries
            .get(index)
            .map(|(_, weight)| *weight as f64 / self.total as f64)
            .unwrap_or(0.0)
    }

    pub fn pick_index(&self, rng: &mut GameRng) -> usize {
        let mut roll = rng.below(self.total);
        for (index, (_, weight)) in self.entries.iter().enumerate() {
            if roll < *weight {
                return index;
            }
            roll -= weight;
        }
        // Unreachable while total == sum(weights); keep the last positive entry.
        self.entries
            .iter()
            .rposition(|(_, weight)| *weight > 0)
            .unwrap_or(0)
    }

    pub fn sample(&self, rng: &mut GameRng) -> &T {
        &self.entries[self.pick_index(rng)].0
    }

    /// Up to `k` distinct entries, each pick renormalised over what is left. Entries
    /// with zero weight are never chosen, so the result is capped at the number of
    /// positive-weight entries.
    pub fn sample_distinct(&self, k: usize, rng: &mut GameRng) -> Vec<&T> {
        let mut pool: Vec<usize> = (0..self.entries.len())
            .filter(|index| self.entries[*index].1 > 0)
            .collect();
        let mut remaining = self.total;
        let mut picked = Vec::with_capacity(k.min(pool.len()));

        while picked.len() < k && !pool.is_empty() {
            let mut roll = rng.below(remaining);
            let mut chosen = pool.len() - 1;
            for (slot, index) in pool.iter().enumerate() {
                let weight = self.entries[*index].1;
                if roll < weight {
                    chosen = slot;
                    break;
                }
                roll -= weight;
            }
            let index = pool.swap_remove(chosen);
            remaining -= self.entries[index].1;
            picked.push(&self.entries[index].0);
        }
        picked
    }
}

/// Independent per-entry drop chances.
#[derive(Clone, Debug)]
pub struct DropTable<T> {
    slots: Vec<(T, Probability)>,
}

impl<T> DropTable<T> {
    pub fn new(slots: Vec<(T, Probability)>) -> Self {
        Self { slots }
    }

    pub fn from_f64(slots: Vec<(T, f64)>) -> Result<Self, TableError> {
        let slots = slots
            .into_iter()
            .map(|(outcome, p)| Probability::new(p).map(|p| (outcome, p)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every slot is trialled; any number may fire.
    pub fn roll(&self, rng: &mut GameRng) -> Vec<&T> {
        self.slots
            .iter()
            .filter(|(_, probability)| rng.chance(*probability))
            .map(|(outcome, _)| outcome)
            .collect()
    }
}

/// Pity configuration for the top tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityRule {
    /// Draw count at which the top tier is forced. Zero disables pity.
    pub threshold: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PityDraw<'a, Tier, T> {
    pub tier: &'a Tier,
    pub item: &'a T,
    pub forced: bool,
}

/// Two-stage table: pick a tier, then an item within it.
#[derive(Clone, Debug)]
pub struct TieredTable<Tier, T> {
    tiers: WeightedTable<Tier>,
    items: Vec<(Tier, WeightedTable<T>)>,
    top: Tier,
}

impl<Tier: PartialEq + std::fmt::Debug, T> TieredTable<Tier, T> {
    /// Every tier that can be drawn, plus `top` (reachable through pity even at zero
    /// weight), needs an item table.
    pub fn new(
        tiers: WeightedTable<Tier>,
        items: Vec<(Tier, WeightedTable<T>)>,
        top: Tier,
    ) -> Result<Self, TableError> {
        let has_items = |tier: &Tier| items.iter().any(|(t, _)| t == tier);
        for (tier, weight) in tiers.entries() {
            if weight > 0 && !has_items(tier) {
                return Err(TableError::MissingTier(format!("{tier:?}")));
            }
        }
        if !has_items(&top) {
            return Err(TableError::MissingTier(format!("{top:?}")));
        }
        Ok(Self { tiers, items, top })
    }

    pub fn top(&self) -> &Tier {
        &self.top
    }

    fn items_for(&self, tier: &Tier) -> &WeightedTable<T> {
        // `new` guarantees an entry for every drawable tier.
        &self
            .items
            .iter()
            .find(|(t, _)| t == tier)
            .unwrap_or(&self.items[0])
            .1
    }

    pub fn sample(&self, rng: &mut GameRng) -> (&Tier, &T) {
        let tier = self.tiers.sample(rng);
        (tier, self.items_for(tier).sample(rng))
    }

    /// `counter` counts draws since the last top-tier result. It is incremented for
    /// this draw first; reaching the threshold forces the top tier. Any top-tier
    /// result, forced or natural, resets it to zero.
    pub fn sample_with_pity(
        &self,
        counter: &mut u32,
        rule: PityRule,
        rng: &mut GameRng,
    ) -> PityDraw<'_, Tier, T> {
        *counter = counter.saturating_add(1);
        let forced = rule.threshold > 0 && *counter >= rule.threshold;
        let tier = if forced {
            &self.top
        } else {
            self.tiers.sample(rng)
        };
        if *tier == self.top {
            *counter = 0;
        }
        PityDraw {
            tier,
            item: self.items_for(tier).sample(rng),
            forced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_zero_weights_fail_fast() {
        let table = WeightedTable::new(vec![("a", 0), ("b", 0)]);
        assert_eq!(table.unwrap_err(), TableError::AllZeroWeights);
        assert_eq!(
            WeightedTable::<&str>::new(vec![]).unwrap_err(),
            TableError::Empty
        );
        assert!(matches!(
            WeightedTable::from_f64(vec![("a", -1.0)]),
            Err(TableError::InvalidWeight { index: 0, .. })
        ));
        assert!(matches!(
            WeightedTable::from_f64(vec![("a", f64::NAN)]),
            Err(TableError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_small_weights_are_exact() {
        let table = WeightedTable::from_f64(vec![("rare", 0.001), ("common", 0.999)]).unwrap();
        assert_eq!(table.entries().next().map(|(_, w)| w), Some(1_000));
        assert_eq!(table.total_weight(), WEIGHT_SCALE);
    }

    #[test]
    fn test_weighted_sampling_converges() {
        let table =
            WeightedTable::from_f64(vec![("A", 0.7), ("B", 0.25), ("C", 0.05)]).unwrap();
        let mut rng = GameRng::from_seed(42);
        let mut counts = [0u32; 3];
        let draws = 1_000_000;
        for _ in 0..draws {
            counts[table.pick_index(&mut rng)] += 1;
        }
        for (index, expected) in [0.7, 0.25, 0.05].into_iter().enumerate() {
            let observed = counts[index] as f64 / draws as f64;
            assert!(
                (observed - expected).abs() < 0.005,
                "entry {index}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_zero_weight_entry_never_drawn() {
        let table = WeightedTable::new(vec![("never", 0), ("always", 5)]).unwrap();
        let mut rng = GameRng::from_seed(5);
        for _ in 0..10_000 {
            assert_eq!(*table.sample(&mut rng), "always");
        }
    }

    #[test]
    fn test_sample_distinct_without_replacement() {
        let table = WeightedTable::new(vec![(1, 10), (2, 10), (3, 10), (4, 0)]).unwrap();
        let mut rng = GameRng::from_seed(11);
        for _ in 0..200 {
            let mut picks: Vec<i32> = table.sample_distinct(2, &mut rng).into_iter().copied().collect();
            picks.sort_unstable();
            picks.dedup();
            assert_eq!(picks.len(), 2);
            assert!(!picks.contains(&4));
        }
        // K larger than the positive pool is capped.
        let all = table.sample_distinct(10, &mut rng);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_drop_table_is_independent_per_slot() {
        let drops = DropTable::from_f64(vec![("x", 1.0), ("y", 0.0), ("z", 1.0)]).unwrap();
        let mut rng = GameRng::from_seed(2);
        for _ in 0..100 {
            assert_eq!(drops.roll(&mut rng), vec![&"x", &"z"]);
        }
        assert!(matches!(
            DropTable::from_f64(vec![("bad", 1.5)]),
            Err(TableError::InvalidProbability(_))
        ));
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Tier {
        Top,
        Low,
    }

    fn tiered(top_weight: u64) -> TieredTable<Tier, &'static str> {
        TieredTable::new(
            WeightedTable::new(vec![(Tier::Top, top_weight), (Tier::Low, 1_000)]).unwrap(),
            vec![
                (Tier::Top, WeightedTable::new(vec![("star", 1)]).unwrap()),
                (Tier::Low, WeightedTable::new(vec![("pebble", 1)]).unwrap()),
            ],
            Tier::Top,
        )
        .unwrap()
    }

    #[test]
    fn test_pity_forces_top_tier_on_threshold() {
        let table = tiered(0);
        let rule = PityRule { threshold: 100 };
        let mut rng = GameRng::from_seed(8);
        let mut counter = 0;
        for draw in 1..100 {
            let result = table.sample_with_pity(&mut counter, rule, &mut rng);
            assert_eq!(*result.tier, Tier::Low);
            assert_eq!(counter, draw);
        }
        let result = table.sample_with_pity(&mut counter, rule, &mut rng);
        assert_eq!(*result.tier, Tier::Top);
        assert_eq!(*result.item, "star");
        assert!(result.forced);
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_natural_top_tier_resets_counter() {
        let table = TieredTable::new(
            WeightedTable::new(vec![(Tier::Top, 1), (Tier::Low, 0)]).unwrap(),
            vec![(Tier::Top, WeightedTable::new(vec![("star", 1)]).unwrap())],
            Tier::Top,
        )
        .unwrap();
        let mut rng = GameRng::from_seed(8);
        let mut counter = 37;
        let result = table.sample_with_pity(&mut counter, PityRule { threshold: 90 }, &mut rng);
        assert!(!result.forced);
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_tier_without_items_is_rejected() {
        let result = TieredTable::<Tier, &str>::new(
            WeightedTable::new(vec![(Tier::Top, 1), (Tier::Low, 1)]).unwrap(),
            vec![(Tier::Top, WeightedTable::new(vec![("star", 1)]).unwrap())],
            Tier::Top,
        );
        assert!(matches!(result, Err(TableError::MissingTier(_))));
    }
}
