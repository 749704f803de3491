//! Three-reel slot machine. Each reel is an independent weighted pick.

use super::{GameDetails, Resolution};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use crate::sampler::{TableError, WeightedTable};
use mora_types::casino::{Multiplier, ACHIEVEMENT_JACKPOT};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Cherry,
    Lemon,
    Bell,
    Diamond,
    Seven,
}

#[derive(Clone, Debug)]
pub struct SlotsRules {
    pub reel: WeightedTable<Symbol>,
    /// Total return for three of a kind.
    pub triples: Vec<(Symbol, Multiplier)>,
    /// Total return for exactly two of a kind.
    pub pairs: Vec<(Symbol, Multiplier)>,
}

impl SlotsRules {
    pub fn standard() -> Result<Self, TableError> {
        Ok(Self {
            reel: WeightedTable::new(vec![
                (Symbol::Cherry, 40),
                (Symbol::Lemon, 30),
                (Symbol::Bell, 15),
                (Symbol::Diamond, 10),
                (Symbol::Seven, 5),
            ])?,
            triples: vec![
                (Symbol::Seven, Multiplier::whole(100)),
                (Symbol::Diamond, Multiplier::whole(25)),
                (Symbol::Bell, Multiplier::whole(10)),
                (Symbol::Lemon, Multiplier::whole(5)),
                (Symbol::Cherry, Multiplier::whole(3)),
            ],
            pairs: vec![(Symbol::Cherry, Multiplier::whole(2))],
        })
    }

    fn lookup(table: &[(Symbol, Multiplier)], symbol: Symbol) -> Option<Multiplier> {
        table
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, multiplier)| *multiplier)
    }

    pub fn score(&self, reels: [Symbol; 3]) -> Option<Multiplier> {
        let [a, b, c] = reels;
        if a == b && b == c {
            return Self::lookup(&self.triples, a);
        }
        let pair = if a == b || a == c {
            Some(a)
        } else if b == c {
            Some(b)
        } else {
            None
        };
        pair.and_then(|symbol| Self::lookup(&self.pairs, symbol))
    }
}

pub fn resolve(rules: &SlotsRules, rng: &mut GameRng) -> Resolution {
    let reels = [
        *rules.reel.sample(rng),
        *rules.reel.sample(rng),
        *rules.reel.sample(rng),
    ];
    let verdict = rules
        .score(reels)
        .map(Verdict::Win)
        .unwrap_or(Verdict::Loss);
    let achievements = if reels == [Symbol::Seven; 3] {
        vec![ACHIEVEMENT_JACKPOT]
    } else {
        Vec::new()
    };
    Resolution {
        verdict,
        details: GameDetails::Slots { reels },
        achievements,
        standard_win: Some(Multiplier::whole(2)),
    }
}
