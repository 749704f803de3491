//! Word scramble: unscramble the word within a limited number of attempts.
//!
//! A hint reveals the first letter and lowers the payout; a skip swaps the word.
//! Both are tracked on the board so each can only be used as configured.

use super::{GameError, SessionAction, Step};
use crate::modifiers::Verdict;
use crate::rng::GameRng;
use mora_types::casino::Multiplier;
use serde::Serialize;

const RESHUFFLES: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrambleRules {
    pub words: Vec<String>,
    pub max_attempts: u8,
    pub max_skips: u8,
    pub win: Multiplier,
    pub hinted_win: Multiplier,
}

impl Default for ScrambleRules {
    fn default() -> Self {
        Self {
            words: [
                "anemo", "archon", "artifact", "commission", "domain", "electro", "geo",
                "hydro", "pyro", "cryo", "dendro", "primogem", "resin", "talent", "wish",
                "constellation", "teapot", "waypoint", "statue", "hilichurl",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_attempts: 3,
            max_skips: 1,
            win: Multiplier::whole(2),
            hinted_win: Multiplier(15_000),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScrambleBoard {
    pub scrambled: String,
    pub attempts_left: u8,
    pub skips_left: u8,
    /// Revealed first letter once a hint was taken.
    pub hint: Option<char>,
    #[serde(skip)]
    answer: String,
    #[serde(skip)]
    rules: ScrambleRules,
}

fn scramble(word: &str, rng: &mut GameRng) -> String {
    let original: Vec<char> = word.chars().collect();
    let mut letters = original.clone();
    for _ in 0..RESHUFFLES {
        rng.shuffle(&mut letters);
        if letters != original {
            break;
        }
    }
    letters.into_iter().collect()
}

impl ScrambleBoard {
    pub fn new(rules: &ScrambleRules, rng: &mut GameRng) -> Result<Self, GameError> {
        let answer = Self::pick(rules, None, rng)?;
        Ok(Self {
            scrambled: scramble(&answer, rng),
            attempts_left: rules.max_attempts.max(1),
            skips_left: rules.max_skips,
            hint: None,
            answer,
            rules: rules.clone(),
        })
    }

    fn pick(
        rules: &ScrambleRules,
        avoid: Option<&str>,
        rng: &mut GameRng,
    ) -> Result<String, GameError> {
        let candidates: Vec<&String> = rules
            .words
            .iter()
            .filter(|word| Some(word.as_str()) != avoid)
            .collect();
        let pool = if candidates.is_empty() {
            rules.words.iter().collect()
        } else {
            candidates
        };
        if pool.is_empty() {
            return Err(GameError::InvalidParams("scramble has no words".to_string()));
        }
        Ok(pool[rng.below(pool.len() as u64) as usize].to_lowercase())
    }

    /// Payout a correct guess would earn now.
    pub fn multiplier(&self) -> Multiplier {
        if self.hint.is_some() {
            self.rules.hinted_win
        } else {
            self.rules.win
        }
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub(crate) fn act(&mut self, action: &SessionAction, rng: &mut GameRng) -> Result<Step, GameError> {
        match action {
            SessionAction::Guess { word } => {
                if word.trim().eq_ignore_ascii_case(&self.answer) {
                    return Ok(Step::Resolved {
                        verdict: Verdict::Win(self.multiplier()),
                    });
                }
                self.attempts_left = self.attempts_left.saturating_sub(1);
                if self.attempts_left == 0 {
                    return Ok(Step::Resolved {
                        verdict: Verdict::Loss,
                    });
                }
            }
            SessionAction::Hint => {
                if self.hint.is_some() {
                    return Err(GameError::InvalidMove("hint already used".to_string()));
                }
                self.hint = self.answer.chars().next();
            }
            SessionAction::Skip => {
                if self.skips_left == 0 {
                    return Err(GameError::InvalidMove("no skips left".to_string()));
                }
                self.skips_left -= 1;
                self.answer = Self::pick(&self.rules, Some(&self.answer), rng)?;
                self.scrambled = scramble(&self.answer, rng);
                self.hint = None;
            }
            other => return Err(GameError::InvalidMove(format!("{other:?} in scramble"))),
        }
        Ok(Step::Continue {
            multiplier: self.multiplier(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(words: &[&str]) -> ScrambleRules {
        ScrambleRules {
            words: words.iter().map(|w| w.to_string()).collect(),
            ..ScrambleRules::default()
        }
    }

    #[test]
    fn test_scrambled_word_is_a_permutation() {
        let mut rng = GameRng::from_seed(6);
        let board = ScrambleBoard::new(&rules(&["constellation"]), &mut rng).unwrap();
        let mut a: Vec<char> = board.scrambled.chars().collect();
        let mut b: Vec<char> = board.answer().chars().collect();
        assert_ne!(board.scrambled, board.answer());
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }

    #[test]
    fn test_correct_guess_wins_and_hint_lowers_payout() {
        let mut rng = GameRng::from_seed(7);
        let mut board = ScrambleBoard::new(&rules(&["teapot"]), &mut rng).unwrap();
        assert_eq!(
            board.act(&SessionAction::Hint, &mut rng).unwrap(),
            Step::Continue {
                multiplier: Multiplier(15_000)
            }
        );
        assert_eq!(board.hint, Some('t'));
        assert!(board.act(&SessionAction::Hint, &mut rng).is_err());
        assert_eq!(
            board
                .act(&SessionAction::Guess { word: " TEAPOT ".into() }, &mut rng)
                .unwrap(),
            Step::Resolved {
                verdict: Verdict::Win(Multiplier(15_000))
            }
        );
    }

    #[test]
    fn test_attempts_run_out() {
        let mut rng = GameRng::from_seed(8);
        let mut board = ScrambleBoard::new(&rules(&["resin"]), &mut rng).unwrap();
        let wrong = SessionAction::Guess { word: "risen".into() };
        assert!(matches!(board.act(&wrong, &mut rng).unwrap(), Step::Continue { .. }));
        assert!(matches!(board.act(&wrong, &mut rng).unwrap(), Step::Continue { .. }));
        assert_eq!(
            board.act(&wrong, &mut rng).unwrap(),
            Step::Resolved {
                verdict: Verdict::Loss
            }
        );
    }

    #[test]
    fn test_skip_swaps_word_once() {
        let mut rng = GameRng::from_seed(9);
        let mut board = ScrambleBoard::new(&rules(&["geo", "pyro"]), &mut rng).unwrap();
        let first = board.answer().to_string();
        board.act(&SessionAction::Skip, &mut rng).unwrap();
        assert_ne!(board.answer(), first);
        assert!(board.act(&SessionAction::Skip, &mut rng).is_err());
    }

    #[test]
    fn test_empty_word_list_rejected() {
        let mut rng = GameRng::from_seed(1);
        assert!(ScrambleBoard::new(&rules(&[]), &mut rng).is_err());
    }
}
