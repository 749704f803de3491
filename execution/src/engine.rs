//! Engine facade.
//!
//! [`Engine`] wires the sampler, modifier pipeline, settlement engine, progression
//! tracker and session coordinator behind the inbound operations: games, chests,
//! wishes, robbery, daily claims, transfers and admin grants. Every committed
//! settlement is reported to the configured [`SettlementListener`].

use crate::casino::chest::{self, ChestCatalog, ChestOpening};
use crate::casino::daily::{self, ClaimError, DailyClaim, DailyRules};
use crate::casino::registry::{BetLimits, GameRegistry};
use crate::casino::rob::{self, RobError, RobOutcome, RobResult, RobRules};
use crate::casino::wish::{self, Banner, WishOutcome};
use crate::casino::{resolve_instant, GameError, GameParams, Resolution, SessionAction};
use crate::listener::{Activity, LogListener, OutcomeSummary, SettledEvent, SettlementListener};
use crate::metrics::{EngineMetrics, EngineMetricsSnapshot};
use crate::payout::{settle_verdict, GamePayout, PlayContext};
use crate::progression::{self, LevelUp};
use crate::rng::RngSource;
use crate::sampler::TableError;
use crate::session::{SessionCoordinator, SessionError, SessionStart, SessionStep, SessionView};
use crate::settlement::{
    apply_effect, RetryPolicy, Retryable, SettleError, Settlement, SettlementResult,
};
use crate::state::{pity_key, signed, Ledger, StoreError};
use mora_types::casino::{
    Account, Currency, DebitPolicy, EconomicEffect, GameKind, InventoryEntry, ProgressionRecord,
    UserId, DEFAULT_PITY_THRESHOLD,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

#[cfg(any(test, feature = "mocks"))]
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime values for an engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub session_timeout: Duration,
    pub pity_threshold: u32,
    pub rob: RobRules,
    pub daily: DailyRules,
    /// Per-game overrides applied on top of the default limits.
    pub bet_limits: Vec<(GameKind, BetLimits)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            session_timeout: crate::casino::registry::DEFAULT_SESSION_TIMEOUT,
            pity_threshold: DEFAULT_PITY_THRESHOLD,
            rob: RobRules::default(),
            daily: DailyRules::default(),
            bet_limits: Vec::new(),
        }
    }
}

/// Premium and admin status, owned by an external service.
pub trait PremiumLookup: Send + Sync {
    fn is_premium(&self, user: UserId) -> bool;

    /// Admin accounts skip the maximum bet.
    fn is_admin(&self, _user: UserId) -> bool {
        false
    }
}

/// Fixed premium and admin sets.
#[derive(Clone, Debug, Default)]
pub struct StaticPremium {
    premium: HashSet<UserId>,
    admins: HashSet<UserId>,
}

impl StaticPremium {
    pub fn new(
        premium: impl IntoIterator<Item = UserId>,
        admins: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            premium: premium.into_iter().collect(),
            admins: admins.into_iter().collect(),
        }
    }
}

impl PremiumLookup for StaticPremium {
    fn is_premium(&self, user: UserId) -> bool {
        self.premium.contains(&user)
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }
}

/// Unix-seconds clock for cooldowns.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}

/// Clock moved by hand in tests.
#[cfg(any(test, feature = "mocks"))]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

#[cfg(any(test, feature = "mocks"))]
impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_secs(), Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "mocks"))]
impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Invalid engine wiring, raised by [`EngineBuilder::build`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("bet limits: {0}")]
    Limits(#[from] GameError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvokeError {
    #[error("insufficient {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: u64,
        available: u64,
    },
    #[error("a {0} session is already active")]
    SessionAlreadyActive(GameKind),
    #[error("bet {bet} outside {min}..={max}")]
    InvalidBet { bet: u64, min: u64, max: u64 },
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("{0} is disabled")]
    GameDisabled(GameKind),
    #[error(transparent)]
    Settlement(SettleError),
    #[error(transparent)]
    Session(SessionError),
}

impl From<SettleError> for InvokeError {
    fn from(err: SettleError) -> Self {
        match err {
            SettleError::InsufficientFunds {
                currency,
                needed,
                available,
            } => InvokeError::InsufficientFunds {
                currency,
                needed,
                available,
            },
            other => InvokeError::Settlement(other),
        }
    }
}

impl From<StoreError> for InvokeError {
    fn from(err: StoreError) -> Self {
        SettleError::from(err).into()
    }
}

impl From<SessionError> for InvokeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyActive(kind) => InvokeError::SessionAlreadyActive(kind),
            SessionError::Game(err) => InvokeError::InvalidParams(err.to_string()),
            SessionError::Escrow(err) => err.into(),
            other => InvokeError::Session(other),
        }
    }
}

impl Retryable for InvokeError {
    fn is_transient(&self) -> bool {
        matches!(self, InvokeError::Settlement(err) if err.is_transient())
    }

    fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            InvokeError::Settlement(err) => InvokeError::Settlement(err.into_exhausted(attempts)),
            other => other,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LootError {
    #[error("unknown chest {0}")]
    UnknownChest(String),
    #[error("no {0} to open")]
    NoChest(String),
    #[error("wishes come in 1 or 10 pulls, not {0}")]
    InvalidPulls(u32),
    #[error(transparent)]
    Settlement(#[from] SettleError),
}

impl From<StoreError> for LootError {
    fn from(err: StoreError) -> Self {
        LootError::Settlement(err.into())
    }
}

impl Retryable for LootError {
    fn is_transient(&self) -> bool {
        matches!(self, LootError::Settlement(err) if err.is_transient())
    }

    fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            LootError::Settlement(err) => LootError::Settlement(err.into_exhausted(attempts)),
            other => other,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    #[error("cannot transfer to yourself")]
    SelfTransfer,
    #[error("transfer amount must be positive")]
    ZeroAmount,
    #[error(transparent)]
    Settlement(#[from] SettleError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstantPlay {
    pub kind: GameKind,
    pub resolution: Resolution,
    pub payout: GamePayout,
}

/// What `invoke_game` hands back: a settled instant game or a newly opened session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingResult {
    Instant(InstantPlay),
    Session(SessionView),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChestResult {
    pub opening: ChestOpening,
    /// Net effect, the consumed chest included.
    pub effect: EconomicEffect,
    pub settlement: SettlementResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WishResult {
    pub outcome: WishOutcome,
    /// Net effect, the fates spent included.
    pub effect: EconomicEffect,
    pub settlement: SettlementResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub from: SettlementResult,
    pub to: SettlementResult,
}

/// Display-only view of one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub account: Account,
    pub inventory: Vec<InventoryEntry>,
    pub progression: ProgressionRecord,
    pub achievements: BTreeSet<String>,
    pub badges: BTreeSet<String>,
}

pub struct EngineBuilder<L: Ledger> {
    ledger: Arc<L>,
    config: EngineConfig,
    registry: Option<GameRegistry>,
    chests: Option<ChestCatalog>,
    banner: Option<Banner>,
    rng: Option<RngSource>,
    premium: Arc<dyn PremiumLookup>,
    clock: Arc<dyn Clock>,
    listener: Arc<dyn SettlementListener>,
}

impl<L: Ledger> EngineBuilder<L> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: GameRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn chests(mut self, chests: ChestCatalog) -> Self {
        self.chests = Some(chests);
        self
    }

    pub fn banner(mut self, banner: Banner) -> Self {
        self.banner = Some(banner);
        self
    }

    pub fn rng(mut self, rng: RngSource) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn premium(mut self, premium: Arc<dyn PremiumLookup>) -> Self {
        self.premium = premium;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn SettlementListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Build the engine. Fails on an invalid table or bet limit.
    pub fn build(self) -> Result<Engine<L>, BuildError> {
        let mut registry = match self.registry {
            Some(registry) => registry,
            None => GameRegistry::new()?,
        };
        registry.set_session_timeout(self.config.session_timeout);
        for (kind, limits) in &self.config.bet_limits {
            registry.set_limits(*kind, *limits)?;
        }
        let chests = match self.chests {
            Some(chests) => chests,
            None => ChestCatalog::standard()?,
        };
        let banner = match self.banner {
            Some(banner) => banner,
            None => Banner::standard(self.config.pity_threshold)?,
        };

        let metrics = Arc::new(EngineMetrics::default());
        let settlement = Arc::new(Settlement::new(
            self.ledger,
            self.config.retry,
            metrics,
        ));
        let rng = Arc::new(self.rng.unwrap_or_else(RngSource::from_entropy));
        let sessions =
            SessionCoordinator::new(settlement.clone(), rng.clone(), self.listener.clone());
        Ok(Engine {
            settlement,
            sessions,
            registry,
            chests,
            banner: Arc::new(banner),
            rob: self.config.rob,
            daily: self.config.daily,
            rng,
            premium: self.premium,
            clock: self.clock,
            listener: self.listener,
        })
    }
}

pub struct Engine<L: Ledger> {
    settlement: Arc<Settlement<L>>,
    sessions: SessionCoordinator<L>,
    registry: GameRegistry,
    chests: ChestCatalog,
    banner: Arc<Banner>,
    rob: RobRules,
    daily: DailyRules,
    rng: Arc<RngSource>,
    premium: Arc<dyn PremiumLookup>,
    clock: Arc<dyn Clock>,
    listener: Arc<dyn SettlementListener>,
}

impl<L: Ledger> Engine<L> {
    pub fn builder(ledger: Arc<L>) -> EngineBuilder<L> {
        EngineBuilder {
            ledger,
            config: EngineConfig::default(),
            registry: None,
            chests: None,
            banner: None,
            rng: None,
            premium: Arc::new(StaticPremium::default()),
            clock: Arc::new(SystemClock),
            listener: Arc::new(LogListener),
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        self.settlement.ledger()
    }

    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionCoordinator<L> {
        &self.sessions
    }

    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.settlement.metrics().snapshot()
    }

    fn notify(
        &self,
        user: UserId,
        activity: Activity,
        effect: EconomicEffect,
        summary: OutcomeSummary,
        account: Account,
    ) {
        self.listener.on_settled(&SettledEvent {
            user,
            activity,
            effect,
            summary,
            account,
        });
    }

    fn check_bet(&self, user: UserId, limits: &BetLimits, bet: u64) -> Result<(), InvokeError> {
        let max = if self.premium.is_admin(user) {
            u64::MAX
        } else {
            limits.max_for(self.premium.is_premium(user))
        };
        if bet < limits.min || bet > max {
            return Err(InvokeError::InvalidBet {
                bet,
                min: limits.min,
                max,
            });
        }
        Ok(())
    }

    /// Start a game. Instant games settle before returning; session games return
    /// the opened session with the bet escrowed.
    pub async fn invoke_game(
        &self,
        user: UserId,
        kind: GameKind,
        bet: u64,
        params: GameParams,
    ) -> Result<PendingResult, InvokeError> {
        if params.kind() != kind {
            return Err(InvokeError::InvalidParams(format!(
                "parameters for {} sent to {kind}",
                params.kind()
            )));
        }
        if !self.registry.is_active(kind) {
            return Err(InvokeError::GameDisabled(kind));
        }
        let config = self
            .registry
            .get_config(kind)
            .ok_or(InvokeError::GameDisabled(kind))?;
        self.check_bet(user, &config.limits, bet)?;
        let premium = self.premium.is_premium(user);

        if kind.is_session() {
            let view = self
                .sessions
                .start(SessionStart {
                    user,
                    bet,
                    premium,
                    params,
                    config: Arc::new(config.clone()),
                })
                .await?;
            return Ok(PendingResult::Session(view));
        }

        let mut rng = self.rng.derive();
        let resolution = resolve_instant(&params, config, &mut rng)
            .map_err(|err| InvokeError::InvalidParams(err.to_string()))?;
        let play_config = Arc::new(config.clone());
        let verdict = resolution.verdict;
        let standard_win = resolution.standard_win;
        let achievements = resolution.achievements.clone();
        let payout = self
            .settlement
            .commit(move |tx| {
                let mut rng = rng.clone();
                let ctx = PlayContext {
                    user,
                    bet,
                    premium,
                    config: &play_config,
                    standard_win,
                    achievements: &achievements,
                };
                tx.apply_currency(user, Currency::Mora, -signed(bet), DebitPolicy::Reject)?;
                settle_verdict(tx, &ctx, verdict, &mut rng).map_err(InvokeError::from)
            })
            .await?;
        info!(
            %user,
            ?kind,
            bet,
            payout = payout.outcome.payout,
            streak = payout.streak,
            "instant game settled"
        );
        self.notify(
            user,
            Activity::Game { kind },
            payout.effect.clone(),
            payout.summary(&resolution.details),
            payout.settlement.account,
        );
        Ok(PendingResult::Instant(InstantPlay {
            kind,
            resolution,
            payout,
        }))
    }

    pub async fn act(
        &self,
        user: UserId,
        kind: GameKind,
        action: SessionAction,
    ) -> Result<SessionStep, SessionError> {
        self.sessions.act(user, kind, action).await
    }

    /// Consume one chest and grant its drops in the same transaction.
    pub async fn open_chest(&self, user: UserId, chest: &str) -> Result<ChestResult, LootError> {
        let table = self
            .chests
            .get(chest)
            .ok_or_else(|| LootError::UnknownChest(chest.to_string()))?;
        let mut rng = self.rng.derive();
        let opening = chest::open(table, &mut rng);
        let rewards = opening.reward_effect(table.exp);
        let chest_id = chest.to_string();
        let granted = rewards.clone();
        let settlement = self
            .settlement
            .commit(move |tx| {
                tx.apply_item(user, &chest_id, -1).map_err(|err| match err {
                    StoreError::InsufficientItems { .. } => LootError::NoChest(chest_id.clone()),
                    other => other.into(),
                })?;
                apply_effect(tx, user, &granted).map_err(LootError::from)
            })
            .await?;
        let mut effect = rewards;
        effect.add_item(chest, -1);
        info!(%user, chest, drops = opening.rewards.len(), "chest opened");
        self.notify(
            user,
            Activity::Chest {
                chest: chest.to_string(),
            },
            effect.clone(),
            OutcomeSummary::details_only(&opening),
            settlement.account,
        );
        Ok(ChestResult {
            opening,
            effect,
            settlement,
        })
    }

    /// Spend fates on `pulls` wishes (1 or 10), carrying the pity counter.
    pub async fn wish(&self, user: UserId, pulls: u32) -> Result<WishResult, LootError> {
        if pulls != 1 && pulls != 10 {
            return Err(LootError::InvalidPulls(pulls));
        }
        let banner = self.banner.clone();
        let key = pity_key(&banner.name);
        let rng = self.rng.derive();
        let (outcome, settlement) = self
            .settlement
            .commit(move |tx| {
                let mut rng = rng.clone();
                let cost = banner.cost_fates.saturating_mul(u64::from(pulls));
                tx.apply_currency(user, Currency::Fates, -signed(cost), DebitPolicy::Reject)?;
                let mut counter = tx.counter(user, &key)?;
                let outcome = wish::pull(&banner, &mut counter, pulls, &mut rng);
                tx.store_counter(user, &key, counter)?;
                let settlement = apply_effect(tx, user, &outcome.reward_effect())?;
                Ok::<_, LootError>((outcome, settlement))
            })
            .await?;
        let banner = &self.banner;
        let mut effect = outcome.reward_effect();
        effect.add_currency(Currency::Fates, -signed(outcome.cost(banner.cost_fates)));
        info!(%user, banner = %banner.name, pulls, pity = outcome.pity_after, "wish resolved");
        self.notify(
            user,
            Activity::Wish {
                banner: banner.name.clone(),
                pulls,
            },
            effect.clone(),
            OutcomeSummary::details_only(&outcome),
            settlement.account,
        );
        Ok(WishResult {
            outcome,
            effect,
            settlement,
        })
    }

    pub async fn rob(&self, robber: UserId, victim: UserId) -> Result<RobOutcome, RobError> {
        let now = self.clock.now();
        let rules = self.rob;
        let rng = self.rng.derive();
        let outcome = self
            .settlement
            .commit(move |tx| rob::attempt(tx, robber, victim, now, &rules, &mut rng.clone()))
            .await?;
        let delta = match outcome.result {
            RobResult::Success { stolen } => signed(stolen),
            RobResult::Failed { fine } => -signed(fine),
            RobResult::Blocked => 0,
        };
        let mut effect = EconomicEffect::new().with_currency(Currency::Mora, delta);
        for achievement in &outcome.achievements_unlocked {
            effect.add_achievement(achievement.clone());
        }
        info!(%robber, %victim, result = ?outcome.result, "robbery resolved");
        self.notify(
            robber,
            Activity::Rob { victim },
            effect,
            OutcomeSummary::details_only(outcome.result),
            outcome.robber,
        );
        Ok(outcome)
    }

    pub async fn claim_daily(&self, user: UserId) -> Result<DailyClaim, ClaimError> {
        let now = self.clock.now();
        let premium = self.premium.is_premium(user);
        let rules = self.daily;
        let claim = self
            .settlement
            .commit(move |tx| daily::claim(tx, user, premium, now, &rules))
            .await?;
        info!(%user, premium, mora = claim.effect.currency_delta(Currency::Mora), "daily claimed");
        self.notify(
            user,
            Activity::Daily,
            claim.effect.clone(),
            OutcomeSummary::details_only(&claim.settlement.level_up),
            claim.settlement.account,
        );
        Ok(claim)
    }

    /// Move mora between two accounts atomically.
    pub async fn pay(
        &self,
        from: UserId,
        to: UserId,
        amount: u64,
    ) -> Result<TransferResult, TransferError> {
        let effects = [
            (
                from,
                EconomicEffect::new().with_currency(Currency::Mora, -signed(amount)),
            ),
            (
                to,
                EconomicEffect::new().with_currency(Currency::Mora, signed(amount)),
            ),
        ];
        self.transfer(from, to, amount, effects).await
    }

    /// Move items between two inventories atomically.
    pub async fn transfer_item(
        &self,
        from: UserId,
        to: UserId,
        item: &str,
        quantity: u64,
    ) -> Result<TransferResult, TransferError> {
        let effects = [
            (from, EconomicEffect::new().with_item(item, -signed(quantity))),
            (to, EconomicEffect::new().with_item(item, signed(quantity))),
        ];
        self.transfer(from, to, quantity, effects).await
    }

    async fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: u64,
        effects: [(UserId, EconomicEffect); 2],
    ) -> Result<TransferResult, TransferError> {
        if from == to {
            return Err(TransferError::SelfTransfer);
        }
        if amount == 0 {
            return Err(TransferError::ZeroAmount);
        }
        let mut results = self.settlement.settle_all(&effects).await?.into_iter();
        let (Some(sent), Some(received)) = (results.next(), results.next()) else {
            return Err(SettleError::Storage("transfer settled without results".to_string()).into());
        };
        let [(_, debit), _] = effects;
        info!(%from, %to, amount, "transfer settled");
        self.notify(
            from,
            Activity::Transfer { to },
            debit,
            OutcomeSummary::details_only(amount),
            sent.account,
        );
        Ok(TransferResult {
            from: sent,
            to: received,
        })
    }

    /// Admin grant (or debit) of an arbitrary effect.
    pub async fn grant(
        &self,
        user: UserId,
        effect: EconomicEffect,
    ) -> Result<SettlementResult, SettleError> {
        let result = self.settlement.settle(user, &effect).await?;
        debug!(%user, "grant settled");
        self.notify(
            user,
            Activity::Grant,
            effect,
            OutcomeSummary::details_only(&result.currency),
            result.account,
        );
        Ok(result)
    }

    /// Award EXP and resolve level-ups. A zero award changes nothing and reports the
    /// current progression.
    pub async fn award_exp(&self, user: UserId, amount: u64) -> Result<LevelUp, SettleError> {
        let (level_up, account) = self
            .settlement
            .commit(move |tx| {
                let level_up = progression::award_exp(tx, user, amount)?;
                Ok::<_, SettleError>((level_up, tx.account(user)?))
            })
            .await?;
        debug!(%user, amount, level = level_up.new_level, "exp awarded");
        self.notify(
            user,
            Activity::Grant,
            EconomicEffect::new().with_exp(amount),
            OutcomeSummary::details_only(&level_up),
            account,
        );
        Ok(level_up)
    }

    /// Admin reset of every balance.
    pub async fn zero_account(&self, user: UserId) -> Result<Account, SettleError> {
        let account = self
            .settlement
            .commit(move |tx| {
                tx.zero_account(user)?;
                tx.account(user).map_err(SettleError::from)
            })
            .await?;
        info!(%user, "account zeroed");
        Ok(account)
    }

    pub fn account(&self, user: UserId) -> Result<Account, StoreError> {
        self.ledger().read(|tx| tx.account(user))
    }

    pub fn profile(&self, user: UserId) -> Result<Profile, StoreError> {
        self.ledger().read(|tx| {
            Ok(Profile {
                account: tx.account(user)?,
                inventory: tx.inventory(user)?,
                progression: tx.progression(user)?,
                achievements: tx.achievements(user)?,
                badges: tx.badges(user)?,
            })
        })
    }

    pub fn pity(&self, user: UserId) -> Result<u32, StoreError> {
        let key = pity_key(&self.banner.name);
        self.ledger().read(|tx| tx.counter(user, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::casino::chest::{ChestTable, RolledReward};
    use crate::casino::registry::GameRules;
    use crate::casino::slots::SlotsRules;
    use crate::casino::CoinSide;
    use crate::listener::RecordingListener;
    use crate::modifiers::{ModifierPolicy, Verdict};
    use crate::sampler::{DropTable, Probability, WeightedTable};
    use crate::state::Memory;
    use mora_types::casino::{Multiplier, Reward, CHEST_COMMON};
    use proptest::prelude::*;

    const ALICE: UserId = UserId(100);
    const BOB: UserId = UserId(101);
    const NOW: u64 = 1_700_000_000;

    fn quiet_registry() -> GameRegistry {
        let mut registry = GameRegistry::new().unwrap();
        for kind in GameKind::ALL {
            let mut config = registry.get_config(kind).unwrap().clone();
            config.modifiers = ModifierPolicy::disabled();
            registry.set_config(config).unwrap();
        }
        registry
    }

    fn engine(ledger: Arc<Memory>) -> EngineBuilder<Memory> {
        Engine::builder(ledger)
            .registry(quiet_registry())
            .rng(RngSource::seeded(11))
            .clock(Arc::new(ManualClock::new(NOW)))
    }

    async fn fund(engine: &Engine<Memory>, user: UserId, mora: u64) {
        engine
            .grant(
                user,
                EconomicEffect::new().with_currency(Currency::Mora, signed(mora)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forced_double_payout_settles_in_one_step() {
        let mut registry = quiet_registry();
        let mut slots = registry.get_config(GameKind::Slots).unwrap().clone();
        slots.rules = GameRules::Slots(SlotsRules {
            reel: WeightedTable::new(vec![
                (crate::casino::Symbol::Cherry, 1),
                (crate::casino::Symbol::Seven, 0),
            ])
            .unwrap(),
            triples: vec![(crate::casino::Symbol::Cherry, Multiplier::whole(2))],
            pairs: Vec::new(),
        });
        registry.set_config(slots).unwrap();
        let listener = Arc::new(RecordingListener::default());
        let engine = engine(Arc::new(Memory::new()))
            .registry(registry)
            .listener(listener.clone())
            .build()
            .unwrap();
        fund(&engine, ALICE, 1_000).await;

        let result = engine
            .invoke_game(ALICE, GameKind::Slots, 100, GameParams::Slots)
            .await
            .unwrap();
        let PendingResult::Instant(play) = result else {
            panic!("slots is instant");
        };
        assert_eq!(play.resolution.verdict, Verdict::Win(Multiplier::whole(2)));
        assert_eq!(play.payout.settlement.account.mora, 1_100);
        assert_eq!(engine.account(ALICE).unwrap().mora, 1_100);

        let events = listener.events();
        let last = events.last().unwrap();
        assert_eq!(last.activity, Activity::Game { kind: GameKind::Slots });
        assert_eq!(last.effect.currency_delta(Currency::Mora), 100);
        assert_eq!(last.summary.payout, 200);
    }

    #[tokio::test]
    async fn test_bet_limits_and_funds_checked_before_any_mutation() {
        let ledger = Arc::new(Memory::new());
        let engine = engine(ledger.clone())
            .premium(Arc::new(StaticPremium::new([BOB], [])))
            .build()
            .unwrap();
        fund(&engine, ALICE, 100_000).await;
        fund(&engine, BOB, 100_000).await;
        let flip = || GameParams::Coinflip {
            side: CoinSide::Heads,
        };

        let err = engine
            .invoke_game(ALICE, GameKind::Coinflip, 5, flip())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::InvalidBet { bet: 5, .. }));
        let err = engine
            .invoke_game(ALICE, GameKind::Coinflip, 60_000, flip())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::InvalidBet { max: 50_000, .. }));
        assert!(engine
            .invoke_game(BOB, GameKind::Coinflip, 60_000, flip())
            .await
            .is_ok());

        let broke = UserId(102);
        let err = engine
            .invoke_game(broke, GameKind::Coinflip, 100, flip())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InvokeError::InsufficientFunds {
                currency: Currency::Mora,
                needed: 100,
                available: 0
            }
        );
        assert_eq!(engine.account(ALICE).unwrap().mora, 100_000);
        assert_eq!(engine.profile(broke).unwrap().progression.current_exp, 0);
    }

    #[tokio::test]
    async fn test_admin_skips_maximum_and_disabled_games_reject() {
        let mut registry = quiet_registry();
        registry.set_active(GameKind::Roulette, false);
        let engine = engine(Arc::new(Memory::new()))
            .registry(registry)
            .premium(Arc::new(StaticPremium::new([], [ALICE])))
            .build()
            .unwrap();
        fund(&engine, ALICE, 10_000_000).await;
        assert!(engine
            .invoke_game(
                ALICE,
                GameKind::Coinflip,
                1_000_000,
                GameParams::Coinflip {
                    side: CoinSide::Tails
                }
            )
            .await
            .is_ok());
        let err = engine
            .invoke_game(
                ALICE,
                GameKind::Roulette,
                100,
                GameParams::Roulette {
                    bet: crate::casino::RouletteBet::Red,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, InvokeError::GameDisabled(GameKind::Roulette));
        let err = engine
            .invoke_game(ALICE, GameKind::Dice, 100, GameParams::Slots)
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_session_game_escrows_and_rejects_second_start() {
        let engine = engine(Arc::new(Memory::new())).build().unwrap();
        fund(&engine, ALICE, 1_000).await;
        let started = engine
            .invoke_game(ALICE, GameKind::Tower, 200, GameParams::Tower {
                difficulty: crate::casino::Difficulty::Easy,
            })
            .await
            .unwrap();
        assert!(matches!(started, PendingResult::Session(_)));
        assert_eq!(engine.account(ALICE).unwrap().mora, 800);
        let err = engine
            .invoke_game(ALICE, GameKind::Tower, 200, GameParams::Tower {
                difficulty: crate::casino::Difficulty::Easy,
            })
            .await
            .unwrap_err();
        assert_eq!(err, InvokeError::SessionAlreadyActive(GameKind::Tower));
        assert_eq!(engine.account(ALICE).unwrap().mora, 800);

        let step = engine
            .act(ALICE, GameKind::Tower, SessionAction::CashOut)
            .await
            .unwrap();
        assert!(matches!(step, SessionStep::Settled(_)));
        assert_eq!(engine.account(ALICE).unwrap().mora, 1_000);
    }

    #[tokio::test]
    async fn test_chest_with_certain_and_impossible_drops() {
        let mut catalog = ChestCatalog::new();
        catalog.insert(ChestTable {
            chest: "test_chest".to_string(),
            drops: DropTable::new(vec![
                (Reward::item("item_x", 1), Probability::ALWAYS),
                (Reward::item("item_y", 1), Probability::NEVER),
            ]),
            guaranteed: None,
            exp: 0,
        });
        let engine = engine(Arc::new(Memory::new()))
            .chests(catalog)
            .build()
            .unwrap();
        engine
            .grant(ALICE, EconomicEffect::new().with_item("test_chest", 1))
            .await
            .unwrap();

        let opened = engine.open_chest(ALICE, "test_chest").await.unwrap();
        assert_eq!(
            opened.opening.rewards,
            vec![RolledReward::Item {
                item: "item_x".to_string(),
                quantity: 1
            }]
        );
        assert_eq!(opened.effect.item_delta("test_chest"), -1);
        let items: Vec<String> = engine
            .profile(ALICE)
            .unwrap()
            .inventory
            .into_iter()
            .map(|entry| entry.item)
            .collect();
        assert_eq!(items, vec!["item_x".to_string()]);

        let err = engine.open_chest(ALICE, "test_chest").await.unwrap_err();
        assert_eq!(err, LootError::NoChest("test_chest".to_string()));
        assert_eq!(
            engine.open_chest(ALICE, CHEST_COMMON).await.unwrap_err(),
            LootError::UnknownChest(CHEST_COMMON.to_string())
        );
    }

    #[tokio::test]
    async fn test_wish_spends_fates_and_persists_pity() {
        let engine = engine(Arc::new(Memory::new())).build().unwrap();
        let err = engine.wish(ALICE, 1).await.unwrap_err();
        assert!(matches!(
            err,
            LootError::Settlement(SettleError::InsufficientFunds {
                currency: Currency::Fates,
                ..
            })
        ));
        assert!(matches!(
            engine.wish(ALICE, 3).await.unwrap_err(),
            LootError::InvalidPulls(3)
        ));

        engine
            .grant(ALICE, EconomicEffect::new().with_currency(Currency::Fates, 10))
            .await
            .unwrap();
        let result = engine.wish(ALICE, 10).await.unwrap();
        assert_eq!(result.outcome.pulls.len(), 10);
        assert_eq!(engine.pity(ALICE).unwrap(), result.outcome.pity_after);
        let fates_won = result.outcome.reward_effect().currency_delta(Currency::Fates);
        assert_eq!(result.settlement.account.fates as i64, fates_won);
    }

    #[tokio::test]
    async fn test_wish_retry_replays_the_same_pulls() {
        let fates = EconomicEffect::new().with_currency(Currency::Fates, 10);
        let clean = engine(Arc::new(Memory::new())).build().unwrap();
        clean.grant(ALICE, fates.clone()).await.unwrap();
        let contended_ledger = Arc::new(Memory::new());
        let contended = engine(contended_ledger.clone()).build().unwrap();
        contended.grant(ALICE, fates).await.unwrap();

        contended_ledger.fail_commit_next(1);
        let expected = clean.wish(ALICE, 10).await.unwrap();
        let retried = contended.wish(ALICE, 10).await.unwrap();
        assert_eq!(contended.metrics().contention_retries, 1);
        assert_eq!(retried.outcome, expected.outcome);
        assert_eq!(retried.settlement.account, expected.settlement.account);
        assert_eq!(contended.pity(ALICE).unwrap(), clean.pity(ALICE).unwrap());
    }

    #[tokio::test]
    async fn test_game_retry_replays_the_same_draw() {
        let flip = || GameParams::Coinflip {
            side: CoinSide::Heads,
        };
        let clean = engine(Arc::new(Memory::new())).build().unwrap();
        fund(&clean, ALICE, 1_000).await;
        let contended_ledger = Arc::new(Memory::new());
        let contended = engine(contended_ledger.clone()).build().unwrap();
        fund(&contended, ALICE, 1_000).await;

        for _ in 0..8 {
            contended_ledger.fail_commit_next(2);
            let expected = clean
                .invoke_game(ALICE, GameKind::Coinflip, 100, flip())
                .await
                .unwrap();
            let retried = contended
                .invoke_game(ALICE, GameKind::Coinflip, 100, flip())
                .await
                .unwrap();
            let (PendingResult::Instant(expected), PendingResult::Instant(retried)) =
                (expected, retried)
            else {
                panic!("coinflip is instant");
            };
            assert_eq!(retried.resolution, expected.resolution);
            assert_eq!(retried.payout.outcome, expected.payout.outcome);
        }
        assert_eq!(contended.metrics().contention_retries, 16);
        assert_eq!(
            contended.account(ALICE).unwrap().mora,
            clean.account(ALICE).unwrap().mora
        );
    }

    #[tokio::test]
    async fn test_pity_forces_top_tier_across_wishes() {
        let engine = engine(Arc::new(Memory::new()))
            .config(EngineConfig {
                pity_threshold: 20,
                ..EngineConfig::default()
            })
            .build()
            .unwrap();
        engine
            .grant(ALICE, EconomicEffect::new().with_currency(Currency::Fates, 20))
            .await
            .unwrap();
        let first = engine.wish(ALICE, 10).await.unwrap();
        let second = engine.wish(ALICE, 10).await.unwrap();
        let top = first
            .outcome
            .pulls
            .iter()
            .chain(second.outcome.pulls.iter())
            .filter(|pull| pull.rarity == wish::Rarity::FiveStar)
            .count();
        assert!(top >= 1);
        assert!(engine.pity(ALICE).unwrap() < 20);
    }

    #[tokio::test]
    async fn test_robbery_cooldowns_follow_outcome() {
        let clock = Arc::new(ManualClock::new(NOW));
        let build = |chance| {
            engine(Arc::new(Memory::new()))
                .clock(clock.clone())
                .config(EngineConfig {
                    rob: RobRules {
                        success_chance: chance,
                        ..RobRules::default()
                    },
                    ..EngineConfig::default()
                })
                .build()
                .unwrap()
        };

        let lucky = build(Probability::ALWAYS);
        fund(&lucky, BOB, 10_000).await;
        let outcome = lucky.rob(ALICE, BOB).await.unwrap();
        assert!(outcome.result.succeeded());
        assert_eq!(outcome.cooldown, Duration::from_secs(30 * 60));
        clock.advance(Duration::from_secs(10 * 60));
        assert_eq!(
            lucky.rob(ALICE, BOB).await.unwrap_err(),
            RobError::OnCooldown {
                remaining: Duration::from_secs(20 * 60)
            }
        );
        clock.advance(Duration::from_secs(20 * 60));
        assert!(lucky.rob(ALICE, BOB).await.is_ok());

        let unlucky = build(Probability::NEVER);
        fund(&unlucky, ALICE, 1_000).await;
        fund(&unlucky, BOB, 1_000).await;
        let outcome = unlucky.rob(ALICE, BOB).await.unwrap();
        assert_eq!(outcome.result, RobResult::Failed { fine: 100 });
        assert_eq!(outcome.cooldown, Duration::from_secs(60 * 60));
        clock.advance(Duration::from_secs(59 * 60));
        assert_eq!(
            unlucky.rob(ALICE, BOB).await.unwrap_err(),
            RobError::OnCooldown {
                remaining: Duration::from_secs(60)
            }
        );
    }

    #[tokio::test]
    async fn test_daily_claim_uses_premium_status() {
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = engine(Arc::new(Memory::new()))
            .clock(clock.clone())
            .premium(Arc::new(StaticPremium::new([BOB], [])))
            .build()
            .unwrap();
        assert_eq!(engine.claim_daily(ALICE).await.unwrap().settlement.account.mora, 1_000);
        assert_eq!(engine.claim_daily(BOB).await.unwrap().settlement.account.mora, 2_000);
        assert!(matches!(
            engine.claim_daily(ALICE).await.unwrap_err(),
            ClaimError::OnCooldown { .. }
        ));
        clock.advance(Duration::from_secs(24 * 3_600));
        assert_eq!(engine.claim_daily(ALICE).await.unwrap().settlement.account.mora, 2_000);
    }

    #[tokio::test]
    async fn test_transfers_are_atomic() {
        let engine = engine(Arc::new(Memory::new())).build().unwrap();
        fund(&engine, ALICE, 500).await;
        let result = engine.pay(ALICE, BOB, 200).await.unwrap();
        assert_eq!((result.from.account.mora, result.to.account.mora), (300, 200));
        assert!(matches!(
            engine.pay(ALICE, BOB, 1_000).await.unwrap_err(),
            TransferError::Settlement(SettleError::InsufficientFunds { .. })
        ));
        assert_eq!(engine.pay(ALICE, ALICE, 1).await.unwrap_err(), TransferError::SelfTransfer);
        assert_eq!(engine.pay(ALICE, BOB, 0).await.unwrap_err(), TransferError::ZeroAmount);

        engine
            .grant(ALICE, EconomicEffect::new().with_item(CHEST_COMMON, 2))
            .await
            .unwrap();
        engine
            .transfer_item(ALICE, BOB, CHEST_COMMON, 2)
            .await
            .unwrap();
        let bob = engine.profile(BOB).unwrap();
        assert_eq!(bob.inventory[0].quantity, 2);
        assert!(engine.profile(ALICE).unwrap().inventory.is_empty());
        assert!(engine
            .transfer_item(ALICE, BOB, CHEST_COMMON, 1)
            .await
            .is_err());
        assert_eq!(engine.account(ALICE).unwrap().mora, 300);
    }

    #[tokio::test]
    async fn test_admin_zero_and_exp_award() {
        let engine = engine(Arc::new(Memory::new())).build().unwrap();
        fund(&engine, ALICE, 500).await;
        let up = engine.award_exp(ALICE, 2_500).await.unwrap();
        assert_eq!((up.old_level, up.new_level, up.current_exp), (0, 2, 300));
        assert_eq!(up.rewards.len(), 2);
        let account = engine.zero_account(ALICE).await.unwrap();
        assert_eq!(account.mora, 0);
        assert_eq!(engine.profile(ALICE).unwrap().progression.level, 2);
    }

    #[tokio::test]
    async fn test_zero_exp_award_reports_current_progression() {
        let listener = Arc::new(RecordingListener::default());
        let engine = engine(Arc::new(Memory::new()))
            .listener(listener.clone())
            .build()
            .unwrap();
        engine.award_exp(ALICE, 1_500).await.unwrap();
        let up = engine.award_exp(ALICE, 0).await.unwrap();
        assert_eq!((up.old_level, up.new_level, up.current_exp), (1, 1, 500));
        assert!(up.rewards.is_empty());
        assert!(!up.leveled());
        assert_eq!(engine.profile(ALICE).unwrap().progression.current_exp, 500);
        let last = listener.events().pop().unwrap();
        assert_eq!(last.activity, Activity::Grant);
        assert_eq!(last.effect.exp, 0);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Grant(u64),
        Debit(u64),
        Flip(u64),
        Pay(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..5_000).prop_map(Op::Grant),
            (1u64..5_000).prop_map(Op::Debit),
            (10u64..2_000).prop_map(Op::Flip),
            (1u64..3_000).prop_map(Op::Pay),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_balances_track_committed_deltas(ops in prop::collection::vec(op(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let engine = engine(Arc::new(Memory::new())).build().unwrap();
                let mut alice: i128 = 0;
                let mut bob: i128 = 0;
                for op in ops {
                    match op {
                        Op::Grant(amount) => {
                            fund(&engine, ALICE, amount).await;
                            alice += amount as i128;
                        }
                        Op::Debit(amount) => {
                            let effect = EconomicEffect::new()
                                .with_currency(Currency::Mora, -signed(amount));
                            if engine.grant(ALICE, effect).await.is_ok() {
                                alice -= amount as i128;
                            }
                        }
                        Op::Flip(bet) => {
                            let params = GameParams::Coinflip { side: CoinSide::Heads };
                            if let Ok(PendingResult::Instant(play)) =
                                engine.invoke_game(ALICE, GameKind::Coinflip, bet, params).await
                            {
                                alice += play.payout.effect.currency_delta(Currency::Mora) as i128;
                            }
                        }
                        Op::Pay(amount) => {
                            if engine.pay(ALICE, BOB, amount).await.is_ok() {
                                alice -= amount as i128;
                                bob += amount as i128;
                            }
                        }
                    }
                    prop_assert!(alice >= 0);
                    prop_assert_eq!(engine.account(ALICE).unwrap().mora as i128, alice);
                    prop_assert_eq!(engine.account(BOB).unwrap().mora as i128, bob);
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
