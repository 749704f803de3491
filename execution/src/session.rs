//! Session coordinator for multi-step games.
//!
//! At most one session exists per `(user, game)`. Starting one escrows the bet
//! before any board state is revealed. Every session gets its own timer task that
//! settles it when the deadline passes without a player action; each action pushes
//! the deadline back.
//!
//! Removal from the session map is the only gate between an explicit settlement
//! and a timeout: whichever path takes the session out of the map settles it, the
//! other finds nothing and returns. If settlement fails after removal the escrow
//! is refunded; a failed refund is logged and counted as stuck escrow.

use crate::casino::registry::{GameConfig, TimeoutPolicy};
use crate::casino::{Board, GameError, GameParams, SessionAction, Step};
use crate::listener::{Activity, SettledEvent, SettlementListener};
use crate::modifiers::Verdict;
use crate::payout::{settle_verdict, GamePayout, PlayContext};
use crate::rng::RngSource;
use crate::settlement::{SettleError, Settlement};
use crate::state::{signed, Ledger};
use mora_types::casino::{Currency, DebitPolicy, GameKind, Multiplier, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("a {0} session is already active")]
    AlreadyActive(GameKind),
    #[error("no active {0} session")]
    NoSession(GameKind),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("escrow failed: {0}")]
    Escrow(SettleError),
    #[error("settlement failed, {refunded} mora refunded: {source}")]
    SettlementFailed { refunded: u64, source: SettleError },
    #[error("settlement and refund of {bet} mora both failed: {source}")]
    EscrowStuck { bet: u64, source: SettleError },
    #[error("session registry poisoned")]
    Poisoned,
}

/// How a session left the active state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleReason {
    /// The board resolved on a move (bust, clear, correct guess).
    Resolved,
    CashOut,
    Timeout,
}

#[derive(Clone, Debug)]
pub struct SessionStart {
    pub user: UserId,
    pub bet: u64,
    pub premium: bool,
    pub params: GameParams,
    pub config: Arc<GameConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub id: u64,
    pub user: UserId,
    pub kind: GameKind,
    pub bet: u64,
    pub board: Board,
    pub actions: u32,
    pub expires_in: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub id: u64,
    pub user: UserId,
    pub kind: GameKind,
    pub reason: SettleReason,
    pub board: Board,
    pub payout: GamePayout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStep {
    /// Still active; `multiplier` is what a cash-out pays now.
    Continue {
        multiplier: Multiplier,
        view: SessionView,
    },
    Settled(SessionOutcome),
}

type SessionKey = (UserId, GameKind);

struct ActiveSession {
    id: u64,
    board: Board,
    bet: u64,
    premium: bool,
    config: Arc<GameConfig>,
    deadline: Instant,
    actions: u32,
}

impl ActiveSession {
    fn view(&self, user: UserId) -> SessionView {
        SessionView {
            id: self.id,
            user,
            kind: self.board.kind(),
            bet: self.bet,
            board: self.board.clone(),
            actions: self.actions,
            expires_in: self.deadline.saturating_duration_since(Instant::now()),
        }
    }
}

enum Expiry {
    Taken(ActiveSession),
    /// An action moved the deadline.
    Extended,
    Gone,
}

enum Slot {
    /// Claimed while the escrow commits.
    Escrowing,
    Active(ActiveSession),
}

struct Shared<L: Ledger> {
    settlement: Arc<Settlement<L>>,
    rng: Arc<RngSource>,
    listener: Arc<dyn SettlementListener>,
    sessions: Mutex<HashMap<SessionKey, Slot>>,
    next_id: AtomicU64,
}

/// Arena of active sessions. Cloning shares the arena.
pub struct SessionCoordinator<L: Ledger> {
    shared: Arc<Shared<L>>,
}

impl<L: Ledger> Clone for SessionCoordinator<L> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<L: Ledger> SessionCoordinator<L> {
    pub fn new(
        settlement: Arc<Settlement<L>>,
        rng: Arc<RngSource>,
        listener: Arc<dyn SettlementListener>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settlement,
                rng,
                listener,
                sessions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Escrow the bet and open a session. The bet must already be validated.
    pub async fn start(&self, start: SessionStart) -> Result<SessionView, SessionError> {
        let kind = start.params.kind();
        let key = (start.user, kind);
        let mut rng = self.shared.rng.derive();
        let board = Board::start(&start.params, &start.config, &mut rng)?;

        {
            let mut sessions = self.shared.lock()?;
            if sessions.contains_key(&key) {
                return Err(SessionError::AlreadyActive(kind));
            }
            sessions.insert(key, Slot::Escrowing);
        }

        let user = start.user;
        let bet = start.bet;
        let escrow = self
            .shared
            .settlement
            .commit(move |tx| {
                tx.apply_currency(user, Currency::Mora, -signed(bet), DebitPolicy::Reject)
                    .map_err(SettleError::from)
            })
            .await;
        if let Err(err) = escrow {
            self.shared.lock()?.remove(&key);
            return Err(SessionError::Escrow(err));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let session = ActiveSession {
            id,
            board,
            bet,
            premium: start.premium,
            deadline: Instant::now() + start.config.session_timeout,
            config: start.config,
            actions: 0,
        };
        let view = session.view(user);
        self.shared.lock()?.insert(key, Slot::Active(session));
        self.shared.settlement.metrics().inc_sessions_started();
        info!(%user, ?kind, bet, session = id, "session started");

        let shared = self.shared.clone();
        tokio::spawn(async move { shared.watch(key, id).await });
        Ok(view)
    }

    /// Apply a player move. A move that resolves the board settles it.
    pub async fn act(
        &self,
        user: UserId,
        kind: GameKind,
        action: SessionAction,
    ) -> Result<SessionStep, SessionError> {
        let key = (user, kind);
        let mut rng = self.shared.rng.derive();
        let (session, verdict, reason) = {
            let mut sessions = self.shared.lock()?;
            let Some(Slot::Active(session)) = sessions.get_mut(&key) else {
                return Err(SessionError::NoSession(kind));
            };
            match session.board.act(&action, &mut rng)? {
                Step::Continue { multiplier } => {
                    session.actions += 1;
                    session.deadline = Instant::now() + session.config.session_timeout;
                    debug!(%user, ?kind, session = session.id, "session advanced");
                    return Ok(SessionStep::Continue {
                        multiplier,
                        view: session.view(user),
                    });
                }
                Step::Resolved { verdict } => {
                    let reason = if action == SessionAction::CashOut {
                        SettleReason::CashOut
                    } else {
                        SettleReason::Resolved
                    };
                    match sessions.remove(&key) {
                        Some(Slot::Active(session)) => (session, verdict, reason),
                        _ => return Err(SessionError::NoSession(kind)),
                    }
                }
            }
        };
        self.shared
            .finish(user, session, verdict, reason)
            .await
            .map(SessionStep::Settled)
    }

    pub fn view(&self, user: UserId, kind: GameKind) -> Option<SessionView> {
        let sessions = self.shared.lock().ok()?;
        match sessions.get(&(user, kind)) {
            Some(Slot::Active(session)) => Some(session.view(user)),
            _ => None,
        }
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }

    /// Run the timeout path now, regardless of the deadline.
    #[cfg(test)]
    pub(crate) async fn force_expire(&self, user: UserId, kind: GameKind) -> Option<SessionOutcome> {
        let id = {
            let sessions = self.shared.lock().ok()?;
            match sessions.get(&(user, kind)) {
                Some(Slot::Active(session)) => session.id,
                _ => return None,
            }
        };
        self.shared.expire((user, kind), id).await
    }
}

impl<L: Ledger> Shared<L> {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionKey, Slot>>, SessionError> {
        self.sessions.lock().map_err(|_| SessionError::Poisoned)
    }

    fn deadline_of(&self, key: SessionKey, id: u64) -> Option<Instant> {
        match self.lock().ok()?.get(&key) {
            Some(Slot::Active(session)) if session.id == id => Some(session.deadline),
            _ => None,
        }
    }

    /// Timer task body: sleep until the deadline, following extensions.
    async fn watch(&self, key: SessionKey, id: u64) {
        loop {
            let Some(deadline) = self.deadline_of(key, id) else {
                return;
            };
            if deadline > Instant::now() {
                tokio::time::sleep_until(deadline).await;
                continue;
            }
            match self.take_expired(key, id, false) {
                Expiry::Taken(session) => {
                    self.settle_timeout(key, session).await;
                    return;
                }
                Expiry::Extended => continue,
                Expiry::Gone => {
                    self.lost_race(key, id);
                    return;
                }
            }
        }
    }

    fn take_expired(&self, key: SessionKey, id: u64, force: bool) -> Expiry {
        let Ok(mut sessions) = self.lock() else {
            return Expiry::Gone;
        };
        let due = match sessions.get(&key) {
            Some(Slot::Active(session)) if session.id == id => {
                force || session.deadline <= Instant::now()
            }
            _ => return Expiry::Gone,
        };
        if !due {
            return Expiry::Extended;
        }
        match sessions.remove(&key) {
            Some(Slot::Active(session)) => Expiry::Taken(session),
            _ => Expiry::Gone,
        }
    }

    fn lost_race(&self, (user, kind): SessionKey, id: u64) {
        self.settlement.metrics().inc_concurrent_settlement_lost();
        warn!(%user, ?kind, session = id, "timeout lost race to player action");
    }

    #[cfg(test)]
    async fn expire(&self, key: SessionKey, id: u64) -> Option<SessionOutcome> {
        match self.take_expired(key, id, true) {
            Expiry::Taken(session) => self.settle_timeout(key, session).await,
            Expiry::Extended => None,
            Expiry::Gone => {
                self.lost_race(key, id);
                None
            }
        }
    }

    async fn settle_timeout(
        &self,
        (user, kind): SessionKey,
        session: ActiveSession,
    ) -> Option<SessionOutcome> {
        self.settlement.metrics().inc_sessions_timed_out();
        let verdict = match session.config.timeout_policy {
            TimeoutPolicy::CashOut => session.board.cash_out().unwrap_or(Verdict::Loss),
            TimeoutPolicy::Forfeit => Verdict::Loss,
        };
        info!(%user, ?kind, session = session.id, ?verdict, "session timed out");
        self.finish(user, session, verdict, SettleReason::Timeout)
            .await
            .ok()
    }

    /// Settle a session already removed from the map.
    async fn finish(
        &self,
        user: UserId,
        session: ActiveSession,
        verdict: Verdict,
        reason: SettleReason,
    ) -> Result<SessionOutcome, SessionError> {
        let kind = session.board.kind();
        let rng = self.rng.derive();
        let bet = session.bet;
        let premium = session.premium;
        let config = session.config.clone();
        // A charm or premium re-roll saves a losing move, not an abandoned session.
        let standard_win = match reason {
            SettleReason::Timeout => None,
            SettleReason::CashOut | SettleReason::Resolved => session.board.standard_win(),
        };
        let settled = self
            .settlement
            .commit(move |tx| {
                let ctx = PlayContext {
                    user,
                    bet,
                    premium,
                    config: &config,
                    standard_win,
                    achievements: &[],
                };
                settle_verdict(tx, &ctx, verdict, &mut rng.clone()).map_err(SettleError::from)
            })
            .await;

        match settled {
            Ok(payout) => {
                info!(
                    %user,
                    ?kind,
                    session = session.id,
                    ?reason,
                    payout = payout.outcome.payout,
                    "session settled"
                );
                let outcome = SessionOutcome {
                    id: session.id,
                    user,
                    kind,
                    reason,
                    board: session.board,
                    payout,
                };
                self.listener.on_settled(&SettledEvent {
                    user,
                    activity: Activity::Game { kind },
                    effect: outcome.payout.effect.clone(),
                    summary: outcome.payout.summary(&outcome.board),
                    account: outcome.payout.settlement.account,
                });
                Ok(outcome)
            }
            Err(source) => Err(self.refund(user, kind, session.bet, source).await),
        }
    }

    async fn refund(
        &self,
        user: UserId,
        kind: GameKind,
        bet: u64,
        source: SettleError,
    ) -> SessionError {
        let refunded = self
            .settlement
            .commit(move |tx| {
                tx.apply_currency(user, Currency::Mora, signed(bet), DebitPolicy::Reject)
                    .map_err(SettleError::from)
            })
            .await;
        match refunded {
            Ok(_) => {
                self.settlement.metrics().inc_escrow_refunds();
                warn!(%user, ?kind, bet, error = %source, "session settlement failed, escrow refunded");
                SessionError::SettlementFailed {
                    refunded: bet,
                    source,
                }
            }
            Err(refund_err) => {
                self.settlement.metrics().inc_escrow_stuck();
                error!(
                    %user,
                    ?kind,
                    bet,
                    error = %source,
                    refund_error = %refund_err,
                    "escrow stuck, manual reconciliation required"
                );
                SessionError::EscrowStuck { bet, source }
            }
        }
    }
}
