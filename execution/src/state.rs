use mora_types::casino::{
    Account, CooldownRecord, Currency, DebitPolicy, InventoryEntry, ProgressionRecord, UserId,
};
use std::collections::BTreeSet;
use thiserror::Error;

#[cfg(any(test, feature = "mocks"))]
use std::collections::BTreeMap;
#[cfg(any(test, feature = "mocks"))]
use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Mutex,
};

/// Errors raised at the storage seam.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lock/busy conflict; safe to retry the whole transaction.
    #[error("storage contention: {0}")]
    Contention(String),
    #[error("insufficient {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: u64,
        available: u64,
    },
    #[error("insufficient {item}: need {needed}, have {available}")]
    InsufficientItems {
        item: String,
        needed: u64,
        available: u64,
    },
    #[error("storage backend: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Contention(_))
    }
}

/// Result of one relative currency mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceChange {
    /// Delta actually applied (differs from the request only under [`DebitPolicy::Clamp`]).
    pub applied: i64,
    pub balance: u64,
}

/// Mutations available inside one all-or-nothing transaction.
///
/// Every balance and quantity change is a relative delta evaluated against the
/// value current at write time, never a value read earlier by the caller.
pub trait LedgerTx {
    /// Account row, created on first touch.
    fn account(&mut self, user: UserId) -> Result<Account, StoreError>;
    fn apply_currency(
        &mut self,
        user: UserId,
        currency: Currency,
        delta: i64,
        policy: DebitPolicy,
    ) -> Result<BalanceChange, StoreError>;
    /// Explicit admin zeroing of every balance.
    fn zero_account(&mut self, user: UserId) -> Result<(), StoreError>;

    fn quantity(&mut self, user: UserId, item: &str) -> Result<u64, StoreError>;
    /// Returns the new quantity. Rows reaching zero are deleted.
    fn apply_item(&mut self, user: UserId, item: &str, delta: i64) -> Result<u64, StoreError>;
    fn inventory(&mut self, user: UserId) -> Result<Vec<InventoryEntry>, StoreError>;

    fn progression(&mut self, user: UserId) -> Result<ProgressionRecord, StoreError>;
    fn store_progression(
        &mut self,
        user: UserId,
        record: ProgressionRecord,
    ) -> Result<(), StoreError>;
    /// Returns `true` only for the first claim of `(user, level)`.
    fn claim_level_reward(&mut self, user: UserId, level: u32) -> Result<bool, StoreError>;

    /// Returns `true` if newly awarded.
    fn award_achievement(&mut self, user: UserId, key: &str) -> Result<bool, StoreError>;
    fn achievements(&mut self, user: UserId) -> Result<BTreeSet<String>, StoreError>;
    fn badges(&mut self, user: UserId) -> Result<BTreeSet<String>, StoreError>;
    /// Returns `true` if the held state changed.
    fn set_badge(&mut self, user: UserId, badge: &str, held: bool) -> Result<bool, StoreError>;

    fn cooldown(&mut self, user: UserId, action: &str)
        -> Result<Option<CooldownRecord>, StoreError>;
    fn store_cooldown(
        &mut self,
        user: UserId,
        action: &str,
        record: CooldownRecord,
    ) -> Result<(), StoreError>;

    /// Named per-user counters (pity, streaks).
    fn counter(&mut self, user: UserId, key: &str) -> Result<u32, StoreError>;
    fn store_counter(&mut self, user: UserId, key: &str, value: u32) -> Result<(), StoreError>;
}

/// Durable economy store.
pub trait Ledger: Send + Sync + 'static {
    /// Run `f` in a single transaction. Commits only if `f` returns `Ok`; any error
    /// leaves no partial effect behind.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>;

    /// Display-only snapshot read.
    fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, StoreError>,
    {
        self.transaction(f)
    }
}

pub fn pity_key(banner: &str) -> String {
    format!("pity:{banner}")
}

pub fn streak_key(kind: mora_types::GameKind) -> String {
    format!("streak:{kind}")
}

pub(crate) fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Consume one `item` if held. A missing item (including one zeroed by a
/// concurrent consumer) yields `Ok(false)` instead of an error.
pub fn consume_if_held(
    tx: &mut dyn LedgerTx,
    user: UserId,
    item: &str,
) -> Result<bool, StoreError> {
    match tx.apply_item(user, item, -1) {
        Ok(_) => Ok(true),
        Err(StoreError::InsufficientItems { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(any(test, feature = "mocks"))]
#[derive(Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<UserId, Account>,
    inventory: BTreeMap<(UserId, String), u64>,
    progression: BTreeMap<UserId, ProgressionRecord>,
    level_claims: BTreeSet<(UserId, u32)>,
    achievements: BTreeSet<(UserId, String)>,
    badges: BTreeSet<(UserId, String)>,
    cooldowns: BTreeMap<(UserId, String), CooldownRecord>,
    counters: BTreeMap<(UserId, String), u32>,
}

/// In-memory ledger with serializable transactions (copy, mutate, swap).
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct Memory {
    state: Mutex<MemoryState>,
    fail_next: AtomicU32,
    fail_commit: AtomicU32,
    committed: AtomicU64,
}

#[cfg(any(test, feature = "mocks"))]
impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` transactions fail with contention before running.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` transactions run to completion, then discard their
    /// writes and fail with contention.
    pub fn fail_commit_next(&self, count: u32) {
        self.fail_commit.store(count, Ordering::SeqCst);
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[cfg(any(test, feature = "mocks"))]
impl Ledger for Memory {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        if Self::take(&self.fail_next) {
            return Err(StoreError::Contention("injected contention".to_string()).into());
        }

        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("memory ledger poisoned".to_string()))?;
        let mut working = guard.clone();
        let out = f(&mut working)?;
        if Self::take(&self.fail_commit) {
            return Err(StoreError::Contention("injected commit contention".to_string()).into());
        }
        *guard = working;
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(out)
    }
}

#[cfg(any(test, feature = "mocks"))]
impl LedgerTx for MemoryState {
    fn account(&mut self, user: UserId) -> Result<Account, StoreError> {
        Ok(*self
            .accounts
            .entry(user)
            .or_insert_with(|| Account::new(user)))
    }

    fn apply_currency(
        &mut self,
        user: UserId,
        currency: Currency,
        delta: i64,
        policy: DebitPolicy,
    ) -> Result<BalanceChange, StoreError> {
        let account = self
            .accounts
            .entry(user)
            .or_insert_with(|| Account::new(user));
        let balance = account.balance_mut(currency);
        if delta >= 0 {
            *balance = balance.saturating_add(delta.unsigned_abs());
            return Ok(BalanceChange {
                applied: delta,
                balance: *balance,
            });
        }

        let needed = delta.unsigned_abs();
        if needed <= *balance {
            *balance -= needed;
            return Ok(BalanceChange {
                applied: delta,
                balance: *balance,
            });
        }
        match policy {
            DebitPolicy::Reject => Err(StoreError::InsufficientFunds {
                currency,
                needed,
                available: *balance,
            }),
            DebitPolicy::Clamp => {
                let taken = std::mem::take(balance);
                Ok(BalanceChange {
                    applied: -signed(taken),
                    balance: 0,
                })
            }
        }
    }

    fn zero_account(&mut self, user: UserId) -> Result<(), StoreError> {
        self.accounts.insert(user, Account::new(user));
        Ok(())
    }

    fn quantity(&mut self, user: UserId, item: &str) -> Result<u64, StoreError> {
        Ok(self
            .inventory
            .get(&(user, item.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn apply_item(&mut self, user: UserId, item: &str, delta: i64) -> Result<u64, StoreError> {
        let key = (user, item.to_string());
        let current = self.inventory.get(&key).copied().unwrap_or(0);
        let updated = if delta >= 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            let needed = delta.unsigned_abs();
            if needed > current {
                return Err(StoreError::InsufficientItems {
                    item: item.to_string(),
                    needed,
                    available: current,
                });
            }
            current - needed
        };
        if updated == 0 {
            self.inventory.remove(&key);
        } else {
            self.inventory.insert(key, updated);
        }
        Ok(updated)
    }

    fn inventory(&mut self, user: UserId) -> Result<Vec<InventoryEntry>, StoreError> {
        Ok(self
            .inventory
            .iter()
            .filter(|((owner, _), _)| *owner == user)
            .map(|((owner, item), quantity)| InventoryEntry {
                user: *owner,
                item: item.clone(),
                quantity: *quantity,
            })
            .collect())
    }

    fn progression(&mut self, user: UserId) -> Result<ProgressionRecord, StoreError> {
        Ok(self.progression.get(&user).copied().unwrap_or_default())
    }

    fn store_progression(
        &mut self,
        user: UserId,
        record: ProgressionRecord,
    ) -> Result<(), StoreError> {
        self.progression.insert(user, record);
        Ok(())
    }

    fn claim_level_reward(&mut self, user: UserId, level: u32) -> Result<bool, StoreError> {
        Ok(self.level_claims.insert((user, level)))
    }

    fn award_achievement(&mut self, user: UserId, key: &str) -> Result<bool, StoreError> {
        Ok(self.achievements.insert((user, key.to_string())))
    }

    fn achievements(&mut self, user: UserId) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .achievements
            .iter()
            .filter(|(owner, _)| *owner == user)
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn badges(&mut self, user: UserId) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .badges
            .iter()
            .filter(|(owner, _)| *owner == user)
            .map(|(_, badge)| badge.clone())
            .collect())
    }

    fn set_badge(&mut self, user: UserId, badge: &str, held: bool) -> Result<bool, StoreError> {
        let key = (user, badge.to_string());
        Ok(if held {
            self.badges.insert(key)
        } else {
            self.badges.remove(&key)
        })
    }

    fn cooldown(
        &mut self,
        user: UserId,
        action: &str,
    ) -> Result<Option<CooldownRecord>, StoreError> {
        Ok(self.cooldowns.get(&(user, action.to_string())).copied())
    }

    fn store_cooldown(
        &mut self,
        user: UserId,
        action: &str,
        record: CooldownRecord,
    ) -> Result<(), StoreError> {
        self.cooldowns.insert((user, action.to_string()), record);
        Ok(())
    }

    fn counter(&mut self, user: UserId, key: &str) -> Result<u32, StoreError> {
        Ok(self
            .counters
            .get(&(user, key.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn store_counter(&mut self, user: UserId, key: &str, value: u32) -> Result<(), StoreError> {
        self.counters.insert((user, key.to_string()), value);
        Ok(())
    }
}
