use crate::map_err;
use mora_execution::state::BalanceChange;
use mora_execution::{LedgerTx, StoreError};
use mora_types::casino::{
    Account, CooldownRecord, Currency, DebitPolicy, InventoryEntry, ProgressionRecord, UserId,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

/// Ids are stored as the bit pattern of the `u64`, so snowflakes round-trip.
fn id(user: UserId) -> i64 {
    user.0 as i64
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) struct SqliteTx<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteTx<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn ensure_account(&self, user: UserId) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO accounts (user_id) VALUES (?1)",
                params![id(user)],
            )
            .map_err(map_err)?;
        Ok(())
    }

    fn balance(&self, user: UserId, currency: Currency) -> Result<u64, StoreError> {
        let column = currency.column();
        self.conn
            .query_row(
                &format!("SELECT {column} FROM accounts WHERE user_id = ?1"),
                params![id(user)],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|balance| balance.map(count).unwrap_or(0))
            .map_err(map_err)
    }

    fn names(&self, sql: &str, user: UserId) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_err)?;
        let rows = stmt
            .query_map(params![id(user)], |row| row.get::<_, String>(0))
            .map_err(map_err)?;
        rows.collect::<Result<BTreeSet<_>, _>>().map_err(map_err)
    }
}

impl LedgerTx for SqliteTx<'_> {
    fn account(&mut self, user: UserId) -> Result<Account, StoreError> {
        self.ensure_account(user)?;
        self.conn
            .query_row(
                "SELECT mora, dust, fates FROM accounts WHERE user_id = ?1",
                params![id(user)],
                |row| {
                    Ok(Account {
                        user,
                        mora: count(row.get(0)?),
                        dust: count(row.get(1)?),
                        fates: count(row.get(2)?),
                    })
                },
            )
            .map_err(map_err)
    }

    fn apply_currency(
        &mut self,
        user: UserId,
        currency: Currency,
        delta: i64,
        policy: DebitPolicy,
    ) -> Result<BalanceChange, StoreError> {
        self.ensure_account(user)?;
        let column = currency.column();
        if delta >= 0 {
            let balance: i64 = self
                .conn
                .query_row(
                    &format!(
                        "UPDATE accounts SET {column} = {column} + ?2 WHERE user_id = ?1 RETURNING {column}"
                    ),
                    params![id(user), delta],
                    |row| row.get(0),
                )
                .map_err(map_err)?;
            return Ok(BalanceChange {
                applied: delta,
                balance: count(balance),
            });
        }

        let needed = delta.unsigned_abs();
        let debited: Option<i64> = self
            .conn
            .query_row(
                &format!(
                    "UPDATE accounts SET {column} = {column} - ?2 \
                     WHERE user_id = ?1 AND {column} >= ?2 RETURNING {column}"
                ),
                params![id(user), signed(needed)],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)?;
        if let Some(balance) = debited {
            return Ok(BalanceChange {
                applied: delta,
                balance: count(balance),
            });
        }

        let available = self.balance(user, currency)?;
        match policy {
            DebitPolicy::Reject => Err(StoreError::InsufficientFunds {
                currency,
                needed,
                available,
            }),
            DebitPolicy::Clamp => {
                self.conn
                    .execute(
                        &format!("UPDATE accounts SET {column} = 0 WHERE user_id = ?1"),
                        params![id(user)],
                    )
                    .map_err(map_err)?;
                Ok(BalanceChange {
                    applied: -signed(available),
                    balance: 0,
                })
            }
        }
    }

    fn zero_account(&mut self, user: UserId) -> Result<(), StoreError> {
        self.ensure_account(user)?;
        self.conn
            .execute(
                "UPDATE accounts SET mora = 0, dust = 0, fates = 0 WHERE user_id = ?1",
                params![id(user)],
            )
            .map_err(map_err)?;
        Ok(())
    }

    fn quantity(&mut self, user: UserId, item: &str) -> Result<u64, StoreError> {
        self.conn
            .query_row(
                "SELECT quantity FROM inventory WHERE user_id = ?1 AND item = ?2",
                params![id(user), item],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|quantity| quantity.map(count).unwrap_or(0))
            .map_err(map_err)
    }

    fn apply_item(&mut self, user: UserId, item: &str, delta: i64) -> Result<u64, StoreError> {
        if delta >= 0 {
            if delta == 0 {
                return self.quantity(user, item);
            }
            let quantity: i64 = self
                .conn
                .query_row(
                    "INSERT INTO inventory (user_id, item, quantity) VALUES (?1, ?2, ?3)
                     ON CONFLICT (user_id, item) DO UPDATE SET quantity = quantity + excluded.quantity
                     RETURNING quantity",
                    params![id(user), item, delta],
                    |row| row.get(0),
                )
                .map_err(map_err)?;
            return Ok(count(quantity));
        }

        let needed = delta.unsigned_abs();
        let remaining: Option<i64> = self
            .conn
            .query_row(
                "UPDATE inventory SET quantity = quantity - ?3
                 WHERE user_id = ?1 AND item = ?2 AND quantity > ?3 RETURNING quantity",
                params![id(user), item, signed(needed)],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)?;
        if let Some(quantity) = remaining {
            return Ok(count(quantity));
        }

        // Exactly `needed` left: the row goes away instead of holding zero.
        let deleted = self
            .conn
            .execute(
                "DELETE FROM inventory WHERE user_id = ?1 AND item = ?2 AND quantity = ?3",
                params![id(user), item, signed(needed)],
            )
            .map_err(map_err)?;
        if deleted == 1 {
            return Ok(0);
        }
        Err(StoreError::InsufficientItems {
            item: item.to_string(),
            needed,
            available: self.quantity(user, item)?,
        })
    }

    fn inventory(&mut self, user: UserId) -> Result<Vec<InventoryEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT item, quantity FROM inventory WHERE user_id = ?1 ORDER BY item",
            )
            .map_err(map_err)?;
        let rows = stmt
            .query_map(params![id(user)], |row| {
                Ok(InventoryEntry {
                    user,
                    item: row.get(0)?,
                    quantity: count(row.get(1)?),
                })
            })
            .map_err(map_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_err)
    }

    fn progression(&mut self, user: UserId) -> Result<ProgressionRecord, StoreError> {
        self.conn
            .query_row(
                "SELECT level, current_exp FROM progression WHERE user_id = ?1",
                params![id(user)],
                |row| {
                    Ok(ProgressionRecord {
                        level: row.get(0)?,
                        current_exp: count(row.get(1)?),
                    })
                },
            )
            .optional()
            .map(Option::unwrap_or_default)
            .map_err(map_err)
    }

    fn store_progression(
        &mut self,
        user: UserId,
        record: ProgressionRecord,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO progression (user_id, level, current_exp) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET level = excluded.level,
                     current_exp = excluded.current_exp",
                params![id(user), record.level, signed(record.current_exp)],
            )
            .map_err(map_err)?;
        Ok(())
    }

    fn claim_level_reward(&mut self, user: UserId, level: u32) -> Result<bool, StoreError> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO level_rewards (user_id, level) VALUES (?1, ?2)",
                params![id(user), level],
            )
            .map_err(map_err)?;
        Ok(inserted == 1)
    }

    fn award_achievement(&mut self, user: UserId, key: &str) -> Result<bool, StoreError> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO achievements (user_id, key) VALUES (?1, ?2)",
                params![id(user), key],
            )
            .map_err(map_err)?;
        Ok(inserted == 1)
    }

    fn achievements(&mut self, user: UserId) -> Result<BTreeSet<String>, StoreError> {
        self.names("SELECT key FROM achievements WHERE user_id = ?1", user)
    }

    fn badges(&mut self, user: UserId) -> Result<BTreeSet<String>, StoreError> {
        self.names("SELECT badge FROM badges WHERE user_id = ?1", user)
    }

    fn set_badge(&mut self, user: UserId, badge: &str, held: bool) -> Result<bool, StoreError> {
        let sql = if held {
            "INSERT OR IGNORE INTO badges (user_id, badge) VALUES (?1, ?2)"
        } else {
            "DELETE FROM badges WHERE user_id = ?1 AND badge = ?2"
        };
        let changed = self
            .conn
            .execute(sql, params![id(user), badge])
            .map_err(map_err)?;
        Ok(changed == 1)
    }

    fn cooldown(
        &mut self,
        user: UserId,
        action: &str,
    ) -> Result<Option<CooldownRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT last_action_at, last_success FROM cooldowns
                 WHERE user_id = ?1 AND action = ?2",
                params![id(user), action],
                |row| {
                    Ok(CooldownRecord {
                        last_action_at: count(row.get(0)?),
                        last_success: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(map_err)
    }

    fn store_cooldown(
        &mut self,
        user: UserId,
        action: &str,
        record: CooldownRecord,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO cooldowns (user_id, action, last_action_at, last_success)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, action) DO UPDATE SET
                     last_action_at = excluded.last_action_at,
                     last_success = excluded.last_success",
                params![
                    id(user),
                    action,
                    signed(record.last_action_at),
                    record.last_success
                ],
            )
            .map_err(map_err)?;
        Ok(())
    }

    fn counter(&mut self, user: UserId, key: &str) -> Result<u32, StoreError> {
        self.conn
            .query_row(
                "SELECT value FROM counters WHERE user_id = ?1 AND key = ?2",
                params![id(user), key],
                |row| row.get::<_, u32>(0),
            )
            .optional()
            .map(|value| value.unwrap_or(0))
            .map_err(map_err)
    }

    fn store_counter(&mut self, user: UserId, key: &str, value: u32) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO counters (user_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, key) DO UPDATE SET value = excluded.value",
                params![id(user), key, value],
            )
            .map_err(map_err)?;
        Ok(())
    }
}
