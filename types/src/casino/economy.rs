use serde::{Deserialize, Serialize};

use super::Currency;

/// What to do when a debit would drive a balance below zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitPolicy {
    /// Abort the whole settlement with `InsufficientFunds`.
    #[default]
    Reject,
    /// Debit only what is available (robbery fines, thefts).
    Clamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDelta {
    pub currency: Currency,
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDelta {
    pub item: String,
    pub quantity: i64,
}

/// Declarative bundle applied all-or-nothing by the settlement engine.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EconomicEffect {
    pub currency: Vec<CurrencyDelta>,
    pub items: Vec<ItemDelta>,
    pub exp: u64,
    pub achievements: Vec<String>,
    pub debit_policy: DebitPolicy,
}

impl EconomicEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_currency(mut self, currency: Currency, amount: i64) -> Self {
        self.add_currency(currency, amount);
        self
    }

    pub fn with_item(mut self, item: impl Into<String>, quantity: i64) -> Self {
        self.add_item(item, quantity);
        self
    }

    pub fn with_exp(mut self, exp: u64) -> Self {
        self.exp = self.exp.saturating_add(exp);
        self
    }

    pub fn with_achievement(mut self, key: impl Into<String>) -> Self {
        self.add_achievement(key);
        self
    }

    pub fn with_debit_policy(mut self, policy: DebitPolicy) -> Self {
        self.debit_policy = policy;
        self
    }

    /// Merge into an existing delta for the same currency.
    pub fn add_currency(&mut self, currency: Currency, amount: i64) {
        if amount == 0 {
            return;
        }
        match self.currency.iter_mut().find(|d| d.currency == currency) {
            Some(delta) => delta.amount = delta.amount.saturating_add(amount),
            None => self.currency.push(CurrencyDelta { currency, amount }),
        }
    }

    pub fn add_item(&mut self, item: impl Into<String>, quantity: i64) {
        if quantity == 0 {
            return;
        }
        let item = item.into();
        match self.items.iter_mut().find(|d| d.item == item) {
            Some(delta) => delta.quantity = delta.quantity.saturating_add(quantity),
            None => self.items.push(ItemDelta { item, quantity }),
        }
    }

    pub fn add_achievement(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.achievements.contains(&key) {
            self.achievements.push(key);
        }
    }

    pub fn currency_delta(&self, currency: Currency) -> i64 {
        self.currency
            .iter()
            .filter(|d| d.currency == currency)
            .map(|d| d.amount)
            .sum()
    }

    pub fn item_delta(&self, item: &str) -> i64 {
        self.items
            .iter()
            .filter(|d| d.item == item)
            .map(|d| d.quantity)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.currency.iter().all(|d| d.amount == 0)
            && self.items.iter().all(|d| d.quantity == 0)
            && self.exp == 0
            && self.achievements.is_empty()
    }
}

/// A single loot outcome. Each variant carries only what it needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reward {
    /// A uniformly drawn amount in `min..=max`.
    Currency { currency: Currency, min: u64, max: u64 },
    Item { item: String, quantity: u64 },
    /// Another chest, granted unopened.
    Chest { chest: String, quantity: u64 },
}

impl Reward {
    pub fn item(item: impl Into<String>, quantity: u64) -> Self {
        Self::Item {
            item: item.into(),
            quantity,
        }
    }

    pub fn chest(chest: impl Into<String>, quantity: u64) -> Self {
        Self::Chest {
            chest: chest.into(),
            quantity,
        }
    }

    pub fn currency(currency: Currency, min: u64, max: u64) -> Self {
        Self::Currency { currency, min, max }
    }
}
