/// Starting mora for freshly created accounts.
pub const INITIAL_MORA: u64 = 0;

/// EXP needed to advance from level 0.
pub const BASE_REQUIRED_EXP: u64 = 1_000;

/// Additional EXP needed per level already reached.
pub const REQUIRED_EXP_PER_LEVEL: u64 = 200;

/// Levels per progression stage (stage = level / 20 + 1).
pub const LEVELS_PER_STAGE: u32 = 20;

/// Every n-th level grants the milestone reward on top of the regular one.
pub const MILESTONE_LEVEL_INTERVAL: u32 = 10;

/// Mora granted per stage at milestone levels.
pub const MILESTONE_MORA_PER_STAGE: u64 = 25_000;

/// Level cap. EXP beyond the cap is retained only up to `required_exp(MAX_LEVEL) - 1`.
pub const MAX_LEVEL: u32 = 1_000;

/// Highest stage with a dedicated badge.
pub const MAX_BADGE_STAGE: u32 = 10;

/// Multipliers are basis points (1x = 10_000).
pub const MULTIPLIER_SCALE: u64 = 10_000;

/// Default pity threshold for the top wish tier.
pub const DEFAULT_PITY_THRESHOLD: u32 = 90;

/// Fates spent per wish.
pub const WISH_COST_FATES: u64 = 1;

// Item keys.
pub const ITEM_LUCKY_CHARM: &str = "lucky_charm";
pub const ITEM_HOT_STREAK: &str = "hot_streak";
pub const ITEM_PADLOCK: &str = "padlock";
pub const CHEST_COMMON: &str = "chest_common";
pub const CHEST_RARE: &str = "chest_rare";
pub const CHEST_EPIC: &str = "chest_epic";

// Achievement keys.
pub const ACHIEVEMENT_FIRST_WIN: &str = "first_win";
pub const ACHIEVEMENT_HIGH_ROLLER: &str = "high_roller";
pub const ACHIEVEMENT_JACKPOT: &str = "jackpot";
pub const ACHIEVEMENT_STREAK_5: &str = "streak_5";
pub const ACHIEVEMENT_MASTER_THIEF: &str = "master_thief";
pub const ACHIEVEMENT_SUMMIT: &str = "summit";

/// Bet at or above which a win unlocks [`ACHIEVEMENT_HIGH_ROLLER`].
pub const HIGH_ROLLER_BET: u64 = 10_000;

/// Consecutive wins needed to earn a `hot_streak` token.
pub const STREAK_REWARD_INTERVAL: u32 = 5;

// Cooldown action keys.
pub const ACTION_ROB: &str = "rob";
pub const ACTION_DAILY: &str = "daily";

/// EXP required to finish `level` (monotonic increasing).
pub const fn required_exp(level: u32) -> u64 {
    BASE_REQUIRED_EXP + REQUIRED_EXP_PER_LEVEL * level as u64
}

/// Progression stage for a level.
pub const fn stage_for_level(level: u32) -> u32 {
    level / LEVELS_PER_STAGE + 1
}

/// Badge key held by accounts in `stage`.
pub fn stage_badge(stage: u32) -> String {
    format!("stage_badge_{}", stage.min(MAX_BADGE_STAGE))
}
