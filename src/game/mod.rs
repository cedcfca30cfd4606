//! Game rules of the quest log: rewards, levels, records and views.

mod error;
pub mod filter;
pub mod level;
pub mod model;
mod profile;
pub mod rewards;

pub use error::{GameError, GameResult};
pub use filter::{parse_date, QuestFilter};
pub use level::{exp_for_level, level_for_exp, level_progress, next_level_exp, LevelProgress};
pub use model::{
    weekday_code, weekday_from_code, DailyQuest, PlayerProfile, Quest, Record, Stage,
    DAILY_QUESTS_COLLECTION, QUESTS_COLLECTION, STAGES_COLLECTION,
};
pub use rewards::{
    daily_quest_penalty, daily_quest_rewards, quest_rewards, DailyQuestRewards, ProfileDelta,
    QuestRewards,
};
