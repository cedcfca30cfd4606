//! Reward formulas.
//!
//! Daily quests pay hearts and a little experience and cost hearts when missed.
//! Quests and stages pay experience growing with the square of the difficulty,
//! plus gems.

use std::ops::{Add, Neg};

use serde::{Deserialize, Serialize};

use crate::game::error::{GameError, GameResult};

pub const DAILY_QUEST_HEARTS_PER_DIFFICULTY: i64 = 1;
pub const DAILY_QUEST_EXP_PER_DIFFICULTY: i64 = 5;
pub const DAILY_QUEST_PENALTY_PER_DIFFICULTY: i64 = 1;
pub const QUEST_EXP_FACTOR: i64 = 10;
pub const QUEST_GEMS_PER_DIFFICULTY: i64 = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuestRewards {
    pub hearts: i64,
    pub exp: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRewards {
    pub exp: i64,
    pub gems: i64,
}

/// Change applied to a player's counters. Hearts may be negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDelta {
    pub exp: i64,
    pub gems: i64,
    pub hearts: i64,
}

impl ProfileDelta {
    pub fn is_empty(&self) -> bool {
        *self == ProfileDelta::default()
    }

    /// Hearts lost for missing a daily quest.
    pub fn penalty(hearts: i64) -> Self {
        Self {
            hearts: -hearts,
            ..Self::default()
        }
    }
}

impl From<DailyQuestRewards> for ProfileDelta {
    fn from(rewards: DailyQuestRewards) -> Self {
        Self {
            exp: rewards.exp,
            hearts: rewards.hearts,
            gems: 0,
        }
    }
}

impl From<QuestRewards> for ProfileDelta {
    fn from(rewards: QuestRewards) -> Self {
        Self {
            exp: rewards.exp,
            gems: rewards.gems,
            hearts: 0,
        }
    }
}

impl Add for ProfileDelta {
    type Output = ProfileDelta;

    fn add(self, other: ProfileDelta) -> ProfileDelta {
        ProfileDelta {
            exp: self.exp + other.exp,
            gems: self.gems + other.gems,
            hearts: self.hearts + other.hearts,
        }
    }
}

/// Undoes a reward, e.g. when a quest is unchecked again.
impl Neg for ProfileDelta {
    type Output = ProfileDelta;

    fn neg(self) -> ProfileDelta {
        ProfileDelta {
            exp: -self.exp,
            gems: -self.gems,
            hearts: -self.hearts,
        }
    }
}

pub fn daily_quest_rewards(difficulty: i64) -> GameResult<DailyQuestRewards> {
    validate_difficulty(difficulty)?;
    Ok(DailyQuestRewards {
        hearts: difficulty * DAILY_QUEST_HEARTS_PER_DIFFICULTY,
        exp: difficulty * DAILY_QUEST_EXP_PER_DIFFICULTY,
    })
}

/// Hearts lost when a daily quest is missed.
pub fn daily_quest_penalty(difficulty: i64) -> GameResult<i64> {
    validate_difficulty(difficulty)?;
    Ok(difficulty * DAILY_QUEST_PENALTY_PER_DIFFICULTY)
}

/// Rewards of a quest or a stage.
pub fn quest_rewards(difficulty: i64) -> GameResult<QuestRewards> {
    validate_difficulty(difficulty)?;
    Ok(QuestRewards {
        exp: difficulty * difficulty * QUEST_EXP_FACTOR,
        gems: difficulty * QUEST_GEMS_PER_DIFFICULTY,
    })
}

fn validate_difficulty(difficulty: i64) -> GameResult<()> {
    if difficulty < 1 {
        return Err(GameError::InvalidDifficulty(difficulty));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_quest_formulas() {
        assert_eq!(
            daily_quest_rewards(2).unwrap(),
            DailyQuestRewards { hearts: 2, exp: 10 }
        );
        assert_eq!(daily_quest_penalty(2).unwrap(), 2);
    }

    #[test]
    fn quest_formulas() {
        assert_eq!(quest_rewards(1).unwrap(), QuestRewards { exp: 10, gems: 5 });
        assert_eq!(quest_rewards(3).unwrap(), QuestRewards { exp: 90, gems: 15 });
    }

    #[test]
    fn difficulty_below_one_is_rejected() {
        assert_eq!(daily_quest_rewards(0), Err(GameError::InvalidDifficulty(0)));
        assert_eq!(daily_quest_penalty(-1), Err(GameError::InvalidDifficulty(-1)));
        assert!(quest_rewards(0).is_err());
    }

    #[test]
    fn deltas_combine() {
        let earned = ProfileDelta::from(quest_rewards(2).unwrap()) + ProfileDelta::from(daily_quest_rewards(1).unwrap());
        assert_eq!(earned, ProfileDelta { exp: 45, gems: 10, hearts: 1 });
        assert_eq!(-earned + earned, ProfileDelta::default());
        assert_eq!(ProfileDelta::penalty(3).hearts, -3);
        assert!(ProfileDelta::default().is_empty());
    }
}
