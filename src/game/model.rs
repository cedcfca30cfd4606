//! Records stored under `users/{uid}`.
//!
//! Field names are camelCase on the wire. Records convert to and from
//! [`Document`]; the id lives on the document, not among its fields.

use chrono::Weekday;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::error::{GameError, GameResult};
use crate::game::rewards::{daily_quest_rewards, quest_rewards, DailyQuestRewards, ProfileDelta, QuestRewards};
use crate::store::{fields_from_value, Document, Fields};

pub const QUESTS_COLLECTION: &str = "quests";
pub const STAGES_COLLECTION: &str = "stages";
pub const DAILY_QUESTS_COLLECTION: &str = "dailyQuests";

/// A record kept in one of the user's collections.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn to_fields(&self) -> GameResult<Fields> {
        let mut fields = fields_from_value(serde_json::to_value(self)?);
        fields.remove("id");
        Ok(fields)
    }

    fn from_document(document: &Document) -> GameResult<Self> {
        let mut fields = document.fields().clone();
        fields.insert("id".into(), Value::String(document.id().to_string()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// A larger goal grouping quests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stage {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub difficulty: i64,
    pub exp: i64,
    pub hearts: i64,
    pub gems: i64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl Stage {
    /// New, uncompleted stage carrying the rewards for `difficulty`.
    pub fn draft(title: impl Into<String>, difficulty: i64) -> GameResult<Self> {
        let rewards = quest_rewards(difficulty)?;
        Ok(Self {
            title: title.into(),
            difficulty,
            exp: rewards.exp,
            gems: rewards.gems,
            ..Self::default()
        })
    }

    pub fn rewards(&self) -> GameResult<QuestRewards> {
        quest_rewards(self.difficulty)
    }
}

impl Record for Stage {
    const COLLECTION: &'static str = STAGES_COLLECTION;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    /// Title of the parent stage, filled in from the stage list when read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub difficulty: i64,
    pub exp: i64,
    pub hearts: i64,
    pub gems: i64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl Quest {
    pub fn draft(title: impl Into<String>, difficulty: i64) -> GameResult<Self> {
        let rewards = quest_rewards(difficulty)?;
        Ok(Self {
            title: title.into(),
            difficulty,
            exp: rewards.exp,
            gems: rewards.gems,
            ..Self::default()
        })
    }

    pub fn rewards(&self) -> GameResult<QuestRewards> {
        quest_rewards(self.difficulty)
    }

    /// Counters earned by completing this quest, as stored on the record.
    pub fn completion_delta(&self) -> ProfileDelta {
        ProfileDelta {
            exp: self.exp,
            gems: self.gems,
            hearts: self.hearts,
        }
    }
}

impl Record for Quest {
    const COLLECTION: &'static str = QUESTS_COLLECTION;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Recurring quest scheduled on weekdays.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyQuest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: i64,
    pub exp: i64,
    pub hearts: i64,
    /// Weekday codes, see [`weekday_from_code`].
    pub days: Vec<String>,
    pub completed: bool,
}

impl DailyQuest {
    pub fn draft(title: impl Into<String>, difficulty: i64, days: &[Weekday]) -> GameResult<Self> {
        let rewards = daily_quest_rewards(difficulty)?;
        Ok(Self {
            title: title.into(),
            difficulty,
            exp: rewards.exp,
            hearts: rewards.hearts,
            days: days.iter().map(|day| weekday_code(*day).to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn rewards(&self) -> GameResult<DailyQuestRewards> {
        daily_quest_rewards(self.difficulty)
    }

    /// Whether the quest is due on `weekday`. Unknown codes are ignored.
    pub fn is_scheduled_on(&self, weekday: Weekday) -> bool {
        self.days
            .iter()
            .filter_map(|code| weekday_from_code(code).ok())
            .any(|day| day == weekday)
    }
}

impl Record for DailyQuest {
    const COLLECTION: &'static str = DAILY_QUESTS_COLLECTION;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Player counters stored on `users/{uid}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerProfile {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub exp: i64,
    pub hearts: i64,
    pub gems: i64,
}

impl PlayerProfile {
    pub fn from_fields(fields: &Fields) -> GameResult<Self> {
        Ok(serde_json::from_value(Value::Object(fields.clone()))?)
    }

    pub fn to_fields(&self) -> GameResult<Fields> {
        Ok(fields_from_value(serde_json::to_value(self)?))
    }

    pub fn apply(&mut self, delta: ProfileDelta) {
        self.exp += delta.exp;
        self.gems += delta.gems;
        self.hearts += delta.hearts;
    }
}

/// Canonical code of `weekday`: `M T W Th F Sa Su`.
pub fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "M",
        Weekday::Tue => "T",
        Weekday::Wed => "W",
        Weekday::Thu => "Th",
        Weekday::Fri => "F",
        Weekday::Sat => "Sa",
        Weekday::Sun => "Su",
    }
}

/// Parses a weekday code. Accepts the canonical codes plus the single-letter
/// forms `R` (Thursday), `S` (Saturday) and `U` (Sunday), case-insensitively.
pub fn weekday_from_code(code: &str) -> GameResult<Weekday> {
    match code.trim().to_ascii_lowercase().as_str() {
        "m" => Ok(Weekday::Mon),
        "t" => Ok(Weekday::Tue),
        "w" => Ok(Weekday::Wed),
        "th" | "r" => Ok(Weekday::Thu),
        "f" => Ok(Weekday::Fri),
        "sa" | "s" => Ok(Weekday::Sat),
        "su" | "u" => Ok(Weekday::Sun),
        _ => Err(GameError::UnknownCode(code.to_string())),
    }
}
