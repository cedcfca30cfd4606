//! Date-based quest views.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::game::error::GameError;
use crate::game::model::Quest;

/// Quest list filter offered by the quest board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QuestFilter {
    /// Due today and still open.
    #[default]
    Today,
    /// Due today, completed or not.
    TodaysContext,
    /// Due tomorrow and still open.
    Tomorrow,
    /// Everything, including undated quests.
    All,
}

impl QuestFilter {
    pub fn key(&self) -> &'static str {
        match self {
            QuestFilter::Today => "today",
            QuestFilter::TodaysContext => "todays_context",
            QuestFilter::Tomorrow => "tomorrow",
            QuestFilter::All => "all",
        }
    }

    /// Whether `quest` belongs in the view for the local date `today`. Start
    /// dates are converted to the user's `offset` before comparing days.
    pub fn matches(&self, quest: &Quest, today: NaiveDate, offset: &FixedOffset) -> bool {
        if *self == QuestFilter::All {
            return true;
        }
        let Some(due) = quest
            .start_date
            .as_deref()
            .and_then(parse_date)
            .map(|start| start.with_timezone(offset).date_naive())
        else {
            return false;
        };

        match self {
            QuestFilter::Today => due == today && !quest.completed,
            QuestFilter::TodaysContext => due == today,
            QuestFilter::Tomorrow => today.succ_opt() == Some(due) && !quest.completed,
            QuestFilter::All => true,
        }
    }

    pub fn apply<'a>(&self, quests: &'a [Quest], today: NaiveDate, offset: &FixedOffset) -> Vec<&'a Quest> {
        quests
            .iter()
            .filter(|quest| self.matches(quest, today, offset))
            .collect()
    }
}

impl Display for QuestFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for QuestFilter {
    type Err = GameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "today" => Ok(QuestFilter::Today),
            "todays_context" => Ok(QuestFilter::TodaysContext),
            "tomorrow" => Ok(QuestFilter::Tomorrow),
            "all" => Ok(QuestFilter::All),
            other => Err(GameError::UnknownCode(other.to_string())),
        }
    }
}

/// Parses an RFC 3339 timestamp, or a bare `YYYY-MM-DD` date taken as midnight
/// UTC.
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quest(id: &str, start: Option<&str>, completed: bool) -> Quest {
        Quest {
            id: id.into(),
            start_date: start.map(str::to_string),
            completed,
            ..Quest::default()
        }
    }

    fn ids(quests: Vec<&Quest>) -> Vec<&str> {
        quests.into_iter().map(|quest| quest.id.as_str()).collect()
    }

    #[test]
    fn filters_by_local_day() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let quests = vec![
            quest("open-today", Some("2024-05-01T09:30:00Z"), false),
            quest("done-today", Some("2024-05-01"), true),
            quest("tomorrow", Some("2024-05-02T00:00:00.000Z"), false),
            quest("undated", None, false),
            quest("garbage", Some("soon"), false),
        ];

        assert_eq!(ids(QuestFilter::Today.apply(&quests, today, &utc)), vec!["open-today"]);
        assert_eq!(
            ids(QuestFilter::TodaysContext.apply(&quests, today, &utc)),
            vec!["open-today", "done-today"]
        );
        assert_eq!(ids(QuestFilter::Tomorrow.apply(&quests, today, &utc)), vec!["tomorrow"]);
        assert_eq!(QuestFilter::All.apply(&quests, today, &utc).len(), 5);
    }

    #[test]
    fn offset_moves_the_due_day() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let new_york = FixedOffset::west_opt(4 * 3600).unwrap();
        let late = quest("late", Some("2024-05-02T02:00:00Z"), false);
        assert!(QuestFilter::Today.matches(&late, today, &new_york));
        assert!(!QuestFilter::Today.matches(&late, today, &FixedOffset::east_opt(0).unwrap()));
    }

    #[test]
    fn filter_keys_round_trip() {
        for filter in [
            QuestFilter::Today,
            QuestFilter::TodaysContext,
            QuestFilter::Tomorrow,
            QuestFilter::All,
        ] {
            assert_eq!(filter.key().parse::<QuestFilter>().unwrap(), filter);
        }
        assert!("yesterday".parse::<QuestFilter>().is_err());
        assert_eq!(QuestFilter::default(), QuestFilter::Today);
    }
}
