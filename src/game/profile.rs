use std::sync::Arc;

use serde_json::Value;

use crate::game::model::{PlayerProfile, Quest, QUESTS_COLLECTION};
use crate::game::rewards::ProfileDelta;
use crate::store::error::{invalid_argument, not_found, StoreResult};
use crate::store::{Fields, TransactionFn};
use crate::sync::SyncContext;

const COUNTER_FIELDS: [&str; 3] = ["exp", "gems", "hearts"];

impl SyncContext {
    /// Adds `delta` to the counters of the user's profile in one transaction.
    /// Returns `false` when the profile is missing or the transaction fails.
    pub async fn award(&self, delta: ProfileDelta) -> bool {
        if delta.is_empty() {
            return true;
        }
        let key = match self.profile_key() {
            Ok(key) => key,
            Err(err) => {
                log::warn!("cannot award {delta:?}: {err}");
                return false;
            }
        };
        let update: TransactionFn = Arc::new(move |current: Option<&Fields>| {
            let current = current.ok_or_else(|| not_found("Player profile does not exist"))?;
            apply_delta(current, delta)
        });
        self.run_transaction(&key, update).await
    }

    /// Current profile as stored on the server.
    pub async fn player_profile(&self) -> Option<PlayerProfile> {
        let key = self.profile_key().ok()?;
        match self.remote().get(&key).await {
            Ok(Some(document)) => match PlayerProfile::from_fields(document.fields()) {
                Ok(profile) => Some(profile),
                Err(err) => {
                    log::warn!("profile of {} is unreadable: {err}", self.uid());
                    None
                }
            },
            Ok(None) => {
                log::debug!("no profile stored for {}", self.uid());
                None
            }
            Err(err) => {
                log::warn!("reading profile of {} failed: {err}", self.uid());
                None
            }
        }
    }

    /// Checks or unchecks `quest` and grants or takes back its rewards. The
    /// flag is buffered like any other edit; the returned flag tells whether the
    /// profile update went through.
    pub async fn set_quest_completed(&self, quest: &Quest, completed: bool) -> StoreResult<bool> {
        self.tweak_field(
            &format!("{QUESTS_COLLECTION}/{}", quest.id),
            "completed",
            Value::Bool(completed),
        )?;
        if quest.completed == completed {
            return Ok(true);
        }
        let delta = quest.completion_delta();
        Ok(self.award(if completed { delta } else { -delta }).await)
    }
}

fn apply_delta(current: &Fields, delta: ProfileDelta) -> StoreResult<Fields> {
    let mut next = current.clone();
    for (field, amount) in COUNTER_FIELDS.into_iter().zip([delta.exp, delta.gems, delta.hearts]) {
        if amount == 0 {
            continue;
        }
        let existing = match next.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| invalid_argument(format!("Profile field `{field}` is not an integer")))?,
        };
        next.insert(field.to_string(), Value::from(existing + amount));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::game::model::Record;
    use crate::store::{fields_from_value, InMemoryRemoteStore, RemoteStore, SetOptions, StoreOperation};
    use crate::sync::{ManualScheduler, SyncSettings};
    use serde_json::json;

    async fn setup(profile: Option<serde_json::Value>) -> (SyncContext, InMemoryRemoteStore) {
        let remote = InMemoryRemoteStore::new();
        let context = SyncContext::with_options(
            "u1",
            Arc::new(remote.clone()),
            LocalCache::in_memory(),
            Arc::new(ManualScheduler::new()),
            SyncSettings::default(),
        )
        .unwrap();
        if let Some(profile) = profile {
            remote
                .set(
                    &context.profile_key().unwrap(),
                    fields_from_value(profile),
                    SetOptions::replace(),
                )
                .await
                .unwrap();
        }
        (context, remote)
    }

    #[test]
    fn deltas_are_added_to_counters() {
        let current = fields_from_value(json!({"uid": "u1", "exp": 10, "hearts": 1}));
        let next = apply_delta(&current, ProfileDelta { exp: 90, gems: 15, hearts: -2 }).unwrap();
        assert_eq!(next, fields_from_value(json!({"uid": "u1", "exp": 100, "gems": 15, "hearts": -1})));

        let corrupt = fields_from_value(json!({"exp": "many"}));
        assert!(apply_delta(&corrupt, ProfileDelta { exp: 1, ..Default::default() }).is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn award_updates_profile() {
        let (context, _) = setup(Some(json!({"uid": "u1", "exp": 0, "gems": 0, "hearts": 5}))).await;

        assert!(context.award(ProfileDelta { exp: 90, gems: 15, hearts: 0 }).await);
        assert!(context.award(ProfileDelta::penalty(2)).await);

        let profile = context.player_profile().await.unwrap();
        assert_eq!((profile.exp, profile.gems, profile.hearts), (90, 15, 3));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn award_without_profile_fails() {
        let (context, remote) = setup(None).await;
        assert!(!context.award(ProfileDelta { exp: 1, ..Default::default() }).await);
        assert!(context.player_profile().await.is_none());
        assert!(remote.document(&context.profile_key().unwrap()).is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn award_conflict_returns_false() {
        let (context, remote) = setup(Some(json!({"exp": 0}))).await;
        remote.fail_next(StoreOperation::Transaction, crate::store::error::aborted("contention"));
        assert!(!context.award(ProfileDelta { exp: 1, ..Default::default() }).await);
        assert_eq!(context.player_profile().await.unwrap().exp, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn completing_a_quest_grants_and_revokes_rewards() {
        let (context, _) = setup(Some(json!({"exp": 0, "gems": 0, "hearts": 0}))).await;
        let mut quest = Quest::draft("Run", 3).unwrap();
        quest.id = context.add_document(QUESTS_COLLECTION, quest.to_fields().unwrap()).unwrap();

        assert!(context.set_quest_completed(&quest, true).await.unwrap());
        let profile = context.player_profile().await.unwrap();
        assert_eq!((profile.exp, profile.gems), (90, 15));

        quest.completed = true;
        assert!(context.set_quest_completed(&quest, false).await.unwrap());
        let profile = context.player_profile().await.unwrap();
        assert_eq!((profile.exp, profile.gems), (0, 0));

        let cached = context
            .read_document(&format!("{QUESTS_COLLECTION}/{}", quest.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.get("completed"), Some(&json!(false)));
    }
}
