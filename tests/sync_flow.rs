#![cfg(not(target_arch = "wasm32"))]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use questlog::cache::{FileStorage, LocalCache};
use questlog::game::{
    level_progress, PlayerProfile, ProfileDelta, Quest, Record, Stage, QUESTS_COLLECTION, STAGES_COLLECTION,
};
use questlog::store::error::unavailable;
use questlog::store::{InMemoryRemoteStore, RemoteStore, SetOptions, StoreOperation};
use questlog::sync::{CollectionPair, ManualScheduler, SyncContext, SyncSettings};
use questlog::util::PartialObserver;

const DEBOUNCE: Duration = Duration::from_secs(30);

fn manual_context(remote: &InMemoryRemoteStore, cache: LocalCache) -> (SyncContext, ManualScheduler) {
    let scheduler = ManualScheduler::new();
    let context = SyncContext::with_options(
        "player-1",
        Arc::new(remote.clone()),
        cache,
        Arc::new(scheduler.clone()),
        SyncSettings::default(),
    )
    .expect("create sync context");
    (context, scheduler)
}

async fn create_profile(context: &SyncContext, remote: &InMemoryRemoteStore) {
    let profile = PlayerProfile {
        uid: context.uid().to_string(),
        display_name: Some("Ada".into()),
        hearts: 5,
        ..Default::default()
    };
    remote
        .set(
            &context.profile_key().unwrap(),
            profile.to_fields().unwrap(),
            SetOptions::replace(),
        )
        .await
        .expect("store profile");
}

fn pair_recorder() -> (PartialObserver<CollectionPair>, Arc<Mutex<Vec<CollectionPair>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();
    let observer = PartialObserver::new().with_next(move |pair: &CollectionPair| {
        captured.lock().unwrap().push(pair.clone());
    });
    (observer, events)
}

#[tokio::test(flavor = "current_thread")]
async fn quest_board_session() {
    let remote = InMemoryRemoteStore::new();
    let (context, scheduler) = manual_context(&remote, LocalCache::in_memory());
    create_profile(&context, &remote).await;

    let mut stage = Stage::draft("Marathon prep", 2).unwrap();
    stage.id = context
        .add_document(STAGES_COLLECTION, stage.to_fields().unwrap())
        .unwrap();

    let (observer, events) = pair_recorder();
    let subscription = context.subscribe_collection_pair(observer).unwrap();
    assert_eq!(subscription.initial_data().stages.len(), 1);

    let mut quest = Quest::draft("Run 5k", 3).unwrap();
    quest.stage_id = Some(stage.id.clone());
    quest.start_date = Some("2024-05-01T07:00:00Z".into());
    quest.id = context
        .add_document(QUESTS_COLLECTION, quest.to_fields().unwrap())
        .unwrap();

    let cached = context.cached_documents(&context.collection(QUESTS_COLLECTION).unwrap());
    let cached_quest = Quest::from_document(&cached[0]).unwrap();
    assert_eq!((cached_quest.exp, cached_quest.gems), (90, 15));

    scheduler.advance(DEBOUNCE).await;
    assert_eq!(remote.commits().len(), 1);
    assert_eq!(remote.commits()[0].len(), 2);

    {
        let events = events.lock().unwrap();
        let latest = events.last().expect("pair event after commit");
        assert_eq!(latest.quests.len(), 1);
        assert_eq!(
            latest.quests[0].get("stageName"),
            Some(&serde_json::json!("Marathon prep"))
        );
    }

    assert!(context.set_quest_completed(&quest, true).await.unwrap());
    let profile = context.player_profile().await.unwrap();
    assert_eq!((profile.exp, profile.gems, profile.hearts), (90, 15, 5));
    assert_eq!(level_progress(profile.exp).level, 4);

    scheduler.advance(DEBOUNCE).await;
    let stored = remote
        .document(&context.document_key(&format!("{QUESTS_COLLECTION}/{}", quest.id)).unwrap())
        .unwrap();
    assert_eq!(stored.get("completed"), Some(&serde_json::json!(true)));

    assert!(context
        .delete_document(&format!("{QUESTS_COLLECTION}/{}", quest.id))
        .await
        .unwrap());
    let latest = events.lock().unwrap().last().unwrap().clone();
    assert!(latest.quests.is_empty());
    assert!(context.status().is_idle());

    subscription.unsubscribe();
    assert_eq!(remote.listener_count(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn writes_survive_an_outage() {
    let remote = InMemoryRemoteStore::new();
    let (context, scheduler) = manual_context(&remote, LocalCache::in_memory());
    remote.fail_next(StoreOperation::Commit, unavailable("offline"));
    remote.fail_next(StoreOperation::Commit, unavailable("still offline"));

    context
        .set_document("quests/q1", Quest::draft("Stretch", 1).unwrap().to_fields().unwrap())
        .unwrap();
    scheduler.advance(DEBOUNCE).await;
    assert!(context.status().has_failed());

    context
        .tweak_field("quests/q1", "completed", serde_json::json!(true))
        .unwrap();
    scheduler.advance(DEBOUNCE).await;
    assert_eq!(context.status().pending, 1);

    scheduler.advance(Duration::from_secs(5)).await;
    let status = context.status();
    assert!(status.is_idle());
    assert!(!status.has_failed());

    let stored = remote
        .document(&context.document_key("quests/q1").unwrap())
        .expect("quest committed after recovery");
    let quest = Quest::from_document(&stored).unwrap();
    assert_eq!(quest.title, "Stretch");
    assert!(quest.completed);
}

#[tokio::test(flavor = "current_thread")]
async fn runtime_scheduler_flushes_after_debounce() {
    let remote = InMemoryRemoteStore::new();
    let settings = SyncSettings::default().with_debounce(Duration::from_millis(20));
    let context = SyncContext::with_options(
        "player-1",
        Arc::new(remote.clone()),
        LocalCache::in_memory(),
        Arc::new(questlog::sync::TokioScheduler::new()),
        settings,
    )
    .unwrap();

    context
        .update_document("stages/s1", Stage::draft("Spring", 1).unwrap().to_fields().unwrap())
        .unwrap();
    assert!(remote.commits().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(remote.commits().len(), 1);
    assert!(context.status().is_idle());
}

#[tokio::test(flavor = "current_thread")]
async fn file_cache_is_visible_after_restart() {
    let mut dir = std::env::temp_dir();
    dir.push(format!("questlog-sync-flow-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let remote = InMemoryRemoteStore::new();

    {
        let cache = LocalCache::new(Arc::new(FileStorage::new(&dir).unwrap()));
        let (context, _) = manual_context(&remote, cache);
        context
            .add_document(QUESTS_COLLECTION, Quest::draft("Offline quest", 2).unwrap().to_fields().unwrap())
            .unwrap();
    }

    let cache = LocalCache::new(Arc::new(FileStorage::new(&dir).unwrap()));
    let (context, _) = manual_context(&remote, cache);
    let quests = context.collection(QUESTS_COLLECTION).unwrap();
    let cached = context.cached_documents(&quests);
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].get("title"), Some(&serde_json::json!("Offline quest")));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "current_thread")]
async fn penalties_can_drain_hearts() {
    let remote = InMemoryRemoteStore::new();
    let (context, _) = manual_context(&remote, LocalCache::in_memory());
    create_profile(&context, &remote).await;

    assert!(context.award(ProfileDelta::penalty(7)).await);
    assert_eq!(context.player_profile().await.unwrap().hearts, -2);
}
