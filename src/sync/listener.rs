//! Live collection views for the UI.
//!
//! Every server event is folded into the cache before observers see it, so
//! observers always get the merged view including unsynced local edits.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::game::filter::parse_date;
use crate::game::model::{QUESTS_COLLECTION, STAGES_COLLECTION};
use crate::store::error::StoreResult;
use crate::store::{CollectionPath, CollectionSnapshot, Document, ListenerRegistration, SnapshotListener};
use crate::sync::context::SyncContext;
use crate::util::subscribe::PartialObserver;

/// Quests and stages of one user, as delivered by
/// [`SyncContext::subscribe_collection_pair`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionPair {
    pub quests: Vec<Document>,
    pub stages: Vec<Document>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Unsubscribed,
}

/// Subscription to one collection. Unsubscribes on drop.
pub struct CollectionSubscription {
    collection: CollectionPath,
    initial_data: Vec<Document>,
    live: Arc<AtomicBool>,
    registration: Mutex<Option<ListenerRegistration>>,
}

impl CollectionSubscription {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Cached contents at subscription time.
    pub fn initial_data(&self) -> &[Document] {
        &self.initial_data
    }

    pub fn state(&self) -> SubscriptionState {
        if self.live.load(Ordering::SeqCst) {
            SubscriptionState::Active
        } else {
            SubscriptionState::Unsubscribed
        }
    }

    /// Stops delivery. Safe to call more than once; callbacks already running
    /// are not forwarded to the observer.
    pub fn unsubscribe(&self) {
        self.live.store(false, Ordering::SeqCst);
        let registration = self.registration.lock().unwrap().take();
        if let Some(mut registration) = registration {
            registration.detach();
        }
    }
}

impl Drop for CollectionSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Joint subscription to quests and stages.
pub struct CollectionPairSubscription {
    initial_data: CollectionPair,
    quests: CollectionSubscription,
    stages: CollectionSubscription,
}

impl CollectionPairSubscription {
    pub fn initial_data(&self) -> &CollectionPair {
        &self.initial_data
    }

    /// `Active` while both collections are still delivered.
    pub fn state(&self) -> SubscriptionState {
        match (self.quests.state(), self.stages.state()) {
            (SubscriptionState::Active, SubscriptionState::Active) => SubscriptionState::Active,
            _ => SubscriptionState::Unsubscribed,
        }
    }

    pub fn unsubscribe(&self) {
        self.quests.unsubscribe();
        self.stages.unsubscribe();
    }
}

impl SyncContext {
    /// Subscribes to `users/{uid}/{name}`. The returned subscription carries the
    /// cached contents; `observer` then receives the merged view on every event.
    /// Transport errors go to the observer's error callback and the last
    /// delivered data stays valid.
    pub fn subscribe_collection(
        &self,
        name: &str,
        observer: PartialObserver<Vec<Document>>,
    ) -> StoreResult<CollectionSubscription> {
        let collection = self.collection(name)?;
        let initial_data = self.cached_documents(&collection);
        let live = Arc::new(AtomicBool::new(true));

        let listener: SnapshotListener = {
            let weak = self.downgrade();
            let live = Arc::clone(&live);
            let observer = observer.clone();
            let collection = collection.clone();
            Arc::new(move |result: StoreResult<CollectionSnapshot>| {
                if !live.load(Ordering::SeqCst) {
                    return;
                }
                match result {
                    Ok(snapshot) => {
                        let Some(context) = weak.upgrade() else {
                            return;
                        };
                        let merged = context.reconcile_snapshot(snapshot);
                        if live.load(Ordering::SeqCst) {
                            observer.notify_next(&merged);
                        }
                    }
                    Err(err) => {
                        log::warn!("listener for {collection} failed: {err}");
                        observer.notify_error(&err);
                    }
                }
            })
        };

        let registration = match self.remote().subscribe_collection(&collection, listener) {
            Ok(registration) => Some(registration),
            Err(err) => {
                log::warn!("subscribing to {collection} failed: {err}");
                observer.notify_error(&err);
                None
            }
        };

        Ok(CollectionSubscription {
            collection,
            initial_data,
            live,
            registration: Mutex::new(registration),
        })
    }

    /// Subscribes to the user's quests and stages together. Each quest's
    /// `stageName` is taken from the current stage list and both lists are
    /// sorted by start date, then title.
    pub fn subscribe_collection_pair(
        &self,
        observer: PartialObserver<CollectionPair>,
    ) -> StoreResult<CollectionPairSubscription> {
        let latest = Arc::new(Mutex::new(CollectionPair {
            quests: self.cached_documents(&self.collection(QUESTS_COLLECTION)?),
            stages: self.cached_documents(&self.collection(STAGES_COLLECTION)?),
        }));
        let initial_data = present(&latest.lock().unwrap());

        let quests = self.subscribe_collection(
            QUESTS_COLLECTION,
            pair_observer(&latest, &observer, |pair, documents| pair.quests = documents),
        )?;
        let stages = self.subscribe_collection(
            STAGES_COLLECTION,
            pair_observer(&latest, &observer, |pair, documents| pair.stages = documents),
        )?;

        Ok(CollectionPairSubscription {
            initial_data,
            quests,
            stages,
        })
    }
}

fn pair_observer(
    latest: &Arc<Mutex<CollectionPair>>,
    observer: &PartialObserver<CollectionPair>,
    update: fn(&mut CollectionPair, Vec<Document>),
) -> PartialObserver<Vec<Document>> {
    let latest = Arc::clone(latest);
    let downstream = observer.clone();
    let mut side = PartialObserver::new().with_next(move |documents: &Vec<Document>| {
        let view = {
            let mut pair = latest.lock().unwrap();
            update(&mut pair, documents.clone());
            present(&pair)
        };
        downstream.notify_next(&view);
    });
    side.error = observer.error.clone();
    side
}

/// The pair as shown to the UI: stage names joined, both lists sorted.
fn present(pair: &CollectionPair) -> CollectionPair {
    let mut stages = pair.stages.clone();
    sort_by_schedule(&mut stages);
    let mut quests = pair.quests.clone();
    join_stage_names(&mut quests, &stages);
    sort_by_schedule(&mut quests);
    CollectionPair { quests, stages }
}

/// Sets `stageName` from the stage referenced by `stageId`. Quests without a
/// known stage lose the field.
fn join_stage_names(quests: &mut [Document], stages: &[Document]) {
    let titles: HashMap<&str, &Value> = stages
        .iter()
        .filter_map(|stage| stage.get("title").map(|title| (stage.id(), title)))
        .collect();

    for quest in quests {
        let title = quest
            .get("stageId")
            .and_then(Value::as_str)
            .and_then(|stage_id| titles.get(stage_id))
            .map(|title| (*title).clone());
        match title {
            Some(title) => quest.set_field("stageName", title),
            None => {
                quest.remove_field("stageName");
            }
        }
    }
}

/// Orders by `startDate` (undated last), then by title.
fn sort_by_schedule(documents: &mut [Document]) {
    documents.sort_by(|a, b| compare_start(start_date(a), start_date(b)).then_with(|| title(a).cmp(title(b))));
}

fn start_date(document: &Document) -> Option<DateTime<FixedOffset>> {
    document.get("startDate").and_then(Value::as_str).and_then(parse_date)
}

fn compare_start(a: Option<DateTime<FixedOffset>>, b: Option<DateTime<FixedOffset>>) -> CmpOrdering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

fn title(document: &Document) -> &str {
    document.get("title").and_then(Value::as_str).unwrap_or_default()
}
