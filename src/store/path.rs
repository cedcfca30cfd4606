use std::fmt::{Display, Formatter};
use std::ops::Deref;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::store::error::{invalid_argument, StoreResult};

/// Length of identifiers produced by [`generate_auto_id`].
pub const AUTO_ID_LENGTH: usize = 20;

/// Root collection holding one document per user.
pub const USERS_COLLECTION: &str = "users";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments.into_iter().map(Into::into).collect();
        Self::new(segments)
    }

    pub fn from_string(path: &str) -> StoreResult<Self> {
        if path.trim().is_empty() {
            return Ok(Self::root());
        }

        if path.contains("//") {
            return Err(invalid_argument("Found empty segment in resource path"));
        }

        Ok(Self::from_segments(
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_string()),
        ))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut new_segments = self.segments.clone();
        new_segments.extend(segments.into_iter().map(Into::into));
        Self::new(new_segments)
    }

    pub fn without_last(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self::new(segments)
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }

    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.len() > other.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(l, r)| l == r)
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl Deref for ResourcePath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

/// Address of a collection (odd number of segments), e.g. `users/u1/quests`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    path: ResourcePath,
}

impl CollectionPath {
    pub fn from_path(path: ResourcePath) -> StoreResult<Self> {
        if path.len() % 2 != 1 {
            return Err(invalid_argument(format!(
                "Collection paths must have an odd number of segments, got `{path}`"
            )));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> StoreResult<Self> {
        Self::from_path(ResourcePath::from_string(path)?)
    }

    /// Collection `name` (which may itself contain `/`) under `users/{uid}`.
    pub fn for_user(uid: &str, name: &str) -> StoreResult<Self> {
        Self::from_path(user_root(uid)?.child(ResourcePath::from_string(name)?.iter().cloned()))
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    pub fn doc(&self, document_id: &str) -> StoreResult<DocumentKey> {
        if document_id.is_empty() || document_id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid document id `{document_id}`"
            )));
        }
        DocumentKey::from_path(self.path.child([document_id]))
    }

    pub fn canonical_string(&self) -> String {
        self.path.canonical_string()
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.path.fmt(f)
    }
}

/// Address of a single document (even number of segments).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    path: ResourcePath,
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> StoreResult<Self> {
        if path.len() < 2 || path.len() % 2 != 0 {
            return Err(invalid_argument(
                "Document keys must point to a document (even number of segments)",
            ));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> StoreResult<Self> {
        let resource = ResourcePath::from_string(path)?;
        Self::from_path(resource)
    }

    /// Document at `relative` (e.g. `quests/q1`) under `users/{uid}`.
    pub fn for_user(uid: &str, relative: &str) -> StoreResult<Self> {
        Self::from_path(user_root(uid)?.child(ResourcePath::from_string(relative)?.iter().cloned()))
    }

    pub fn collection(&self) -> CollectionPath {
        CollectionPath {
            path: self.path.without_last(),
        }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    pub fn canonical_string(&self) -> String {
        self.path.canonical_string()
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.path.fmt(f)
    }
}

/// `users/{uid}`, the document holding a player's profile.
pub fn user_root(uid: &str) -> StoreResult<ResourcePath> {
    if uid.is_empty() || uid.contains('/') {
        return Err(invalid_argument(format!("Invalid user id `{uid}`")));
    }
    Ok(ResourcePath::from_segments([USERS_COLLECTION, uid]))
}

pub fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LENGTH)
        .collect()
}
