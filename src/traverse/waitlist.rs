//! once-only continuation registry for shared tree and action builds

use std::path::PathBuf;
use std::sync::Mutex;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Result;

/// continuation invoked with the canonical path once an artifact is ready
pub type Continuation = Box<dyn FnOnce(PathBuf) -> Result<()> + Send + 'static>;

/// outcome of registering a continuation on a shared artifact key
pub enum WaitState {
    /// first demand: the caller owns the build
    Created,
    /// a build is underway: the continuation was parked
    Inserted,
    /// the artifact is ready: the continuation is handed back to run now
    Cleared(Continuation),
}

/// parked continuations per shared artifact key (`TREE/<id>`, `ACTION/<id>`)
///
/// an entry moves from collecting continuations to cleared exactly once,
/// when the builder takes the parked list on publication.
#[derive(Default)]
pub struct Waitlist {
    map: DashMap<String, Mutex<Option<Vec<Continuation>>>>,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// register a continuation for `key`
    pub fn add(&self, key: &str, continuation: Continuation) -> WaitState {
        match self.map.entry(key.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Mutex::new(Some(vec![continuation])));
                WaitState::Created
            }
            Entry::Occupied(mut entry) => match entry.get_mut().get_mut().unwrap() {
                Some(pending) => {
                    pending.push(continuation);
                    WaitState::Inserted
                }
                None => WaitState::Cleared(continuation),
            },
        }
    }

    /// take the parked continuations for `key`, marking the artifact ready
    pub fn fetch_clear(&self, key: &str) -> Vec<Continuation> {
        self.map
            .get_mut(key)
            .and_then(|mut entry| entry.get_mut().unwrap().take())
            .unwrap_or_default()
    }
}
