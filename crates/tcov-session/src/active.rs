//! Live test sessions

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tcov_model::{ExecClassData, FinishedSession};

#[derive(Debug, Default)]
struct SessionData {
    sealed: bool,
    /// Exec data keyed by `(test name, class name)`
    probes: BTreeMap<(String, String), ExecClassData>,
}

/// A session collecting probe data
///
/// Probe batches are merged under a per-session lock, so producers of
/// different sessions never contend. Once [`seal`](Self::seal)ed the session
/// rejects further data; the sealed snapshot holds exactly the batches
/// accepted before.
#[derive(Debug)]
pub struct ActiveSession {
    id: String,
    test_type: String,
    name: String,
    is_global: bool,
    is_realtime: bool,
    data: Mutex<SessionData>,
}

impl ActiveSession {
    /// Create session; `name` is used for hits without a test name
    #[must_use]
    pub fn new(id: impl Into<String>, test_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            test_type: test_type.into(),
            name: name.into(),
            is_global: false,
            is_realtime: false,
            data: Mutex::new(SessionData::default()),
        }
    }

    /// Mark as global session
    #[inline]
    #[must_use]
    pub fn global(mut self, is_global: bool) -> Self {
        self.is_global = is_global;
        self
    }

    /// Mark as realtime session
    #[inline]
    #[must_use]
    pub fn realtime(mut self, is_realtime: bool) -> Self {
        self.is_realtime = is_realtime;
        self
    }

    /// Session id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Test type
    #[inline]
    #[must_use]
    pub fn test_type(&self) -> &str {
        &self.test_type
    }

    /// Session name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the scope's global session
    #[inline]
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.is_global
    }

    /// Whether coverage is recomputed while the session runs
    #[inline]
    #[must_use]
    pub fn is_realtime(&self) -> bool {
        self.is_realtime
    }

    /// Merge a batch of exec data
    ///
    /// Returns `false` if the session is already sealed; nothing is merged then.
    pub fn add_all(&self, batch: impl IntoIterator<Item = ExecClassData>) -> bool {
        let mut data = self.data.lock();
        if data.sealed {
            return false;
        }
        for exec in batch {
            let key = (exec.test_name.clone(), exec.class_name.clone());
            match data.probes.entry(key) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.probes.merge(&exec.probes);
                    if existing.id == 0 {
                        existing.id = exec.id;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(exec);
                }
            }
        }
        true
    }

    /// Whether the session is sealed
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.data.lock().sealed
    }

    /// Seal the session and take its data
    ///
    /// Sealing twice yields an empty session the second time.
    pub fn seal(&self) -> FinishedSession {
        let probes = {
            let mut data = self.data.lock();
            data.sealed = true;
            std::mem::take(&mut data.probes)
        };
        self.finished(probes.into_values().collect())
    }

    /// Point-in-time copy of the data collected so far
    #[must_use]
    pub fn snapshot(&self) -> FinishedSession {
        let probes = self.data.lock().probes.values().cloned().collect();
        self.finished(probes)
    }

    /// Reporting view
    #[must_use]
    pub fn to_dto(&self) -> ActiveSessionDto {
        ActiveSessionDto {
            id: self.id.clone(),
            test_type: self.test_type.clone(),
            is_global: self.is_global,
            is_realtime: self.is_realtime,
        }
    }

    fn finished(&self, probes: Vec<ExecClassData>) -> FinishedSession {
        FinishedSession {
            id: self.id.clone(),
            test_type: self.test_type.clone(),
            name: self.name.clone(),
            probes,
        }
    }
}

/// Reporting view of a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionDto {
    /// Session id
    pub id: String,
    /// Test type
    pub test_type: String,
    /// Global flag
    pub is_global: bool,
    /// Realtime flag
    pub is_realtime: bool,
}

/// Summary of the live sessions of a scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessions {
    /// Number of live sessions
    pub count: usize,
    /// Distinct test types of the live sessions
    pub test_types: Vec<String>,
}

impl ActiveSessions {
    /// Summarize session views
    #[must_use]
    pub fn of(sessions: &[ActiveSessionDto]) -> Self {
        let mut test_types: Vec<String> = sessions.iter().map(|s| s.test_type.clone()).collect();
        test_types.sort();
        test_types.dedup();
        Self {
            count: sessions.len(),
            test_types,
        }
    }
}
