//! Settings Reconciler.
//!
//! Holds two snapshots of the display preferences: the draft the user is
//! editing and the committed copy last written to the durable store. Nothing
//! is written until [`SettingsReconciler::save`] is called, and a failed save
//! leaves the committed copy untouched.

use pulse_core::{is_dirty, SettingUpdate, SettingsSnapshot};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::store::{SettingsStore, StoreError};

/// Observable reconciler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsState {
    pub draft: SettingsSnapshot,
    pub committed: SettingsSnapshot,
    pub is_dirty: bool,
    pub saving: bool,
    pub last_error: Option<String>,
}

impl SettingsState {
    fn new(committed: SettingsSnapshot) -> Self {
        Self {
            draft: committed.clone(),
            committed,
            is_dirty: false,
            saving: false,
            last_error: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Failed to persist settings: {0}")]
    Store(#[from] StoreError),
}

pub struct SettingsReconciler {
    store: Arc<dyn SettingsStore>,
    state: watch::Sender<SettingsState>,
    save_lock: Mutex<()>,
}

impl SettingsReconciler {
    /// Read every field from `store`. Each field falls back to its default on
    /// its own when absent, malformed or unreadable.
    pub async fn load(store: Arc<dyn SettingsStore>) -> Self {
        let mut raw = Vec::with_capacity(SettingsSnapshot::KEYS.len());
        for key in SettingsSnapshot::KEYS {
            match store.read(key).await {
                Ok(value) => raw.push((key, value)),
                Err(err) => {
                    warn!(key, error = %err, "Failed to read setting, using default");
                    raw.push((key, None));
                }
            }
        }
        let committed = SettingsSnapshot::decode(|key| {
            raw.iter()
                .find(|(k, _)| *k == key)
                .and_then(|(_, v)| v.clone())
        });
        Self::with_committed(store, committed)
    }

    pub fn with_committed(store: Arc<dyn SettingsStore>, committed: SettingsSnapshot) -> Self {
        let (state, _) = watch::channel(SettingsState::new(committed));
        Self {
            store,
            state,
            save_lock: Mutex::new(()),
        }
    }

    /// Edit the draft. The committed snapshot is not touched.
    pub fn set_draft(&self, update: SettingUpdate) {
        self.state.send_modify(|s| {
            s.draft.apply(update);
            s.is_dirty = is_dirty(&s.draft, &s.committed);
        });
    }

    /// Drop unsaved edits.
    pub fn discard(&self) {
        self.state.send_modify(|s| {
            s.draft = s.committed.clone();
            s.is_dirty = false;
        });
    }

    /// Persist the draft as it stood when the save began.
    ///
    /// Concurrent calls queue. On failure the error is recorded in the state,
    /// the committed snapshot is unchanged and the draft stays dirty.
    pub async fn save(&self) -> Result<SettingsSnapshot, SaveError> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.state.borrow().draft.clone();
        self.state.send_modify(|s| {
            s.saving = true;
            s.last_error = None;
        });

        match self.store.write_batch(&snapshot.encode()).await {
            Ok(()) => {
                self.state.send_modify(|s| {
                    s.committed = snapshot.clone();
                    s.is_dirty = is_dirty(&s.draft, &s.committed);
                    s.saving = false;
                });
                info!(
                    events_per_page = snapshot.events_per_page,
                    export_format = %snapshot.export_format,
                    "Settings saved"
                );
                Ok(snapshot)
            }
            Err(err) => {
                error!(error = %err, "Settings save failed");
                self.state.send_modify(|s| {
                    s.saving = false;
                    s.last_error = Some(err.to_string());
                });
                Err(err.into())
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.state.borrow().is_dirty
    }

    pub fn draft(&self) -> SettingsSnapshot {
        self.state.borrow().draft.clone()
    }

    pub fn committed(&self) -> SettingsSnapshot {
        self.state.borrow().committed.clone()
    }

    pub fn state(&self) -> SettingsState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsState> {
        self.state.subscribe()
    }
}
