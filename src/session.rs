//! Order session: the one shared owner of the ledger.
//!
//! Every mutation is applied atomically under the state lock and followed by
//! a snapshot write. Network and store I/O never runs while the lock is held,
//! so readers always see a fully applied ledger.
//!
//! Persistence is scoped by identity. While the identity layer is still
//! bootstrapping nothing is loaded or written; a token change discards the
//! in-memory ledger and reloads the snapshot stored under the new token's
//! key; logout resets to an empty ledger.

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::api::{KitchenClient, PlacedItemsFetcher};
use crate::error::LedgerError;
use crate::ledger::{reduce, Action, Ledger};
use crate::models::{LineItem, Product, ProductId, SubmissionPayload, TableId, TableOrder};
use crate::storage::{storage_key, PersistentStore};

/// What the identity layer reports to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityState {
    pub token: Option<String>,
    pub is_bootstrapping: bool,
}

impl IdentityState {
    pub fn bootstrapping() -> Self {
        Self {
            token: None,
            is_bootstrapping: true,
        }
    }

    pub fn signed_in(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            is_bootstrapping: false,
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

struct SessionState {
    ledger: Ledger,
    /// Store key of the identity the ledger belongs to.
    scope: Option<String>,
    loading: bool,
    /// Bumped on every identity change; in-flight results from an older
    /// generation are dropped.
    generation: u64,
}

pub struct OrderSession {
    state: Mutex<SessionState>,
    /// Serializes snapshot writes so the last write always holds the latest ledger.
    persist_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn PersistentStore>,
    kitchen: Arc<dyn KitchenClient>,
    fetcher: Arc<dyn PlacedItemsFetcher>,
}

impl OrderSession {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        kitchen: Arc<dyn KitchenClient>,
        fetcher: Arc<dyn PlacedItemsFetcher>,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState {
                ledger: Ledger::default(),
                scope: None,
                loading: true,
                generation: 0,
            }),
            persist_lock: tokio::sync::Mutex::new(()),
            store,
            kitchen,
            fetcher,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        // Every writer swaps in a complete ledger, so a poisoned guard still
        // holds consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- Reads ---------------------------------------------------------------

    pub fn snapshot(&self) -> Ledger {
        self.lock_state().ledger.clone()
    }

    pub fn active_order(&self) -> TableOrder {
        self.lock_state().ledger.active_order().clone()
    }

    pub fn order_for(&self, table_id: TableId) -> TableOrder {
        self.lock_state().ledger.order_for(table_id).clone()
    }

    pub fn active_table_id(&self) -> Option<TableId> {
        self.lock_state().ledger.active_table_id
    }

    pub fn orders_by_table(&self) -> std::collections::BTreeMap<TableId, TableOrder> {
        self.lock_state().ledger.orders_by_table.clone()
    }

    pub fn is_ledger_loading(&self) -> bool {
        self.lock_state().loading
    }

    pub fn has_unsent_items(&self, table_id: TableId) -> bool {
        self.lock_state().ledger.has_unsent_items(table_id)
    }

    // -- Mutations -----------------------------------------------------------

    /// Apply `action`, persist, and return the resulting ledger.
    pub async fn dispatch(&self, action: Action) -> Ledger {
        let next = {
            let mut state = self.lock_state();
            let next = reduce(&state.ledger, action);
            state.ledger = next.clone();
            next
        };
        self.persist().await;
        next
    }

    /// Apply `action` only if the identity generation is still `generation`.
    async fn dispatch_in_generation(&self, generation: u64, action: Action) -> bool {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return false;
            }
            state.ledger = reduce(&state.ledger, action);
        }
        self.persist().await;
        true
    }

    pub async fn set_active_table(&self, table_id: TableId) {
        self.dispatch(Action::SetActiveTable { table_id }).await;
    }

    pub async fn add_item(&self, product: &Product, quantity: u32, remarks: Option<&str>) {
        self.dispatch(Action::AddItem {
            product: product.clone(),
            quantity,
            remarks: remarks.map(str::to_string),
        })
        .await;
    }

    pub async fn remove_item(&self, id: ProductId, remarks: Option<&str>) {
        self.dispatch(Action::RemoveItem {
            id,
            remarks: remarks.map(str::to_string),
        })
        .await;
    }

    pub async fn update_quantity(&self, id: ProductId, remarks: Option<&str>, quantity: i64) {
        self.dispatch(Action::UpdateQuantity {
            id,
            remarks: remarks.map(str::to_string),
            quantity,
        })
        .await;
    }

    pub async fn clear_table_orders(&self, table_id: TableId) {
        self.dispatch(Action::ClearTableOrders { table_id }).await;
    }

    // -- Submission ----------------------------------------------------------

    /// Send the pending items of `table_id` to the kitchen.
    ///
    /// On success the sent batch moves to the placed items optimistically and
    /// a reconciliation replaces it with the backend's list. On failure the
    /// ledger is untouched so the waiter can retry.
    pub async fn send_order_to_kitchen(&self, table_id: TableId) -> Result<Value, LedgerError> {
        let (pending, generation, scope) = {
            let state = self.lock_state();
            (
                state.ledger.order_for(table_id).pending_items.clone(),
                state.generation,
                state.scope.clone(),
            )
        };
        if pending.is_empty() {
            return Err(LedgerError::EmptyOrder { table_id });
        }

        let payload = SubmissionPayload::new(table_id, &pending);
        info!(
            table_id,
            lines = payload.items.len(),
            "Sending order to kitchen"
        );

        let response = match self.kitchen.submit_new_items(&payload).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(table_id, error = %e, "Order submission failed");
                return Err(LedgerError::Submission(e));
            }
        };

        let committed = self
            .dispatch_in_generation(
                generation,
                Action::CommitPending {
                    table_id,
                    sent: pending.clone(),
                },
            )
            .await;
        if !committed {
            info!(
                table_id,
                "Identity changed during submission, committing to the sender's ledger"
            );
            self.commit_for_sender(scope, table_id, pending).await;
            return Ok(response);
        }

        if let Err(e) = self.refresh_placed_items(table_id).await {
            debug!(table_id, error = %e, "Post-submission reconciliation skipped");
        }
        Ok(response)
    }

    /// Record a batch the kitchen accepted after the identity changed.
    ///
    /// The batch belongs to the identity that sent it (`scope`). When that
    /// identity is current again the live ledger takes the commit; otherwise
    /// its stored snapshot does, so the items are never offered for sending
    /// a second time.
    async fn commit_for_sender(
        &self,
        scope: Option<String>,
        table_id: TableId,
        sent: Vec<LineItem>,
    ) {
        // Signed-out ledgers are never stored.
        let Some(key) = scope else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let action = Action::CommitPending { table_id, sent };

        let deferred = {
            let mut state = self.lock_state();
            if state.scope.as_deref() == Some(key.as_str()) && !state.loading {
                state.ledger = reduce(&state.ledger, action);
                None
            } else {
                Some(action)
            }
        };
        let Some(action) = deferred else {
            self.write_current_snapshot().await;
            return;
        };

        match self.load_snapshot(&key).await {
            Ok(Some(stored)) => {
                let updated = reduce(&stored, action).without_placed_items();
                self.write_snapshot(&key, &updated).await;
            }
            Ok(None) => debug!(table_id, "No stored ledger for the sender, nothing to commit"),
            Err(e) => warn!(table_id, error = %e, "Failed to commit submission to stored ledger"),
        }
    }

    /// [`send_order_to_kitchen`](Self::send_order_to_kitchen) for the active table.
    pub async fn send_active_order(&self) -> Result<Value, LedgerError> {
        let table_id = self.active_table_id().ok_or(LedgerError::NoActiveTable)?;
        self.send_order_to_kitchen(table_id).await
    }

    // -- Reconciliation ------------------------------------------------------

    /// Replace the placed items of `table_id` with the backend's list.
    ///
    /// Failures keep the current placed items and are returned for display
    /// only. The result is applied to the table captured here, whatever table
    /// is active when the fetch completes.
    pub async fn refresh_placed_items(&self, table_id: TableId) -> Result<usize, LedgerError> {
        let generation = self.lock_state().generation;
        let items = match self.fetcher.fetch_placed_items(table_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(table_id, error = %e, "Placed items refresh failed, keeping cached view");
                return Err(LedgerError::Reconciliation(e));
            }
        };
        let count = items.len();
        if !self
            .dispatch_in_generation(generation, Action::SetPlacedItems { table_id, items })
            .await
        {
            debug!(table_id, "Discarding placed items fetched for a previous identity");
            return Ok(0);
        }
        debug!(table_id, count, "Placed items refreshed");
        Ok(count)
    }

    pub async fn refresh_active_placed_items(&self) -> Result<usize, LedgerError> {
        let table_id = self.active_table_id().ok_or(LedgerError::NoActiveTable)?;
        self.refresh_placed_items(table_id).await
    }

    // -- Identity & persistence ----------------------------------------------

    /// React to an identity change.
    ///
    /// Re-applying the current identity is a no-op. A bootstrapping signal
    /// only marks the ledger loading when no identity is loaded yet; an
    /// already loaded ledger stays usable and keeps persisting.
    pub async fn apply_identity(&self, identity: &IdentityState) {
        if identity.is_bootstrapping {
            let mut state = self.lock_state();
            if state.scope.is_none() {
                state.loading = true;
            }
            return;
        }

        let scope = identity
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(storage_key);

        let generation = {
            let mut state = self.lock_state();
            if state.scope == scope && !state.loading {
                return;
            }
            state.generation += 1;
            state.ledger = Ledger::default();
            state.scope = scope.clone();
            state.loading = scope.is_some();
            state.generation
        };

        let Some(key) = scope else {
            info!("Signed out, order ledger cleared");
            return;
        };

        // Held across load and swap so a late submission commit either lands
        // in the store before the read or in the loaded ledger after it.
        let _guard = self.persist_lock.lock().await;
        let loaded = match self.load_snapshot(&key).await {
            Ok(Some(ledger)) => ledger,
            Ok(None) => Ledger::default(),
            Err(e) => {
                warn!(error = %e, "Failed to restore order ledger, starting empty");
                Ledger::default()
            }
        };

        let mut state = self.lock_state();
        if state.generation != generation {
            debug!("Identity changed while loading, dropping stale snapshot");
            return;
        }
        state.ledger = loaded;
        state.loading = false;
        info!(
            tables = state.ledger.orders_by_table.len(),
            "Order ledger restored"
        );
    }

    async fn load_snapshot(&self, key: &str) -> Result<Option<Ledger>, LedgerError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let ledger: Ledger = serde_json::from_str(&raw)?;
        Ok(Some(ledger.without_placed_items()))
    }

    /// Sign out and delete the stored ledger of the identity being left.
    pub async fn forget_identity(&self) {
        let scope = self.lock_state().scope.clone();
        self.apply_identity(&IdentityState::signed_out()).await;
        let Some(key) = scope else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        match self.store.delete(&key).await {
            Ok(()) => info!("Stored order ledger deleted"),
            Err(e) => warn!(error = %e, "Failed to delete stored order ledger"),
        }
    }

    /// Write the current ledger under the current scope.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        self.write_current_snapshot().await;
    }

    /// Skipped while loading or signed out. Caller holds `persist_lock`.
    async fn write_current_snapshot(&self) {
        let (key, snapshot) = {
            let state = self.lock_state();
            match (&state.scope, state.loading) {
                (Some(key), false) => (key.clone(), state.ledger.without_placed_items()),
                _ => return,
            }
        };
        self.write_snapshot(&key, &snapshot).await;
    }

    /// Failures are logged and dropped.
    async fn write_snapshot(&self, key: &str, ledger: &Ledger) {
        let encoded = match serde_json::to_string(ledger) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to encode order ledger");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &encoded).await {
            warn!(error = %e, "Failed to persist order ledger");
        }
    }
}
