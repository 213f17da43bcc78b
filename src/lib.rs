//! Waiter order ledger.
//!
//! Client-side, per-table order state for a waiter app: pending items kept
//! apart from items already placed with the kitchen, persisted per signed-in
//! waiter, submitted in batches and reconciled against the backend.
//!
//! [`WaiterApp`] wires the pieces for production use: a SQLite snapshot
//! store, the HTTP kitchen client and the [`OrderSession`] that owns the
//! ledger. Tests and embedders can assemble an [`OrderSession`] from any
//! [`PersistentStore`], [`KitchenClient`] and [`PlacedItemsFetcher`].

use std::sync::Arc;

use tracing::{info, warn};

/// Snapshots of identities not seen for this long are deleted at start-up.
const SNAPSHOT_RETENTION_DAYS: i64 = 30;

mod api;
mod config;
mod db;
mod error;
mod ledger;
mod logging;
mod menu;
mod models;
mod session;
mod storage;
mod tables;

pub use api::{HttpKitchenApi, KitchenClient, PlacedItemsFetcher};
pub use config::{normalize_api_url, ClientConfig};
pub use db::DbState;
pub use error::{ApiError, LedgerError, StoreError};
pub use ledger::{reduce, Action, Ledger};
pub use logging::{build_info, init_logging, prune_old_logs};
pub use menu::{filter_menu, MenuCategory, MenuItem};
pub use models::{
    normalize_remarks, LineItem, PlacedItem, Product, ProductId, SubmissionLine,
    SubmissionPayload, TableId, TableOrder,
};
pub use session::{IdentityState, OrderSession};
pub use storage::{storage_key, MemoryStore, PersistentStore, SqliteStore};
pub use tables::{
    clear_decision, effective_status, partition_tables, ready_tables, table_lock, ClearDecision,
    TableLock, TableSummary, WaiterId,
};

/// Production wiring: SQLite snapshots, HTTP backend, one shared session.
pub struct WaiterApp {
    pub session: Arc<OrderSession>,
    pub api: Arc<HttpKitchenApi>,
    pub db: Arc<DbState>,
}

impl WaiterApp {
    /// Open the snapshot database under `config.data_dir` and build the
    /// session. The ledger stays in its loading state until the first
    /// [`apply_identity`](Self::apply_identity).
    pub fn open(config: &ClientConfig) -> Result<Self, String> {
        let db = Arc::new(db::init(&config.data_dir).map_err(|e| e.to_string())?);
        let cutoff =
            (chrono::Utc::now() - chrono::Duration::days(SNAPSHOT_RETENTION_DAYS)).to_rfc3339();
        match db.conn.lock() {
            Ok(conn) => {
                if let Err(e) = db::prune_snapshots_before(&conn, &cutoff) {
                    warn!(error = %e, "Failed to prune stale ledger snapshots");
                }
            }
            Err(_) => warn!("Database lock poisoned, skipping snapshot pruning"),
        }
        let api = Arc::new(
            HttpKitchenApi::new(&config.api_base_url, Some(config.request_timeout()))
                .map_err(|e| e.to_string())?,
        );
        if api.base_url().is_empty() {
            warn!("No API base URL configured, kitchen calls will fail");
        }
        let store = Arc::new(SqliteStore::new(db.clone()));
        let session = Arc::new(OrderSession::new(store, api.clone(), api.clone()));
        info!(
            api = %api.base_url(),
            db = %db.db_path.display(),
            "Waiter ledger ready"
        );
        Ok(Self { session, api, db })
    }

    /// Forward an identity change to the HTTP client and the session.
    pub async fn apply_identity(&self, identity: &IdentityState) {
        if !identity.is_bootstrapping {
            self.api.set_token(identity.token.clone());
        }
        self.session.apply_identity(identity).await;
    }

    /// Sign out and delete the stored ledger of the waiter signing out.
    pub async fn forget_identity(&self) {
        self.api.set_token(None);
        self.session.forget_identity().await;
    }

    pub async fn fetch_tables(&self) -> Result<Vec<TableSummary>, ApiError> {
        self.api.fetch_tables().await
    }

    pub async fn fetch_menu(&self) -> Result<Vec<MenuCategory>, ApiError> {
        self.api.fetch_menu().await
    }

    /// Carry out the long-press "clear" on a table and report what was done.
    ///
    /// `NotAllowed` and `Nothing` are returned without side effects.
    pub async fn clear_table(
        &self,
        table: &TableSummary,
        waiter_id: WaiterId,
    ) -> Result<ClearDecision, ApiError> {
        let decision = clear_decision(table, waiter_id, &self.session.snapshot());
        match &decision {
            ClearDecision::DiscardUnsent => {
                self.session.clear_table_orders(table.id).await;
                info!(table_id = table.id, "Discarded unsent items");
            }
            ClearDecision::FreeUp | ClearDecision::ClearServed => {
                self.api.clear_table_status(table.id).await?;
                info!(table_id = table.id, "Table marked available");
            }
            ClearDecision::NotAllowed { .. } | ClearDecision::Nothing => {}
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_config(name: &str) -> (ClientConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("waiter-ledger-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = ClientConfig {
            api_base_url: "http://127.0.0.1:9/api".into(),
            data_dir: dir.join("data"),
            log_dir: dir.join("logs"),
            ..ClientConfig::default()
        };
        (config, dir)
    }

    #[tokio::test]
    async fn test_pending_items_survive_reopen() {
        let (config, dir) = temp_config("reopen");
        let soup = Product::new(1, "Soup", 4.5);

        {
            let app = WaiterApp::open(&config).expect("open app");
            assert!(app.session.is_ledger_loading());
            app.apply_identity(&IdentityState::signed_in("tok-1")).await;
            app.session.set_active_table(5).await;
            app.session.add_item(&soup, 2, None).await;
        }

        let app = WaiterApp::open(&config).expect("reopen app");
        app.apply_identity(&IdentityState::bootstrapping()).await;
        assert!(app.session.is_ledger_loading());
        app.apply_identity(&IdentityState::signed_in("tok-1")).await;
        assert_eq!(app.session.active_table_id(), Some(5));
        assert_eq!(app.session.order_for(5).pending_items[0].quantity, 2);

        app.apply_identity(&IdentityState::signed_in("tok-2")).await;
        assert!(!app.session.has_unsent_items(5));

        drop(app);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_clear_table_discards_unsent_items_locally() {
        let (config, dir) = temp_config("clear");
        let app = WaiterApp::open(&config).expect("open app");
        app.apply_identity(&IdentityState::signed_in("tok-1")).await;
        app.session.set_active_table(3).await;
        app.session
            .add_item(&Product::new(2, "Tea", 2.0), 1, None)
            .await;

        let table = TableSummary {
            id: 3,
            table_name: "T3".into(),
            status: "ordered".into(),
            waiter_id: Some(1),
            waiter_name: None,
            table_token: None,
            start_time: None,
        };
        let decision = app.clear_table(&table, 1).await.expect("clear table");
        assert_eq!(decision, ClearDecision::DiscardUnsent);
        assert!(!app.session.has_unsent_items(3));

        let blocked = TableSummary {
            status: "preparing".into(),
            ..table
        };
        let decision = app.clear_table(&blocked, 1).await.expect("clear table");
        assert!(matches!(decision, ClearDecision::NotAllowed { .. }));

        drop(app);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
