//! Table-list helpers built on the ledger.
//!
//! The table screen polls `GET /tables-status` and combines the result with
//! local ledger state: which tables the waiter should see first, which of
//! them just became ready for pickup, and what a long-press "clear" does.

use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::models::TableId;

pub type WaiterId = i64;

pub const STATUS_AVAILABLE: &str = "available";
pub const STATUS_OCCUPIED: &str = "occupied";
pub const STATUS_PREPARING: &str = "preparing";
pub const STATUS_SERVED: &str = "served";
pub const STATUS_BILL_PAID: &str = "bill_paid";

/// A row of `GET /tables-status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub id: TableId,
    #[serde(default, alias = "name")]
    pub table_name: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub waiter_id: Option<WaiterId>,
    #[serde(default)]
    pub waiter_name: Option<String>,
    /// Set when a customer scanned the table's code.
    #[serde(default)]
    pub table_token: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
}

fn default_status() -> String {
    STATUS_AVAILABLE.to_string()
}

impl TableSummary {
    pub fn is_assigned_to(&self, waiter_id: WaiterId) -> bool {
        self.waiter_id == Some(waiter_id)
    }

    pub fn is_customer_occupied(&self) -> bool {
        self.table_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    /// `start_time` parsed as RFC 3339, when the backend sent one.
    pub fn started_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.start_time
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
    }
}

/// Split tables into the waiter's own and everyone else's, preserving order.
///
/// A table with unsent local items stays with the waiter even when the
/// backend assigns it to nobody (or to someone else).
pub fn partition_tables<'a>(
    tables: &'a [TableSummary],
    waiter_id: WaiterId,
    ledger: &Ledger,
) -> (Vec<&'a TableSummary>, Vec<&'a TableSummary>) {
    tables
        .iter()
        .partition(|table| table.is_assigned_to(waiter_id) || ledger.has_unsent_items(table.id))
}

/// Names of the waiter's tables that moved from `preparing` to `served`
/// between two polls.
pub fn ready_tables(
    previous: &[TableSummary],
    current: &[TableSummary],
    waiter_id: WaiterId,
) -> Vec<String> {
    current
        .iter()
        .filter(|table| table.is_assigned_to(waiter_id) && table.status == STATUS_SERVED)
        .filter(|table| {
            previous
                .iter()
                .any(|old| old.id == table.id && old.status == STATUS_PREPARING)
        })
        .map(|table| table.table_name.clone())
        .collect()
}

/// Status to display: local unsent items mark a table occupied.
pub fn effective_status<'a>(table: &'a TableSummary, ledger: &Ledger) -> &'a str {
    if ledger.has_unsent_items(table.id) {
        STATUS_OCCUPIED
    } else {
        &table.status
    }
}

/// Whether the waiter may order for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLock {
    Unlocked,
    /// Another waiter is serving the table.
    HeldByOtherWaiter,
    /// A customer scanned the table's code and orders for themselves.
    CustomerOccupied,
}

impl TableLock {
    pub fn is_locked(self) -> bool {
        self != TableLock::Unlocked
    }

    /// Message shown in place of the order button, empty when unlocked.
    pub fn message(self) -> &'static str {
        match self {
            TableLock::Unlocked => "",
            TableLock::HeldByOtherWaiter => "This table is being served by another waiter.",
            TableLock::CustomerOccupied => "This table is being used by a customer.",
        }
    }
}

/// Another waiter's claim takes precedence over a customer session.
pub fn table_lock(table: &TableSummary, waiter_id: WaiterId) -> TableLock {
    match table.waiter_id {
        Some(owner) if owner != waiter_id => TableLock::HeldByOtherWaiter,
        _ if table.is_customer_occupied() => TableLock::CustomerOccupied,
        _ => TableLock::Unlocked,
    }
}

/// What clearing a table from the table list should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearDecision {
    /// Drop the local unsent items (`clear_table_orders`); kitchen orders are untouched.
    DiscardUnsent,
    /// Free a table occupied by mistake (`POST /tables/{id}/clear`).
    FreeUp,
    /// Release the waiter's finished table (`POST /tables/{id}/clear`).
    ClearServed,
    NotAllowed { reason: String },
    /// Already available.
    Nothing,
}

pub fn clear_decision(table: &TableSummary, waiter_id: WaiterId, ledger: &Ledger) -> ClearDecision {
    if ledger.has_unsent_items(table.id) {
        return ClearDecision::DiscardUnsent;
    }
    if table.status == STATUS_OCCUPIED {
        return ClearDecision::FreeUp;
    }
    let mine = table.is_assigned_to(waiter_id);
    if mine && (table.status == STATUS_SERVED || table.status == STATUS_BILL_PAID) {
        return ClearDecision::ClearServed;
    }
    if table.status == STATUS_AVAILABLE {
        return ClearDecision::Nothing;
    }
    let reason = match (&table.waiter_name, mine) {
        (Some(name), false) => format!(
            "This table is assigned to {name}. Only they can perform actions on it at this stage."
        ),
        _ => format!(
            "This table has active kitchen orders ({}) and cannot be cleared right now.",
            table.status
        ),
    };
    ClearDecision::NotAllowed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Product;

    fn table(id: TableId, status: &str, waiter_id: Option<WaiterId>) -> TableSummary {
        TableSummary {
            id,
            table_name: format!("T{id}"),
            status: status.to_string(),
            waiter_id,
            waiter_name: waiter_id.map(|w| format!("Waiter {w}")),
            table_token: None,
            start_time: None,
        }
    }

    fn ledger_with_unsent(table_id: TableId) -> Ledger {
        Ledger::default()
            .set_active_table(table_id)
            .add_item(&Product::new(1, "Soup", 4.5), 1, None)
    }

    #[test]
    fn test_partition_keeps_tables_with_unsent_items_mine() {
        let tables = vec![
            table(1, "ordered", Some(7)),
            table(2, "available", None),
            table(3, "ordered", Some(9)),
            table(4, "available", None),
        ];
        let ledger = ledger_with_unsent(3);
        let (mine, others) = partition_tables(&tables, 7, &ledger);
        let mine: Vec<TableId> = mine.iter().map(|t| t.id).collect();
        let others: Vec<TableId> = others.iter().map(|t| t.id).collect();
        assert_eq!(mine, vec![1, 3]);
        assert_eq!(others, vec![2, 4]);
    }

    #[test]
    fn test_ready_tables_only_reports_preparing_to_served_for_waiter() {
        let previous = vec![
            table(1, STATUS_PREPARING, Some(7)),
            table(2, STATUS_PREPARING, Some(9)),
            table(3, STATUS_SERVED, Some(7)),
        ];
        let current = vec![
            table(1, STATUS_SERVED, Some(7)),
            table(2, STATUS_SERVED, Some(9)),
            table(3, STATUS_SERVED, Some(7)),
            table(4, STATUS_SERVED, Some(7)),
        ];
        assert_eq!(ready_tables(&previous, &current, 7), vec!["T1".to_string()]);
        assert!(ready_tables(&[], &current, 7).is_empty());
    }

    #[test]
    fn test_effective_status_marks_unsent_tables_occupied() {
        let ledger = ledger_with_unsent(2);
        assert_eq!(effective_status(&table(2, "available", None), &ledger), STATUS_OCCUPIED);
        assert_eq!(effective_status(&table(1, "ordered", None), &ledger), "ordered");
    }

    #[test]
    fn test_clear_decision_matrix() {
        let empty = Ledger::default();
        assert_eq!(
            clear_decision(&table(2, "ordered", Some(9)), 7, &ledger_with_unsent(2)),
            ClearDecision::DiscardUnsent
        );
        assert_eq!(
            clear_decision(&table(1, STATUS_OCCUPIED, None), 7, &empty),
            ClearDecision::FreeUp
        );
        assert_eq!(
            clear_decision(&table(1, STATUS_BILL_PAID, Some(7)), 7, &empty),
            ClearDecision::ClearServed
        );
        assert_eq!(
            clear_decision(&table(1, STATUS_AVAILABLE, None), 7, &empty),
            ClearDecision::Nothing
        );

        match clear_decision(&table(1, STATUS_SERVED, Some(9)), 7, &empty) {
            ClearDecision::NotAllowed { reason } => assert!(reason.contains("Waiter 9")),
            other => panic!("unexpected decision: {other:?}"),
        }
        match clear_decision(&table(1, STATUS_PREPARING, Some(7)), 7, &empty) {
            ClearDecision::NotAllowed { reason } => assert!(reason.contains("(preparing)")),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_table_lock_rules() {
        assert_eq!(table_lock(&table(1, "ordered", Some(7)), 7), TableLock::Unlocked);
        assert_eq!(table_lock(&table(1, "available", None), 7), TableLock::Unlocked);

        let other = table_lock(&table(1, "ordered", Some(9)), 7);
        assert_eq!(other, TableLock::HeldByOtherWaiter);
        assert!(other.is_locked());
        assert_eq!(other.message(), "This table is being served by another waiter.");

        let mut scanned = table(2, "occupied", None);
        scanned.table_token = Some("qr-123".into());
        assert_eq!(table_lock(&scanned, 7), TableLock::CustomerOccupied);
        assert_eq!(
            table_lock(&scanned, 7).message(),
            "This table is being used by a customer."
        );

        scanned.waiter_id = Some(9);
        assert_eq!(table_lock(&scanned, 7), TableLock::HeldByOtherWaiter);

        scanned.table_token = Some(String::new());
        scanned.waiter_id = None;
        assert_eq!(table_lock(&scanned, 7), TableLock::Unlocked);
        assert_eq!(TableLock::Unlocked.message(), "");
    }

    #[test]
    fn test_table_summary_defaults_and_start_time() {
        let row: TableSummary = serde_json::from_str(
            r#"{"id":5,"table_name":"Patio 5","table_token":"abc","start_time":"2026-10-15T18:30:00Z"}"#,
        )
        .unwrap();
        assert_eq!(row.status, STATUS_AVAILABLE);
        assert!(row.is_customer_occupied());
        assert!(row.started_at().is_some());
        assert_eq!(row.waiter_id, None);
    }
}
