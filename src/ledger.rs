//! Per-table order ledger.
//!
//! The ledger is a plain value: every change goes through [`reduce`], which
//! takes the previous ledger and an [`Action`] and returns the next ledger
//! without performing any I/O. The session layer (`session.rs`) owns the one
//! shared instance and adds persistence, submission and reconciliation on top.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{
    normalize_remarks, LineItem, PlacedItem, Product, ProductId, TableId, TableOrder,
};

static EMPTY_ORDER: TableOrder = TableOrder {
    pending_items: Vec::new(),
    placed_items: Vec::new(),
};

/// Full per-table order state plus the active-table pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    /// Orders keyed by table. A missing key is an empty order.
    #[serde(default)]
    pub orders_by_table: BTreeMap<TableId, TableOrder>,
    #[serde(default)]
    pub active_table_id: Option<TableId>,
}

/// A ledger transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetActiveTable {
        table_id: TableId,
    },
    AddItem {
        product: Product,
        quantity: u32,
        remarks: Option<String>,
    },
    RemoveItem {
        id: ProductId,
        remarks: Option<String>,
    },
    UpdateQuantity {
        id: ProductId,
        remarks: Option<String>,
        quantity: i64,
    },
    ClearTableOrders {
        table_id: TableId,
    },
    SetPlacedItems {
        table_id: TableId,
        items: Vec<PlacedItem>,
    },
    /// Optimistic local commit of a batch that the kitchen accepted.
    CommitPending {
        table_id: TableId,
        sent: Vec<LineItem>,
    },
    /// Hydrate from a loaded snapshot.
    Replace(Ledger),
    Reset,
}

/// Apply `action` to `ledger` and return the resulting ledger.
pub fn reduce(ledger: &Ledger, action: Action) -> Ledger {
    let mut next = ledger.clone();
    match action {
        Action::SetActiveTable { table_id } => {
            next.active_table_id = Some(table_id);
        }
        Action::AddItem {
            product,
            quantity,
            remarks,
        } => {
            let Some(table_id) = next.active_table_id else {
                return next;
            };
            if quantity == 0 {
                return next;
            }
            let remarks = normalize_remarks(remarks.as_deref());
            let order = next.orders_by_table.entry(table_id).or_default();
            match order
                .pending_items
                .iter_mut()
                .find(|item| item.matches(product.id, remarks.as_deref()))
            {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
                None => order
                    .pending_items
                    .push(LineItem::new(&product, quantity, remarks.as_deref())),
            }
        }
        Action::RemoveItem { id, remarks } => {
            let remarks = normalize_remarks(remarks.as_deref());
            if let Some(order) = next.active_order_mut() {
                order
                    .pending_items
                    .retain(|item| !item.matches(id, remarks.as_deref()));
            }
        }
        Action::UpdateQuantity {
            id,
            remarks,
            quantity,
        } => {
            let remarks = normalize_remarks(remarks.as_deref());
            if let Some(order) = next.active_order_mut() {
                if quantity <= 0 {
                    order
                        .pending_items
                        .retain(|item| !item.matches(id, remarks.as_deref()));
                } else if let Some(existing) = order
                    .pending_items
                    .iter_mut()
                    .find(|item| item.matches(id, remarks.as_deref()))
                {
                    existing.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
                }
            }
        }
        Action::ClearTableOrders { table_id } => {
            next.orders_by_table.remove(&table_id);
        }
        Action::SetPlacedItems { table_id, items } => {
            next.orders_by_table.entry(table_id).or_default().placed_items = items;
        }
        Action::CommitPending { table_id, sent } => {
            if sent.is_empty() {
                return next;
            }
            let order = next.orders_by_table.entry(table_id).or_default();
            for item in &sent {
                if let Some(pending) = order
                    .pending_items
                    .iter_mut()
                    .find(|p| p.matches(item.id, item.remarks.as_deref()))
                {
                    pending.quantity = pending.quantity.saturating_sub(item.quantity);
                }
                order.placed_items.push(PlacedItem::optimistic(item));
            }
            order.pending_items.retain(|p| p.quantity > 0);
        }
        Action::Replace(ledger) => {
            next = ledger;
        }
        Action::Reset => {
            next = Ledger::default();
        }
    }
    next
}

impl Ledger {
    /// Consume the ledger and return it with `action` applied.
    pub fn apply(self, action: Action) -> Ledger {
        reduce(&self, action)
    }

    pub fn set_active_table(self, table_id: TableId) -> Ledger {
        self.apply(Action::SetActiveTable { table_id })
    }

    pub fn add_item(self, product: &Product, quantity: u32, remarks: Option<&str>) -> Ledger {
        self.apply(Action::AddItem {
            product: product.clone(),
            quantity,
            remarks: remarks.map(str::to_string),
        })
    }

    pub fn remove_item(self, id: ProductId, remarks: Option<&str>) -> Ledger {
        self.apply(Action::RemoveItem {
            id,
            remarks: remarks.map(str::to_string),
        })
    }

    pub fn update_quantity(self, id: ProductId, remarks: Option<&str>, quantity: i64) -> Ledger {
        self.apply(Action::UpdateQuantity {
            id,
            remarks: remarks.map(str::to_string),
            quantity,
        })
    }

    pub fn clear_table_orders(self, table_id: TableId) -> Ledger {
        self.apply(Action::ClearTableOrders { table_id })
    }

    pub fn set_placed_items(self, table_id: TableId, items: Vec<PlacedItem>) -> Ledger {
        self.apply(Action::SetPlacedItems { table_id, items })
    }

    /// Move every pending item of `table_id` into its placed items.
    pub fn commit_pending(self, table_id: TableId) -> Ledger {
        let sent = self.order_for(table_id).pending_items.clone();
        self.apply(Action::CommitPending { table_id, sent })
    }

    // -- Derived views -------------------------------------------------------

    /// Order of `table_id`, or an empty order when the table was never touched.
    pub fn order_for(&self, table_id: TableId) -> &TableOrder {
        self.orders_by_table.get(&table_id).unwrap_or(&EMPTY_ORDER)
    }

    /// Order of the active table; empty when no table is active.
    pub fn active_order(&self) -> &TableOrder {
        match self.active_table_id {
            Some(table_id) => self.order_for(table_id),
            None => &EMPTY_ORDER,
        }
    }

    pub fn has_unsent_items(&self, table_id: TableId) -> bool {
        self.order_for(table_id).has_pending()
    }

    /// Tables holding local edits that were not sent yet.
    pub fn tables_with_unsent_items(&self) -> Vec<TableId> {
        self.orders_by_table
            .iter()
            .filter(|(_, order)| order.has_pending())
            .map(|(table_id, _)| *table_id)
            .collect()
    }

    /// Copy of the ledger with every table's placed items emptied.
    ///
    /// Placed items are kitchen state and go stale while the app is closed,
    /// so snapshots are always written and read in this form.
    pub fn without_placed_items(&self) -> Ledger {
        let mut stripped = self.clone();
        for order in stripped.orders_by_table.values_mut() {
            order.placed_items.clear();
        }
        stripped
    }

    fn active_order_mut(&mut self) -> Option<&mut TableOrder> {
        let table_id = self.active_table_id?;
        self.orders_by_table.get_mut(&table_id)
    }
}
