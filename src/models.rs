//! Order data model shared by the ledger, the session and the HTTP client.
//!
//! Field names on the wire follow the snapshots and payloads the waiter app
//! has always written (`qty`, `price`, `newItems`), with aliases for the
//! camelCase and snake_case spellings the backend also emits.

use serde::{Deserialize, Serialize};

/// Server-side table identifier.
pub type TableId = i64;

/// Menu product identifier.
pub type ProductId = i64;

/// Status the backend reports for cancelled kitchen items.
pub const STATUS_CANCELLED: &str = "cancelled";

/// Normalise a customization note: an empty note means "no remarks".
pub fn normalize_remarks(remarks: Option<&str>) -> Option<String> {
    remarks.filter(|r| !r.is_empty()).map(str::to_string)
}

/// A menu product as the waiter picks it from the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "price", alias = "unitPrice", alias = "unit_price")]
    pub unit_price: f64,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, unit_price: f64) -> Self {
        Self {
            id,
            name: name.into(),
            unit_price,
        }
    }
}

/// A product with a quantity and an optional customization note.
///
/// Two line items are the same entry when `(id, remarks)` match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "price", alias = "unitPrice", alias = "unit_price")]
    pub unit_price: f64,
    #[serde(rename = "qty", alias = "quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl LineItem {
    pub fn new(product: &Product, quantity: u32, remarks: Option<&str>) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            unit_price: product.unit_price,
            quantity,
            remarks: normalize_remarks(remarks),
        }
    }

    /// Whether this entry merges with `(id, remarks)`.
    pub fn matches(&self, id: ProductId, remarks: Option<&str>) -> bool {
        self.id == id && self.remarks.as_deref() == remarks
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// An item the kitchen backend has accepted for a table.
///
/// `status` is opaque (`ordered`, `preparing`, `served`, `cancelled`, ...).
/// Items appended optimistically after a submission have no status until the
/// next reconciliation replaces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlacedItemRow")]
pub struct PlacedItem {
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: f64,
    #[serde(rename = "qty")]
    pub quantity: u32,
    pub remarks: Option<String>,
    pub status: Option<String>,
}

/// Wire shape of a placed item.
///
/// Order-line rows carry their own row `id` next to `menu_item_id`; the
/// product id is `menu_item_id` when present, `id` otherwise.
#[derive(Deserialize)]
struct PlacedItemRow {
    #[serde(default)]
    id: Option<ProductId>,
    #[serde(default, alias = "menuItemId")]
    menu_item_id: Option<ProductId>,
    #[serde(default, alias = "item_name")]
    name: String,
    #[serde(default, rename = "price", alias = "unitPrice", alias = "unit_price")]
    unit_price: f64,
    #[serde(rename = "qty", alias = "quantity")]
    quantity: u32,
    #[serde(default, alias = "notes")]
    remarks: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl TryFrom<PlacedItemRow> for PlacedItem {
    type Error = String;

    fn try_from(row: PlacedItemRow) -> Result<Self, Self::Error> {
        let id = row
            .menu_item_id
            .or(row.id)
            .ok_or_else(|| "placed item has neither menu_item_id nor id".to_string())?;
        Ok(Self {
            id,
            name: row.name,
            unit_price: row.unit_price,
            quantity: row.quantity,
            remarks: row.remarks,
            status: row.status,
        })
    }
}

impl PlacedItem {
    /// Local stand-in for a just-submitted line item.
    pub fn optimistic(item: &LineItem) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
            remarks: item.remarks.clone(),
            status: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case(STATUS_CANCELLED))
            .unwrap_or(false)
    }
}

/// Order state for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOrder {
    #[serde(default, alias = "newItems")]
    pub pending_items: Vec<LineItem>,
    #[serde(default)]
    pub placed_items: Vec<PlacedItem>,
}

impl TableOrder {
    pub fn is_empty(&self) -> bool {
        self.pending_items.is_empty() && self.placed_items.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_items.is_empty()
    }

    /// Sum of `unit_price * quantity` over the pending items.
    pub fn pending_total(&self) -> f64 {
        self.pending_items.iter().map(LineItem::line_total).sum()
    }

    /// Item count shown on the order badge: pending quantities plus the
    /// quantities of placed items that were not cancelled.
    pub fn item_count(&self) -> u32 {
        let pending: u32 = self.pending_items.iter().map(|item| item.quantity).sum();
        let placed: u32 = self
            .placed_items
            .iter()
            .filter(|item| !item.is_cancelled())
            .map(|item| item.quantity)
            .sum();
        pending + placed
    }

    /// Placed items without the ones the kitchen cancelled.
    pub fn visible_placed_items(&self) -> Vec<&PlacedItem> {
        self.placed_items
            .iter()
            .filter(|item| !item.is_cancelled())
            .collect()
    }
}

/// One line of a kitchen submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionLine {
    pub id: ProductId,
    pub qty: u32,
    pub remarks: Option<String>,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub table_id: TableId,
    pub items: Vec<SubmissionLine>,
    pub source: String,
}

impl SubmissionPayload {
    pub const SOURCE_WAITER: &'static str = "waiter";

    pub fn new(table_id: TableId, items: &[LineItem]) -> Self {
        Self {
            table_id,
            items: items
                .iter()
                .map(|item| SubmissionLine {
                    id: item.id,
                    qty: item.quantity,
                    remarks: item.remarks.clone(),
                })
                .collect(),
            source: Self::SOURCE_WAITER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_remarks_treats_empty_as_none() {
        assert_eq!(normalize_remarks(None), None);
        assert_eq!(normalize_remarks(Some("")), None);
        assert_eq!(normalize_remarks(Some("less salt")), Some("less salt".into()));
    }

    #[test]
    fn test_submission_payload_shape() {
        let soup = Product::new(1, "Soup", 4.5);
        let items = vec![
            LineItem::new(&soup, 3, Some("")),
            LineItem::new(&soup, 1, Some("no onion")),
        ];
        let payload = SubmissionPayload::new(5, &items);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "tableId": 5,
                "items": [
                    { "id": 1, "qty": 3, "remarks": null },
                    { "id": 1, "qty": 1, "remarks": "no onion" },
                ],
                "source": "waiter",
            })
        );
    }

    #[test]
    fn test_table_order_accepts_legacy_new_items_key() {
        let raw = r#"{"newItems":[{"id":7,"name":"Tea","price":2.0,"qty":2,"remarks":null}],"placedItems":[]}"#;
        let order: TableOrder = serde_json::from_str(raw).unwrap();
        assert_eq!(order.pending_items.len(), 1);
        assert_eq!(order.pending_items[0].quantity, 2);
        assert!(order.placed_items.is_empty());
    }

    #[test]
    fn test_placed_item_accepts_backend_spellings() {
        let raw = r#"{"menu_item_id":3,"item_name":"Rice","unit_price":1.5,"quantity":2,"notes":"extra","status":"preparing"}"#;
        let item: PlacedItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.id, 3);
        assert_eq!(item.name, "Rice");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.remarks.as_deref(), Some("extra"));
        assert!(!item.is_cancelled());
    }

    #[test]
    fn test_placed_item_prefers_menu_item_id_over_row_id() {
        let raw = r#"{"id":91,"menu_item_id":3,"item_name":"Rice","price":1.5,"qty":1,"status":"ordered"}"#;
        let item: PlacedItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.id, 3);
        assert_eq!(item.name, "Rice");

        let camel = r#"{"id":91,"menuItemId":4,"name":"Tea","qty":2}"#;
        let item: PlacedItem = serde_json::from_str(camel).unwrap();
        assert_eq!(item.id, 4);
        assert_eq!(item.quantity, 2);
    }

    #[test]
    fn test_placed_item_without_any_id_is_rejected() {
        let raw = r#"{"name":"Rice","qty":1}"#;
        let err = serde_json::from_str::<PlacedItem>(raw).unwrap_err();
        assert!(err.to_string().contains("neither menu_item_id nor id"));
    }

    #[test]
    fn test_placed_item_snapshot_form_reads_back() {
        let item = PlacedItem::optimistic(&LineItem::new(&Product::new(5, "Cake", 3.0), 2, Some("warm")));
        let encoded = serde_json::to_string(&item).unwrap();
        assert!(encoded.contains("\"qty\":2"));
        let decoded: PlacedItem = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_item_count_skips_cancelled_placed_items() {
        let soup = Product::new(1, "Soup", 4.5);
        let tea = Product::new(2, "Tea", 2.0);
        let mut cancelled = PlacedItem::optimistic(&LineItem::new(&tea, 4, None));
        cancelled.status = Some("cancelled".into());
        let order = TableOrder {
            pending_items: vec![LineItem::new(&soup, 2, None), LineItem::new(&tea, 1, Some("lemon"))],
            placed_items: vec![PlacedItem::optimistic(&LineItem::new(&soup, 3, None)), cancelled],
        };
        assert_eq!(order.item_count(), 6);
        assert_eq!(TableOrder::default().item_count(), 0);
    }

    #[test]
    fn test_totals_and_visible_placed_items() {
        let soup = Product::new(1, "Soup", 4.5);
        let tea = Product::new(2, "Tea", 2.0);
        let mut cancelled = PlacedItem::optimistic(&LineItem::new(&tea, 1, None));
        cancelled.status = Some("Cancelled".into());
        let order = TableOrder {
            pending_items: vec![LineItem::new(&soup, 2, None), LineItem::new(&tea, 1, None)],
            placed_items: vec![
                PlacedItem::optimistic(&LineItem::new(&soup, 1, None)),
                cancelled,
            ],
        };
        assert!((order.pending_total() - 11.0).abs() < f64::EPSILON);
        let visible = order.visible_placed_items();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, 1);
    }
}
