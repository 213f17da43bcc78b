//! Menu returned by `GET /menu`: categories of orderable items.
//!
//! The menu screen shows one section per category and narrows it with a
//! case-insensitive name search and an optional category filter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{Product, ProductId};

/// An orderable menu entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: ProductId,
    #[serde(alias = "name")]
    pub item_name: String,
    #[serde(default)]
    pub item_description: Option<String>,
    #[serde(default)]
    pub price: f64,
}

impl MenuItem {
    /// The product the ledger records when this entry is added to an order.
    pub fn to_product(&self) -> Product {
        Product::new(self.id, self.item_name.clone(), self.price)
    }
}

/// A menu section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCategory {
    #[serde(alias = "name")]
    pub category_name: String,
    #[serde(default, rename = "item", alias = "items")]
    pub items: Vec<MenuItem>,
}

/// Extract the category list; a `data` envelope is unwrapped.
pub(crate) fn parse_menu(body: Value) -> Result<Vec<MenuCategory>, ApiError> {
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut obj) => obj
            .remove("data")
            .filter(Value::is_array)
            .ok_or_else(|| ApiError::InvalidResponse("menu response has no category list".into()))?,
        other => {
            return Err(ApiError::InvalidResponse(format!(
                "expected a category list, got {other}"
            )))
        }
    };
    serde_json::from_value(list).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Sections to display for a search query and an optional category.
///
/// Matching is a case-insensitive substring test on the item name; a blank
/// query keeps every item. Categories left without items are dropped.
pub fn filter_menu(
    categories: &[MenuCategory],
    query: &str,
    category: Option<&str>,
) -> Vec<MenuCategory> {
    let needle = query.trim().to_lowercase();
    categories
        .iter()
        .filter(|c| category.map_or(true, |name| c.category_name == name))
        .filter_map(|c| {
            let items: Vec<MenuItem> = c
                .items
                .iter()
                .filter(|item| needle.is_empty() || item.item_name.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            (!items.is_empty()).then(|| MenuCategory {
                category_name: c.category_name.clone(),
                items,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_menu() -> Vec<MenuCategory> {
        parse_menu(json!([
            {
                "category_name": "Soups",
                "item": [
                    {"id": 1, "item_name": "Tomato Soup", "item_description": "Fresh", "price": 4.5},
                    {"id": 2, "item_name": "Miso Soup", "price": 3.0}
                ]
            },
            {
                "category_name": "Drinks",
                "item": [{"id": 7, "item_name": "Iced Tea", "price": 2.0}]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_menu_reads_categories_and_items() {
        let menu = sample_menu();
        assert_eq!(menu.len(), 2);
        assert_eq!(menu[0].category_name, "Soups");
        assert_eq!(menu[0].items[1].item_description, None);
        assert_eq!(menu[0].items[0].to_product(), Product::new(1, "Tomato Soup", 4.5));

        let wrapped = parse_menu(json!({"data": [{"category_name": "Empty"}]})).unwrap();
        assert!(wrapped[0].items.is_empty());
        assert!(parse_menu(json!({"message": "nope"})).is_err());
        assert!(parse_menu(Value::Null).is_err());
    }

    #[test]
    fn test_filter_menu_by_query_and_category() {
        let menu = sample_menu();

        let soups = filter_menu(&menu, "  SOUP ", None);
        assert_eq!(soups.len(), 1);
        assert_eq!(soups[0].items.len(), 2);

        let tea = filter_menu(&menu, "tea", None);
        assert_eq!(tea.len(), 1);
        assert_eq!(tea[0].category_name, "Drinks");

        assert_eq!(filter_menu(&menu, "", None), menu);
        assert_eq!(filter_menu(&menu, "", Some("Drinks")).len(), 1);
        assert!(filter_menu(&menu, "miso", Some("Drinks")).is_empty());
    }
}
