//! Menu tools the model can invoke
//!
//! Tool results are a closed union keyed by tool name. Anything this build
//! cannot parse lands in [`ToolOutput::Unrecognized`] instead of being dropped.

use crate::llm::ToolDefinition;
use crate::ui::{render, UiNode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const LIST_MENU_ITEMS: &str = "list_menu_items";
pub const SHOW_MENU_ITEM: &str = "show_menu_item";
pub const SHOW_PURCHASE: &str = "show_purchase";

/// Largest quantity the purchase card accepts
pub const MAX_PURCHASE_QUANTITY: i64 = 1000;

/// System note recorded when the model proposes an impossible quantity
pub const INVALID_AMOUNT_NOTE: &str = "[User has selected an invalid amount]";

/// A dish from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItemList {
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    RequiresAction,
    Completed,
    Expired,
}

/// Arguments of `show_purchase`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PurchaseRequest {
    pub item: String,
    pub price: f64,
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Purchase card contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseDetails {
    pub item: String,
    pub price: f64,
    pub quantity: i64,
    pub status: PurchaseStatus,
}

/// Known tool kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    ListMenuItems,
    ShowMenuItem,
    ShowPurchase,
    Unrecognized(String),
}

impl ToolKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            LIST_MENU_ITEMS => ToolKind::ListMenuItems,
            SHOW_MENU_ITEM => ToolKind::ShowMenuItem,
            SHOW_PURCHASE => ToolKind::ShowPurchase,
            other => ToolKind::Unrecognized(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolKind::ListMenuItems => LIST_MENU_ITEMS,
            ToolKind::ShowMenuItem => SHOW_MENU_ITEM,
            ToolKind::ShowPurchase => SHOW_PURCHASE,
            ToolKind::Unrecognized(name) => name,
        }
    }
}

/// Strongly typed tool result
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    ListMenuItems(MenuItemList),
    ShowMenuItem(MenuItem),
    ShowPurchase(PurchaseDetails),
    /// Unknown tool, or a payload that failed to parse
    Unrecognized { name: String, result: Value },
}

impl ToolOutput {
    /// Result payload as stored in the conversation log
    pub fn to_value(&self) -> Value {
        match self {
            ToolOutput::ListMenuItems(list) => serde_json::to_value(list).unwrap_or(Value::Null),
            ToolOutput::ShowMenuItem(item) => serde_json::to_value(item).unwrap_or(Value::Null),
            ToolOutput::ShowPurchase(details) => {
                serde_json::to_value(details).unwrap_or(Value::Null)
            }
            ToolOutput::Unrecognized { result, .. } => result.clone(),
        }
    }

    /// Parse a stored result back into its typed form
    pub fn from_name_and_value(name: &str, value: Value) -> Self {
        let unrecognized = |value| ToolOutput::Unrecognized {
            name: name.to_string(),
            result: value,
        };
        match ToolKind::from_name(name) {
            ToolKind::ListMenuItems => serde_json::from_value(value.clone())
                .map_or_else(|_| unrecognized(value), ToolOutput::ListMenuItems),
            ToolKind::ShowMenuItem => serde_json::from_value(value.clone())
                .map_or_else(|_| unrecognized(value), ToolOutput::ShowMenuItem),
            ToolKind::ShowPurchase => serde_json::from_value(value.clone())
                .map_or_else(|_| unrecognized(value), ToolOutput::ShowPurchase),
            ToolKind::Unrecognized(_) => unrecognized(value),
        }
    }
}

/// What a completed tool call contributes to the turn
#[derive(Debug, Clone)]
pub struct ToolEvaluation {
    pub output: ToolOutput,
    /// System note to log after the call/result pair
    pub note: Option<String>,
    /// Live rendering of the result
    pub view: UiNode,
}

/// Evaluate a tool call requested by the model.
///
/// The menu tools are presentational: the model supplies the data and the
/// result echoes it back in typed form.
pub fn evaluate(name: &str, args: &Value) -> ToolEvaluation {
    let output = match ToolKind::from_name(name) {
        ToolKind::ShowPurchase => match serde_json::from_value::<PurchaseRequest>(args.clone()) {
            Ok(request) => return evaluate_purchase(request),
            Err(_) => ToolOutput::Unrecognized {
                name: name.to_string(),
                result: args.clone(),
            },
        },
        _ => ToolOutput::from_name_and_value(name, args.clone()),
    };
    let view = render::tool_result(&output);
    ToolEvaluation {
        output,
        note: None,
        view,
    }
}

fn evaluate_purchase(request: PurchaseRequest) -> ToolEvaluation {
    let quantity = request.quantity.unwrap_or(1);
    let valid = (1..=MAX_PURCHASE_QUANTITY).contains(&quantity);
    let details = PurchaseDetails {
        item: request.item,
        price: request.price,
        quantity,
        status: if valid {
            PurchaseStatus::RequiresAction
        } else {
            PurchaseStatus::Expired
        },
    };
    let output = ToolOutput::ShowPurchase(details);

    if valid {
        let view = render::tool_result(&output);
        ToolEvaluation {
            output,
            note: None,
            view,
        }
    } else {
        tracing::warn!(quantity, "Rejected purchase quantity from model");
        ToolEvaluation {
            output,
            note: Some(INVALID_AMOUNT_NOTE.to_string()),
            view: UiNode::bot_text("Invalid amount"),
        }
    }
}

/// Tool schemas offered to the model
pub fn definitions() -> Vec<ToolDefinition> {
    let item_schema = json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "description": "Name of the menu item"},
            "price": {"type": "number", "description": "Price of the menu item in dollars"},
            "description": {"type": "string", "description": "Ingredients of the menu item"}
        },
        "required": ["name", "price"]
    });

    vec![
        ToolDefinition {
            name: LIST_MENU_ITEMS.to_string(),
            description: "List menu items that match the user's preferences and budget."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "items": {"type": "array", "items": item_schema.clone(), "maxItems": 5}
                },
                "required": ["items"]
            }),
        },
        ToolDefinition {
            name: SHOW_MENU_ITEM.to_string(),
            description: "Show a single menu item with its price and ingredients.".to_string(),
            input_schema: item_schema,
        },
        ToolDefinition {
            name: SHOW_PURCHASE.to_string(),
            description: "Show the UI to order a menu item. Use this if the user wants to order."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item": {"type": "string", "description": "Name of the menu item"},
                    "price": {"type": "number", "description": "Price of one item"},
                    "quantity": {
                        "type": "integer",
                        "description": "How many to order. Optional if the user did not say."
                    }
                },
                "required": ["item", "price"]
            }),
        },
    ]
}
