//! Request and response messages of `example.Example`.

use portico::gateway::Message;
use serde::{Deserialize, Serialize};

/// Credentials for `Login`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginReq {
    /// Account name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

impl LoginReq {
    /// Both fields are required.
    pub fn validate(&self) -> Result<(), String> {
        required("username", &self.username)?;
        required("password", &self.password)
    }
}

impl Message for LoginReq {}

/// Outcome of `Login`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginResp {
    /// `success` or `failed`.
    pub status: String,
    /// Human-readable detail.
    pub description: String,
}

impl Message for LoginResp {}

/// Filter for `ListItems`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListItemsReq {
    /// Owner of the items.
    pub username: String,
    /// Item name to look for.
    pub item: String,
}

impl ListItemsReq {
    /// Both fields are required.
    pub fn validate(&self) -> Result<(), String> {
        required("username", &self.username)?;
        required("item", &self.item)
    }
}

impl Message for ListItemsReq {}

/// One item row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemData {
    /// Item id.
    pub item_id: i64,
    /// Display name.
    pub item_name: String,
    /// Category.
    pub category: String,
}

/// Items found by `ListItems`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListItemsResp {
    /// `success` or `failed`.
    pub status: String,
    /// Matching items.
    pub item: Vec<ItemData>,
}

impl Message for ListItemsResp {}

fn required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}
