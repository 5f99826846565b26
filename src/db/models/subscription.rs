use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Address;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdminState {
    Locked,
    #[default]
    Unlocked,
}

impl AdminState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminState::Locked => "LOCKED",
            AdminState::Unlocked => "UNLOCKED",
        }
    }
}

impl FromStr for AdminState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCKED" => Ok(AdminState::Locked),
            "UNLOCKED" => Ok(AdminState::Unlocked),
            other => Err(AppError::ContractInvalid(format!(
                "unknown admin state '{}'",
                other
            ))),
        }
    }
}

/// Routing rule mapping category/label criteria to delivery channels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub id: String,
    /// Unique key.
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub channels: Vec<Address>,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub description: String,
    /// Positive values override the service-wide resend limit.
    #[serde(default)]
    pub resend_limit: i32,
    /// Non-empty values override the service-wide resend interval.
    #[serde(default)]
    pub resend_interval: String,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
}

impl Subscription {
    pub fn is_locked(&self) -> bool {
        self.admin_state == AdminState::Locked
    }

    /// True when any of the given categories or labels is shared with this subscription.
    pub fn matches(&self, categories: &[String], labels: &[String]) -> bool {
        self.categories.iter().any(|c| categories.contains(c))
            || self.labels.iter().any(|l| labels.contains(l))
    }
}
