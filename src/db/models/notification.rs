use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Normal,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "NORMAL",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Severity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(Severity::Normal),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(AppError::ContractInvalid(format!(
                "unknown notification severity '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    #[default]
    New,
    Processed,
    Escalated,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::New => "NEW",
            NotificationStatus::Processed => "PROCESSED",
            NotificationStatus::Escalated => "ESCALATED",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(NotificationStatus::New),
            "PROCESSED" => Ok(NotificationStatus::Processed),
            "ESCALATED" => Ok(NotificationStatus::Escalated),
            other => Err(AppError::ContractInvalid(format!(
                "unknown notification status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message to be delivered to every subscription whose categories or labels match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Assigned by the store on insert when empty.
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub content_type: String,
    pub sender: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub status: NotificationStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acknowledged: bool,
    /// Epoch millis; zero means "assign on insert".
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
}

impl Notification {
    /// Categories used for subscription matching: the single category, or nothing when blank.
    pub fn match_categories(&self) -> Vec<String> {
        if self.category.trim().is_empty() {
            Vec::new()
        } else {
            vec![self.category.clone()]
        }
    }

    /// Checks the fields ingestion requires before a notification may be stored.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sender.trim().is_empty() {
            return Err(AppError::ContractInvalid("sender is empty".to_string()));
        }
        if self.content.is_empty() {
            return Err(AppError::ContractInvalid("content is empty".to_string()));
        }
        if self.category.trim().is_empty() && self.labels.iter().all(|l| l.trim().is_empty()) {
            return Err(AppError::ContractInvalid(
                "at least one of category or labels must be specified".to_string(),
            ));
        }
        Ok(())
    }
}
