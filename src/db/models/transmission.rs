use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{now_millis, Address};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransmissionStatus {
    Sent,
    Failed,
    Resending,
    Escalated,
}

impl TransmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionStatus::Sent => "SENT",
            TransmissionStatus::Failed => "FAILED",
            TransmissionStatus::Resending => "RESENDING",
            TransmissionStatus::Escalated => "ESCALATED",
        }
    }
}

impl FromStr for TransmissionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(TransmissionStatus::Sent),
            "FAILED" => Ok(TransmissionStatus::Failed),
            "RESENDING" => Ok(TransmissionStatus::Resending),
            "ESCALATED" => Ok(TransmissionStatus::Escalated),
            other => Err(AppError::ContractInvalid(format!(
                "unknown transmission status '{}'",
                other
            ))),
        }
    }
}

/// Outcome of one delivery attempt. Immutable once appended to a transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionRecord {
    /// Either `Sent` or `Failed`.
    pub status: TransmissionStatus,
    pub response: String,
    pub sent: i64,
}

impl TransmissionRecord {
    pub fn sent(response: impl Into<String>) -> Self {
        Self {
            status: TransmissionStatus::Sent,
            response: response.into(),
            sent: now_millis(),
        }
    }

    pub fn failed(response: impl Into<String>) -> Self {
        Self {
            status: TransmissionStatus::Failed,
            response: response.into(),
            sent: now_millis(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == TransmissionStatus::Sent
    }
}

/// Attempt series for one (notification, subscription, channel) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transmission {
    pub id: String,
    pub created: i64,
    pub subscription_name: String,
    pub notification_id: String,
    pub channel: Address,
    pub status: TransmissionStatus,
    pub records: Vec<TransmissionRecord>,
    pub resend_count: i32,
}

impl Transmission {
    /// Builds a transmission whose status mirrors its first attempt.
    pub fn from_first_attempt(
        notification_id: &str,
        subscription_name: &str,
        channel: &Address,
        record: TransmissionRecord,
    ) -> Self {
        Self {
            id: String::new(),
            created: 0,
            subscription_name: subscription_name.to_string(),
            notification_id: notification_id.to_string(),
            channel: channel.clone(),
            status: record.status,
            records: vec![record],
            resend_count: 0,
        }
    }
}
