//! Notification distribution core: subscription matching, per-channel delivery,
//! resend of critical failures, escalation and retention.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use config::Config;
use db::DbClient;
use services::channel::Senders;
use services::distribution::Distributor;
use services::retention::Purger;

pub struct AppState {
    pub db: Arc<dyn DbClient>,
    pub config: Config,
    pub senders: Senders,
    pub distributor: Arc<Distributor>,
    pub purger: Arc<Purger>,
}
