//! Domain models shared by the persistence layer and the delivery services.

pub mod address;
pub mod notification;
pub mod subscription;
pub mod transmission;

pub use self::address::*;
pub use self::notification::*;
pub use self::subscription::*;
pub use self::transmission::*;

/// Current wall-clock time as epoch milliseconds, the unit every stored timestamp uses.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
