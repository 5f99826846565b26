pub mod notification;
pub mod subscription;
pub mod transmission;

pub use notification::NotificationRepository;
pub use subscription::SubscriptionRepository;
pub use transmission::TransmissionRepository;
