//! Business Layer

pub mod subscription;

pub use subscription::{SubscriptionInfo, SubscriptionService, SubscriptionStats};
