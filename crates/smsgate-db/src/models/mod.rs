//! Database row models.

pub mod webhook_delivery;
pub mod webhook_subscription;

pub use webhook_delivery::{
    CreateWebhookDelivery, DeliveryFilter, DeliveryStatusCounts, EventTypeCount, WebhookDelivery,
};
pub use webhook_subscription::{
    CreateWebhookSubscription, UpdateWebhookSubscription, WebhookSubscription,
};
