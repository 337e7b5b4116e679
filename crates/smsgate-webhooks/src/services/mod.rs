//! Engine services: subscription registry, event router, delivery execution.

pub mod delivery_service;
pub mod event_router;
pub mod subscription_service;
