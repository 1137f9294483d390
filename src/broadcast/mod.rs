//! Broadcast hub
//!
//! Fans trading-state, market and risk messages out to any number of
//! subscribers. Each subscriber has a bounded queue; one that falls behind is
//! dropped rather than slowing the publisher.

mod hub;
mod types;

pub use hub::{BroadcastHub, Subscription};
pub use types::{IndicatorSnapshot, Message, Payload, PositionUpdate, SubscriberId};
