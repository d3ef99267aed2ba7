//! In-process publish/subscribe fan-out of workspace events.
//!
//! One [`EventBus`] instance is constructed at process start and passed by
//! reference to every component that publishes or subscribes; there is no
//! global dispatcher. Publishers never block and never see errors: a slow
//! subscriber loses its oldest queued events and is handed a synthetic
//! `events.gap` marker covering exactly the dropped range.

mod bus;
mod subscription;

pub use bus::EventBus;
pub use subscription::{StartPoint, Subscription};
