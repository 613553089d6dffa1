//! Core types shared by every pipeline.
//!
//! - [`types`]: stream identifiers and stream purposes
//! - [`events`]: typed events and the publish/subscribe bus

pub mod events;
pub mod types;
