//! Contains the building blocks of the alert pipeline.
//!
//! Each tick the monitor runs fetched events through these components in
//! order: the filter decides what the user cares about, the scheduler decides
//! what fires now, and the lifecycle owns whatever is on screen. The link
//! extractor is shared by all three.

pub mod filter;
pub mod lifecycle;
pub mod link;
pub mod scheduler;
