//! Routing table and the structures it is built from.

pub mod bucket;
pub mod closest;
pub mod node;
pub mod table;
