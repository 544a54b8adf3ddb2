//! Domain layer: payment records, extracted candidates, and the collaborator ports the
//! application layer depends on.

pub mod candidate;
pub mod link;
pub mod message;
pub mod money;
pub mod order;
pub mod ports;
pub mod provider;
