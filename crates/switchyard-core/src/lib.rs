//! Shared types for the switchyard gateway: identifiers, collaborator
//! contracts (completion provider, remote tool client) and tool metadata.

pub mod errors;
pub mod ids;
pub mod provider;
pub mod remote;
pub mod tools;
