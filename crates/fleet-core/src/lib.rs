//! # fleet-core
//!
//! Foundation types for the fleet coordination platform.
//!
//! This crate provides the shared vocabulary that all other fleet crates
//! depend on:
//!
//! - **Branded IDs**: `RobotId`, `TransportSessionId`, `UserId`, `GroupId`,
//!   `CommandId` as newtypes for type safety
//! - **Commands**: [`RobotCommand`] with a closed [`CommandVerb`] set and
//!   ordered [`CommandPriority`]
//! - **Status**: [`RobotStatus`] as reported by robots over the transport

#![deny(unsafe_code)]

pub mod command;
pub mod ids;
pub mod status;

pub use command::{CommandPriority, CommandVerb, RobotCommand};
pub use ids::{CommandId, GroupId, RobotId, TransportSessionId, UserId};
pub use status::RobotStatus;
