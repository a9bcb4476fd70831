//! # fleet-coordination
//!
//! The robot fleet coordination core.
//!
//! Tracks which robots are currently connected, routes commands to them with
//! priority and timeout semantics, aggregates robots into user-owned groups
//! for bulk operations, detects liveness failure via heartbeats, and provides
//! an emergency-stop safety path.
//!
//! - **Registry**: sharded in-memory map of live robot connections
//! - **Dispatcher**: validate-then-route with queue fallback; nothing is
//!   silently dropped
//! - **Queue**: per-robot backlog, priority-then-FIFO, capped
//! - **Groups**: named robot sets with exhaustive per-member fan-out
//! - **Monitor**: fixed-interval staleness sweep with bounded detection latency
//! - **Emergency stop**: best-effort critical broadcast with per-robot outcomes
//!
//! Everything is explicitly constructed and dependency-injected; connection
//! state lives purely in memory and is rebuilt from live reconnects after a
//! restart.

#![deny(unsafe_code)]

pub mod audit;
pub mod connection;
pub mod coordinator;
pub mod dispatch;
pub mod errors;
pub mod estop;
pub mod gateway;
pub mod groups;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod stats;
pub mod store;

pub use audit::{DispatchAudit, DispatchOutcome, DispatchRecord};
pub use connection::RobotConnection;
pub use coordinator::FleetCoordinator;
pub use dispatch::{CommandDispatcher, DrainReport, SendOutcome, SweepReport};
pub use errors::{CoordinationError, Result};
pub use estop::EmergencyStopReport;
pub use gateway::{
    ActionScope, Authorizer, CommandEnvelope, DeliveryStatus, NotificationKind, Notifier,
    TransportGateway,
};
pub use groups::{GroupCommandReport, GroupManager, RobotGroup};
pub use monitor::HeartbeatMonitor;
pub use queue::{CommandQueue, EnqueueOutcome, QueueEntry};
pub use registry::{ConnectionRegistry, RegisterOutcome};
pub use stats::PlatformStats;
pub use store::{GroupStore, OwnershipStore, StoreError};
