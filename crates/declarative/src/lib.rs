//! # Declarative
//!
//! Plan and apply changes to quadlet components.
//!
//! Given the components installed on a host and the components assigned
//! to it, the [`Planner`] works out which files, services and podman
//! objects need to change. The resulting [`Plan`] orders those changes so
//! that stops come first, file changes next, a single daemon reload after
//! them, service starts after that and destructive cleanup last. The
//! [`Executor`] applies the plan step by step and then waits, in parallel,
//! for touched services to settle.
//!
//! ## Core Concepts
//!
//! - **ComponentGraph**: installed and assigned components paired by name
//! - **Action**: one change to one resource
//! - **Plan**: prioritised, coalesced, validated action list
//! - **Executor**: dispatches each action to a handler
//!
//! ## Example
//!
//! ```
//! use components::{Component, Resource, ServiceResourceConfig};
//! use declarative::memory::MemoryHost;
//! use declarative::{ExecuteOptions, Executor, Planner, PlannerConfig};
//!
//! let mut hello = Component::new("hello");
//! hello
//!     .add_resource(
//!         Resource::from_path("hello", "hello.container")
//!             .with_content("[Container]\nImage=nginx\n"),
//!     )
//!     .unwrap();
//! hello.services.add(ServiceResourceConfig::new("hello.service"));
//! hello.resolve_host_objects().unwrap();
//!
//! let host = MemoryHost::new();
//! let plan = Planner::new(&host, PlannerConfig::default())
//!     .plan(vec![], vec![hello])
//!     .unwrap();
//! assert_eq!(plan.steps().len(), 4);
//!
//! let summary = Executor::new(&host, &host, ExecuteOptions::default())
//!     .execute(&plan)
//!     .unwrap();
//! assert_eq!(summary.completed, 4);
//! ```
//!
//! ## Collaborator Traits
//!
//! The crate never talks to systemd, podman or the filesystem itself:
//!
//! - [`HostStateManager`]: live service and podman state, plus mutations
//! - [`ComponentReader`]: loads components from the host or the source
//! - [`ComponentWriter`]: writes component files to the host
//!
//! [`memory::MemoryHost`] implements the host-side traits in memory.

pub mod action;
pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod memory;
pub mod plan;
pub mod planner;
pub mod types;
pub mod validate;

// Re-export main types at crate root
pub use action::{Action, ActionMetadata, ActionRecord, ActionType};
pub use context::{CancelToken, ComponentReader, ComponentWriter, HostStateManager};
pub use error::{ExecuteError, ExecuteErrorKind, PlanError, Result};
pub use executor::Executor;
pub use graph::{ComponentGraph, ComponentTree, TreeKind};
pub use plan::{Plan, coalesce, default_priority};
pub use planner::{Planner, PlannerConfig};
pub use types::{
    ContainerInfo, ExecuteOptions, ExecuteSummary, ImageInfo, NetworkInfo, ServiceOp,
    ServiceStatus, UnitState, VolumeInfo,
};
pub use validate::{Validator, Violation, default_validators, validate};
