//! Weft Core
//!
//! This crate provides the core runtime for the weft task-graph engine. It
//! expresses parallel computations as a dynamically built task graph whose
//! dependencies are *inferred* rather than declared: a task states which
//! shared resources it reads or writes, and the runtime derives the edges by
//! comparing those declarations pairwise. Independent branches of a
//! computation run in parallel automatically; nobody hand-builds a DAG.
//!
//! # Architecture
//!
//! The crate is organized into three layers:
//!
//! - `resource`: resource handles and the access algebra — the conflict and
//!   subsumption predicates that drive dependency inference
//! - `task`: task objects, the chunked generation-checked arena they live
//!   in, the emplacement queue, events, and composable properties
//! - `space`: the task space, which drains the queue, wires graph edges,
//!   tracks readiness, and reclaims finished tasks; plus the scheduler
//!   notification contract
//!
//! Execution itself is external: the space tells a [`Scheduler`] that work
//! may be ready, and the scheduler pulls tasks via
//! [`TaskSpace::pop_ready`] and runs them with [`TaskSpace::execute`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft_core::{IoResource, NoopScheduler, SpaceConfig, TaskSpace};
//!
//! let space = TaskSpace::new(SpaceConfig::default(), Arc::new(NoopScheduler));
//! let field = IoResource::new();
//!
//! // two writers and a reader on the same resource: the runtime orders
//! // them; unrelated tasks would run in parallel
//! let a = space.emplace(|| println!("produce")).access(field.write()).submit()?;
//! let b = space.emplace(|| println!("update")).access(field.write()).submit()?;
//! let c = space.emplace(|| println!("consume")).access(field.read()).submit()?;
//!
//! while space.init_until_ready() {}
//! while let Some(task) = space.pop_ready() {
//!     space.execute(task);
//! }
//! c.wait();
//! ```

pub mod config;
pub mod error;
pub mod resource;
pub mod space;
pub mod task;

pub use config::SpaceConfig;
pub use error::EmplaceError;
pub use resource::{
    AccessPolicy, IoAccess, IoResource, RangeAccess, RangeResource, Resource, ResourceAccess,
    ResourceId,
};
pub use space::{CountingScheduler, NoopScheduler, Scheduler, TaskBuilder, TaskHandle, TaskSpace};
pub use task::{TaskId, TaskKey, TaskProperties, TaskPropertiesPatch, TaskState};
