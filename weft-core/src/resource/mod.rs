//! Resources and the access algebra.
//!
//! This module implements the dependency-inference half of the runtime:
//! typed handles to shared state ([`Resource`]) and comparable access
//! descriptors ([`ResourceAccess`]).
//!
//! # Concepts
//!
//! ## Resources
//!
//! A `Resource` is a process-unique handle to a piece of shared state.
//! Copies of a handle denote the *same* resource; identity is the resource
//! id, not the handle address. A resource knows its nesting scope level and
//! keeps a back-reference to the tasks currently holding an access to it,
//! which is what the task space walks when it wires dependency edges.
//!
//! ## Access policies
//!
//! How accesses to a resource may conflict is defined by a pluggable
//! [`AccessPolicy`]: a conflict predicate (`is_serial`, symmetric) and a
//! subsumption predicate (`is_superset_of`, asymmetric). New resource kinds
//! (a scalar cell, an array region, an I/O handle) are added by writing a
//! policy; graph construction never changes.
//!
//! ## Type-erased comparison
//!
//! A [`ResourceAccess`] erases the policy type so that heterogeneous access
//! lists can be stored per task. Two accesses are only comparable when their
//! policy types match; across types they are reported as unrelated, never as
//! an error — by construction they cannot reference the same resource.

mod access;
mod io;
mod range;

pub use access::{AccessPolicy, Resource, ResourceAccess, ResourceId};
pub use io::{IoAccess, IoResource};
pub use range::{RangeAccess, RangeAccessBuilder, RangeResource};
