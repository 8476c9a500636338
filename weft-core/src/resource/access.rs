//! Resource handles and type-erased resource accesses.
//!
//! The two predicates exported from here — [`ResourceAccess::must_be_ordered`]
//! and [`ResourceAccess::is_superset_of`] — are the *sole* primitives the task
//! space uses to build graph edges. No access policy ever needs to know about
//! tasks or scheduling.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::task::TaskKey;

/// Counter for generating process-unique resource IDs.
static RESOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a resource.
///
/// Handle copies share the identifier; two handles denote the same resource
/// iff their IDs are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Generate a new unique resource ID.
    fn next() -> Self {
        Self(RESOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Shared state behind every handle copy of one resource: the identity, the
/// nesting scope, and the list of tasks currently registered on it.
pub(crate) struct ResourceCore {
    pub(crate) id: ResourceId,
    pub(crate) scope_level: u32,

    /// Tasks currently holding an access to this resource, in registration
    /// (drain) order. The task space appends during graph wiring and removes
    /// entries when a task is reclaimed.
    pub(crate) users: Mutex<Vec<TaskKey>>,
}

/// How accesses of one resource kind may conflict.
///
/// An implementation of this trait creates a new resource type
/// (`Resource<P>`) and defines the possible access modes for it.
pub trait AccessPolicy: Clone + PartialEq + fmt::Display + Send + Sync + 'static {
    /// Check whether two accesses have to be ordered.
    ///
    /// Must be symmetric: `is_serial(a, b) == is_serial(b, a)`. For a plain
    /// read/write mode, two reads return `false` and any pairing involving a
    /// write returns `true`.
    fn is_serial(a: &Self, b: &Self) -> bool;

    /// Check whether `self`'s effect covers `other`'s.
    ///
    /// Not necessarily symmetric; used to validate nested-space scoping
    /// (a sub-task's access must be covered by its parent's).
    fn is_superset_of(&self, other: &Self) -> bool;
}

/// Capability set every concrete access mode exposes through the erased
/// handle: conflict test, subsume test, equality, clone and formatting.
trait AccessObject: Send + Sync {
    fn core(&self) -> &Arc<ResourceCore>;

    /// The policy value as `Any`, for cross-type identity checks.
    fn policy_any(&self) -> &dyn Any;

    fn is_serial_with(&self, other: &dyn AccessObject) -> bool;
    fn is_superset_of(&self, other: &dyn AccessObject) -> bool;
    fn eq_access(&self, other: &dyn AccessObject) -> bool;
    fn mode_format(&self) -> String;
    fn clone_box(&self) -> Box<dyn AccessObject>;
}

/// The one concrete `AccessObject`: a policy value bound to a resource core.
struct ModeAccess<P: AccessPolicy> {
    core: Arc<ResourceCore>,
    policy: P,
}

impl<P: AccessPolicy> AccessObject for ModeAccess<P> {
    fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    fn policy_any(&self) -> &dyn Any {
        &self.policy
    }

    fn is_serial_with(&self, other: &dyn AccessObject) -> bool {
        // Differing policy types can never address the same resource.
        match other.policy_any().downcast_ref::<P>() {
            Some(other_policy) => {
                self.core.id == other.core().id && P::is_serial(&self.policy, other_policy)
            }
            None => false,
        }
    }

    fn is_superset_of(&self, other: &dyn AccessObject) -> bool {
        match other.policy_any().downcast_ref::<P>() {
            Some(other_policy) => {
                self.core.id == other.core().id && self.policy.is_superset_of(other_policy)
            }
            None => false,
        }
    }

    fn eq_access(&self, other: &dyn AccessObject) -> bool {
        match other.policy_any().downcast_ref::<P>() {
            Some(other_policy) => self.core.id == other.core().id && self.policy == *other_policy,
            None => false,
        }
    }

    fn mode_format(&self) -> String {
        self.policy.to_string()
    }

    fn clone_box(&self) -> Box<dyn AccessObject> {
        Box::new(ModeAccess {
            core: self.core.clone(),
            policy: self.policy.clone(),
        })
    }
}

/// A concrete access configuration on a resource: an (access mode, resource)
/// pair with the mode's type erased.
///
/// This is the only channel through which dependency information enters the
/// task graph.
pub struct ResourceAccess {
    obj: Box<dyn AccessObject>,
}

impl ResourceAccess {
    /// Check whether two accesses must execute in a fixed order.
    ///
    /// True iff both reference the same resource and their modes conflict
    /// under that mode type's rule. Accesses of differing mode types are
    /// always unordered.
    pub fn must_be_ordered(a: &ResourceAccess, b: &ResourceAccess) -> bool {
        a.obj.is_serial_with(&*b.obj)
    }

    /// Check whether this access's effect covers `other`'s.
    pub fn is_superset_of(&self, other: &ResourceAccess) -> bool {
        self.obj.is_superset_of(&*other.obj)
    }

    /// Check whether `other` references the same resource.
    ///
    /// Accesses of differing mode types report `false`: they cannot by
    /// construction share a resource.
    pub fn same_resource(&self, other: &ResourceAccess) -> bool {
        other.obj.policy_any().type_id() == self.obj.policy_any().type_id()
            && self.resource_id() == other.resource_id()
    }

    /// The identity of the accessed resource.
    pub fn resource_id(&self) -> ResourceId {
        self.obj.core().id
    }

    /// The nesting scope level of the accessed resource.
    pub fn scope_level(&self) -> u32 {
        self.obj.core().scope_level
    }

    /// Render the access mode for logs and diagnostics.
    pub fn mode_format(&self) -> String {
        self.obj.mode_format()
    }

    pub(crate) fn core(&self) -> Arc<ResourceCore> {
        self.obj.core().clone()
    }
}

impl Clone for ResourceAccess {
    fn clone(&self) -> Self {
        Self {
            obj: self.obj.clone_box(),
        }
    }
}

impl PartialEq for ResourceAccess {
    fn eq(&self, other: &Self) -> bool {
        self.obj.eq_access(&*other.obj)
    }
}

impl fmt::Debug for ResourceAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceAccess")
            .field("resource", &self.resource_id())
            .field("scope_level", &self.scope_level())
            .field("mode", &self.mode_format())
            .finish()
    }
}

/// A handle to a piece of shared state.
///
/// # Type Parameters
///
/// - `P`: the [`AccessPolicy`] defining the access modes possible on this
///   resource.
///
/// Cloned handles represent the same resource; the clone is cheap (one
/// reference count).
pub struct Resource<P: AccessPolicy> {
    core: Arc<ResourceCore>,
    _policy: PhantomData<fn() -> P>,
}

impl<P: AccessPolicy> Resource<P> {
    /// Create a new resource at scope level 0 with an unused ID.
    pub fn new() -> Self {
        Self::with_scope(0)
    }

    /// Create a new resource at the given nesting scope level.
    ///
    /// Resources created for use inside a nested task space carry the
    /// enclosing task's depth plus one.
    pub fn with_scope(scope_level: u32) -> Self {
        Self {
            core: Arc::new(ResourceCore {
                id: ResourceId::next(),
                scope_level,
                users: Mutex::new(Vec::new()),
            }),
            _policy: PhantomData,
        }
    }

    /// The resource's unique ID.
    pub fn id(&self) -> ResourceId {
        self.core.id
    }

    /// The resource's nesting scope level.
    pub fn scope_level(&self) -> u32 {
        self.core.scope_level
    }

    /// Create a [`ResourceAccess`] representing a concrete access
    /// configuration on this resource.
    pub fn make_access(&self, policy: P) -> ResourceAccess {
        ResourceAccess {
            obj: Box::new(ModeAccess {
                core: self.core.clone(),
                policy,
            }),
        }
    }
}

impl<P: AccessPolicy> Clone for Resource<P> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _policy: PhantomData,
        }
    }
}

impl<P: AccessPolicy> Default for Resource<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: AccessPolicy> PartialEq for Resource<P> {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl<P: AccessPolicy> fmt::Debug for Resource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.core.id)
            .field("scope_level", &self.core.scope_level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{IoAccess, RangeAccess};

    #[test]
    fn resource_ids_are_unique() {
        let a: Resource<IoAccess> = Resource::new();
        let b: Resource<IoAccess> = Resource::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn cloned_handles_are_the_same_resource() {
        let a: Resource<IoAccess> = Resource::new();
        let b = a.clone();
        assert_eq!(a, b);
        assert!(a.make_access(IoAccess::Read).same_resource(&b.make_access(IoAccess::Write)));
    }

    #[test]
    fn conflict_is_symmetric() {
        let r: Resource<IoAccess> = Resource::new();
        let modes = [IoAccess::Read, IoAccess::Write];
        for a in &modes {
            for b in &modes {
                let left = r.make_access(a.clone());
                let right = r.make_access(b.clone());
                assert_eq!(
                    ResourceAccess::must_be_ordered(&left, &right),
                    ResourceAccess::must_be_ordered(&right, &left),
                );
            }
        }
    }

    #[test]
    fn unrelated_resources_are_independent() {
        let a: Resource<IoAccess> = Resource::new();
        let b: Resource<IoAccess> = Resource::new();
        let wa = a.make_access(IoAccess::Write);
        let wb = b.make_access(IoAccess::Write);
        assert!(!ResourceAccess::must_be_ordered(&wa, &wb));
        assert!(!wa.same_resource(&wb));
    }

    #[test]
    fn differing_mode_types_never_compare() {
        let io: Resource<IoAccess> = Resource::new();
        let ranged: Resource<RangeAccess> = Resource::new();

        let a = io.make_access(IoAccess::Write);
        let b = ranged.make_access(RangeAccess::write(0..4));

        assert!(!ResourceAccess::must_be_ordered(&a, &b));
        assert!(!ResourceAccess::must_be_ordered(&b, &a));
        assert!(!a.same_resource(&b));
        assert!(!a.is_superset_of(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn access_equality_requires_same_mode() {
        let r: Resource<IoAccess> = Resource::new();
        assert_eq!(r.make_access(IoAccess::Read), r.make_access(IoAccess::Read));
        assert_ne!(r.make_access(IoAccess::Read), r.make_access(IoAccess::Write));
    }

    #[test]
    fn scope_level_is_carried_into_accesses() {
        let r: Resource<IoAccess> = Resource::with_scope(2);
        let access = r.make_access(IoAccess::Read);
        assert_eq!(access.scope_level(), 2);
    }
}
