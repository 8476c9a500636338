//! Task objects and their storage.
//!
//! A [`Task`] is the unit of scheduling: a work closure, the resource
//! accesses declared at creation, a property bag, and the bookkeeping the
//! space needs to wire it into the graph and later reclaim it. Task memory
//! lives in the [`TaskArena`]; everything outside the arena refers to a task
//! through its [`TaskKey`].
//!
//! # Lifecycle
//!
//! A task moves through created, initialized (wired into the graph, possibly
//! blocked on predecessors), ready, running, and done. Once done it lingers
//! until its result is consumed and its child space is empty; only then is
//! its slot freed.
//!
//! The liveness flag is the safe-destruction gate: only the caller that wins
//! the compare-and-swap from alive to dead may free the task, which makes a
//! racing second removal a structural no-op.

mod arena;
mod event;
mod properties;
mod queue;

pub use arena::{TaskArena, TaskKey};
pub use event::Event;
pub use properties::{
    CustomPatch, CustomProperties, LabelPatch, LabelProperty, PropertyFragment, TagPatch,
    TagProperty, TaskProperties, TaskPropertiesPatch,
};
pub use queue::EmplacementQueue;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::resource::ResourceAccess;
use crate::space::TaskSpace;

/// The work closure a task runs.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Unique identifier for a task.
///
/// Distinct from [`TaskKey`]: the ID is stable and never reused, while the
/// key locates the (reusable) arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Generate a new unique task ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Observable task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Enqueued, not yet wired into the graph.
    Created = 0,
    /// Wired into the graph; blocked if predecessors remain.
    Initialized = 1,
    /// All predecessors complete; eligible for dispatch.
    Ready = 2,
    /// Work closure executing.
    Running = 3,
    /// Work finished; awaiting result consumption and child completion.
    Done = 4,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Created,
            1 => TaskState::Initialized,
            2 => TaskState::Ready,
            3 => TaskState::Running,
            _ => TaskState::Done,
        }
    }
}

/// A single task.
///
/// All shared fields are atomics or internally locked, so the arena slot can
/// stay read-shared during graph traversal and is taken exclusively only at
/// removal.
pub struct Task {
    id: TaskId,

    /// The resource accesses declared at creation; immutable afterwards.
    pub(crate) accesses: SmallVec<[ResourceAccess; 4]>,

    /// Composed property bag.
    pub(crate) properties: TaskProperties,

    /// Owning space, used to route readiness notifications for cross-space
    /// successors.
    pub(crate) space: Weak<TaskSpace>,

    state: AtomicU8,

    /// Liveness flag; the exactly-once destruction gate.
    pub(crate) alive: AtomicBool,

    /// Unresolved-predecessor counter, plus one wiring guard held while the
    /// task's edges are being built.
    pub(crate) pre_count: AtomicUsize,

    /// Predecessor keys, recorded at wiring time. Introspection only.
    pub(crate) predecessors: Mutex<SmallVec<[TaskKey; 4]>>,

    /// Successor keys awaiting this task's completion. Drained exactly once,
    /// under the lock, when the task completes.
    pub(crate) successors: Mutex<SmallVec<[TaskKey; 4]>>,

    /// Completion event: the work closure has run.
    pub(crate) post_event: Arc<Event>,

    /// Result event: whoever wanted the outcome has consumed it.
    pub(crate) result_event: Arc<Event>,

    /// Nested sub-space holding this task's children, if any were created.
    pub(crate) children: Mutex<Option<Arc<TaskSpace>>>,

    /// The work closure; taken exactly once at execution.
    pub(crate) work: Mutex<Option<Work>>,
}

impl Task {
    pub(crate) fn new(
        space: Weak<TaskSpace>,
        work: Work,
        properties: TaskProperties,
        accesses: SmallVec<[ResourceAccess; 4]>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            accesses,
            properties,
            space,
            state: AtomicU8::new(TaskState::Created as u8),
            alive: AtomicBool::new(false),
            // one wiring guard, released when edge construction finishes
            pre_count: AtomicUsize::new(1),
            predecessors: Mutex::new(SmallVec::new()),
            successors: Mutex::new(SmallVec::new()),
            post_event: Arc::new(Event::new()),
            result_event: Arc::new(Event::new()),
            children: Mutex::new(None),
            work: Mutex::new(Some(work)),
        }
    }

    /// The task's unique ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's current state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The task's property bag.
    pub fn properties(&self) -> &TaskProperties {
        &self.properties
    }

    /// The resource accesses declared at creation.
    pub fn accesses(&self) -> &[ResourceAccess] {
        &self.accesses
    }

    /// A minimal task for storage-level tests: no work, no accesses.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(
            Weak::new(),
            Box::new(|| {}),
            TaskProperties::default(),
            SmallVec::new(),
        )
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("accesses", &self.accesses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_task_starts_created_and_guarded() {
        let task = Task::for_tests();
        assert_eq!(task.state(), TaskState::Created);
        assert!(!task.alive.load(Ordering::Relaxed));
        assert_eq!(task.pre_count.load(Ordering::Relaxed), 1);
        assert!(!task.post_event.is_reached());
        assert!(!task.result_event.is_reached());
    }

    #[test]
    fn state_round_trips() {
        let task = Task::for_tests();
        for state in [
            TaskState::Initialized,
            TaskState::Ready,
            TaskState::Running,
            TaskState::Done,
        ] {
            task.set_state(state);
            assert_eq!(task.state(), state);
        }
    }
}
