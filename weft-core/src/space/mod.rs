//! Task spaces: graph construction and lifecycle.
//!
//! A [`TaskSpace`] owns a set of tasks: it allocates their memory from the
//! arena, drains the emplacement queue, infers dependency edges from the
//! declared resource accesses, tracks liveness, and reclaims finished tasks.
//! Spaces nest: a task may open a sub-space for its children, forming a tree
//! whose depth matches resource scope depth.
//!
//! # How edges are inferred
//!
//! No caller ever declares an edge. During the drain, each popped task's
//! accesses are compared against the accesses of the tasks already
//! registered on the same resources, in submission order, using
//! [`ResourceAccess::must_be_ordered`]. Every conflicting, still-incomplete
//! prior task becomes a predecessor. Each resource therefore behaves like a
//! lock queue granting access in FIFO arrival order, refined by the access
//! mode's own rule — concurrent reads do not serialize each other.
//!
//! # Readiness and reclamation
//!
//! A task carries an unresolved-predecessor counter, pre-charged with one
//! wiring guard so it cannot hit zero while its edges are still being built.
//! Whoever performs the final decrement — the drain releasing the guard, or
//! the last predecessor completing — marks the task ready and queues it for
//! the external scheduler to pull. Reclamation is gated three ways
//! (completion event, result event, empty child space) and funnelled through
//! an atomic liveness compare-and-swap, so racing removal attempts collapse
//! into exactly one free.

mod scheduler;

pub use scheduler::{CountingScheduler, NoopScheduler, Scheduler};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::SpaceConfig;
use crate::error::EmplaceError;
use crate::resource::ResourceAccess;
use crate::task::{
    EmplacementQueue, Event, Task, TaskArena, TaskId, TaskKey, TaskProperties, TaskState, Work,
};

/// Back-reference from a sub-space to the task that opened it.
struct ParentLink {
    space: Weak<TaskSpace>,
    key: TaskKey,
}

/// A container of tasks, flat (root) or nested under a parent task.
pub struct TaskSpace {
    /// Self-reference handed to tasks and sub-spaces; spaces only ever live
    /// behind an `Arc`.
    self_ref: Weak<TaskSpace>,

    /// Nesting depth; 0 for the root space.
    depth: u32,

    /// Set for sub-spaces only.
    parent: Option<ParentLink>,

    /// Task storage, shared across the whole space tree so `TaskKey`s are
    /// unambiguous between parent and child spaces.
    arena: Arc<TaskArena>,

    /// Intake queue for tasks submitted but not yet wired.
    queue: EmplacementQueue,

    /// Serializes concurrent drains.
    drain_lock: Mutex<()>,

    /// Tasks ready for dispatch, pulled by the external scheduler.
    ready: Mutex<VecDeque<TaskKey>>,

    /// Live tasks in this space (emplaced and not yet freed).
    task_count: AtomicUsize,

    scheduler: Arc<dyn Scheduler>,
}

impl TaskSpace {
    /// Create a root task space.
    pub fn new(config: SpaceConfig, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            depth: 0,
            parent: None,
            arena: Arc::new(TaskArena::new(config.chunk_capacity, config.max_chunks)),
            queue: EmplacementQueue::new(),
            drain_lock: Mutex::new(()),
            ready: Mutex::new(VecDeque::new()),
            task_count: AtomicUsize::new(0),
            scheduler,
        })
    }

    /// A strong reference to this space. Valid whenever a method is being
    /// called, since spaces only live behind `Arc`.
    fn strong(&self) -> Arc<TaskSpace> {
        self.self_ref.upgrade().expect("task space dropped while in use")
    }

    /// This space's nesting depth.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of live tasks (emplaced and not yet freed).
    pub fn task_count(&self) -> usize {
        self.task_count.load(Ordering::Acquire)
    }

    /// True iff no live tasks remain.
    ///
    /// An enclosing task uses this to know its children have all completed
    /// before it may itself be reclaimed.
    pub fn empty(&self) -> bool {
        self.task_count() == 0
    }

    /// Start building a task around `work`.
    ///
    /// Accesses and properties are added on the returned builder; nothing is
    /// submitted until [`TaskBuilder::submit`].
    pub fn emplace(&self, work: impl FnOnce() + Send + 'static) -> TaskBuilder {
        TaskBuilder {
            space: self.strong(),
            work: Box::new(work),
            accesses: SmallVec::new(),
            properties: TaskProperties::default(),
        }
    }

    /// Get (or create) the sub-space for the children of the task behind
    /// `key`.
    ///
    /// Returns `None` if the task has already been reclaimed.
    pub fn subspace_for(&self, key: TaskKey) -> Option<Arc<TaskSpace>> {
        self.arena.with(key, |task| {
            let mut children = task.children.lock();
            if children.is_none() {
                *children = Some(Arc::new_cyclic(|self_ref| TaskSpace {
                    self_ref: self_ref.clone(),
                    depth: self.depth + 1,
                    parent: Some(ParentLink {
                        space: self.self_ref.clone(),
                        key,
                    }),
                    arena: self.arena.clone(),
                    queue: EmplacementQueue::new(),
                    drain_lock: Mutex::new(()),
                    ready: Mutex::new(VecDeque::new()),
                    task_count: AtomicUsize::new(0),
                    scheduler: self.scheduler.clone(),
                }));
            }
            children.clone().expect("just initialized")
        })
    }

    /// Take tasks from the emplacement queue and wire them into the graph,
    /// until one is initialized whose execution could start immediately.
    ///
    /// Returns `true` if a ready task was found, `false` once the queue is
    /// drained. Stopping at the first ready task bounds the latency of
    /// producing runnable work; remaining queued tasks are handled by
    /// subsequent calls.
    pub fn init_until_ready(&self) -> bool {
        let _guard = self.drain_lock.lock();
        while let Some(key) = self.queue.pop() {
            if self.init_task(key) {
                return true;
            }
        }
        false
    }

    /// Pull the next ready task, if any.
    pub fn pop_ready(&self) -> Option<TaskKey> {
        self.ready.lock().pop_front()
    }

    /// Run the task behind `key`: take its work closure, execute it, and
    /// propagate completion to successors.
    pub fn execute(&self, key: TaskKey) {
        let work = self
            .arena
            .with(key, |task| {
                task.set_state(TaskState::Running);
                task.work.lock().take()
            })
            .flatten();
        if let Some(work) = work {
            work();
        }
        self.complete(key);
    }

    /// The observable state of the task behind `key`, if it still exists.
    pub fn task_state(&self, key: TaskKey) -> Option<TaskState> {
        self.arena.with(key, |task| task.state())
    }

    /// The predecessor keys recorded for the task behind `key`.
    pub fn predecessors_of(&self, key: TaskKey) -> Option<Vec<TaskKey>> {
        self.arena.with(key, |task| task.predecessors.lock().to_vec())
    }

    /// Wire one popped task into the graph. Returns whether it came out
    /// ready.
    fn init_task(&self, key: TaskKey) -> bool {
        let accesses = match self.arena.with(key, |task| {
            task.alive.store(true, Ordering::Release);
            task.accesses.clone()
        }) {
            Some(accesses) => accesses,
            // reclaimed before wiring; nothing to do
            None => return false,
        };

        let mut predecessors: SmallVec<[TaskKey; 4]> = SmallVec::new();

        for access in &accesses {
            let core = access.core();
            let mut users = core.users.lock();

            for &prior in users.iter() {
                if prior == key || predecessors.contains(&prior) {
                    continue;
                }
                let conflicts = self
                    .arena
                    .with(prior, |prior_task| {
                        prior_task
                            .accesses
                            .iter()
                            .any(|prior_access| ResourceAccess::must_be_ordered(access, prior_access))
                    })
                    .unwrap_or(false);
                if !conflicts {
                    continue;
                }

                // Charge the predecessor before linking, so a completion
                // racing with this wiring cannot drop the counter to zero
                // early. Rolled back if the prior task turns out complete.
                let _ = self.arena.with(key, |task| {
                    task.pre_count.fetch_add(1, Ordering::AcqRel);
                });
                let linked = self
                    .arena
                    .with(prior, |prior_task| {
                        let mut successors = prior_task.successors.lock();
                        if prior_task.post_event.is_reached() {
                            false
                        } else {
                            successors.push(key);
                            true
                        }
                    })
                    .unwrap_or(false);
                if linked {
                    trace!(pred = ?prior, succ = ?key, "dependency edge");
                    predecessors.push(prior);
                } else {
                    let _ = self.arena.with(key, |task| {
                        task.pre_count.fetch_sub(1, Ordering::AcqRel);
                    });
                }
            }

            users.push(key);
        }

        let became_ready = self
            .arena
            .with(key, |task| {
                *task.predecessors.lock() = predecessors.clone();
                task.set_state(TaskState::Initialized);
                // release the wiring guard
                if task.pre_count.fetch_sub(1, Ordering::AcqRel) == 1 {
                    task.set_state(TaskState::Ready);
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        if became_ready {
            debug!(task = ?key, "task ready at initialization");
            self.ready.lock().push_back(key);
            self.scheduler.notify();
        }
        became_ready
    }

    /// Mark the task completed, release its successors, and attempt
    /// reclamation.
    fn complete(&self, key: TaskKey) {
        let successors = self.arena.with(key, |task| {
            task.set_state(TaskState::Done);
            // The successor list and the completion flag flip under the same
            // lock late wirers take, so an edge is either linked before the
            // drain below or never linked at all.
            let mut successors = task.successors.lock();
            task.post_event.notify();
            std::mem::take(&mut *successors)
        });
        let Some(successors) = successors else {
            return;
        };

        for successor in successors {
            let ready_space = self
                .arena
                .with(successor, |succ_task| {
                    if succ_task.pre_count.fetch_sub(1, Ordering::AcqRel) == 1 {
                        succ_task.set_state(TaskState::Ready);
                        succ_task.space.upgrade()
                    } else {
                        None
                    }
                })
                .flatten();
            if let Some(space) = ready_space {
                debug!(task = ?successor, "task became ready");
                space.ready.lock().push_back(successor);
                space.scheduler.notify();
            }
        }

        self.scheduler.notify();
        self.try_remove(key);
    }

    /// Free the task behind `key` if it is fully finished: completed, result
    /// consumed, and no live children.
    ///
    /// The only path that releases task memory. Safe to call from any number
    /// of racing completion notifications — the liveness compare-and-swap
    /// lets exactly one of them perform the removal.
    pub fn try_remove(&self, key: TaskKey) {
        let eligible = self
            .arena
            .with(key, |task| {
                task.post_event.is_reached()
                    && task.result_event.is_reached()
                    && task
                        .children
                        .lock()
                        .as_ref()
                        .map(|child_space| child_space.empty())
                        .unwrap_or(true)
            })
            .unwrap_or(false);
        if !eligible {
            return;
        }

        let won = self
            .arena
            .with(key, |task| {
                task.alive
                    .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
            .unwrap_or(false);
        if !won {
            return;
        }

        let Some(task) = self.arena.remove(key) else {
            return;
        };
        for access in &task.accesses {
            access.core().users.lock().retain(|&user| user != key);
        }
        let id = task.id();
        drop(task);

        let remaining = self.task_count.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(task = ?id, remaining, "task reclaimed");
        self.scheduler.notify();

        if remaining == 0 {
            // our emptiness may be the last thing holding the parent alive
            if let Some(parent) = &self.parent {
                if let Some(parent_space) = parent.space.upgrade() {
                    parent_space.try_remove(parent.key);
                }
            }
        }
    }
}

impl std::fmt::Debug for TaskSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpace")
            .field("depth", &self.depth)
            .field("task_count", &self.task_count())
            .finish()
    }
}

/// Builder for a task submission.
///
/// Created by [`TaskSpace::emplace`]; collects resource accesses and
/// property fragments, then submits in one step.
pub struct TaskBuilder {
    space: Arc<TaskSpace>,
    work: Work,
    accesses: SmallVec<[ResourceAccess; 4]>,
    properties: TaskProperties,
}

impl TaskBuilder {
    /// Declare a resource access.
    pub fn access(mut self, access: ResourceAccess) -> Self {
        self.accesses.push(access);
        self
    }

    /// Declare several resource accesses.
    pub fn accesses(mut self, accesses: impl IntoIterator<Item = ResourceAccess>) -> Self {
        self.accesses.extend(accesses);
        self
    }

    /// Set the task's label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.properties.label.label = Some(label.into());
        self
    }

    /// Set the task's scheduler routing tag.
    pub fn tag(mut self, tag: u64) -> Self {
        self.properties.tag.tag = Some(tag);
        self
    }

    /// Add a custom key/value property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.custom.entries.insert(key.into(), value.into());
        self
    }

    /// Submit the task: allocate it from the arena, enqueue it for wiring,
    /// and notify the scheduler.
    ///
    /// Never blocks. In a sub-space, every declared access must be covered
    /// by one of the parent task's accesses; violating that contract is a
    /// programming error and panics.
    ///
    /// # Errors
    ///
    /// [`EmplaceError::OutOfMemory`] when the arena cannot grow another
    /// chunk.
    pub fn submit(self) -> Result<TaskHandle, EmplaceError> {
        let space = self.space;

        if let Some(parent) = &space.parent {
            let parent_space = parent
                .space
                .upgrade()
                .expect("sub-space outlived its parent space");
            let covered = parent_space
                .arena
                .with(parent.key, |parent_task| {
                    self.accesses.iter().all(|access| {
                        parent_task
                            .accesses
                            .iter()
                            .any(|parent_access| parent_access.is_superset_of(access))
                    })
                })
                .unwrap_or(false);
            assert!(
                covered,
                "scope violation: sub-space task accesses {:?} exceed its parent's access set",
                self.accesses,
            );
        }

        let task = Task::new(
            Arc::downgrade(&space),
            self.work,
            self.properties,
            self.accesses,
        );
        let id = task.id();
        let post = task.post_event.clone();
        let result = task.result_event.clone();

        let key = space.arena.insert(task)?;
        space.task_count.fetch_add(1, Ordering::AcqRel);
        space.queue.push(key);
        debug!(task = ?id, ?key, "task emplaced");
        space.scheduler.notify();

        Ok(TaskHandle {
            space,
            key,
            id,
            post,
            result,
        })
    }
}

/// Handle to a submitted task.
///
/// The handle does not own the task — the space does — but it can wait for
/// completion and opens the result-consumption gate of reclamation. Dropping
/// the handle without waiting marks the result as consumed, so
/// fire-and-forget tasks are still reclaimed.
pub struct TaskHandle {
    space: Arc<TaskSpace>,
    key: TaskKey,
    id: TaskId,
    post: Arc<Event>,
    result: Arc<Event>,
}

impl TaskHandle {
    /// The task's unique ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's arena key.
    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Whether the task's work has run.
    pub fn is_complete(&self) -> bool {
        self.post.is_reached()
    }

    /// Block until the task completes, then mark its result consumed.
    pub fn wait(&self) {
        self.post.wait();
        self.consume_result();
    }

    /// Get (or create) the sub-space for this task's children.
    ///
    /// Returns `None` once the task has been reclaimed.
    pub fn subspace(&self) -> Option<Arc<TaskSpace>> {
        self.space.subspace_for(self.key)
    }

    fn consume_result(&self) {
        if !self.result.is_reached() {
            self.result.notify();
            self.space.try_remove(self.key);
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.consume_result();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::IoResource;

    fn space() -> Arc<TaskSpace> {
        TaskSpace::new(SpaceConfig::default(), Arc::new(NoopScheduler))
    }

    /// Wire everything queued, then run everything ready, until quiescent.
    fn drive(space: &Arc<TaskSpace>) {
        loop {
            while space.init_until_ready() {}
            let mut ran = false;
            while let Some(key) = space.pop_ready() {
                space.execute(key);
                ran = true;
            }
            if !ran {
                break;
            }
        }
    }

    #[test]
    fn task_without_accesses_is_ready_immediately() {
        let space = space();
        let handle = space.emplace(|| {}).submit().unwrap();

        assert!(space.init_until_ready());
        assert_eq!(space.task_state(handle.key()), Some(TaskState::Ready));

        let key = space.pop_ready().unwrap();
        assert_eq!(key, handle.key());
        space.execute(key);
        handle.wait();
        assert!(space.empty());
    }

    #[test]
    fn emplacement_notifies_the_scheduler() {
        let scheduler = Arc::new(CountingScheduler::new());
        let space = TaskSpace::new(SpaceConfig::default(), scheduler.clone());
        let _handle = space.emplace(|| {}).submit().unwrap();
        assert!(scheduler.count() > 0);
    }

    #[test]
    fn conflicting_tasks_are_chained_in_submission_order() {
        let space = space();
        let resource = IoResource::new();

        let first = space.emplace(|| {}).access(resource.write()).submit().unwrap();
        let second = space.emplace(|| {}).access(resource.write()).submit().unwrap();
        let third = space.emplace(|| {}).access(resource.write()).submit().unwrap();

        while space.init_until_ready() {}

        assert_eq!(space.predecessors_of(first.key()), Some(vec![]));
        assert_eq!(
            space.predecessors_of(second.key()),
            Some(vec![first.key()])
        );
        let third_preds = space.predecessors_of(third.key()).unwrap();
        assert!(third_preds.contains(&first.key()));
        assert!(third_preds.contains(&second.key()));

        drive(&space);
        first.wait();
        second.wait();
        third.wait();
        assert!(space.empty());
    }

    #[test]
    fn readers_share_a_resource() {
        let space = space();
        let resource = IoResource::new();

        let a = space.emplace(|| {}).access(resource.read()).submit().unwrap();
        let b = space.emplace(|| {}).access(resource.read()).submit().unwrap();

        while space.init_until_ready() {}

        assert_eq!(space.task_state(a.key()), Some(TaskState::Ready));
        assert_eq!(space.task_state(b.key()), Some(TaskState::Ready));
        assert_eq!(space.predecessors_of(b.key()), Some(vec![]));
    }

    #[test]
    fn writer_blocks_until_prior_writer_completes() {
        let space = space();
        let resource = IoResource::new();

        let first = space.emplace(|| {}).access(resource.write()).submit().unwrap();
        let second = space.emplace(|| {}).access(resource.write()).submit().unwrap();

        while space.init_until_ready() {}
        assert_eq!(space.task_state(second.key()), Some(TaskState::Initialized));

        // completing the first writer releases the second without another
        // drain call
        let key = space.pop_ready().unwrap();
        assert_eq!(key, first.key());
        space.execute(key);
        assert_eq!(space.task_state(second.key()), Some(TaskState::Ready));
    }

    #[test]
    fn out_of_memory_surfaces_to_the_submitter() {
        let config = SpaceConfig {
            chunk_capacity: 2,
            max_chunks: Some(1),
        };
        let space = TaskSpace::new(config, Arc::new(NoopScheduler));

        let _a = space.emplace(|| {}).submit().unwrap();
        let _b = space.emplace(|| {}).submit().unwrap();
        let err = space.emplace(|| {}).submit().unwrap_err();
        assert_eq!(err, EmplaceError::OutOfMemory { limit: 1 });
    }

    #[test]
    fn subspace_task_must_stay_within_parent_accesses() {
        let space = space();
        let resource = IoResource::new();

        let parent = space.emplace(|| {}).access(resource.write()).submit().unwrap();
        drive(&space);

        let sub = parent.subspace().unwrap();
        assert_eq!(sub.depth(), 1);

        // covered: read within the parent's write
        let child = sub.emplace(|| {}).access(resource.read()).submit().unwrap();
        drive(&sub);
        child.wait();
    }

    #[test]
    #[should_panic(expected = "scope violation")]
    fn subspace_scope_violation_panics() {
        let space = space();
        let covered = IoResource::new();
        let foreign = IoResource::new();

        let parent = space.emplace(|| {}).access(covered.write()).submit().unwrap();
        drive(&space);

        let sub = parent.subspace().unwrap();
        let _ = sub.emplace(|| {}).access(foreign.write()).submit();
    }

    #[test]
    fn parent_is_reclaimed_only_after_children_finish() {
        let space = space();
        let parent = space.emplace(|| {}).submit().unwrap();
        drive(&space);

        // open the sub-space while the parent still awaits result consumption
        let sub = parent.subspace().unwrap();
        let child = sub.emplace(|| {}).submit().unwrap();
        parent.wait();

        // parent completed and its result was consumed, but the live child
        // keeps it in the space
        assert!(!space.empty());

        drive(&sub);
        child.wait();
        assert!(sub.empty());
        assert!(space.empty());
    }

    #[test]
    fn racing_removals_reclaim_exactly_once() {
        let space = space();
        let resource = IoResource::new();
        let handle = space.emplace(|| {}).access(resource.write()).submit().unwrap();

        while space.init_until_ready() {}
        let key = space.pop_ready().unwrap();
        space.execute(key);
        assert_eq!(space.task_count(), 1);

        // make the task reclaimable without removing it, then race removals
        space
            .arena
            .with(key, |task| task.result_event.notify())
            .unwrap();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let space = space.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        space.try_remove(key);
                    }
                });
            }
        });

        // exactly one removal may decrement the live counter
        assert_eq!(space.task_count(), 0);
        assert!(space.empty());
        drop(handle);
    }

    #[test]
    fn properties_travel_with_the_task() {
        let space = space();
        let handle = space
            .emplace(|| {})
            .label("stencil-sweep")
            .tag(2)
            .property("stage", "halo")
            .submit()
            .unwrap();

        while space.init_until_ready() {}
        let (label, tag, stage) = space
            .arena
            .with(handle.key(), |task| {
                (
                    task.properties().label.label.clone(),
                    task.properties().tag.tag,
                    task.properties().custom.entries.get("stage").cloned(),
                )
            })
            .unwrap();
        assert_eq!(label.as_deref(), Some("stencil-sweep"));
        assert_eq!(tag, Some(2));
        assert_eq!(stage.as_deref(), Some("halo"));
    }
}
