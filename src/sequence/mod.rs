//! The sequence tree
//!
//! A [`Sequence`] is a handle to one node of the tree: it names the node, owns
//! (through the tree) the node's suspended task body and its children, and is
//! the context value every task body receives. Task bodies suspend through
//! the handle's primitives ([`wait_for`](Sequence::wait_for),
//! [`wait_until`](Sequence::wait_until),
//! [`wait_for_child`](Sequence::wait_for_child), [`wait`](Sequence::wait))
//! and fork work with [`create_child`](Sequence::create_child).
//!
//! The tree only advances when its owner thread calls
//! [`dispatch`](Sequence::dispatch). Children are always serviced to
//! quiescence before their parent resumes, which is what makes
//! `wait_for_child` a join without any counter.
//!
//! # Example
//!
//! ```rust
//! use seqtree::clock::MockClock;
//! use seqtree::{Driver, DriverConfig, Error};
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! let driver = Driver::with_clock(clock.clone(), DriverConfig::default());
//!
//! let result = driver.spawn("parent", |seq| async move {
//!     let a = seq.create_child("a", |seq| async move {
//!         seq.wait_for(Duration::from_millis(100)).await;
//!         Ok::<_, Error>(1)
//!     });
//!     seq.wait_for_child().await;
//!     Ok::<_, Error>(a.try_read().unwrap()? + 1)
//! });
//!
//! driver.dispatch().unwrap();
//! assert!(!driver.is_done());
//!
//! clock.advance(Duration::from_millis(100));
//! driver.dispatch().unwrap();
//! assert!(driver.is_done());
//! assert_eq!(result.read().unwrap(), 2);
//! ```

mod dispatch;
mod state;
mod wait;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::{result_channel, ResultReceiver};
use crate::clock::{Clock, Deadline};
use crate::driver::FailurePolicy;
use crate::error::{BoxError, Error, Result};
use crate::frame::{Frame, TaskFrame};

use state::DispatchState;
pub use wait::{WaitFor, WaitForChild, WaitPredicate, WaitUntil};

/// Unique identifier for a sequence node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(u64);

impl SequenceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

/// State shared by every node of one tree.
pub(crate) struct Tree {
    owner: ThreadId,
    clock: Arc<dyn Clock>,
    policy: FailurePolicy,
    /// Node whose frame is being resumed right now.
    current: Mutex<Option<Arc<Node>>>,
}

impl Tree {
    pub(crate) fn new(clock: Arc<dyn Clock>, policy: FailurePolicy) -> Arc<Self> {
        Arc::new(Self {
            owner: thread::current().id(),
            clock,
            policy,
            current: Mutex::new(None),
        })
    }

    pub(crate) fn check_owner(&self) -> Result<()> {
        let actual = thread::current().id();
        if actual == self.owner {
            Ok(())
        } else {
            Err(Error::WrongThread {
                owner: self.owner,
                actual,
            })
        }
    }

    pub(crate) fn now(&self) -> Duration {
        self.clock.now()
    }

    fn current(&self) -> Option<Arc<Node>> {
        self.current.lock().clone()
    }
}

/// One node of the tree. Owned by its parent's child list (the root by the
/// driver); the parent link is weak.
pub(crate) struct Node {
    id: SequenceId,
    name: String,
    parent: Weak<Node>,
    tree: Arc<Tree>,
    children: Mutex<Vec<Arc<Node>>>,
    /// Set once the node has left the tree; read and written with
    /// `children` locked so no insertion can slip past it.
    detached: AtomicBool,
    frame: Mutex<Option<Box<dyn Frame>>>,
    state: Mutex<DispatchState>,
}

impl Node {
    pub(crate) fn root(name: impl Into<String>, tree: Arc<Tree>) -> Arc<Self> {
        Self::new(name.into(), Weak::new(), tree, false)
    }

    fn new(name: String, parent: Weak<Node>, tree: Arc<Tree>, has_frame: bool) -> Arc<Self> {
        Arc::new(Self {
            id: SequenceId::new(),
            name,
            parent,
            tree,
            children: Mutex::new(Vec::new()),
            detached: AtomicBool::new(false),
            frame: Mutex::new(None),
            state: Mutex::new(DispatchState::new(has_frame)),
        })
    }

    fn has_children(&self) -> bool {
        !self.children.lock().is_empty()
    }

    fn frame_live(&self) -> bool {
        self.state.lock().frame_live
    }

    fn is_done(&self) -> bool {
        !self.has_children() && !self.frame_live()
    }

    /// The wake time this node reports upward, read from the cache.
    fn aggregate_wake(&self) -> Deadline {
        let has_children = self.has_children();
        self.state.lock().aggregate(has_children)
    }

    /// Walks this node's wake time up through its ancestors, stopping at the
    /// first one that already expects to run at least as early.
    fn propagate_wake(&self) {
        let when = self.aggregate_wake();
        let mut ancestor = self.parent.upgrade();
        while let Some(node) = ancestor {
            if !node.state.lock().lower_child_wake(when) {
                break;
            }
            ancestor = node.parent.upgrade();
        }
    }

    fn reserve_resume(&self, wake: Deadline) -> bool {
        {
            let mut state = self.state.lock();
            if !state.frame_live {
                return false;
            }
            state.own_wake = wake;
        }
        self.propagate_wake();
        true
    }

    fn recompute_wake(&self) -> Deadline {
        let children = self.children.lock().clone();
        let wake = children
            .iter()
            .map(|child| child.recompute_wake())
            .min()
            .unwrap_or(Deadline::NEVER);
        let mut state = self.state.lock();
        state.child_wake = wake;
        state.aggregate(!children.is_empty())
    }

    fn scan_wake(&self) -> Deadline {
        let children = self.children.lock().clone();
        if children.is_empty() {
            return self.state.lock().aggregate(false);
        }
        children
            .iter()
            .map(|child| child.scan_wake())
            .min()
            .unwrap_or(Deadline::NEVER)
    }

    /// Marks a finished node as out of the tree. Fails if a child was
    /// injected since the node was seen done; the node must then stay.
    pub(crate) fn detach(&self) -> bool {
        let children = self.children.lock();
        if !children.is_empty() {
            return false;
        }
        self.detached.store(true, Ordering::Relaxed);
        true
    }

    /// Adds `child` unless the node already left the tree.
    fn attach(&self, child: &Arc<Node>) -> bool {
        let mut children = self.children.lock();
        if self.detached.load(Ordering::Relaxed) {
            return false;
        }
        children.push(Arc::clone(child));
        true
    }

    /// Destroys the frame and the whole subtree without running any
    /// continuation. Pending result channels report `Cancelled`.
    fn teardown(&self) {
        let frame = self.frame.lock().take();
        {
            let mut state = self.state.lock();
            state.frame_live = false;
            state.predicate = None;
        }
        if let Some(mut frame) = frame {
            frame.destroy();
        }
        let children = {
            let mut children = self.children.lock();
            self.detached.store(true, Ordering::Relaxed);
            std::mem::take(&mut *children)
        };
        for child in children {
            child.teardown();
        }
    }
}

/// Handle to a node of the sequence tree.
///
/// Handles are cheap to clone and may be sent to other threads, but only
/// [`create_child`](Self::create_child) (and the read-only accessors) may be
/// used off the owner thread.
#[derive(Clone)]
pub struct Sequence {
    inner: Arc<Node>,
}

impl Sequence {
    pub(crate) fn from_node(inner: Arc<Node>) -> Self {
        Self { inner }
    }

    /// Unique identifier of this node.
    #[must_use]
    pub fn id(&self) -> SequenceId {
        self.inner.id
    }

    /// Name given at creation. Names need not be unique.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent node, if this is not the root (and the parent still exists).
    #[must_use]
    pub fn parent(&self) -> Option<Sequence> {
        self.inner.parent.upgrade().map(Self::from_node)
    }

    /// The only thread allowed to dispatch this tree.
    #[must_use]
    pub fn owner_thread(&self) -> ThreadId {
        self.inner.tree.owner
    }

    /// Current time of the tree's clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.tree.now()
    }

    /// The node whose task body is running right now, if any.
    #[must_use]
    pub fn current(&self) -> Option<Sequence> {
        self.inner.tree.current().map(Self::from_node)
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }

    /// Snapshot of the direct children, in creation order.
    #[must_use]
    pub fn children(&self) -> Vec<Sequence> {
        self.inner
            .children
            .lock()
            .iter()
            .cloned()
            .map(Self::from_node)
            .collect()
    }

    /// `true` once the node has no children and its own body (if any) has
    /// finished. A node with a live child is never done.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Cached earliest time this subtree wants to run again.
    ///
    /// Between dispatches this is never later than the true earliest wake
    /// time of the subtree.
    #[must_use]
    pub fn next_wake(&self) -> Deadline {
        self.inner.aggregate_wake()
    }

    /// Recomputes every cached wake time in the subtree bottom-up and returns
    /// the fresh aggregate.
    pub fn recompute_wake(&self) -> Deadline {
        self.inner.recompute_wake()
    }

    /// Earliest wake time of the subtree, computed by a full scan without
    /// touching any cache.
    #[must_use]
    pub fn scan_wake(&self) -> Deadline {
        self.inner.scan_wake()
    }

    /// Schedules this node's own body to run at `wake` and propagates the
    /// change to the ancestors. Does not resume anything by itself.
    ///
    /// Returns `false` if the node has no live body.
    pub fn reserve_resume(&self, wake: Deadline) -> bool {
        self.inner.reserve_resume(wake)
    }

    /// Creates a child sequence running `body`.
    ///
    /// The body receives the child's own handle and does not start until the
    /// owner thread's next dispatch reaches it. May be called from any
    /// thread.
    ///
    /// Returns the receiver for the child's outcome. If this node has
    /// already finished and left the tree, the child is never started and
    /// the receiver reads [`Error::Cancelled`].
    pub fn create_child<T, F, Fut, E>(&self, name: impl Into<String>, body: F) -> ResultReceiver<T>
    where
        T: Send + 'static,
        F: FnOnce(Sequence) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let name = name.into();
        let tree = Arc::clone(&self.inner.tree);
        let node = Node::new(name.clone(), Arc::downgrade(&self.inner), tree, true);
        let (sender, receiver) = result_channel(name.clone());
        let future = body(Self::from_node(Arc::clone(&node)));
        *node.frame.lock() = Some(Box::new(TaskFrame::new(name, future, sender)));

        if !self.inner.attach(&node) {
            tracing::debug!(
                parent = %self.inner.name,
                child = %node.name,
                "parent already finished, sequence cancelled"
            );
            node.teardown();
            return receiver;
        }
        node.propagate_wake();

        tracing::debug!(
            parent = %self.inner.name,
            child = %node.name,
            id = %node.id,
            off_thread = thread::current().id() != self.inner.tree.owner,
            "sequence created"
        );
        receiver
    }

    /// Like [`create_child`](Self::create_child), passing `param` to the
    /// handler alongside the child's handle.
    pub fn create_child_with<T, P, F, Fut, E>(
        &self,
        name: impl Into<String>,
        handler: F,
        param: P,
    ) -> ResultReceiver<T>
    where
        T: Send + 'static,
        F: FnOnce(Sequence, P) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.create_child(name, move |seq| handler(seq, param))
    }

    /// First direct child called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongThread`] off the owner thread.
    pub fn find_direct_child(&self, name: &str) -> Result<Option<Sequence>> {
        self.inner.tree.check_owner()?;
        Ok(self
            .inner
            .children
            .lock()
            .iter()
            .find(|child| child.name == name)
            .cloned()
            .map(Self::from_node))
    }

    /// First descendant called `name`: each node's own children are checked
    /// before descending into any of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongThread`] off the owner thread.
    pub fn find_child_dfs(&self, name: &str) -> Result<Option<Sequence>> {
        self.inner.tree.check_owner()?;
        Ok(Self::find_in(&self.inner, name).map(Self::from_node))
    }

    fn find_in(node: &Arc<Node>, name: &str) -> Option<Arc<Node>> {
        let children = node.children.lock().clone();
        if let Some(found) = children.iter().find(|child| child.name == name) {
            return Some(Arc::clone(found));
        }
        children.iter().find_map(|child| Self::find_in(child, name))
    }

    /// Destroys the first direct child called `name` together with its whole
    /// subtree. Their bodies never run again and their results read as
    /// [`Error::Cancelled`].
    ///
    /// Returns `false` if there was no such child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongThread`] off the owner thread.
    pub fn destroy_child(&self, name: &str) -> Result<bool> {
        self.inner.tree.check_owner()?;
        let removed = {
            let mut children = self.inner.children.lock();
            children
                .iter()
                .position(|child| child.name == name)
                .map(|index| children.remove(index))
        };
        match removed {
            Some(child) => {
                tracing::debug!(
                    parent = %self.inner.name,
                    child = %child.name,
                    "sequence destroyed"
                );
                child.teardown();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Destroys every body in this subtree. Used when the owning driver goes
    /// away, since a suspended body keeps its own node alive.
    pub(crate) fn teardown(&self) {
        self.inner.teardown();
    }

    /// Runs one scheduling pass over this subtree and returns when it next
    /// wants to run ([`Deadline::NEVER`] once it is done).
    ///
    /// # Errors
    ///
    /// [`Error::WrongThread`] off the owner thread, [`Error::Reentrant`] from
    /// inside a running body, or the failure of a task body when the tree's
    /// [`FailurePolicy`] is `Propagate`.
    pub fn dispatch(&self) -> Result<Deadline> {
        self.inner.tree.check_owner()?;
        if let Some(running) = self.inner.tree.current() {
            return Err(Error::Reentrant {
                running: running.name.clone(),
            });
        }
        if self.inner.dispatch_node(self.inner.tree.now())? {
            Ok(self.inner.aggregate_wake())
        } else {
            Ok(Deadline::NEVER)
        }
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Sequence {}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("children", &self.child_count())
            .field("is_done", &self.is_done())
            .finish()
    }
}
