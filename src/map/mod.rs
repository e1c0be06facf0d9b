//! Name-based routing of task bodies.
//!
//! A [`SequenceMap`] binds sequence names to handlers and groups them in a
//! tree of named units, so that code can start a sequence by name (and by
//! unit) instead of holding on to the handler itself. Starting a sequence
//! still goes through [`Sequence::create_child`]; the map only resolves what
//! to run and under which parent.
//!
//! # Example
//!
//! ```rust
//! use seqtree::clock::MockClock;
//! use seqtree::map::SequenceMap;
//! use seqtree::{Driver, DriverConfig, Error};
//!
//! let driver = Driver::with_clock(MockClock::auto_advancing(), DriverConfig::default());
//! let mut map = SequenceMap::<u32, u32>::new("top", driver.root());
//! map.add_unit("math").bind("square", |_seq, n| async move { Ok::<_, Error>(n * n) });
//!
//! let rx = map.create_root_sequence("math", "square", 7).unwrap();
//! driver.run_until_done().unwrap();
//! assert_eq!(rx.read().unwrap(), 49);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::channel::ResultReceiver;
use crate::clock::Deadline;
use crate::error::{BoxError, Error, Result};
use crate::sequence::{Sequence, WaitFor, WaitForChild, WaitUntil};

/// A bound task body: takes the new sequence's handle and the parameter.
pub type Handler<P, R> =
    Arc<dyn Fn(Sequence, P) -> BoxFuture<'static, std::result::Result<R, BoxError>> + Send + Sync>;

/// One unit of the routing tree.
pub struct SequenceMap<P, R> {
    unit: String,
    root: Sequence,
    handlers: HashMap<String, Handler<P, R>>,
    units: Vec<SequenceMap<P, R>>,
}

impl<P, R> SequenceMap<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Creates an empty unit whose root sequences go under `root`.
    #[must_use]
    pub fn new(unit: impl Into<String>, root: &Sequence) -> Self {
        Self {
            unit: unit.into(),
            root: root.clone(),
            handlers: HashMap::new(),
            units: Vec::new(),
        }
    }

    /// Name of this unit.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Binds `name` to `handler`, replacing any previous binding.
    pub fn bind<F, Fut, E>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Sequence, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let handler: Handler<P, R> = Arc::new(move |seq: Sequence, param: P| {
            let body = handler(seq, param);
            async move { body.await.map_err(Into::<BoxError>::into) }.boxed()
        });
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Removes the binding for `name`. Returns whether there was one.
    pub fn unbind(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// The handler bound to `name` in this unit.
    #[must_use]
    pub fn find_handler(&self, name: &str) -> Option<Handler<P, R>> {
        self.handlers.get(name).cloned()
    }

    /// Adds a child unit and returns it for binding.
    pub fn add_unit(&mut self, unit: impl Into<String>) -> &mut Self {
        let child = Self::new(unit, &self.root);
        self.units.push(child);
        let last = self.units.len() - 1;
        &mut self.units[last]
    }

    /// This unit or the first descendant unit called `unit`, depth first.
    #[must_use]
    pub fn find_unit_dfs(&self, unit: &str) -> Option<&Self> {
        if self.unit == unit {
            return Some(self);
        }
        self.units.iter().find_map(|child| child.find_unit_dfs(unit))
    }

    /// Mutable form of [`find_unit_dfs`](Self::find_unit_dfs).
    pub fn find_unit_dfs_mut(&mut self, unit: &str) -> Option<&mut Self> {
        if self.unit == unit {
            return Some(self);
        }
        self.units.iter_mut().find_map(|child| child.find_unit_dfs_mut(unit))
    }

    /// Starts the sequence bound to `name` in `unit`.
    ///
    /// An empty `unit` means this unit; otherwise the unit is looked up depth
    /// first from here. Without an explicit `parent` the sequence goes under
    /// the currently running sequence, or under the root when nothing is
    /// running. The new node is called `running` if given, else `name`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownUnit`] or [`Error::UnknownHandler`] when the lookup
    /// fails.
    pub fn create_sequence(
        &self,
        parent: Option<&Sequence>,
        unit: &str,
        name: &str,
        running: Option<&str>,
        param: P,
    ) -> Result<ResultReceiver<R>> {
        let target = if unit.is_empty() {
            self
        } else {
            self.find_unit_dfs(unit)
                .ok_or_else(|| Error::UnknownUnit(unit.to_string()))?
        };
        let handler = target
            .find_handler(name)
            .ok_or_else(|| Error::UnknownHandler(name.to_string()))?;
        let parent = match parent {
            Some(parent) => parent.clone(),
            None => self.root.current().unwrap_or_else(|| self.root.clone()),
        };
        Ok(parent.create_child(running.unwrap_or(name), move |seq| handler(seq, param)))
    }

    /// Starts `name` from `unit` directly under the root.
    ///
    /// # Errors
    ///
    /// Same as [`create_sequence`](Self::create_sequence).
    pub fn create_root_sequence(
        &self,
        unit: &str,
        name: &str,
        param: P,
    ) -> Result<ResultReceiver<R>> {
        self.create_sequence(Some(&self.root), unit, name, None, param)
    }

    /// Starts `name` from `unit` under the currently running sequence.
    ///
    /// # Errors
    ///
    /// [`Error::NoCurrentSequence`] outside a running task body, otherwise the
    /// same as [`create_sequence`](Self::create_sequence).
    pub fn create_child_sequence(
        &self,
        unit: &str,
        name: &str,
        param: P,
    ) -> Result<ResultReceiver<R>> {
        let parent = self
            .root
            .current()
            .ok_or(Error::NoCurrentSequence("create_child_sequence"))?;
        self.create_sequence(Some(&parent), unit, name, None, param)
    }

    /// Starts `name` under `parent` once for every unit in this subtree that
    /// binds it.
    pub fn broadcast(&self, parent: &Sequence, name: &str, param: P) -> Vec<ResultReceiver<R>>
    where
        P: Clone,
    {
        let mut started = Vec::new();
        self.broadcast_into(parent, name, &param, &mut started);
        tracing::debug!(unit = %self.unit, sequence = name, count = started.len(), "broadcast");
        started
    }

    fn broadcast_into(
        &self,
        parent: &Sequence,
        name: &str,
        param: &P,
        started: &mut Vec<ResultReceiver<R>>,
    ) where
        P: Clone,
    {
        if let Some(handler) = self.find_handler(name) {
            let param = param.clone();
            started.push(parent.create_child(name, move |seq| handler(seq, param)));
        }
        for child in &self.units {
            child.broadcast_into(parent, name, param, started);
        }
    }

    fn running(&self, operation: &'static str) -> Result<Sequence> {
        self.root.current().ok_or(Error::NoCurrentSequence(operation))
    }

    /// [`Sequence::wait_for`] on the running sequence.
    ///
    /// # Errors
    ///
    /// [`Error::NoCurrentSequence`] outside a running task body.
    pub fn wait_for(&self, delay: Duration) -> Result<WaitFor> {
        Ok(self.running("wait_for")?.wait_for(delay))
    }

    /// [`Sequence::wait_until`] on the running sequence.
    ///
    /// # Errors
    ///
    /// [`Error::NoCurrentSequence`] outside a running task body.
    pub fn wait_until(&self, deadline: Deadline) -> Result<WaitUntil> {
        Ok(self.running("wait_until")?.wait_until(deadline))
    }

    /// [`Sequence::wait_for_child`] on the running sequence.
    ///
    /// # Errors
    ///
    /// [`Error::NoCurrentSequence`] outside a running task body.
    pub fn wait_for_child(&self) -> Result<WaitForChild> {
        Ok(self.running("wait_for_child")?.wait_for_child())
    }
}

impl<P, R> fmt::Debug for SequenceMap<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<_> = self.handlers.keys().collect();
        bound.sort();
        f.debug_struct("SequenceMap")
            .field("unit", &self.unit)
            .field("handlers", &bound)
            .field("units", &self.units)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::{Driver, DriverConfig};

    fn driver() -> Driver {
        Driver::with_clock(MockClock::auto_advancing(), DriverConfig::default())
    }

    fn sample(driver: &Driver) -> SequenceMap<i32, String> {
        let mut map = SequenceMap::new("top", driver.root());
        map.bind("hello", |_seq, n| async move { Ok::<_, Error>(format!("top:{n}")) });
        {
            let io = map.add_unit("io");
            io.bind("hello", |_seq, n| async move { Ok::<_, Error>(format!("io:{n}")) });
            io.add_unit("disk")
                .bind("hello", |_seq, n| async move { Ok::<_, Error>(format!("disk:{n}")) });
        }
        map.add_unit("net");
        map
    }

    #[test]
    fn test_bind_unbind_find() {
        let driver = driver();
        let mut map = sample(&driver);
        assert!(map.find_handler("hello").is_some());
        assert!(map.unbind("hello"));
        assert!(!map.unbind("hello"));
        assert!(map.find_handler("hello").is_none());
    }

    #[test]
    fn test_find_unit_dfs() {
        let driver = driver();
        let mut map = sample(&driver);
        assert_eq!(map.find_unit_dfs("top").unwrap().unit(), "top");
        assert_eq!(map.find_unit_dfs("disk").unwrap().unit(), "disk");
        assert!(map.find_unit_dfs("gpu").is_none());

        map.find_unit_dfs_mut("net")
            .unwrap()
            .bind("ping", |_seq, _n| async { Ok::<_, Error>("pong".to_string()) });
        assert!(map.find_unit_dfs("net").unwrap().find_handler("ping").is_some());
    }

    #[test]
    fn test_create_root_sequence_by_unit() {
        let driver = driver();
        let map = sample(&driver);
        let top = map.create_root_sequence("", "hello", 1).unwrap();
        let disk = map.create_root_sequence("disk", "hello", 2).unwrap();
        driver.run_until_done().unwrap();
        assert_eq!(top.read().unwrap(), "top:1");
        assert_eq!(disk.read().unwrap(), "disk:2");
    }

    #[test]
    fn test_unknown_unit_and_handler() {
        let driver = driver();
        let map = sample(&driver);
        assert!(matches!(
            map.create_root_sequence("gpu", "hello", 0),
            Err(Error::UnknownUnit(unit)) if unit == "gpu"
        ));
        assert!(matches!(
            map.create_root_sequence("net", "hello", 0),
            Err(Error::UnknownHandler(name)) if name == "hello"
        ));
    }

    #[test]
    fn test_running_name_and_explicit_parent() {
        let driver = driver();
        let map = sample(&driver);
        let _rx = map
            .create_sequence(Some(driver.root()), "io", "hello", Some("greeter"), 3)
            .unwrap();
        assert!(driver.root().find_direct_child("greeter").unwrap().is_some());
        assert!(driver.root().find_direct_child("hello").unwrap().is_none());
    }

    #[test]
    fn test_child_sequence_needs_running_sequence() {
        let driver = driver();
        let map = sample(&driver);
        assert!(matches!(
            map.create_child_sequence("", "hello", 0),
            Err(Error::NoCurrentSequence(_))
        ));
        assert!(matches!(map.wait_for(Duration::from_secs(1)), Err(Error::NoCurrentSequence(_))));
        assert!(map.wait_for_child().is_err());
    }

    #[test]
    fn test_child_sequence_from_running_body() {
        let driver = driver();
        let map = Arc::new(sample(&driver));
        let inner = Arc::clone(&map);
        let mut outer = SequenceMap::<(), String>::new("outer", driver.root());
        outer.bind("parent", move |seq, ()| {
            let map = Arc::clone(&inner);
            async move {
                let rx = map.create_child_sequence("io", "hello", 9)?;
                assert_eq!(seq.child_count(), 1);
                map.wait_for_child()?.await;
                rx.await
            }
        });

        let rx = outer.create_root_sequence("", "parent", ()).unwrap();
        driver.run_until_done().unwrap();
        assert_eq!(rx.read().unwrap(), "io:9");
    }

    #[test]
    fn test_broadcast_reaches_every_binding_unit() {
        let driver = driver();
        let map = sample(&driver);
        let receivers = map.broadcast(driver.root(), "hello", 5);
        assert_eq!(receivers.len(), 3);
        driver.run_until_done().unwrap();

        let mut results: Vec<_> = receivers.into_iter().map(|rx| rx.read().unwrap()).collect();
        results.sort();
        assert_eq!(results, ["disk:5", "io:5", "top:5"]);
    }
}
