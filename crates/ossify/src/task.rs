//! # Deferred Graph Tasks
//!
//! Graph mutations that must run on the thread that owns the scene graph are
//! queued as [`DeferredTask`]s and drained there, in submission order.
//!
//! ```text
//! any thread                         graph-owning thread
//! ──────────                         ───────────────────
//! queue.push(MoveNode{..})  ──mpsc──►  receiver.drain()
//! queue.push(UpdateWorld{..})          └─ engine.run_task(task, scene, entities)
//! ```
//!
//! Tasks carry handles and node *names*, never live node references. Each
//! one re-resolves its targets when it runs and silently does nothing if the
//! entity or node has gone away in between.

use std::sync::mpsc;

use crate::entity::{EntityHandle, Viewpoint};

/// A unit of graph work to run later on the graph-owning thread.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredTask {
    /// Re-parent `node` under `destination`, both looked up under the
    /// entity's root for `viewpoint`.
    MoveNode {
        handle: EntityHandle,
        viewpoint: Viewpoint,
        node: String,
        destination: String,
    },
    /// Refresh world transforms under the entity's root for `viewpoint`.
    UpdateWorld {
        handle: EntityHandle,
        viewpoint: Viewpoint,
    },
    /// Recompute every overridden node of the entity.
    Recompute { handle: EntityHandle },
}

/// Create a connected queue/receiver pair.
pub fn task_channel() -> (TaskQueue, TaskReceiver) {
    let (tx, rx) = mpsc::channel();
    (TaskQueue { tx }, TaskReceiver { rx })
}

/// Sending half. Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<DeferredTask>,
}

impl TaskQueue {
    /// Enqueue a task. Returns `false` if the receiver has been dropped.
    pub fn push(&self, task: DeferredTask) -> bool {
        match self.tx.send(task) {
            Ok(()) => true,
            Err(mpsc::SendError(task)) => {
                log::warn!("Task receiver dropped; discarding {task:?}");
                false
            }
        }
    }
}

/// Receiving half. Lives on the graph-owning thread.
#[derive(Debug)]
pub struct TaskReceiver {
    rx: mpsc::Receiver<DeferredTask>,
}

impl TaskReceiver {
    /// Take every task queued so far, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<DeferredTask> {
        self.rx.try_iter().collect()
    }
}
