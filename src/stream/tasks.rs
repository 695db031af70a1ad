use std::collections::HashMap;
use std::future::Future;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Chunk-processing tasks still running for one connection, by sequence number
///
/// Tasks remove themselves through [`ActiveTasks::complete`] when they finish.
/// Registration holds the map lock across the spawn, so a task that finishes
/// immediately cannot try to remove itself before it has been inserted.
///
/// Admission and the drain check both run under [`ActiveTasks::lock`]: a chunk
/// admitted after a status read cannot slip past a concurrent completion.
#[derive(Default)]
pub struct ActiveTasks {
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

/// Exclusive access to a connection's task set
pub struct TasksGuard<'a> {
    tasks: MutexGuard<'a, HashMap<u64, JoinHandle<()>>>,
}

impl TasksGuard<'_> {
    /// Spawn `task` and track it under `sequence`
    pub fn spawn<F>(&mut self, sequence: u64, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tasks.insert(sequence, handle);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl ActiveTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> TasksGuard<'_> {
        TasksGuard {
            tasks: self.tasks.lock().await,
        }
    }

    /// Spawn `task` and track it under `sequence`
    pub async fn spawn<F>(&self, sequence: u64, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lock().await.spawn(sequence, task);
    }

    /// Completion callback: forget `sequence`, returning how many remain
    pub async fn complete(&self, sequence: u64) -> usize {
        let mut tasks = self.tasks.lock().await;
        tasks.remove(&sequence);
        tasks.len()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Remove every tracked task, handing the handles to the caller
    pub async fn take_all(&self) -> Vec<(u64, JoinHandle<()>)> {
        let mut tasks = self.tasks.lock().await;
        let mut handles: Vec<_> = tasks.drain().collect();
        handles.sort_by_key(|(sequence, _)| *sequence);
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_task_removes_itself_on_completion() {
        let tasks = Arc::new(ActiveTasks::new());
        let (done_tx, done_rx) = oneshot::channel();

        let tracker = Arc::clone(&tasks);
        tasks
            .spawn(0, async move {
                let remaining = tracker.complete(0).await;
                let _ = done_tx.send(remaining);
            })
            .await;

        assert_eq!(done_rx.await.unwrap(), 0);
        assert!(tasks.is_empty().await);
    }

    #[tokio::test]
    async fn test_take_all_returns_sorted_handles() {
        let tasks = ActiveTasks::new();
        for sequence in [2, 0, 1] {
            tasks
                .spawn(sequence, async {
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                })
                .await;
        }

        assert_eq!(tasks.len().await, 3);
        let handles = tasks.take_all().await;
        let order: Vec<u64> = handles.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(order, vec![0, 1, 2]);
        for (_, handle) in handles {
            handle.abort();
        }
        assert!(tasks.is_empty().await);
    }
}
