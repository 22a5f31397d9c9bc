// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::any::type_name;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, trace, warn};

use crate::{AppError, AppResult};

/// Handler trait for processing tasks
pub trait PoolHandler<T>: Clone + Send + Sync + 'static {
    /// Handle the task
    fn handle(&self, task: T) -> impl Future<Output = ()> + Send;
}

/// Worker Pool Config Parameters
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Workers running tasks concurrently
    pub thread_count: usize,
    /// Upper bound of queued plus running tasks
    pub max_queue_size: usize,
    /// How often the monitor looks for dead workers
    pub monitor_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            thread_count: 4,
            max_queue_size: 64,
            monitor_interval: Duration::from_secs(5),
        }
    }
}

/// A task together with its slot in the pool, the slot is given back once the
/// task has run.
struct QueuedTask<T> {
    task: T,
    _permit: OwnedSemaphorePermit,
}

/// represent a running worker
#[derive(Debug)]
struct Worker {
    id: usize,
    handle: JoinHandle<()>,
}

/// Bounded worker pool: `thread_count` workers share one queue, and at most
/// `max_queue_size` tasks are queued or running at any time.
///
/// When the pool is full, [`WorkerPool::push`] waits for a slot instead of
/// rejecting; it only fails once the pool is closed, so no task is dropped
/// without the caller knowing.
///
/// Draining: [`WorkerPool::close`] refuses new tasks, the workers finish what
/// is queued and exit, dropping their `shutdown_complete_tx` clones. The
/// monitor holds one more clone until the shutdown signal arrives or every
/// `notify_shutdown` sender is gone.
pub struct WorkerPool<T> {
    sender: async_channel::Sender<QueuedTask<T>>,
    slots: Arc<Semaphore>,
    submitted: AtomicU64,
    config: WorkerPoolConfig,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new<H: PoolHandler<T>>(
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        handler: H,
        config: WorkerPoolConfig,
    ) -> Self {
        let (sender, receiver) = async_channel::bounded(config.max_queue_size);

        let workers = (0..config.thread_count)
            .map(|id| {
                Self::spawn_worker(
                    id,
                    handler.clone(),
                    receiver.clone(),
                    shutdown_complete_tx.clone(),
                )
            })
            .collect();
        Self::spawn_monitor(
            workers,
            receiver,
            notify_shutdown,
            shutdown_complete_tx,
            handler,
            config.clone(),
        );

        Self {
            sender,
            slots: Arc::new(Semaphore::new(config.max_queue_size)),
            submitted: AtomicU64::new(0),
            config,
        }
    }

    /// Schedules `task` on one of the workers, waiting while the pool is full.
    pub async fn push(&self, task: T) -> AppResult<()> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::ChannelSendError("worker pool is closed".to_string()))?;
        self.sender
            .send(QueuedTask {
                task,
                _permit: permit,
            })
            .await
            .map_err(|_| AppError::ChannelSendError("worker pool is closed".to_string()))?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stops accepting tasks; already queued tasks still run.
    pub fn close(&self) {
        self.slots.close();
        self.sender.close();
    }

    /// Tasks accepted since the pool started.
    #[cfg(test)]
    pub(crate) fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Tasks currently queued or running.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.config.max_queue_size - self.slots.available_permits()
    }

    fn spawn_worker<H: PoolHandler<T>>(
        id: usize,
        handler: H,
        receiver: async_channel::Receiver<QueuedTask<T>>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Worker {
        let handle = tokio::spawn(async move {
            let _shutdown_complete_tx = shutdown_complete_tx;
            debug!("Worker {id} started");

            // recv fails only once the queue is closed and empty
            while let Ok(queued) = receiver.recv().await {
                let QueuedTask { task, _permit } = queued;
                handler.handle(task).await;
            }
            debug!("Worker {id} drained the queue and exited");
        });

        Worker { id, handle }
    }

    fn spawn_monitor<H: PoolHandler<T>>(
        mut workers: Vec<Worker>,
        receiver: async_channel::Receiver<QueuedTask<T>>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        handler: H,
        config: WorkerPoolConfig,
    ) {
        let mut shutdown_rx = notify_shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = time::interval(config.monitor_interval);

            loop {
                tokio::select! {
                    // a send and a dropped sender both end the monitor
                    _ = shutdown_rx.recv() => {
                        debug!("Worker monitor received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        let mut index = 0;
                        while index < workers.len() {
                            if !workers[index].handle.is_finished() {
                                trace!("Worker {} is running", workers[index].id);
                                index += 1;
                                continue;
                            }
                            let id = workers[index].id;
                            match (&mut workers[index].handle).await {
                                Ok(_) => {
                                    // queue closed and drained
                                    workers.swap_remove(index);
                                    continue;
                                }
                                Err(err) => {
                                    if err.is_panic() {
                                        Self::log_worker_panic(id, err);
                                    } else {
                                        error!("Worker {id} failed with non-panic error");
                                    }
                                }
                            }

                            warn!("Worker {id} failed, restarting...");
                            workers[index] = Self::spawn_worker(
                                id,
                                handler.clone(),
                                receiver.clone(),
                                shutdown_complete_tx.clone(),
                            );
                            index += 1;
                        }
                    }
                }
            }
            debug!("Worker monitor exiting");
        });
    }

    fn log_worker_panic(worker_id: usize, err: tokio::task::JoinError) {
        let payload = err.into_panic();
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            error!("Worker {worker_id} panicked with message: {message}");
        } else if let Some(message) = payload.downcast_ref::<String>() {
            error!("Worker {worker_id} panicked with message: {message}");
        } else {
            error!(
                "Worker {worker_id} panicked with an unknown type: {}",
                get_type_name(&payload)
            );
        }
    }
}

#[inline]
fn get_type_name<R>(_: &R) -> &'static str {
    type_name::<R>()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, AtomicUsize};

    use super::*;

    #[derive(Clone)]
    struct CountingHandler {
        counter: Arc<AtomicI32>,
        gate: Arc<Semaphore>,
    }

    impl CountingHandler {
        fn open() -> Self {
            CountingHandler {
                counter: Arc::new(AtomicI32::new(0)),
                gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            }
        }

        fn closed() -> Self {
            CountingHandler {
                counter: Arc::new(AtomicI32::new(0)),
                gate: Arc::new(Semaphore::new(0)),
            }
        }
    }

    impl PoolHandler<i32> for CountingHandler {
        fn handle(&self, task: i32) -> impl Future<Output = ()> + Send {
            let counter = self.counter.clone();
            let gate = self.gate.clone();
            async move {
                let _pass = gate.acquire().await.unwrap();
                counter.fetch_add(task, Ordering::SeqCst);
            }
        }
    }

    fn config(thread_count: usize, max_queue_size: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            thread_count,
            max_queue_size,
            monitor_interval: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_drain_runs_every_pushed_task() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);
        let handler = CountingHandler::open();

        let pool = WorkerPool::new(
            notify_shutdown.clone(),
            shutdown_complete_tx,
            handler.clone(),
            config(3, 4),
        );
        for task in 1..=10 {
            pool.push(task).await.unwrap();
        }
        assert_eq!(pool.submitted(), 10);

        pool.close();
        notify_shutdown.send(()).unwrap();
        shutdown_complete_rx.recv().await;

        assert_eq!(handler.counter.load(Ordering::SeqCst), 55);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_push_waits_while_pool_is_full() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, _) = mpsc::channel(1);
        let handler = CountingHandler::closed();

        let pool = WorkerPool::new(notify_shutdown, shutdown_complete_tx, handler.clone(), config(1, 2));
        pool.push(1).await.unwrap();
        pool.push(2).await.unwrap();
        assert_eq!(pool.in_flight(), 2);

        // both slots are taken, a running one and a queued one
        let blocked = time::timeout(Duration::from_millis(100), pool.push(3)).await;
        assert!(blocked.is_err());

        handler.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        time::timeout(Duration::from_secs(5), pool.push(4))
            .await
            .expect("a slot frees up once the gate opens")
            .unwrap();
    }

    #[tokio::test]
    async fn test_running_tasks_never_exceed_thread_count() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

        #[derive(Clone)]
        struct PeakHandler {
            active: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
            done: Arc<AtomicUsize>,
            gate: Arc<Semaphore>,
        }

        impl PoolHandler<()> for PeakHandler {
            fn handle(&self, _task: ()) -> impl Future<Output = ()> + Send {
                let handler = self.clone();
                async move {
                    let running = handler.active.fetch_add(1, Ordering::SeqCst) + 1;
                    handler.peak.fetch_max(running, Ordering::SeqCst);
                    let _pass = handler.gate.acquire().await.unwrap();
                    handler.active.fetch_sub(1, Ordering::SeqCst);
                    handler.done.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let handler = PeakHandler {
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            done: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(0)),
        };
        let pool = WorkerPool::new(
            notify_shutdown.clone(),
            shutdown_complete_tx,
            handler.clone(),
            config(2, 8),
        );
        for _ in 0..8 {
            pool.push(()).await.unwrap();
        }

        // every worker is parked on the gate, the rest stays queued
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.active.load(Ordering::SeqCst), 2);
        assert_eq!(pool.in_flight(), 8);

        handler.gate.add_permits(8);
        pool.close();
        notify_shutdown.send(()).unwrap();
        shutdown_complete_rx.recv().await;

        assert_eq!(handler.done.load(Ordering::SeqCst), 8);
        assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_push_after_close_is_refused() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, _) = mpsc::channel(1);

        let pool = WorkerPool::new(
            notify_shutdown,
            shutdown_complete_tx,
            CountingHandler::open(),
            config(1, 1),
        );
        pool.close();

        assert!(matches!(
            pool.push(1).await,
            Err(AppError::ChannelSendError(_))
        ));
        assert_eq!(pool.submitted(), 0);
    }

    #[tokio::test]
    async fn test_worker_panic_recovery() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, _) = mpsc::channel(1);

        #[derive(Clone)]
        struct PanicHandler {
            counter: Arc<AtomicI32>,
        }

        impl PoolHandler<bool> for PanicHandler {
            fn handle(&self, should_panic: bool) -> impl Future<Output = ()> + Send {
                let counter = self.counter.clone();
                async move {
                    if should_panic {
                        panic!("Test panic");
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let handler = PanicHandler {
            counter: Arc::new(AtomicI32::new(0)),
        };
        let pool = WorkerPool::new(
            notify_shutdown.clone(),
            shutdown_complete_tx,
            handler.clone(),
            config(1, 4),
        );

        // kill the only worker
        pool.push(true).await.unwrap();

        // wait for the monitor to restart it
        time::sleep(Duration::from_millis(300)).await;

        pool.push(false).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.in_flight(), 0);
    }
}
