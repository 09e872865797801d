// ============================================================================
// BLUR SCHEDULER — single-flight, latest-wins task queue
// ============================================================================
//
// All blur computation funnels through one dedicated background thread, so
// at most one source/scaled/output buffer triple is live at a time. The
// queue is drained newest-first (the last slider position is what the user
// wants to see), and popping a task discards every still-queued task for
// the same consumer. A task already popped for execution always runs to
// completion; coalescing only filters the queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak, mpsc};
use std::thread;

use crate::bitmap::{Bitmap, PixelSize};

use super::render_once;
use super::worker::BlurWorker;

// ---------------------------------------------------------------------------
//  Task values
// ---------------------------------------------------------------------------

/// Opaque identity of the UI element a result is destined for. Compared for
/// equality when coalescing, never dereferenced — the element may be gone by
/// the time its last task drains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Allocate a fresh process-unique identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Invoked exactly once with the blurred image, or with `None` when the
/// source no longer exists. Runs on the scheduler's worker thread; UI
/// consumers forward the result onto their own context (see `app.rs`).
type Completion = Box<dyn FnOnce(Option<Arc<Bitmap>>) + Send>;

/// The source of a pending blur. Both variants are weak: a task never keeps
/// its source alive past the caller.
enum TaskSource {
    Image(Weak<Bitmap>),
    Worker(Weak<BlurWorker>),
}

/// One pending blur request.
pub struct BlurTask {
    source: TaskSource,
    consumer: Option<ConsumerId>,
    target: PixelSize,
    radius: f32,
    completion: Completion,
}

impl BlurTask {
    /// A request against a bare image; the scale step runs uncached.
    pub fn for_image(
        image: &Arc<Bitmap>,
        consumer: Option<ConsumerId>,
        target: PixelSize,
        radius: f32,
        completion: impl FnOnce(Option<Arc<Bitmap>>) + Send + 'static,
    ) -> Self {
        Self {
            source: TaskSource::Image(Arc::downgrade(image)),
            consumer,
            target,
            radius,
            completion: Box::new(completion),
        }
    }

    /// A request against a [`BlurWorker`], reusing its scaled-source cache.
    pub fn for_worker(
        worker: &Arc<BlurWorker>,
        consumer: Option<ConsumerId>,
        target: PixelSize,
        radius: f32,
        completion: impl FnOnce(Option<Arc<Bitmap>>) + Send + 'static,
    ) -> Self {
        Self {
            source: TaskSource::Worker(Arc::downgrade(worker)),
            consumer,
            target,
            radius,
            completion: Box::new(completion),
        }
    }

    fn source_alive(&self) -> bool {
        match &self.source {
            TaskSource::Image(image) => image.strong_count() > 0,
            TaskSource::Worker(worker) => worker.strong_count() > 0,
        }
    }
}

// ---------------------------------------------------------------------------
//  Scheduler
// ---------------------------------------------------------------------------

/// Cloneable handle to the blur queue. Construct one per process and pass it
/// to every consumer; the dedicated worker thread shuts down when the last
/// handle drops.
#[derive(Clone)]
pub struct BlurScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    tasks: Mutex<Vec<BlurTask>>,
    wake: mpsc::Sender<()>,
}

impl BlurScheduler {
    /// Create the scheduler and spawn its worker thread.
    pub fn new() -> Self {
        let (wake, signal) = mpsc::channel();
        let inner = Arc::new(Inner { tasks: Mutex::new(Vec::new()), wake });

        // The thread holds only a weak handle so dropping the last
        // `BlurScheduler` closes the wake channel and ends the loop.
        let queue = Arc::downgrade(&inner);
        let spawned = thread::Builder::new()
            .name("blur-worker".to_string())
            .spawn(move || drain_loop(queue, signal));
        if let Err(e) = spawned {
            crate::log_err!("blur scheduler: failed to spawn worker thread: {}", e);
        }

        Self { inner }
    }

    /// Enqueue a blur request. Never blocks and never errors.
    ///
    /// A task whose source is already gone completes synchronously with
    /// `None` and is not queued. Queued tasks for the same consumer are
    /// superseded by newer ones and dropped without any completion callback
    /// — submit again rather than waiting on an old request.
    pub fn submit(&self, task: BlurTask) {
        if !task.source_alive() {
            crate::log_warn!("blur scheduler: task submitted without a source image");
            (task.completion)(None);
            return;
        }

        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(task);
        drop(tasks);
        let _ = self.inner.wake.send(());
    }
}

impl Default for BlurScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Pop the newest pending task and discard every other queued task for
    /// the same consumer. Tasks without a consumer are never coalesced.
    fn next_task(&self) -> Option<BlurTask> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let task = tasks.pop()?;
        if task.consumer.is_some() {
            let before = tasks.len();
            tasks.retain(|t| t.consumer != task.consumer);
            let dropped = before - tasks.len();
            if dropped > 0 {
                crate::log_info!(
                    "blur scheduler: superseded {} older task(s) for the same consumer",
                    dropped
                );
            }
        }
        Some(task)
    }
}

/// The worker thread: execute until the queue is empty, then park on the
/// wake channel. Exits when every scheduler handle is gone.
fn drain_loop(queue: Weak<Inner>, signal: mpsc::Receiver<()>) {
    loop {
        let task = match queue.upgrade() {
            Some(inner) => inner.next_task(),
            None => return,
        };
        match task {
            Some(task) => execute(task),
            None => {
                if signal.recv().is_err() {
                    return;
                }
            }
        }
    }
}

/// Run one task to completion on the worker thread.
fn execute(task: BlurTask) {
    let BlurTask { source, target, radius, completion, .. } = task;

    let result = match source {
        TaskSource::Worker(worker) => match worker.upgrade() {
            Some(worker) => {
                if radius <= 0.0 {
                    crate::log_info!("blur scheduler: radius {} requires no blur", radius);
                    Some(Arc::clone(worker.image()))
                } else {
                    Some(worker.blur(radius, target))
                }
            }
            // Worker died between submission and execution.
            None => None,
        },
        TaskSource::Image(image) => match image.upgrade() {
            Some(image) => {
                if radius <= 0.0 {
                    crate::log_info!("blur scheduler: radius {} requires no blur", radius);
                    Some(image)
                } else {
                    match render_once(&image, radius, target) {
                        Some(blurred) => Some(Arc::new(blurred)),
                        // Pipeline failure degrades to the unblurred image.
                        None => Some(image),
                    }
                }
            }
            None => None,
        },
    };

    completion(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);
    const SETTLE: Duration = Duration::from_millis(300);

    fn bitmap(w: u32, h: u32) -> Arc<Bitmap> {
        Arc::new(Bitmap::new(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 33, 255])
        })))
    }

    /// Block the worker thread inside a task completion until released, so
    /// follow-up submissions queue deterministically behind it.
    fn plug(scheduler: &BlurScheduler, image: &Arc<Bitmap>) -> mpsc::Sender<()> {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        scheduler.submit(BlurTask::for_image(
            image,
            None,
            PixelSize::new(8, 8),
            0.0,
            move |_| {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
            },
        ));
        started_rx.recv_timeout(WAIT).expect("worker never reached the plug task");
        release_tx
    }

    #[test]
    fn missing_source_completes_synchronously_with_none() {
        let scheduler = BlurScheduler::new();
        let image = bitmap(8, 8);
        let (tx, rx) = mpsc::channel();
        let task = BlurTask::for_image(&image, None, PixelSize::new(8, 8), 3.0, move |res| {
            let _ = tx.send(res);
        });
        drop(image);
        scheduler.submit(task);
        // No queue round-trip: the completion already ran on this thread.
        let res = rx.try_recv().expect("completion did not run synchronously");
        assert!(res.is_none());
    }

    #[test]
    fn zero_radius_delivers_the_original_image() {
        let scheduler = BlurScheduler::new();
        let image = bitmap(16, 16);
        let (tx, rx) = mpsc::channel();
        scheduler.submit(BlurTask::for_image(
            &image,
            None,
            PixelSize::new(16, 16),
            0.0,
            move |res| {
                let _ = tx.send(res);
            },
        ));
        let res = rx.recv_timeout(WAIT).unwrap().expect("expected an image");
        assert!(Arc::ptr_eq(&res, &image));
    }

    #[test]
    fn same_consumer_tasks_coalesce_to_the_newest() {
        let scheduler = BlurScheduler::new();
        let image = bitmap(64, 64);
        let consumer = ConsumerId::next();
        let release = plug(&scheduler, &image);

        let (tx, rx) = mpsc::channel();
        for radius in [5.0f32, 9.0, 12.0] {
            let tx = tx.clone();
            scheduler.submit(BlurTask::for_image(
                &image,
                Some(consumer),
                PixelSize::new(16, 16),
                radius,
                move |res| {
                    let _ = tx.send((radius, res));
                },
            ));
        }
        release.send(()).unwrap();

        let (radius, res) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(radius, 12.0);
        assert!(res.is_some());
        // The superseded radius-5 and radius-9 completions never fire.
        assert!(rx.recv_timeout(SETTLE).is_err());
    }

    #[test]
    fn different_consumers_complete_independently_newest_first() {
        let scheduler = BlurScheduler::new();
        let image = bitmap(32, 32);
        let consumer_a = ConsumerId::next();
        let consumer_b = ConsumerId::next();
        let release = plug(&scheduler, &image);

        let (tx, rx) = mpsc::channel();
        for (name, consumer) in [("a", consumer_a), ("b", consumer_b)] {
            let tx = tx.clone();
            scheduler.submit(BlurTask::for_image(
                &image,
                Some(consumer),
                PixelSize::new(16, 16),
                2.0,
                move |res| {
                    let _ = tx.send((name, res.is_some()));
                },
            ));
        }
        release.send(()).unwrap();

        // LIFO: the later submission (b) drains first; both complete once.
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("b", true));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("a", true));
        assert!(rx.recv_timeout(SETTLE).is_err());
    }

    #[test]
    fn pipeline_failure_degrades_to_original_and_drain_continues() {
        let scheduler = BlurScheduler::new();
        // Zero-sized source: decode fails, blur degrades to the original.
        let broken = Arc::new(Bitmap::new(RgbaImage::new(0, 0)));
        let good = bitmap(16, 16);
        let release = plug(&scheduler, &good);

        let (tx, rx) = mpsc::channel();
        let tx_broken = tx.clone();
        let broken_clone = Arc::clone(&broken);
        scheduler.submit(BlurTask::for_image(
            &broken,
            None,
            PixelSize::new(8, 8),
            4.0,
            move |res| {
                let res = res.expect("failure must still deliver an image");
                let _ = tx_broken.send(("broken", Arc::ptr_eq(&res, &broken_clone)));
            },
        ));
        scheduler.submit(BlurTask::for_image(
            &good,
            None,
            PixelSize::new(8, 8),
            2.0,
            move |res| {
                let _ = tx.send(("good", res.is_some()));
            },
        ));
        release.send(()).unwrap();

        // LIFO: the good task runs first, then the broken one — no deadlock.
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("good", true));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("broken", true));
    }

    #[test]
    fn worker_task_downscales_before_convolving() {
        let scheduler = BlurScheduler::new();
        let image = bitmap(512, 512);
        let worker = Arc::new(BlurWorker::new(Arc::clone(&image)));

        let (tx, rx) = mpsc::channel();
        scheduler.submit(BlurTask::for_worker(
            &worker,
            Some(ConsumerId::next()),
            PixelSize::new(64, 64),
            10.0,
            move |res| {
                let _ = tx.send(res);
            },
        ));

        let res = rx.recv_timeout(WAIT).unwrap().expect("expected an image");
        // ratio = 64/512: the delivered image has the downscaled dimensions.
        assert_eq!((res.width(), res.height()), (64, 64));
    }

    #[test]
    fn back_to_back_radii_deliver_only_the_last() {
        let scheduler = BlurScheduler::new();
        let image = bitmap(128, 128);
        let worker = Arc::new(BlurWorker::new(Arc::clone(&image)));
        let consumer = ConsumerId::next();
        let release = plug(&scheduler, &image);

        let (tx, rx) = mpsc::channel();
        for radius in [5.0f32, 12.0] {
            let tx = tx.clone();
            scheduler.submit(BlurTask::for_worker(
                &worker,
                Some(consumer),
                PixelSize::new(32, 32),
                radius,
                move |res| {
                    let _ = tx.send((radius, res.is_some()));
                },
            ));
        }
        release.send(()).unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (12.0, true));
        assert!(rx.recv_timeout(SETTLE).is_err());
    }

    #[test]
    fn source_dropped_before_execution_completes_with_none() {
        let scheduler = BlurScheduler::new();
        let keep_alive = bitmap(16, 16);
        let dying = bitmap(16, 16);
        let release = plug(&scheduler, &keep_alive);

        let (tx, rx) = mpsc::channel();
        scheduler.submit(BlurTask::for_image(
            &dying,
            None,
            PixelSize::new(8, 8),
            3.0,
            move |res| {
                let _ = tx.send(res.is_none());
            },
        ));
        // Queued alive, gone by execution time.
        drop(dying);
        release.send(()).unwrap();

        assert!(rx.recv_timeout(WAIT).unwrap());
    }
}
