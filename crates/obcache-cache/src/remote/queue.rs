//! Ordered buffer of operations waiting for a connection.

use std::collections::VecDeque;
use std::fmt;

use obcache_core::result::AppResult;

/// An operation parked until the connection settles.
///
/// It receives either the live connection handle or the error that
/// prevented the connection from being established.
pub type Continuation<T> = Box<dyn FnOnce(AppResult<T>) + Send + 'static>;

/// FIFO of deferred operations.
///
/// The queue itself holds no lock; the owner swaps it out with
/// [`take`](Self::take) while holding its own lock and then calls
/// [`release`](Self::release) on the detached batch outside of it. Each
/// continuation is consumed when released, so it runs at most once.
pub struct DeferredQueue<T> {
    ops: VecDeque<Continuation<T>>,
}

impl<T> DeferredQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            ops: VecDeque::new(),
        }
    }

    /// Append an operation.
    pub fn push(&mut self, op: Continuation<T>) {
        self.ops.push_back(op);
    }

    /// Number of parked operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Detach every parked operation, leaving a fresh empty queue behind.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl<T: Clone> DeferredQueue<T> {
    /// Invoke every operation in submission order with the same outcome.
    pub fn release(self, outcome: &AppResult<T>) {
        for op in self.ops {
            op(outcome.clone());
        }
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DeferredQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("len", &self.ops.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use obcache_core::error::{AppError, ErrorKind};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> Continuation<u32> {
        let log = Arc::clone(log);
        Box::new(move |outcome| {
            let entry = match outcome {
                Ok(v) => format!("{label}:ok:{v}"),
                Err(e) => format!("{label}:err:{}", e.kind),
            };
            log.lock().unwrap().push(entry);
        })
    }

    #[test]
    fn test_release_in_submission_order() {
        let log: Log = Arc::default();
        let mut queue = DeferredQueue::new();
        queue.push(recorder(&log, "a"));
        queue.push(recorder(&log, "b"));
        queue.push(recorder(&log, "c"));
        assert_eq!(queue.len(), 3);

        queue.take().release(&Ok(7));

        assert!(queue.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["a:ok:7", "b:ok:7", "c:ok:7"]);
    }

    #[test]
    fn test_release_error_to_every_operation() {
        let log: Log = Arc::default();
        let mut queue = DeferredQueue::new();
        queue.push(recorder(&log, "a"));
        queue.push(recorder(&log, "b"));

        queue.take().release(&Err(AppError::connection("refused")));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:err:CONNECTION", "b:err:CONNECTION"]
        );
    }

    #[test]
    fn test_take_leaves_fresh_queue_for_late_arrivals() {
        let log: Log = Arc::default();
        let mut queue = DeferredQueue::new();
        queue.push(recorder(&log, "early"));

        let batch = queue.take();
        queue.push(recorder(&log, "late"));
        batch.release(&Ok(1));

        assert_eq!(*log.lock().unwrap(), vec!["early:ok:1"]);
        assert_eq!(queue.len(), 1);

        queue.take().release(&Err(AppError::new(ErrorKind::Connection, "down")));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["early:ok:1", "late:err:CONNECTION"]
        );
    }

    #[test]
    fn test_empty_release_is_noop() {
        let queue: DeferredQueue<u32> = DeferredQueue::new();
        queue.release(&Ok(0));
    }
}
