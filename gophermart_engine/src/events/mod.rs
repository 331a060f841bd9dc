//! Advisory error reporting for the pipeline.
//!
//! The sink is a bounded multi-producer single-consumer channel. Producers never block: when the
//! buffer is full the error is dropped and counted, because stalling a pipeline worker on an
//! observability channel would be worse than losing the message.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::*;
use tokio::{sync::mpsc, task::JoinHandle};

/// The producing half. Cheap to clone; one per pipeline worker.
#[derive(Clone)]
pub struct ErrorSink<E: Send + 'static> {
    sender: mpsc::Sender<E>,
    dropped: Arc<AtomicU64>,
}

impl<E: Send + 'static> ErrorSink<E> {
    /// Non-blocking send. On a full buffer the error is dropped and the drop counter bumped.
    pub fn report(&self, error: E) {
        if let Err(e) = self.sender.try_send(error) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("📬️ Error sink is full; dropping an error ({dropped} dropped so far): {e}");
        }
    }

    /// How many errors have been dropped on the floor since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The consuming half. Call [`listen`][ErrorPump::listen] once to drain errors into a callback.
pub struct ErrorPump<E: Send + 'static> {
    sender: mpsc::Sender<E>,
    receiver: mpsc::Receiver<E>,
    dropped: Arc<AtomicU64>,
}

impl<E: Send + 'static> ErrorPump<E> {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { sender, receiver, dropped: Arc::new(AtomicU64::new(0)) }
    }

    pub fn sink(&self) -> ErrorSink<E> {
        ErrorSink { sender: self.sender.clone(), dropped: Arc::clone(&self.dropped) }
    }

    /// Drain errors into `callback` until every sink has been dropped. The internal sender is
    /// released first so the task shuts down with the last producer.
    pub fn listen<F>(mut self, mut callback: F) -> JoinHandle<()>
    where F: FnMut(E) + Send + 'static {
        tokio::spawn(async move {
            drop(self.sender);
            while let Some(error) = self.receiver.recv().await {
                callback(error);
            }
            debug!("📬️ Error pump has shut down");
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn delivers_errors_to_the_callback() {
        let pump = ErrorPump::<String>::new(8);
        let sink = pump.sink();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let handle = pump.listen(move |e| seen2.lock().unwrap().push(e));
        sink.report("one".to_string());
        sink.report("two".to_string());
        drop(sink);
        handle.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn overflow_drops_and_counts_instead_of_blocking() {
        let pump = ErrorPump::<u32>::new(2);
        let sink = pump.sink();
        for i in 0..5 {
            sink.report(i);
        }
        assert_eq!(sink.dropped_count(), 3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let handle = pump.listen(move |e| seen2.lock().unwrap().push(e));
        drop(sink);
        handle.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
