//! Serial execution contexts
//!
//! A `SerialContext<S>` is one named thread that owns a value of type `S` and
//! runs submitted jobs against it strictly in submission order. The session
//! controller lives inside one of these, so every hardware mutation is
//! serialized without any lock around the hardware objects themselves.

use crate::errors::CameraError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

pub struct SerialContext<S: Send + 'static> {
    name: String,
    sender: Option<Sender<Job<S>>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    timeout: Duration,
}

impl<S: Send + 'static> SerialContext<S> {
    /// Spawn the context thread, moving `state` onto it
    pub fn spawn(name: &str, state: S, timeout: Duration) -> Result<Self, CameraError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job<S>>();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_jobs(state, receiver))?;
        let thread_id = thread.thread().id();

        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            thread: Some(thread),
            thread_id,
            timeout,
        })
    }

    /// Queue a job without waiting for it
    pub fn post<F>(&self, job: F) -> Result<(), CameraError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(CameraError::ContextTerminated)?;
        sender
            .send(Box::new(job))
            .map_err(|_| CameraError::ContextTerminated)
    }

    /// Run a job and block until it returns, bounded by the context timeout
    pub fn run<R, F>(&self, job: F) -> Result<R, CameraError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        self.run_with_timeout(self.timeout, job)
    }

    /// A job still queued when the wait expires is abandoned and never runs.
    /// One that has already started runs to completion.
    pub fn run_with_timeout<R, F>(&self, timeout: Duration, job: F) -> Result<R, CameraError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            // A job waiting on its own context would never be scheduled.
            return Err(CameraError::configuration(format!(
                "re-entrant call onto {}",
                self.name
            )));
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let progress = Arc::new(AtomicU8::new(PENDING));
        let job_progress = progress.clone();
        self.post(move |state| {
            if job_progress
                .compare_exchange(PENDING, STARTED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let _ = reply_tx.send(job(state));
            }
        })?;

        match reply_rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                let abandoned = progress
                    .compare_exchange(PENDING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok();
                Err(CameraError::Timeout(format!(
                    "{} did not answer within {}ms ({})",
                    self.name,
                    timeout.as_millis(),
                    if abandoned { "abandoned before it ran" } else { "still running" }
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(CameraError::ContextTerminated),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting jobs, drain the queue and join the thread
    pub fn shutdown(&mut self) {
        self.sender = None;
        if let Some(handle) = self.thread.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::warn!("{} terminated with a panic", self.name);
            }
        }
    }
}

impl<S: Send + 'static> Drop for SerialContext<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_jobs<S>(mut state: S, receiver: Receiver<Job<S>>) {
    while let Ok(job) = receiver.recv() {
        job(&mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_jobs_run_in_order() {
        let context = SerialContext::spawn("test-order", Vec::new(), Duration::from_secs(1))
            .expect("spawn");
        for i in 0..50 {
            context.post(move |log: &mut Vec<i32>| log.push(i)).unwrap();
        }
        let log = context.run(|log| log.clone()).unwrap();
        assert_eq!(log, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_times_out() {
        let context = SerialContext::spawn("test-timeout", (), Duration::from_millis(20))
            .expect("spawn");
        context
            .post(|_| std::thread::sleep(Duration::from_millis(200)))
            .unwrap();
        let result = context.run(|_| 1);
        assert!(matches!(result, Err(CameraError::Timeout(_))));
    }

    #[test]
    fn test_timed_out_job_never_runs() {
        let ran = Arc::new(AtomicUsize::new(0));
        let context = SerialContext::spawn("test-abandon", (), Duration::from_millis(20))
            .expect("spawn");
        context
            .post(|_| std::thread::sleep(Duration::from_millis(150)))
            .unwrap();

        let job_ran = ran.clone();
        let result = context.run(move |_| {
            job_ran.fetch_add(1, Ordering::SeqCst);
        });
        match result {
            Err(CameraError::Timeout(message)) => assert!(message.contains("abandoned")),
            other => panic!("expected a timeout, got {:?}", other),
        }

        context
            .run_with_timeout(Duration::from_secs(1), |_| ())
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reentrant_run_is_rejected() {
        let context = Arc::new(
            SerialContext::spawn("test-reentrant", 0u32, Duration::from_secs(1)).expect("spawn"),
        );
        let inner = context.clone();
        let (tx, rx) = crossbeam_channel::bounded(1);
        context
            .post(move |_| {
                let nested = inner.run(|value| *value);
                let _ = tx.send(nested.is_err());
            })
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut context =
            SerialContext::spawn("test-drain", (), Duration::from_secs(1)).expect("spawn");
        for _ in 0..10 {
            let counter = counter.clone();
            context
                .post(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        context.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(matches!(context.post(|_| {}), Err(CameraError::ContextTerminated)));
    }
}
