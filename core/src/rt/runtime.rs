//! Coroutine scheduler
//!
//! A fixed pool of worker threads draws coroutines from one bounded queue.
//! Each coroutine gets its own [`Vm`] sharing the scheduler's
//! [`Environment`]. Uncaught errors and panics are sent to a reporter
//! thread, which writes them to the environment's stderr sink, so a failing
//! coroutine never takes its siblings or the host down with it.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::select;

use crate::config::VmConfig;
use crate::error::Thrown;
use crate::val::{Closure, ErrorKind, ErrorValue, Val};
use crate::vm::{Environment, Function, Spawn, Vm};

/// Room for the deepest chain of nested native calls a coroutine may make.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// A runnable coroutine: a callee plus its arguments.
struct Job {
    callee: Val,
    args: Vec<Val>,
    /// Present for the main coroutine, whose outcome goes back to the host.
    reply: Option<Sender<Result<Val, Thrown>>>,
}

enum Report {
    Uncaught(Thrown),
    Panic(String),
    Stop,
}

/// How [`Scheduler::shutdown`] treats coroutines that have not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait until every queued and running coroutine is done.
    Drain,
    /// Stop taking work; running coroutines are left to finish on their own.
    Detach,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub spawned: usize,
    pub finished: usize,
    pub failed: usize,
    pub pending: usize,
}

/// State shared by the scheduler handle, its workers and every [`Vm`] that
/// may call `go`.
struct Shared {
    env: Arc<Environment>,
    config: VmConfig,
    jobs: Sender<Job>,
    reports: Sender<Report>,
    closed: AtomicBool,
    spawned: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
    pending: Mutex<usize>,
    idle: Condvar,
}

impl Shared {
    fn enqueue(&self, job: Job) -> Result<(), ErrorValue> {
        if self.closed.load(Ordering::Acquire) {
            return Err(shut_down());
        }
        // Count first so a fast worker cannot finish the job before it is counted.
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        match self.jobs.try_send(job) {
            Ok(()) => {
                self.spawned.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.finish_one();
                Err(match err {
                    TrySendError::Full(_) => ErrorValue::new(
                        ErrorKind::Error,
                        format!("coroutine queue is full ({} pending)", self.config.queue_depth),
                    ),
                    TrySendError::Disconnected(_) => shut_down(),
                })
            }
        }
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self.idle.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn report(&self, report: Report) {
        // The reporter only goes away after `Report::Stop`.
        let _ = self.reports.send(report);
    }
}

impl Spawn for Shared {
    fn spawn(&self, callee: Val, args: Vec<Val>) -> Result<(), ErrorValue> {
        self.enqueue(Job {
            callee,
            args,
            reply: None,
        })?;
        tracing::debug!(target: "ember::rt", "coroutine spawned");
        Ok(())
    }
}

fn shut_down() -> ErrorValue {
    ErrorValue::new(ErrorKind::Error, "scheduler is shut down")
}

/// Worker pool running the main coroutine and everything it spawns.
pub struct Scheduler {
    shared: Arc<Shared>,
    /// Dropped to tell idle workers to exit.
    stop: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(env: Arc<Environment>, config: VmConfig) -> Result<Self> {
        config.validate()?;
        let (jobs_tx, jobs_rx) = channel::bounded::<Job>(config.queue_depth);
        let (reports_tx, reports_rx) = channel::unbounded::<Report>();
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let shared = Arc::new(Shared {
            env,
            config,
            jobs: jobs_tx,
            reports: reports_tx,
            closed: AtomicBool::new(false),
            spawned: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            pending: Mutex::new(0),
            idle: Condvar::new(),
        });

        let reporter = {
            let env = shared.env.clone();
            let trace = shared.config.trace_uncaught;
            thread::Builder::new()
                .name("ember-reporter".into())
                .spawn(move || run_reporter(&env, trace, reports_rx))
                .context("failed to start the error reporter thread")?
        };

        let mut workers = Vec::with_capacity(shared.config.workers);
        for i in 0..shared.config.workers {
            let (shared, jobs, stop) = (shared.clone(), jobs_rx.clone(), stop_rx.clone());
            let handle = thread::Builder::new()
                .name(format!("ember-worker-{i}"))
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || run_worker(&shared, &jobs, &stop))
                .with_context(|| format!("failed to start worker thread {i}"))?;
            workers.push(handle);
        }
        tracing::debug!(target: "ember::rt", workers = workers.len(), queue_depth = shared.config.queue_depth, "scheduler started");

        Ok(Self {
            shared,
            stop: Some(stop_tx),
            workers,
            reporter: Some(reporter),
        })
    }

    /// Scheduler configured from `EMBER_*` environment variables.
    pub fn from_env(env: Arc<Environment>) -> Result<Self> {
        Self::new(env, VmConfig::from_env()?)
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.shared.env
    }

    /// Runs `main` as a coroutine on the pool and waits for its result.
    /// Coroutines it spawned may still be running when this returns.
    pub fn interpret(&self, main: Arc<Function>) -> Result<Val, Thrown> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        let job = Job {
            callee: Val::Closure(Arc::new(Closure::plain(main))),
            args: Vec::new(),
            reply: Some(reply_tx),
        };
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(shut_down().into());
        }
        *self.shared.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        // The host may block on a full queue; coroutines may not.
        if self.shared.jobs.send(job).is_err() {
            self.shared.finish_one();
            return Err(shut_down().into());
        }
        self.shared.spawned.fetch_add(1, Ordering::Relaxed);
        reply_rx.recv().unwrap_or_else(|_| {
            Err(ErrorValue::new(ErrorKind::Error, "main coroutine was abandoned").into())
        })
    }

    /// Enqueues a coroutine from the host.
    pub fn spawn(&self, callee: Val, args: Vec<Val>) -> Result<(), ErrorValue> {
        Spawn::spawn(self.shared.as_ref(), callee, args)
    }

    /// Blocks until no coroutine is queued or running.
    pub fn wait_idle(&self) {
        self.shared.wait_idle();
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            spawned: self.shared.spawned.load(Ordering::Relaxed),
            finished: self.shared.finished.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            pending: *self.shared.pending.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn shutdown(mut self, mode: ShutdownMode) {
        self.stop_workers(mode);
    }

    fn stop_workers(&mut self, mode: ShutdownMode) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if mode == ShutdownMode::Drain {
            self.shared.wait_idle();
        }
        drop(self.stop.take());
        self.shared.report(Report::Stop);
        match mode {
            ShutdownMode::Drain => {
                for worker in self.workers.drain(..) {
                    let _ = worker.join();
                }
                if let Some(reporter) = self.reporter.take() {
                    let _ = reporter.join();
                }
            }
            ShutdownMode::Detach => {
                self.workers.clear();
                self.reporter = None;
            }
        }
        tracing::debug!(target: "ember::rt", ?mode, "scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_workers(ShutdownMode::Detach);
    }
}

fn run_worker(shared: &Arc<Shared>, jobs: &Receiver<Job>, stop: &Receiver<()>) {
    tracing::debug!(target: "ember::rt", "worker started");
    loop {
        select! {
            recv(jobs) -> job => match job {
                Ok(job) => run_job(shared, job),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
    tracing::debug!(target: "ember::rt", "worker stopped");
}

fn run_job(shared: &Arc<Shared>, job: Job) {
    let Job { callee, args, reply } = job;
    let spawner: Arc<dyn Spawn> = shared.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut vm = Vm::with_config(shared.env.clone(), &shared.config).with_spawner(spawner);
        vm.call(&callee, Val::Nil, &args)
    }));

    match outcome {
        Ok(Ok(value)) => {
            shared.finished.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "ember::rt", "coroutine finished");
            if let Some(reply) = reply {
                let _ = reply.send(Ok(value));
            }
        }
        Ok(Err(thrown)) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            match reply {
                Some(reply) => {
                    let _ = reply.send(Err(thrown));
                }
                None => shared.report(Report::Uncaught(thrown)),
            }
        }
        Err(payload) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            let message = panic_message(payload.as_ref());
            match reply {
                Some(reply) => {
                    let err = ErrorValue::new(ErrorKind::Error, format!("coroutine panicked: {message}"));
                    let _ = reply.send(Err(err.into()));
                }
                None => shared.report(Report::Panic(message)),
            }
        }
    }
    // After the report is queued, so draining also sees it written.
    shared.finish_one();
}

fn run_reporter(env: &Environment, trace: bool, reports: Receiver<Report>) {
    for report in reports {
        let text = match report {
            Report::Uncaught(thrown) => {
                tracing::warn!(target: "ember::rt", value = %thrown.value.inspect(), "uncaught error in coroutine");
                if trace { thrown.render() } else { format!("{thrown}\n") }
            }
            Report::Panic(message) => {
                tracing::warn!(target: "ember::rt", %message, "coroutine panicked");
                format!("Error! Coroutine panicked: {message}\n")
            }
            Report::Stop => break,
        };
        if let Err(err) = env.stderr().write_str(&text) {
            tracing::warn!(target: "ember::rt", %err, "cannot write to the error sink");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
