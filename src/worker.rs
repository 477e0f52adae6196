use log::error;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use crate::environment::{EnvError, EnvironmentManager, OverlayEnvironment};
use crate::launch::ExecutionTarget;
use crate::supervisor::{Session, SessionError, SessionReport};

/// What a worker tells the controller. Every worker ends with exactly one
/// `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Log(String),
    Output(Vec<String>),
    Done(bool),
}

#[derive(Debug, Clone)]
pub enum LifecycleOp {
    /// `disposable` environments are removed again if bootstrapping fails.
    Create {
        base: PathBuf,
        working_dir: PathBuf,
        disposable: bool,
    },
    Delete(OverlayEnvironment),
}

#[derive(Debug)]
pub enum LifecycleOutcome {
    Created(OverlayEnvironment),
    Deleted,
}

/// A background operation: events arrive on `events`, the typed result comes
/// back from `join`.
pub struct Worker<T> {
    events: Receiver<Event>,
    thread: JoinHandle<Option<T>>,
}

impl<T> Worker<T> {
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// The result, or None if the worker panicked.
    pub fn join(self) -> Option<T> {
        self.thread.join().ok().flatten()
    }
}

/**
 * Runs `work` on its own thread. A panic inside `work` is caught and
 * reported as a failed `Done`, the same as a returned error.
 */
fn spawn_worker<T, E, F>(name: &str, work: F) -> std::io::Result<Worker<Result<T, E>>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(&Sender<Event>) -> Result<T, E> + Send + 'static,
{
    let (sender, events) = channel();
    let name = name.to_string();
    let thread = std::thread::Builder::new().name(name.clone()).spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(|| work(&sender)));
        let success = matches!(result, Ok(Ok(_)));
        if result.is_err() {
            error!("Worker {} panicked", name);
            let _ = sender.send(Event::Log(format!("{} aborted unexpectedly", name)));
        }
        let _ = sender.send(Event::Done(success));
        result.ok()
    })?;
    Ok(Worker { events, thread })
}

pub fn spawn_lifecycle(
    manager: Arc<EnvironmentManager>,
    op: LifecycleOp,
) -> std::io::Result<Worker<Result<LifecycleOutcome, EnvError>>> {
    let name = match &op {
        LifecycleOp::Create { .. } => "create",
        LifecycleOp::Delete(_) => "delete",
    };
    spawn_worker(name, move |events| match op {
        LifecycleOp::Create {
            base,
            working_dir,
            disposable,
        } => {
            let _ = events.send(Event::Log(format!(
                "Creating overlay of {} in {}",
                base.display(),
                working_dir.display()
            )));
            let env = if disposable {
                manager.create_disposable(&base, &working_dir)?
            } else {
                manager.create(&base, &working_dir)?
            };
            let _ = events.send(Event::Log(format!(
                "Prefix ready at {}",
                env.merged_dir.display()
            )));
            Ok(LifecycleOutcome::Created(env))
        }
        LifecycleOp::Delete(env) => {
            let _ = events.send(Event::Log(format!(
                "Deleting {}",
                env.working_dir.display()
            )));
            manager.delete(&env)?;
            Ok(LifecycleOutcome::Deleted)
        }
    })
}

pub fn spawn_session(
    session: Session,
    target: ExecutionTarget,
    env: BTreeMap<String, String>,
    raise_nofile: bool,
) -> std::io::Result<Worker<Result<SessionReport, SessionError>>> {
    spawn_worker("session", move |events| {
        let report = session.run(&target, env, raise_nofile, &mut |batch| {
            let _ = events.send(Event::Output(batch));
        })?;
        if let Some(report_file) = &report.report_file {
            let _ = events.send(Event::Log(format!(
                "Possibly missing dependencies listed in {}",
                report_file.display()
            )));
        }
        Ok(report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<T>(worker: &Worker<T>) -> Vec<Event> {
        worker.events().iter().collect()
    }

    #[test]
    fn test_done_once_on_success() {
        let worker = spawn_worker("ok", |events| {
            events.send(Event::Log("working".to_string())).unwrap();
            Ok::<_, String>(7)
        })
        .unwrap();
        assert_eq!(
            collect(&worker),
            [Event::Log("working".to_string()), Event::Done(true)]
        );
        assert_eq!(worker.join(), Some(Ok(7)));
    }

    #[test]
    fn test_done_false_on_error() {
        let worker =
            spawn_worker("err", |_| Err::<(), _>("nope".to_string())).unwrap();
        assert_eq!(collect(&worker), [Event::Done(false)]);
        assert_eq!(worker.join(), Some(Err("nope".to_string())));
    }

    #[test]
    fn test_panic_still_done() {
        let worker = spawn_worker("boom", |_| -> Result<(), String> {
            panic!("worker bug");
        })
        .unwrap();
        let events = collect(&worker);
        assert_eq!(events.last(), Some(&Event::Done(false)));
        assert_eq!(
            events.iter().filter(|e| matches!(e, Event::Done(_))).count(),
            1
        );
        assert_eq!(worker.join(), None);
    }
}
