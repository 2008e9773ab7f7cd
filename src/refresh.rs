//! Refresh actions and the worker that runs them off the event thread.

use log::{debug, info};
use std::{
    panic::{self, AssertUnwindSafe},
    process::{Command, ExitStatus},
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to launch refresh command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("refresh command exited with {0}")]
    Exit(ExitStatus),
    #[error("refresh commands are disabled (meta.allow_commands = false)")]
    CommandsDisabled,
    #[error("refresh action panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Failed(String),
}

pub trait RefreshAction: Send + Sync {
    fn refresh(&self) -> Result<(), RefreshError>;

    fn describe(&self) -> String {
        "refresh".to_string()
    }
}

impl<F> RefreshAction for F
where
    F: Fn() -> Result<(), RefreshError> + Send + Sync,
{
    fn refresh(&self) -> Result<(), RefreshError> {
        self()
    }

    fn describe(&self) -> String {
        "closure".to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoopRefresh;

impl RefreshAction for NoopRefresh {
    fn refresh(&self) -> Result<(), RefreshError> {
        info!("refresh requested (no command configured)");
        Ok(())
    }

    fn describe(&self) -> String {
        "noop".to_string()
    }
}

/// Runs `sh -c <command>`.
#[derive(Debug, Clone)]
pub struct CommandRefresh {
    command: String,
    allowed: bool,
}

impl CommandRefresh {
    pub fn new(command: impl Into<String>, allowed: bool) -> Self {
        Self {
            command: command.into(),
            allowed,
        }
    }
}

impl RefreshAction for CommandRefresh {
    fn refresh(&self) -> Result<(), RefreshError> {
        if !self.allowed {
            return Err(RefreshError::CommandsDisabled);
        }
        debug!("running refresh command: {}", self.command);
        let status = Command::new("sh").arg("-c").arg(&self.command).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(RefreshError::Exit(status))
        }
    }

    fn describe(&self) -> String {
        format!("cmd: {}", self.command)
    }
}

#[derive(Debug)]
pub struct Settled {
    pub generation: u64,
    pub outcome: Result<(), RefreshError>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct RefreshRunner {
    tx: Sender<Settled>,
    rx: Receiver<Settled>,
    next_generation: u64,
    in_flight: usize,
}

impl Default for RefreshRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshRunner {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            next_generation: 1,
            in_flight: 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn start(&mut self, action: Arc<dyn RefreshAction>) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.in_flight += 1;

        let tx = self.tx.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| action.refresh()))
                .unwrap_or_else(|p| Err(RefreshError::Panicked(panic_message(p.as_ref()))));
            // receiver gone means the controller was dropped; nothing to report to
            let _ = tx.send(Settled {
                generation,
                outcome,
                elapsed: started.elapsed(),
            });
        });
        generation
    }

    pub fn try_settled(&mut self) -> Option<Settled> {
        let s = self.rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(s)
    }

    /// Blocks until a refresh settles. `None` waits forever.
    pub fn wait_settled(&mut self, timeout: Option<Duration>) -> Option<Settled> {
        if self.in_flight == 0 {
            return None;
        }
        let s = match timeout {
            Some(t) => match self.rx.recv_timeout(t) {
                Ok(s) => s,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            },
            None => self.rx.recv().ok()?,
        };
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(s)
    }
}

fn panic_message(p: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Option<Duration> = Some(Duration::from_secs(5));

    #[test]
    fn runner_reports_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut runner = RefreshRunner::new();
        let generation = runner.start(Arc::new(move || -> Result<(), RefreshError> {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let s = runner.wait_settled(WAIT).expect("settled");
        assert_eq!(s.generation, generation);
        assert!(s.outcome.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn runner_reports_failure() {
        let mut runner = RefreshRunner::new();
        runner.start(Arc::new(|| -> Result<(), RefreshError> {
            Err(RefreshError::Failed("offline".into()))
        }));
        let s = runner.wait_settled(WAIT).expect("settled");
        assert_eq!(s.outcome.unwrap_err().to_string(), "offline");
    }

    #[test]
    fn panicking_action_still_settles() {
        let mut runner = RefreshRunner::new();
        runner.start(Arc::new(|| -> Result<(), RefreshError> { panic!("boom") }));
        let s = runner.wait_settled(WAIT).expect("settled");
        assert!(matches!(s.outcome, Err(RefreshError::Panicked(ref m)) if m == "boom"));
    }

    #[test]
    fn wait_without_work_returns_none() {
        let mut runner = RefreshRunner::new();
        assert!(runner.wait_settled(None).is_none());
        assert!(runner.try_settled().is_none());
    }

    #[test]
    fn disabled_command_is_refused() {
        let action = CommandRefresh::new("true", false);
        assert!(matches!(
            action.refresh(),
            Err(RefreshError::CommandsDisabled)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn command_exit_status_is_checked() {
        assert!(CommandRefresh::new("exit 0", true).refresh().is_ok());
        assert!(matches!(
            CommandRefresh::new("exit 3", true).refresh(),
            Err(RefreshError::Exit(_))
        ));
    }
}
