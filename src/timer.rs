use crate::error::Result;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

enum TimerCommand {
    Schedule(Duration),
    Cancel,
    Shutdown,
}

/// Re-armable one-shot timer backed by its own thread.
///
/// `schedule` replaces any pending deadline, `cancel` drops it. The callback
/// runs on the timer thread, so it must not drop or join the timer itself.
pub struct OneShotTimer {
    commands: Sender<TimerCommand>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl OneShotTimer {
    pub fn new<F>(name: &str, mut callback: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (commands, rx) = channel::unbounded();

        let handle = std::thread::Builder::new()
            .name(format!("padbridge-timer-{}", name))
            .spawn(move || {
                let mut deadline: Option<Instant> = None;
                loop {
                    let command = match deadline {
                        Some(at) => rx.recv_deadline(at),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match command {
                        Ok(TimerCommand::Schedule(delay)) => {
                            deadline = Some(Instant::now() + delay)
                        }
                        Ok(TimerCommand::Cancel) => deadline = None,
                        Ok(TimerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            deadline = None;
                            callback();
                        }
                    }
                }
            })?;

        Ok(Self {
            commands,
            thread_handle: Some(handle),
        })
    }

    /// Arm (or re-arm) the timer to fire once after `delay`.
    pub fn schedule(&self, delay: Duration) {
        if self.commands.send(TimerCommand::Schedule(delay)).is_err() {
            log::warn!("Timer thread is gone, schedule ignored");
        }
    }

    pub fn cancel(&self) {
        let _ = self.commands.send(TimerCommand::Cancel);
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        let _ = self.commands.send(TimerCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Timer callback panicked");
            }
        }
    }
}
