//! Run state shared between an endpoint and its background loops

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    /// Loops have been told to exit but may not have finished yet
    StopRequested,
}

/// How `stop` waits for the background loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Request the stop and join every loop
    Synchronous,
    /// Request the stop and return immediately
    Asynchronous,
}

/// Publishes run-state transitions so loops wake as soon as a stop is requested
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<RunState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::Stopped);
        Self { state }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Moves to `Running` when not already running; reports success
    pub fn begin(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            RunState::Running => false,
            _ => {
                *state = RunState::Running;
                true
            }
        })
    }

    /// Moves `Running` to `StopRequested`; reports whether it did
    pub fn request_stop(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            RunState::Running => {
                *state = RunState::StopRequested;
                true
            }
            _ => false,
        })
    }

    pub fn finish(&self) {
        self.state.send_replace(RunState::Stopped);
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            receiver: self.state.subscribe(),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop-side view of the lifecycle
#[derive(Debug, Clone)]
pub struct StopSignal {
    receiver: watch::Receiver<RunState>,
}

impl StopSignal {
    /// Resolves once the state is anything other than `Running`
    pub async fn requested(&mut self) {
        loop {
            let running = *self.receiver.borrow_and_update() == RunState::Running;
            if !running {
                return;
            }
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}
