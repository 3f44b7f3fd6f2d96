//! Server run state shared between the lifecycle owner and its tasks

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopped,
}

/// Owner of the one-way running -> stopped transition
#[derive(Debug)]
pub struct StateController {
    tx: watch::Sender<ServerState>,
}

impl StateController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Running);
        Self { tx }
    }

    pub fn subscribe(&self) -> StateWatcher {
        StateWatcher {
            rx: self.tx.subscribe(),
        }
    }

    /// Flip to `Stopped`. Returns false when already stopped.
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ServerState::Running {
                *state = ServerState::Stopped;
                true
            } else {
                false
            }
        })
    }
}

impl Default for StateController {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the server state
#[derive(Debug, Clone)]
pub struct StateWatcher {
    rx: watch::Receiver<ServerState>,
}

impl StateWatcher {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() == ServerState::Stopped
    }

    /// Resolve once the server is stopped (or its controller is gone)
    pub async fn stopped(&mut self) {
        loop {
            let state = *self.rx.borrow_and_update();
            if state == ServerState::Stopped {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
