//! Fixed-size worker pool fed by a bounded dispatch queue

use crate::proxy::handler::ConnectionHandler;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, trace};

/// An accepted connection waiting for a worker
#[derive(Debug)]
pub struct Job {
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    QueueFull,
    /// Every worker has exited, so nothing will ever drain the queue
    NoWorkers,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::QueueFull => f.write_str("dispatch queue full"),
            RejectReason::NoWorkers => f.write_str("no workers left"),
        }
    }
}

/// A connection the pool refused; dropping it closes the socket
#[derive(Debug)]
pub struct Rejected {
    pub job: Job,
    pub reason: RejectReason,
}

pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawn `max_workers` workers sharing a queue of `queue_capacity` slots
    pub fn start(max_workers: usize, queue_capacity: usize, handler: Arc<ConnectionHandler>) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for id in 0..max_workers {
            workers.spawn(worker_loop(id, Arc::clone(&receiver), Arc::clone(&handler)));
        }

        Self { sender, workers }
    }

    /// Queue a connection without waiting
    pub fn dispatch(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), Rejected> {
        self.sender
            .try_send(Job { stream, peer })
            .map_err(|e| match e {
                TrySendError::Full(job) => Rejected {
                    job,
                    reason: RejectReason::QueueFull,
                },
                TrySendError::Closed(job) => Rejected {
                    job,
                    reason: RejectReason::NoWorkers,
                },
            })
    }

    /// Connections currently waiting for a worker
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Close the queue and wait for every worker to finish its in-flight and
    /// already-queued connections
    pub async fn shutdown(mut self) {
        drop(self.sender);
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
    }
}

async fn worker_loop(id: usize, queue: Arc<Mutex<mpsc::Receiver<Job>>>, handler: Arc<ConnectionHandler>) {
    loop {
        let job = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };

        match job {
            Some(job) => handler.handle(job.stream, job.peer).await,
            None => break,
        }
    }

    trace!("Worker {} exiting", id);
}
