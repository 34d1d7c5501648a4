use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use super::overpass::OverpassResponse;
use crate::Error;

pub type QueryResult = Result<OverpassResponse, Error>;

/// Pending result of a map-data query.
///
/// The producer side (typically a network fetch running on another thread
/// or runtime) sends exactly one [`QueryResult`]; the pipeline polls the task
/// once per tick without blocking.
#[derive(Debug)]
pub struct QueryTask {
    receiver: Receiver<QueryResult>,
    resolved: bool,
}

impl QueryTask {
    /// Creates a task together with the sender that resolves it
    pub fn channel() -> (Sender<QueryResult>, Self) {
        let (sender, receiver) = mpsc::channel();
        (
            sender,
            Self {
                receiver,
                resolved: false,
            },
        )
    }

    /// Runs `fetch` on a dedicated thread and resolves the task with its output
    pub fn spawn<F>(fetch: F) -> Self
    where
        F: FnOnce() -> QueryResult + Send + 'static,
    {
        let (sender, task) = Self::channel();
        std::thread::spawn(move || {
            // The receiver may already be gone if the session was cancelled
            let _ = sender.send(fetch());
        });
        task
    }

    /// A task that is already resolved
    pub fn ready(result: QueryResult) -> Self {
        let (sender, task) = Self::channel();
        let _ = sender.send(result);
        task
    }

    /// Returns the query result once it is available.
    ///
    /// Yields `Some` exactly once. A producer dropped without sending
    /// resolves the task with [`Error::NoData`].
    pub fn poll(&mut self) -> Option<QueryResult> {
        if self.resolved {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(Error::NoData(
                "map query was dropped without a result".to_string(),
            )),
        };
        self.resolved = true;
        Some(result)
    }
}
