use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use crate::Error;

/// Handle to a closure running on the rayon thread pool.
///
/// The pipeline holds at most one of these per resource (image writer,
/// metadata writer) and checks it without blocking once per tick.
#[derive(Debug)]
pub struct BackgroundJob<T> {
    receiver: Receiver<std::thread::Result<T>>,
    outcome: Option<Result<T, Error>>,
}

impl<T: Send + 'static> BackgroundJob<T> {
    pub fn spawn<F>(job: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        rayon::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(job));
            let _ = sender.send(result);
        });
        Self {
            receiver,
            outcome: None,
        }
    }

    pub fn is_finished(&mut self) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.outcome = Some(Self::unpack(result));
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.outcome = Some(Err(Error::UnrecoverableError(
                    "background job vanished without a result",
                )));
                true
            }
        }
    }

    /// Takes the result if the job has finished
    pub fn try_take(&mut self) -> Option<Result<T, Error>> {
        if self.is_finished() {
            self.outcome.take()
        } else {
            None
        }
    }

    /// Blocks until the job finishes
    ///
    /// # Errors
    ///
    /// Returns an error if the job panicked.
    pub fn wait(mut self) -> Result<T, Error> {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        match self.receiver.recv() {
            Ok(result) => Self::unpack(result),
            Err(_) => Err(Error::UnrecoverableError(
                "background job vanished without a result",
            )),
        }
    }

    fn unpack(result: std::thread::Result<T>) -> Result<T, Error> {
        result.map_err(|_| Error::UnrecoverableError("background job panicked"))
    }
}
