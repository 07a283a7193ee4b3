//! Interval-driven package polling for async hosts

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::Result;
use crate::session::AcquisitionSession;
use crate::types::{SamplePackage, SessionState};

/// Polls a session on a fixed interval and yields each non-empty batch
///
/// Every tick drains the buffer with reset. Pending faults are yielded as errors
/// and the stream keeps going. The stream ends on the first empty tick after the
/// session has returned to `Idle`.
pub struct PackagePoller {
    session: Arc<AcquisitionSession>,
    interval: Interval,
    finished: bool,
}

impl PackagePoller {
    pub fn new(session: Arc<AcquisitionSession>, period: Duration) -> Self {
        let mut interval = interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { session, interval, finished: false }
    }
}

impl Stream for PackagePoller {
    type Item = Result<Vec<SamplePackage>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            ready!(this.interval.poll_tick(cx));

            match this.session.get_package_of_data(true) {
                Ok(Some(packages)) => return Poll::Ready(Some(Ok(packages))),
                Err(e) => return Poll::Ready(Some(Err(e))),
                Ok(None) if this.session.state() == SessionState::Idle => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Ok(None) => {}
            }
        }
    }
}

/// Adapters for streams of polled batches
pub trait PackageStreamExt: Stream<Item = Result<Vec<SamplePackage>>> {
    /// End the stream after yielding the first fault the acquisition cannot survive
    fn until_terminal(self) -> UntilTerminal<Self>
    where
        Self: Sized,
    {
        UntilTerminal { stream: self, done: false }
    }
}

impl<S: Stream<Item = Result<Vec<SamplePackage>>>> PackageStreamExt for S {}

pin_project! {
    /// Stream returned by [`PackageStreamExt::until_terminal`]
    pub struct UntilTerminal<S> {
        #[pin]
        stream: S,
        done: bool,
    }
}

impl<S: Stream<Item = Result<Vec<SamplePackage>>>> Stream for UntilTerminal<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        let item = ready!(this.stream.poll_next(cx));
        match &item {
            Some(Err(e)) if e.requires_force_stop() => *this.done = true,
            None => *this.done = true,
            _ => {}
        }
        Poll::Ready(item)
    }
}
