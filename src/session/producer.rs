//! Producer callbacks registered with the driver's communication loop

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace, warn};

use crate::buffer::{PushOutcome, SampleBuffer};
use crate::device::FrameSink;
use crate::fault::{Fault, FaultFlag};
use crate::types::{DeviceEvent, SamplePackage};

/// Routes driver callbacks into the sample buffer and the fault flag
///
/// Runs on the driver's thread. Takes at most one lock per callback and never
/// blocks on the consumer. Once its acquisition is cancelled the producer drops
/// every callback, so a detached loop cannot write into a restarted session.
pub(crate) struct Producer {
    buffer: Arc<SampleBuffer>,
    fault: Arc<FaultFlag>,
    events: broadcast::Sender<DeviceEvent>,
    cancel: CancellationToken,
}

impl Producer {
    pub(crate) fn new(
        buffer: Arc<SampleBuffer>,
        fault: Arc<FaultFlag>,
        events: broadcast::Sender<DeviceEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { buffer, fault, events, cancel }
    }

    fn detached(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record a fault unless the acquisition has been cancelled
    ///
    /// The cancellation check happens under the flag's lock.
    pub(crate) fn raise(&self, fault: Fault) {
        if !self.fault.raise_if(fault, || !self.detached()) {
            trace!("Dropping fault from cancelled acquisition");
        }
    }
}

impl FrameSink for Producer {
    fn on_raw_frame(&self, seq: i64, values: &[i32]) {
        let outcome = self.buffer.push_if(SamplePackage::new(seq, values), || !self.detached());
        match outcome {
            None => trace!(seq, "Dropping frame from cancelled acquisition"),
            Some(PushOutcome::Stored) => trace!(seq, channels = values.len(), "Frame buffered"),
            Some(PushOutcome::Gap { expected, received }) => {
                self.raise(Fault::Continuity { expected, received });
            }
            Some(PushOutcome::Rejected) => self.raise(Fault::InvalidPackage { seq }),
        }
    }

    fn on_fault(&self, code: i32, message: &str) {
        if self.detached() {
            return;
        }
        error!(code, message, "Driver raised an exception");
        self.raise(Fault::Driver { code, message: message.to_owned() });
    }

    fn on_event(&self, event: DeviceEvent) {
        if self.detached() {
            return;
        }
        if let DeviceEvent::Disconnect { reason } = &event {
            warn!(%reason, "Device reported a disconnect");
            self.raise(Fault::Disconnected { reason: *reason });
        }

        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
