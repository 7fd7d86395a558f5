//! Bounded in/out message queues owned by an Element.

use std::sync::Mutex;

use tokio::sync::mpsc;

use flowmesh_message::PipelineMessage;

/// Default bounded queue depth for both input and output queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One bounded queue plus a single-consumer receiver that can be taken
/// exactly once (mirrors the "take the receiver, keep the sender
/// cloneable" shape used across the workers in this codebase).
struct Queue {
    tx: mpsc::Sender<PipelineMessage>,
    rx: Mutex<Option<mpsc::Receiver<PipelineMessage>>>,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

/// The input and output queues of an Element.
pub struct ElementIo {
    input: Queue,
    output: Queue,
}

impl ElementIo {
    pub fn new(capacity: usize) -> Self {
        Self {
            input: Queue::new(capacity),
            output: Queue::new(capacity),
        }
    }

    /// The sendable side of the input queue — what `Pipeline::push` or an
    /// upstream edge writes to.
    pub fn input_sender(&self) -> mpsc::Sender<PipelineMessage> {
        self.input.tx.clone()
    }

    /// Takes the input queue's receiver. Returns `None` if already
    /// taken (the worker only needs it once, on `start`).
    pub fn take_input_receiver(&self) -> Option<mpsc::Receiver<PipelineMessage>> {
        self.input.rx.lock().unwrap().take()
    }

    /// The sender a worker uses internally to publish to the output
    /// queue.
    pub fn output_sender(&self) -> mpsc::Sender<PipelineMessage> {
        self.output.tx.clone()
    }

    /// The receivable side of the output queue — what `Pipeline::pull` or
    /// a downstream edge reads from.
    pub fn take_output_receiver(&self) -> Option<mpsc::Receiver<PipelineMessage>> {
        self.output.rx.lock().unwrap().take()
    }

    /// Non-blocking send to the input queue, dropping (and logging) on a
    /// full queue rather than buffering unboundedly.
    pub fn try_push_input(&self, msg: PipelineMessage) -> bool {
        match self.input.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("element input queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
