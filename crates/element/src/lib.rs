//! The Element contract: a named processing stage with bounded in/out
//! queues, a shared Event Bus handle, a property registry, and a
//! `New -> Started -> Stopped` lifecycle.
//!
//! Concrete stages implement [`ElementWorker`] (the actual processing
//! loop) and are wrapped in [`BaseElement`], which supplies the lifecycle,
//! queue, and property-registry machinery every Element needs so that
//! boilerplate isn't reimplemented per stage.

mod io;
mod lifecycle;
mod property;

pub use io::{ElementIo, DEFAULT_QUEUE_CAPACITY};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use property::{PropertyDescriptor, PropertyError, PropertyKind, PropertyRegistry, PropertyValue};

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use flowmesh_bus::EventBus;
use flowmesh_message::PipelineMessage;

#[derive(Debug, thiserror::Error)]
pub enum ElementError {
    #[error("element has no bus set; call set_bus before start")]
    NoBus,
    #[error("missing precondition: {0}")]
    Precondition(String),
    #[error("property error: {0}")]
    Property(#[from] PropertyError),
}

/// The processing logic of a pipeline stage. Implementors must not
/// panic on unexpected input; drop or pass through messages of a kind
/// they don't recognize (pass-through is the default expectation for
/// non-terminal stages).
#[async_trait]
pub trait ElementWorker: Send + Sync + 'static {
    /// Runs until `cancel` fires. Must read `input` and not block the
    /// bus: publish with non-blocking sends only.
    async fn run(
        self: Arc<Self>,
        input: mpsc::Receiver<PipelineMessage>,
        output: mpsc::Sender<PipelineMessage>,
        bus: EventBus,
        cancel: CancellationToken,
    );

    /// Checked once per `start`, before the worker loop is spawned.
    /// Return an error for missing preconditions (credentials,
    /// unsupported sample rate, ...) so `Element::start` fails
    /// synchronously instead of failing deep inside the worker loop.
    async fn on_start(&self, _bus: &EventBus, _properties: &PropertyRegistry) -> Result<(), ElementError> {
        Ok(())
    }
}

/// Object-safe façade every pipeline stage exposes to the `Pipeline`.
#[async_trait]
pub trait Element: Send + Sync {
    fn name(&self) -> &str;
    fn set_bus(&self, bus: EventBus);
    fn bus(&self) -> Option<EventBus>;
    fn input_sender(&self) -> mpsc::Sender<PipelineMessage>;
    /// Non-blocking send into this element's input queue. Drops (and
    /// logs) on a full queue rather than buffering unboundedly or
    /// blocking the caller — the shape edge-forwarding tasks must use.
    fn try_push_input(&self, msg: PipelineMessage) -> bool;
    fn take_output_receiver(&self) -> Option<mpsc::Receiver<PipelineMessage>>;
    fn properties(&self) -> &PropertyRegistry;
    fn state(&self) -> LifecycleState;
    async fn start(&self) -> Result<(), ElementError>;
    async fn stop(&self);
}

/// Generic Element scaffolding: lifecycle, queues, property registry,
/// and bus wiring, parameterized over the stage-specific [`ElementWorker`].
pub struct BaseElement<W: ElementWorker> {
    name: String,
    io: ElementIo,
    bus: Mutex<Option<EventBus>>,
    properties: PropertyRegistry,
    lifecycle: Lifecycle,
    worker: Arc<W>,
    cancel: Mutex<Option<CancellationToken>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl<W: ElementWorker> BaseElement<W> {
    pub fn new(name: impl Into<String>, worker: W) -> Self {
        Self::with_capacity(name, worker, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, worker: W, capacity: usize) -> Self {
        Self {
            name: name.into(),
            io: ElementIo::new(capacity),
            bus: Mutex::new(None),
            properties: PropertyRegistry::new(),
            lifecycle: Lifecycle::new(),
            worker: Arc::new(worker),
            cancel: Mutex::new(None),
            join: Mutex::new(None),
        }
    }

    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    pub fn worker(&self) -> &Arc<W> {
        &self.worker
    }
}

#[async_trait]
impl<W: ElementWorker> Element for BaseElement<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_bus(&self, bus: EventBus) {
        *self.bus.lock().unwrap() = Some(bus);
    }

    fn bus(&self) -> Option<EventBus> {
        self.bus.lock().unwrap().clone()
    }

    fn input_sender(&self) -> mpsc::Sender<PipelineMessage> {
        self.io.input_sender()
    }

    fn try_push_input(&self, msg: PipelineMessage) -> bool {
        self.io.try_push_input(msg)
    }

    fn take_output_receiver(&self) -> Option<mpsc::Receiver<PipelineMessage>> {
        self.io.take_output_receiver()
    }

    fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    async fn start(&self) -> Result<(), ElementError> {
        if !self.lifecycle.begin_start() {
            // Already started (or re-start after stop, which is
            // undefined by contract) — idempotent no-op.
            return Ok(());
        }

        let bus = match self.bus() {
            Some(bus) => bus,
            None => return Err(ElementError::NoBus),
        };

        if let Err(e) = self.worker.on_start(&bus, &self.properties).await {
            tracing::warn!(element = %self.name, error = %e, "element failed to start");
            return Err(e);
        }

        let input_rx = self
            .io
            .take_input_receiver()
            .expect("input receiver taken twice");
        let output_tx = self.io.output_sender();
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(cancel.clone());

        let worker = Arc::clone(&self.worker);
        let name = self.name.clone();
        let handle = tokio::spawn(async move {
            worker.run(input_rx, output_tx, bus, cancel).await;
            tracing::debug!(element = %name, "element worker exited");
        });
        *self.join.lock().unwrap() = Some(handle);

        Ok(())
    }

    async fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            return;
        }
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel.cancel();
        }
        let handle = self.join.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_message::{AudioData, PipelineMessage};

    struct PassThrough;

    #[async_trait]
    impl ElementWorker for PassThrough {
        async fn run(
            self: Arc<Self>,
            mut input: mpsc::Receiver<PipelineMessage>,
            output: mpsc::Sender<PipelineMessage>,
            _bus: EventBus,
            cancel: CancellationToken,
        ) {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = input.recv() => {
                        match msg {
                            Some(m) => { let _ = output.send(m).await; }
                            None => break,
                        }
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn start_is_idempotent_and_processes_messages() {
        let element = BaseElement::new("passthrough", PassThrough);
        element.set_bus(EventBus::new());
        element.start().await.unwrap();
        element.start().await.unwrap(); // second call: no-op, no panic

        let tx = element.input_sender();
        let mut rx = element.take_output_receiver().unwrap();

        tx.send(PipelineMessage::audio("s1", AudioData::new(vec![0; 4], 16000, 1)))
            .await
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.session_id, "s1");

        element.stop().await;
        element.stop().await; // safe to call twice
    }

    #[tokio::test]
    async fn start_without_bus_fails() {
        let element = BaseElement::new("passthrough", PassThrough);
        let err = element.start().await.unwrap_err();
        assert!(matches!(err, ElementError::NoBus));
    }
}
