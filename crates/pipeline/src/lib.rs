//! Owns a linear list of [`Element`]s, wires edges between them on
//! request, and exposes boundary `push`/`pull` at the head and tail.
//!
//! The Pipeline does no graph validation beyond "head/tail exist" —
//! topology is whatever the caller wires up with [`Pipeline::link`].
//! Fan-out beyond the linear chain happens through the shared
//! [`EventBus`], not through additional edges.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

pub use flowmesh_bus::EventBus;
pub use flowmesh_element::{Element, ElementError};
use flowmesh_message::PipelineMessage;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("element '{0}' output queue already taken (already linked or pulled)")]
    OutputAlreadyTaken(String),
    #[error("pipeline has no elements")]
    Empty,
    #[error("element '{name}' failed to start: {source}")]
    ElementStart {
        name: String,
        #[source]
        source: ElementError,
    },
}

/// Handle returned by [`Pipeline::link`]. Call `unlink` to tear down
/// this specific edge without affecting any other edge. Dropping the
/// forwarding task's sender (which happens automatically when the task
/// exits) closes the downstream input queue once nothing else can send
/// to it.
pub struct EdgeHandle {
    cancel: CancellationToken,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EdgeHandle {
    /// Cancels the forwarding task and waits for it to exit. Safe to
    /// call more than once.
    pub async fn unlink(&self) {
        self.cancel.cancel();
        let handle = self.join.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Owns a named, ordered set of Elements sharing one Event Bus.
pub struct Pipeline {
    name: String,
    bus: EventBus,
    elements: Mutex<Vec<Arc<dyn Element>>>,
    tail_output: AsyncMutex<Option<mpsc::Receiver<PipelineMessage>>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: EventBus::new(),
            elements: Mutex::new(Vec::new()),
            tail_output: AsyncMutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Appends an Element in data-flow order and wires it to this
    /// pipeline's bus. Must happen before `start`.
    pub fn add_element(&self, element: Arc<dyn Element>) {
        element.set_bus(self.bus.clone());
        self.elements.lock().unwrap().push(element);
    }

    pub fn elements(&self) -> Vec<Arc<dyn Element>> {
        self.elements.lock().unwrap().clone()
    }

    /// Spawns one forwarding task that drains `upstream`'s output queue
    /// and sends into `downstream`'s input queue. Fails if either
    /// element's output has already been taken (already linked, or
    /// already claimed by `pull`).
    pub fn link(
        &self,
        upstream: &Arc<dyn Element>,
        downstream: &Arc<dyn Element>,
    ) -> Result<EdgeHandle, PipelineError> {
        let mut rx = upstream
            .take_output_receiver()
            .ok_or_else(|| PipelineError::OutputAlreadyTaken(upstream.name().to_string()))?;
        let downstream = Arc::clone(downstream);
        let upstream_name = upstream.name().to_string();
        let downstream_name = downstream.name().to_string();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    msg = rx.recv() => {
                        match msg {
                            Some(m) => {
                                if !downstream.try_push_input(m) {
                                    tracing::warn!(
                                        from = %upstream_name,
                                        to = %downstream_name,
                                        "downstream input queue full, dropping forwarded message"
                                    );
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            // The downstream `Arc` drops here; the input sender it holds
            // is one of possibly several clones, so the queue only closes
            // once every clone (including any held by the Pipeline itself
            // for `push`) is gone.
        });

        Ok(EdgeHandle {
            cancel,
            join: Mutex::new(Some(join)),
        })
    }

    /// Non-blocking send to the head Element's input. Drops (and logs)
    /// on a full queue. Pushing before `start` is allowed — the message
    /// waits in the queue up to its capacity.
    pub fn push(&self, msg: PipelineMessage) -> bool {
        let head = match self.elements.lock().unwrap().first().cloned() {
            Some(e) => e,
            None => return false,
        };
        match head.input_sender().try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(pipeline = %self.name, "head input queue full, dropping pushed message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Blocking receive from the tail Element's output. Returns `None`
    /// if the tail's output channel is closed.
    pub async fn pull(&self) -> Option<PipelineMessage> {
        let mut guard = self.tail_output.lock().await;
        if guard.is_none() {
            let tail = self.elements.lock().unwrap().last().cloned()?;
            *guard = tail.take_output_receiver();
        }
        match guard.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Starts elements in registration order. If one fails, elements
    /// already started are left running and the error is returned — the
    /// caller may call `stop` to unwind.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let elements = self.elements.lock().unwrap().clone();
        if elements.is_empty() {
            return Err(PipelineError::Empty);
        }
        self.bus.start();
        for element in &elements {
            element
                .start()
                .await
                .map_err(|source| PipelineError::ElementStart {
                    name: element.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Stops elements in reverse registration order, then stops the bus.
    pub async fn stop(&self) {
        let elements = self.elements.lock().unwrap().clone();
        for element in elements.iter().rev() {
            element.stop().await;
        }
        self.bus.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowmesh_element::{BaseElement, ElementWorker};
    use flowmesh_message::{AudioData, PipelineMessage};

    struct Doubler;

    #[async_trait]
    impl ElementWorker for Doubler {
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
                            Some(mut m) => {
                                if let flowmesh_message::Payload::Audio(ref mut a) = m.payload {
                                    let mut doubled = a.bytes.clone();
                                    doubled.extend_from_slice(&a.bytes);
                                    a.bytes = doubled;
                                }
                                if output.send(m).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        }
    }

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
                            Some(m) => { if output.send(m).await.is_err() { break; } }
                            None => break,
                        }
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn push_pull_through_three_element_chain() {
        let pipeline = Pipeline::new("test");
        let resample: Arc<dyn Element> = Arc::new(BaseElement::new("resample", Doubler));
        let noop: Arc<dyn Element> = Arc::new(BaseElement::new("noop", PassThrough));
        let sink: Arc<dyn Element> = Arc::new(BaseElement::new("sink", PassThrough));

        pipeline.add_element(resample.clone());
        pipeline.add_element(noop.clone());
        pipeline.add_element(sink.clone());

        let _edge1 = pipeline.link(&resample, &noop).unwrap();
        let _edge2 = pipeline.link(&noop, &sink).unwrap();

        pipeline.start().await.unwrap();

        let msg = PipelineMessage::audio("s1", AudioData::new(vec![0u8; 100], 48000, 1));
        assert!(pipeline.push(msg));

        let out = pipeline.pull().await.unwrap();
        let audio = out.as_audio().unwrap();
        assert_eq!(audio.bytes.len(), 200);

        pipeline.stop().await;
    }

    #[tokio::test]
    async fn unlink_disconnects_only_that_edge() {
        let pipeline = Pipeline::new("test");
        let a: Arc<dyn Element> = Arc::new(BaseElement::new("a", PassThrough));
        let b: Arc<dyn Element> = Arc::new(BaseElement::new("b", PassThrough));
        let c: Arc<dyn Element> = Arc::new(BaseElement::new("c", PassThrough));

        pipeline.add_element(a.clone());
        pipeline.add_element(b.clone());
        pipeline.add_element(c.clone());

        let edge_ab = pipeline.link(&a, &b).unwrap();
        let _edge_bc = pipeline.link(&b, &c).unwrap();

        pipeline.start().await.unwrap();

        edge_ab.unlink().await;

        // a -> b is severed; pushing into a's input should no longer
        // reach c's output within a short window.
        let msg = PipelineMessage::audio("s1", AudioData::new(vec![1, 2, 3, 4], 16000, 1));
        assert!(pipeline.push(msg));

        let result = tokio::time::timeout(std::time::Duration::from_millis(100), pipeline.pull()).await;
        assert!(result.is_err(), "pull should time out: a-b edge was unlinked");

        pipeline.stop().await;
    }

    #[tokio::test]
    async fn push_before_start_queues_up_to_capacity() {
        let pipeline = Pipeline::new("test");
        let a: Arc<dyn Element> = Arc::new(BaseElement::new("a", PassThrough));
        pipeline.add_element(a.clone());

        let msg = PipelineMessage::audio("s1", AudioData::new(vec![9], 16000, 1));
        assert!(pipeline.push(msg));

        pipeline.start().await.unwrap();
        let out = pipeline.pull().await.unwrap();
        assert_eq!(out.as_audio().unwrap().bytes, vec![9]);
        pipeline.stop().await;
    }
}
