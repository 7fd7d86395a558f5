//! Wires [`VadSegmenter`] into the Element contract: consumes audio
//! frames, publishes VAD events to the bus, and forwards per the
//! configured [`OutputMode`].

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use flowmesh_bus::EventBus;
use flowmesh_element::ElementWorker;
use flowmesh_event::Event;
use flowmesh_message::PipelineMessage;

use crate::segmenter::{OutputMode, VadSegmenter, SAMPLE_RATE_HZ};

pub struct VadWorker {
    segmenter: Mutex<VadSegmenter>,
}

impl VadWorker {
    pub fn new(segmenter: VadSegmenter) -> Self {
        Self {
            segmenter: Mutex::new(segmenter),
        }
    }
}

#[async_trait]
impl ElementWorker for VadWorker {
    async fn run(
        self: std::sync::Arc<Self>,
        mut input: mpsc::Receiver<PipelineMessage>,
        output: mpsc::Sender<PipelineMessage>,
        bus: EventBus,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(msg) = msg else { break };
                    self.handle(msg, &output, &bus).await;
                }
            }
        }
    }
}

impl VadWorker {
    async fn handle(&self, msg: PipelineMessage, output: &mpsc::Sender<PipelineMessage>, bus: &EventBus) {
        let Some(audio) = msg.as_audio() else {
            // Implicit pass-through of message kinds this stage doesn't
            // interpret.
            let _ = output.send(msg).await;
            return;
        };

        if audio.sample_rate_hz != SAMPLE_RATE_HZ || audio.channels != 1 {
            tracing::warn!(
                rate = audio.sample_rate_hz,
                channels = audio.channels,
                "VAD requires 16kHz mono input, dropping frame"
            );
            return;
        }

        let bytes = audio.bytes.clone();
        let (events, warnings, mode, is_speaking) = {
            let mut segmenter = self.segmenter.lock().unwrap();
            let (events, warnings) = segmenter.process(&msg.session_id, &bytes);
            (events, warnings, segmenter.output_mode(), segmenter.is_speaking())
        };

        for warning in warnings {
            tracing::warn!("{warning}");
        }
        for payload in events {
            bus.publish(Event::new(payload));
        }

        match mode {
            OutputMode::Passthrough => {
                let _ = output.send(msg).await;
            }
            OutputMode::Filter => {
                if is_speaking {
                    let _ = output.send(msg).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_element::{BaseElement, Element};
    use flowmesh_event::EventType;
    use flowmesh_message::{AudioData, PipelineMessage};

    use crate::{MockDetector, VadConfig, VadSegmenter};

    #[tokio::test]
    async fn rejects_non_16k_mono_frames() {
        let segmenter = VadSegmenter::new(VadConfig::default(), Box::new(MockDetector::new(vec![0.1])));
        let worker = VadWorker::new(segmenter);
        let element = BaseElement::new("vad", worker);
        element.set_bus(EventBus::new());
        element.start().await.unwrap();

        let tx = element.input_sender();
        let mut rx = element.take_output_receiver().unwrap();

        tx.send(PipelineMessage::audio("s1", AudioData::new(vec![0; 1024], 48000, 1)))
            .await
            .unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(result.is_err(), "48kHz frame should have been dropped, not forwarded");

        element.stop().await;
    }

    #[tokio::test]
    async fn passthrough_forwards_and_publishes_speech_start() {
        let probs = vec![0.1, 0.1, 0.8];
        let segmenter = VadSegmenter::new(VadConfig::default(), Box::new(MockDetector::new(probs)));
        let worker = VadWorker::new(segmenter);
        let element = BaseElement::new("vad", worker);
        let bus = EventBus::new();
        let (_id, mut speech_start_rx) = bus.subscribe(EventType::VadSpeechStart);
        element.set_bus(bus);
        element.start().await.unwrap();

        let tx = element.input_sender();
        let mut rx = element.take_output_receiver().unwrap();

        // 3 windows of 512 16-bit samples = 3072 bytes, triggers speech
        // start on the third per the mock probability sequence.
        for _ in 0..3 {
            tx.send(PipelineMessage::audio("s1", AudioData::new(vec![0; 1024], 16000, 1)))
                .await
                .unwrap();
            rx.recv().await.unwrap();
        }

        let event = tokio::time::timeout(std::time::Duration::from_millis(50), speech_start_rx.recv())
            .await
            .expect("expected a VadSpeechStart event")
            .unwrap();
        assert_eq!(event.event_type(), EventType::VadSpeechStart);

        element.stop().await;
    }
}
