//! Cross-component barge-in state machine. Subscribes to VAD and
//! response lifecycle events on the shared Event Bus and decides, under
//! one mutex, whether user speech should cut off an in-progress AI
//! response — immediately (pure VAD), only once the LLM agrees (pure
//! API), or tentatively with a pause-then-confirm window (hybrid).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use flowmesh_bus::EventBus;
pub use flowmesh_event::InterruptSource;
use flowmesh_event::{
    Event, EventPayload, EventType, InterruptedPayload, ResponsePayload, VadSpeechEndPayload,
    VadSpeechStartPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    Idle,
    UserSpeaking,
    Processing,
    AiResponding,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct InterruptConfig {
    pub enable_vad_interrupt: bool,
    pub enable_api_interrupt: bool,
    pub enable_hybrid_mode: bool,
    pub min_speech_duration_ms: u64,
    pub interrupt_cooldown_ms: u64,
    pub api_confirm_timeout_ms: u64,
    pub min_speech_for_confirm_ms: u64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            enable_vad_interrupt: false,
            enable_api_interrupt: true,
            enable_hybrid_mode: false,
            min_speech_duration_ms: 100,
            interrupt_cooldown_ms: 500,
            api_confirm_timeout_ms: 500,
            min_speech_for_confirm_ms: 300,
        }
    }
}

struct State {
    s: InterruptState,
    current_response_id: Option<String>,
    speech_start_at: Option<Instant>,
    last_interrupt_at: Option<Instant>,
    pending_interrupt: bool,
    confirm_generation: u64,
}

impl State {
    fn new() -> Self {
        Self {
            s: InterruptState::Idle,
            current_response_id: None,
            speech_start_at: None,
            last_interrupt_at: None,
            pending_interrupt: false,
            confirm_generation: 0,
        }
    }
}

/// What to publish once the state lock is released. State mutation and
/// bus I/O are kept apart so the mutex is never held while calling out.
enum Announce {
    AudioPause,
    AudioResume,
    Interrupted {
        source: InterruptSource,
        response_id: Option<String>,
        reason: String,
        audio_ms: Option<u64>,
    },
}

impl Announce {
    fn into_event(self) -> Event {
        match self {
            Announce::AudioPause => Event::new(EventPayload::AudioPause),
            Announce::AudioResume => Event::new(EventPayload::AudioResume),
            Announce::Interrupted {
                source,
                response_id,
                reason,
                audio_ms,
            } => Event::new(EventPayload::Interrupted(InterruptedPayload {
                source,
                response_id,
                interrupted_at: flowmesh_message::now_ms(),
                reason: Some(reason),
                audio_ms,
            })),
        }
    }
}

pub struct InterruptManager {
    config: InterruptConfig,
    bus: EventBus,
    state: Arc<Mutex<State>>,
}

impl InterruptManager {
    pub fn new(config: InterruptConfig, bus: EventBus) -> Self {
        Self {
            config,
            bus,
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    pub fn state(&self) -> InterruptState {
        self.state.lock().unwrap().s
    }

    fn publish(&self, announce: Announce) {
        self.bus.publish(announce.into_event());
    }

    fn should_interrupt(&self, st: &State, source: InterruptSource) -> bool {
        if let Some(last) = st.last_interrupt_at {
            if last.elapsed() < Duration::from_millis(self.config.interrupt_cooldown_ms) {
                return false;
            }
        }
        match source {
            InterruptSource::Client => true,
            InterruptSource::Vad => self.config.enable_vad_interrupt || self.config.enable_hybrid_mode,
            InterruptSource::Api => self.config.enable_api_interrupt,
        }
    }

    /// Unconditionally escalates to `Interrupted`. Caller already holds
    /// the lock.
    fn apply_trigger(
        &self,
        st: &mut State,
        source: InterruptSource,
        audio_ms: Option<u64>,
        reason: String,
    ) -> Announce {
        st.s = InterruptState::Interrupted;
        st.last_interrupt_at = Some(Instant::now());
        st.pending_interrupt = false;
        Announce::Interrupted {
            source,
            response_id: st.current_response_id.clone(),
            reason,
            audio_ms,
        }
    }

    pub fn on_response_start(&self, payload: ResponsePayload) {
        let mut st = self.state.lock().unwrap();
        st.s = InterruptState::AiResponding;
        st.current_response_id = Some(payload.response_id);
    }

    pub fn on_response_end(&self) {
        let mut st = self.state.lock().unwrap();
        st.s = InterruptState::Idle;
        st.pending_interrupt = false;
        st.current_response_id = None;
    }

    pub fn on_vad_speech_start(&self, payload: VadSpeechStartPayload) {
        let mut announcements = Vec::new();
        {
            let mut st = self.state.lock().unwrap();
            let was_ai_responding = st.s == InterruptState::AiResponding;
            st.speech_start_at = Some(Instant::now());
            // Baseline: the user is now speaking. A triggered pure-VAD
            // interrupt escalates this further, below.
            st.s = InterruptState::UserSpeaking;

            if was_ai_responding && self.should_interrupt(&st, InterruptSource::Vad) {
                if self.config.enable_hybrid_mode {
                    st.pending_interrupt = true;
                    st.confirm_generation += 1;
                    let generation = st.confirm_generation;
                    announcements.push(Announce::AudioPause);
                    self.arm_confirm_timer(generation);
                } else if self.config.enable_vad_interrupt {
                    announcements.push(self.apply_trigger(
                        &mut st,
                        InterruptSource::Vad,
                        Some(payload.audio_ms),
                        "vad speech start".to_string(),
                    ));
                }
                // Pure-API mode: wait for an API-originated `Interrupted`.
            }
        }
        for a in announcements {
            self.publish(a);
        }
    }

    pub fn on_vad_speech_end(&self, payload: VadSpeechEndPayload) {
        let mut announcements = Vec::new();
        {
            let mut st = self.state.lock().unwrap();
            let d = st
                .speech_start_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);

            if st.pending_interrupt {
                if d < Duration::from_millis(self.config.min_speech_for_confirm_ms) {
                    announcements.push(Announce::AudioResume);
                    st.pending_interrupt = false;
                    st.s = InterruptState::AiResponding;
                } else {
                    announcements.push(self.apply_trigger(
                        &mut st,
                        InterruptSource::Vad,
                        Some(payload.audio_ms),
                        "hybrid confirm".to_string(),
                    ));
                }
            }
            if st.s == InterruptState::UserSpeaking {
                st.s = InterruptState::Processing;
            }
        }
        for a in announcements {
            self.publish(a);
        }
    }

    /// Handles an `Interrupted` event seen on the bus — either
    /// API-originated, or this manager's own echo of an event it just
    /// published (harmless: by then `pending_interrupt` is already false
    /// and `S` is no longer `AiResponding`).
    pub fn on_interrupted(&self, payload: InterruptedPayload) {
        let mut announcements = Vec::new();
        {
            let mut st = self.state.lock().unwrap();
            if st.pending_interrupt {
                announcements.push(self.apply_trigger(
                    &mut st,
                    InterruptSource::Api,
                    payload.audio_ms,
                    "api interrupted while pending".to_string(),
                ));
            } else if self.config.enable_api_interrupt && st.s == InterruptState::AiResponding {
                st.s = InterruptState::Interrupted;
                st.last_interrupt_at = Some(Instant::now());
                // Do not re-publish: the originator already did.
            }
        }
        for a in announcements {
            self.publish(a);
        }
    }

    /// Client-initiated interrupt (e.g. a UI "stop" button). Ignored
    /// outside `AiResponding`.
    pub fn trigger_manual_interrupt(&self, reason: impl Into<String>) {
        let announcement = {
            let mut st = self.state.lock().unwrap();
            if st.s != InterruptState::AiResponding {
                None
            } else {
                Some(self.apply_trigger(&mut st, InterruptSource::Client, None, reason.into()))
            }
        };
        if let Some(a) = announcement {
            self.publish(a);
        }
    }

    fn arm_confirm_timer(&self, generation: u64) {
        let state = Arc::clone(&self.state);
        let bus = self.bus.clone();
        let timeout_ms = self.config.api_confirm_timeout_ms;
        let min_confirm_ms = self.config.min_speech_for_confirm_ms;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;

            let announce = {
                let mut st = state.lock().unwrap();
                if !st.pending_interrupt || st.confirm_generation != generation {
                    return;
                }
                let elapsed = st
                    .speech_start_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= Duration::from_millis(min_confirm_ms) {
                    st.s = InterruptState::Interrupted;
                    st.last_interrupt_at = Some(Instant::now());
                    st.pending_interrupt = false;
                    Announce::Interrupted {
                        source: InterruptSource::Vad,
                        response_id: st.current_response_id.clone(),
                        reason: "hybrid confirm timeout".to_string(),
                        audio_ms: None,
                    }
                } else {
                    st.pending_interrupt = false;
                    Announce::AudioResume
                }
            };
            bus.publish(announce.into_event());
        });
    }

    /// Runs until `cancel` fires, dispatching subscribed bus events to
    /// the corresponding handler.
    pub async fn run(&self, cancel: CancellationToken) {
        let (_id1, mut vad_start_rx) = self.bus.subscribe(EventType::VadSpeechStart);
        let (_id2, mut vad_end_rx) = self.bus.subscribe(EventType::VadSpeechEnd);
        let (_id3, mut resp_start_rx) = self.bus.subscribe(EventType::ResponseStart);
        let (_id4, mut resp_end_rx) = self.bus.subscribe(EventType::ResponseEnd);
        let (_id5, mut interrupted_rx) = self.bus.subscribe(EventType::Interrupted);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = vad_start_rx.recv() => {
                    if let EventPayload::VadSpeechStart(p) = event.payload {
                        self.on_vad_speech_start(p);
                    }
                }
                Some(event) = vad_end_rx.recv() => {
                    if let EventPayload::VadSpeechEnd(p) = event.payload {
                        self.on_vad_speech_end(p);
                    }
                }
                Some(event) = resp_start_rx.recv() => {
                    if let EventPayload::ResponseStart(p) = event.payload {
                        self.on_response_start(p);
                    }
                }
                Some(event) = resp_end_rx.recv() => {
                    if let EventPayload::ResponseEnd(_) = event.payload {
                        self.on_response_end();
                    }
                }
                Some(event) = interrupted_rx.recv() => {
                    if let EventPayload::Interrupted(p) = event.payload {
                        self.on_interrupted(p);
                    }
                }
            }
        }
    }

    /// Spawns `run` on a fresh task. The returned token tears the task
    /// down; the handle can be joined after cancelling.
    pub fn spawn(self: Arc<Self>) -> (CancellationToken, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let manager = self;
        let handle = tokio::spawn(async move { manager.run(task_cancel).await });
        (cancel, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_event::ResponsePayload;

    fn manager(config: InterruptConfig) -> (Arc<InterruptManager>, EventBus) {
        let bus = EventBus::new();
        let manager = Arc::new(InterruptManager::new(config, bus.clone()));
        (manager, bus)
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_limits_repeated_interrupts() {
        let config = InterruptConfig {
            enable_vad_interrupt: true,
            interrupt_cooldown_ms: 500,
            ..InterruptConfig::default()
        };
        let (manager, bus) = manager(config);
        let (_id, mut interrupted_rx) = bus.subscribe(EventType::Interrupted);

        manager.on_response_start(ResponsePayload {
            response_id: "resp_1".to_string(),
        });

        let vad_payload = |audio_ms: u64| VadSpeechStartPayload {
            audio_ms,
            item_id: "s1".to_string(),
            confidence: 0.9,
            pre_roll_audio: Vec::new(),
            sample_rate: 16000,
            channels: 1,
        };

        manager.on_vad_speech_start(vad_payload(10));
        manager.on_response_start(ResponsePayload {
            response_id: "resp_1".to_string(),
        }); // back to AiResponding for the second attempt
        manager.on_vad_speech_start(vad_payload(20));

        let mut count = 0;
        while interrupted_rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hybrid_false_alarm_resumes_without_interrupt() {
        let config = InterruptConfig {
            enable_hybrid_mode: true,
            min_speech_for_confirm_ms: 300,
            ..InterruptConfig::default()
        };
        let (manager, bus) = manager(config);
        let (_id1, mut pause_rx) = bus.subscribe(EventType::AudioPause);
        let (_id2, mut resume_rx) = bus.subscribe(EventType::AudioResume);
        let (_id3, mut interrupted_rx) = bus.subscribe(EventType::Interrupted);

        manager.on_response_start(ResponsePayload {
            response_id: "resp_1".to_string(),
        });
        manager.on_vad_speech_start(VadSpeechStartPayload {
            audio_ms: 100,
            item_id: "s1".to_string(),
            confidence: 0.9,
            pre_roll_audio: Vec::new(),
            sample_rate: 16000,
            channels: 1,
        });
        tokio::time::advance(Duration::from_millis(100)).await;
        manager.on_vad_speech_end(VadSpeechEndPayload {
            audio_ms: 150,
            item_id: "s1".to_string(),
            confidence: 0.1,
        });

        assert!(pause_rx.try_recv().is_ok());
        assert!(resume_rx.try_recv().is_ok());
        assert!(interrupted_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn hybrid_confirm_interrupts_after_sustained_speech() {
        let config = InterruptConfig {
            enable_hybrid_mode: true,
            min_speech_for_confirm_ms: 300,
            ..InterruptConfig::default()
        };
        let (manager, bus) = manager(config);
        let (_id1, mut pause_rx) = bus.subscribe(EventType::AudioPause);
        let (_id2, mut resume_rx) = bus.subscribe(EventType::AudioResume);
        let (_id3, mut interrupted_rx) = bus.subscribe(EventType::Interrupted);

        manager.on_response_start(ResponsePayload {
            response_id: "resp_1".to_string(),
        });
        manager.on_vad_speech_start(VadSpeechStartPayload {
            audio_ms: 100,
            item_id: "s1".to_string(),
            confidence: 0.9,
            pre_roll_audio: Vec::new(),
            sample_rate: 16000,
            channels: 1,
        });
        tokio::time::advance(Duration::from_millis(400)).await;
        manager.on_vad_speech_end(VadSpeechEndPayload {
            audio_ms: 500,
            item_id: "s1".to_string(),
            confidence: 0.1,
        });

        assert!(pause_rx.try_recv().is_ok());
        assert!(resume_rx.try_recv().is_err());
        let interrupted = interrupted_rx.try_recv().expect("expected Interrupted");
        if let EventPayload::Interrupted(p) = interrupted.payload {
            assert_eq!(p.source, InterruptSource::Vad);
            assert_eq!(p.response_id.as_deref(), Some("resp_1"));
        } else {
            panic!("wrong payload");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hybrid_confirm_timeout_fires_interrupt_without_vad_end() {
        let config = InterruptConfig {
            enable_hybrid_mode: true,
            api_confirm_timeout_ms: 500,
            min_speech_for_confirm_ms: 300,
            ..InterruptConfig::default()
        };
        let (manager, bus) = manager(config);
        let (_id1, mut pause_rx) = bus.subscribe(EventType::AudioPause);
        let (_id2, mut resume_rx) = bus.subscribe(EventType::AudioResume);
        let (_id3, mut interrupted_rx) = bus.subscribe(EventType::Interrupted);

        manager.on_response_start(ResponsePayload {
            response_id: "resp_1".to_string(),
        });
        manager.on_vad_speech_start(VadSpeechStartPayload {
            audio_ms: 100,
            item_id: "s1".to_string(),
            confidence: 0.9,
            pre_roll_audio: Vec::new(),
            sample_rate: 16000,
            channels: 1,
        });
        assert!(pause_rx.try_recv().is_ok());

        // No VADSpeechEnd ever arrives; the confirm timer itself must
        // fire once `api_confirm_timeout_ms` elapses.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;

        assert!(resume_rx.try_recv().is_err());
        let interrupted = interrupted_rx.try_recv().expect("expected Interrupted from confirm timeout");
        if let EventPayload::Interrupted(p) = interrupted.payload {
            assert_eq!(p.source, InterruptSource::Vad);
            assert_eq!(p.response_id.as_deref(), Some("resp_1"));
        } else {
            panic!("wrong payload");
        }
        assert_eq!(manager.state(), InterruptState::Interrupted);
    }

    #[tokio::test]
    async fn manual_interrupt_ignored_outside_ai_responding() {
        let (manager, bus) = manager(InterruptConfig::default());
        let (_id, mut interrupted_rx) = bus.subscribe(EventType::Interrupted);

        manager.trigger_manual_interrupt("user clicked stop");
        assert!(interrupted_rx.try_recv().is_err());

        manager.on_response_start(ResponsePayload {
            response_id: "resp_1".to_string(),
        });
        manager.trigger_manual_interrupt("user clicked stop");

        let interrupted = interrupted_rx.try_recv().expect("expected Interrupted");
        if let EventPayload::Interrupted(p) = interrupted.payload {
            assert_eq!(p.source, InterruptSource::Client);
        } else {
            panic!("wrong payload");
        }
    }
}
