//! Live session lifecycle: idle → connecting → live → (error | idle).
//!
//! The session is the sole owner of the microphone source and the playback
//! scheduler for its lifetime, and the single place where capture, transport,
//! and codec failures become state transitions. Raw errors never escape to
//! the driver; decode errors on inbound audio are the one category recovered
//! in place (log, drop the chunk, stay live).

use tokio::sync::mpsc;

use crate::audio::pcm;
use crate::audio::{CaptureSource, PlaybackScheduler};
use crate::error::LiveError;
use crate::protocol::MediaChunk;
use crate::transcript::{TranscriptAssembler, TranscriptTurn};
use crate::transport::{LinkCommand, LinkEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Live,
    Error,
}

/// Builds the playback side when a session starts, so output resources live
/// and die with the session instead of the process.
pub type SchedulerFactory = Box<dyn FnMut() -> anyhow::Result<PlaybackScheduler> + Send>;

pub struct Session {
    status: SessionStatus,
    capture: Box<dyn CaptureSource>,
    make_scheduler: SchedulerFactory,
    scheduler: Option<PlaybackScheduler>,
    link_cmd: mpsc::Sender<LinkCommand>,
    frame_tx: mpsc::Sender<Vec<f32>>,
    assembler: TranscriptAssembler,
    turns: Vec<TranscriptTurn>,
    torn_down: bool,
}

impl Session {
    pub fn new(
        capture: Box<dyn CaptureSource>,
        make_scheduler: SchedulerFactory,
        link_cmd: mpsc::Sender<LinkCommand>,
        frame_tx: mpsc::Sender<Vec<f32>>,
    ) -> Self {
        Self {
            status: SessionStatus::Idle,
            capture,
            make_scheduler,
            scheduler: None,
            link_cmd,
            frame_tx,
            assembler: TranscriptAssembler::new(),
            turns: Vec::new(),
            torn_down: true,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Completed turns of this session, oldest first.
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// Begin connecting: acquire the microphone and the playback output.
    /// The transport connect may already be in flight when this fails, so
    /// failure still requests a transport close during teardown.
    pub async fn start(&mut self) -> Result<(), LiveError> {
        match self.status {
            SessionStatus::Idle | SessionStatus::Error => {}
            _ => return Ok(()),
        }

        self.torn_down = false;
        self.status = SessionStatus::Connecting;
        self.turns.clear();
        self.assembler = TranscriptAssembler::new();

        if let Err(e) = self.capture.acquire() {
            log::error!("Failed to start live session: {}", e);
            self.fail().await;
            return Err(e);
        }

        match (self.make_scheduler)() {
            Ok(mut sched) => {
                sched.reset();
                self.scheduler = Some(sched);
            }
            Err(e) => {
                log::error!("Failed to open playback output: {:#}", e);
                self.fail().await;
                return Err(LiveError::Permission(format!("{:#}", e)));
            }
        }

        Ok(())
    }

    /// Explicit stop from any state. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        log::info!("Stopping live session...");
        self.teardown().await;
        self.status = SessionStatus::Idle;
    }

    pub async fn handle_link_event(&mut self, event: LinkEvent) -> Option<TranscriptTurn> {
        match event {
            LinkEvent::Opened => {
                if self.status != SessionStatus::Connecting {
                    return None;
                }
                log::info!("Session opened");
                if let Err(e) = self.capture.begin(self.frame_tx.clone()) {
                    log::error!("Failed to begin capture: {}", e);
                    self.fail().await;
                    return None;
                }
                self.status = SessionStatus::Live;
                None
            }
            LinkEvent::Message(msg) => self.handle_message(msg),
            LinkEvent::Closed => {
                log::info!("Session closed");
                if self.status != SessionStatus::Idle {
                    self.stop().await;
                }
                None
            }
            LinkEvent::Faulted(reason) => {
                log::error!("Session error: {}", LiveError::Transport(reason));
                self.fail().await;
                None
            }
        }
    }

    /// One captured microphone frame. Dropped unless the session is live.
    pub async fn handle_frame(&mut self, frame: Vec<f32>) {
        if self.status != SessionStatus::Live {
            return;
        }
        let data = pcm::encode_base64(&pcm::floats_to_pcm16(&frame));
        if let Err(e) = self
            .link_cmd
            .send(LinkCommand::SendMedia(MediaChunk::pcm16(data)))
            .await
        {
            log::error!("Failed to send audio frame: {}", e);
        }
    }

    fn handle_message(&mut self, msg: crate::protocol::ServerMessage) -> Option<TranscriptTurn> {
        if self.status != SessionStatus::Live {
            return None;
        }

        let mut completed = None;
        if let Some(content) = &msg.server_content {
            if let Some(t) = &content.input_transcription {
                self.assembler.on_input_fragment(&t.text);
            }
            if let Some(t) = &content.output_transcription {
                self.assembler.on_output_fragment(&t.text);
            }
            if content.turn_complete == Some(true) {
                let turn = self.assembler.on_turn_complete();
                self.turns.push(turn.clone());
                completed = Some(turn);
            }
        }

        if let Some(b64) = msg.inline_audio() {
            if let Some(sched) = &mut self.scheduler {
                // A corrupt chunk is dropped; it must not kill a live call.
                if let Err(e) = sched.enqueue(b64) {
                    log::warn!("Dropping inbound audio chunk: {}", e);
                }
            }
        }

        completed
    }

    async fn fail(&mut self) {
        self.teardown().await;
        self.status = SessionStatus::Error;
    }

    /// Release everything the session owns, exactly once per session.
    /// Ordering: stop capture (frames cease, mic released), request transport
    /// close, silence playback, drop the output. Each step is best-effort so
    /// one failing release never leaves the rest held.
    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.capture.stop();

        if let Err(e) = self.link_cmd.send(LinkCommand::Close).await {
            log::debug!("Transport already gone during teardown: {}", e);
        }

        if let Some(mut sched) = self.scheduler.take() {
            sched.stop_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{OutputClock, PlaybackSink};
    use crate::protocol::ServerMessage;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CaptureLog {
        acquired: usize,
        begun: usize,
        stopped: usize,
    }

    struct FakeCapture {
        log: Arc<Mutex<CaptureLog>>,
        deny: bool,
    }

    impl CaptureSource for FakeCapture {
        fn acquire(&mut self) -> Result<(), LiveError> {
            if self.deny {
                return Err(LiveError::Permission("denied".to_string()));
            }
            self.log.lock().unwrap().acquired += 1;
            Ok(())
        }
        fn begin(&mut self, _frames: mpsc::Sender<Vec<f32>>) -> Result<(), LiveError> {
            self.log.lock().unwrap().begun += 1;
            Ok(())
        }
        fn stop(&mut self) {
            self.log.lock().unwrap().stopped += 1;
        }
    }

    struct ZeroClock;
    impl OutputClock for ZeroClock {
        fn now(&self) -> f64 {
            0.0
        }
    }

    struct NullSink;
    impl PlaybackSink for NullSink {
        fn write(&mut self, _samples: &[f32]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_session(
        deny_capture: bool,
    ) -> (
        Session,
        Arc<Mutex<CaptureLog>>,
        mpsc::Receiver<LinkCommand>,
        mpsc::Receiver<Vec<f32>>,
    ) {
        let log = Arc::new(Mutex::new(CaptureLog::default()));
        let capture = Box::new(FakeCapture {
            log: log.clone(),
            deny: deny_capture,
        });
        let make_scheduler: SchedulerFactory = Box::new(|| {
            PlaybackScheduler::new(Box::new(NullSink), Arc::new(ZeroClock), 24_000)
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let session = Session::new(capture, make_scheduler, cmd_tx, frame_tx);
        (session, log, cmd_rx, frame_rx)
    }

    fn msg(json: &str) -> ServerMessage {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn clean_turn_lands_in_history_and_resets_accumulators() {
        let (mut session, _, _cmd_rx, _frame_rx) = test_session(false);
        session.start().await.unwrap();
        session.handle_link_event(LinkEvent::Opened).await;
        assert_eq!(session.status(), SessionStatus::Live);

        session
            .handle_link_event(LinkEvent::Message(msg(
                r#"{"serverContent":{"inputTranscription":{"text":"Hello"}}}"#,
            )))
            .await;
        session
            .handle_link_event(LinkEvent::Message(msg(
                r#"{"serverContent":{"outputTranscription":{"text":"Hi there"}}}"#,
            )))
            .await;
        let turn = session
            .handle_link_event(LinkEvent::Message(msg(
                r#"{"serverContent":{"turnComplete":true}}"#,
            )))
            .await
            .expect("turn should complete");

        assert_eq!(turn.input, "Hello");
        assert_eq!(turn.output, "Hi there");
        assert_eq!(session.turns().len(), 1);

        // Accumulators were reset: an immediate second turn is empty.
        let next = session
            .handle_link_event(LinkEvent::Message(msg(
                r#"{"serverContent":{"turnComplete":true}}"#,
            )))
            .await
            .unwrap();
        assert_eq!(next.input, "");
        assert_eq!(next.output, "");
    }

    #[tokio::test]
    async fn malformed_audio_chunk_does_not_kill_the_session() {
        let (mut session, _, _cmd_rx, _frame_rx) = test_session(false);
        session.start().await.unwrap();
        session.handle_link_event(LinkEvent::Opened).await;

        // "oops" decodes to 3 bytes: not whole PCM16 samples.
        session
            .handle_link_event(LinkEvent::Message(msg(
                r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"data":"b29w"}}]}}}"#,
            )))
            .await;

        assert_eq!(session.status(), SessionStatus::Live);
        assert_eq!(session.scheduler.as_ref().unwrap().pending_count(), 0);
    }

    #[tokio::test]
    async fn permission_denial_fails_the_session_and_closes_the_transport() {
        let (mut session, log, mut cmd_rx, _frame_rx) = test_session(true);
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, LiveError::Permission(_)));
        assert_eq!(session.status(), SessionStatus::Error);

        // Any transport that was already connecting gets told to close.
        assert!(matches!(cmd_rx.try_recv(), Ok(LinkCommand::Close)));
        assert_eq!(log.lock().unwrap().begun, 0);
    }

    #[tokio::test]
    async fn playback_open_failure_fails_the_session() {
        let log = Arc::new(Mutex::new(CaptureLog::default()));
        let capture = Box::new(FakeCapture {
            log: log.clone(),
            deny: false,
        });
        let make_scheduler: SchedulerFactory = Box::new(|| anyhow::bail!("playback device busy"));
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let (frame_tx, _frame_rx) = mpsc::channel(16);
        let mut session = Session::new(capture, make_scheduler, cmd_tx, frame_tx);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, LiveError::Permission(_)));
        // The rendered error must not claim the microphone failed.
        assert!(err.to_string().starts_with("audio device unavailable"));
        assert!(err.to_string().contains("playback device busy"));
        assert_eq!(session.status(), SessionStatus::Error);

        // The already-acquired microphone is released during teardown.
        assert_eq!(log.lock().unwrap().stopped, 1);
        assert!(matches!(cmd_rx.try_recv(), Ok(LinkCommand::Close)));
    }

    #[tokio::test]
    async fn double_stop_releases_each_resource_exactly_once() {
        let (mut session, log, mut cmd_rx, _frame_rx) = test_session(false);
        session.start().await.unwrap();
        session.handle_link_event(LinkEvent::Opened).await;

        session.stop().await;
        session.stop().await;

        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(log.lock().unwrap().stopped, 1);
        assert!(matches!(cmd_rx.try_recv(), Ok(LinkCommand::Close)));
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn transport_fault_tears_down_into_error_state() {
        let (mut session, log, mut cmd_rx, _frame_rx) = test_session(false);
        session.start().await.unwrap();
        session.handle_link_event(LinkEvent::Opened).await;

        session
            .handle_link_event(LinkEvent::Faulted("connection reset".to_string()))
            .await;

        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(log.lock().unwrap().stopped, 1);
        assert!(matches!(cmd_rx.try_recv(), Ok(LinkCommand::Close)));
    }

    #[tokio::test]
    async fn frames_are_only_forwarded_while_live() {
        let (mut session, _, mut cmd_rx, _frame_rx) = test_session(false);
        session.start().await.unwrap();

        // Still connecting: frame dropped.
        session.handle_frame(vec![0.0; 8]).await;
        assert!(cmd_rx.try_recv().is_err());

        session.handle_link_event(LinkEvent::Opened).await;
        session.handle_frame(vec![0.0; 8]).await;
        match cmd_rx.try_recv() {
            Ok(LinkCommand::SendMedia(chunk)) => {
                assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
                // 8 samples -> 16 bytes -> 24 base64 chars.
                assert_eq!(chunk.data.len(), 24);
            }
            other => panic!("expected media command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn server_close_returns_the_session_to_idle() {
        let (mut session, log, _cmd_rx, _frame_rx) = test_session(false);
        session.start().await.unwrap();
        session.handle_link_event(LinkEvent::Opened).await;

        session.handle_link_event(LinkEvent::Closed).await;
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(log.lock().unwrap().stopped, 1);
    }
}
