use facegate_core::{
    Frame, LandmarkExtractor, Observation, Outcome, QrDecoder, SessionConfig, SessionController,
    SessionError, SessionSnapshot, Step, TimerToken,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("no tokio runtime to host session timers: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Result of feeding one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub seq: u64,
    pub face_detected: bool,
    /// QR payload decoded from this frame (only decoded during the dual check).
    pub qr: Option<String>,
    pub outcome: Outcome,
}

/// Latest session status, published after every event including timer
/// firings that no caller is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub session_id: Uuid,
    pub step: Step,
    pub last_error: Option<SessionError>,
}

/// Messages sent from callers (and timer tasks) to the engine thread.
enum EngineRequest {
    Start {
        reply: oneshot::Sender<Result<Outcome, SessionError>>,
    },
    Frame {
        frame: Frame,
        reply: oneshot::Sender<Result<FrameReport, SessionError>>,
    },
    Timeout {
        token: TimerToken,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    TakeCapture {
        reply: oneshot::Sender<Option<Frame>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    /// `Init → BaselineCapture`.
    pub async fn start(&self) -> Result<Outcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Start { reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Run extraction (and QR decoding during the dual check) on a frame and
    /// advance the session.
    pub async fn submit_frame(&self, frame: Frame) -> Result<FrameReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Frame { frame, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Discard the session and any pending timers; returns to `Init`.
    pub async fn reset(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Reset { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Snapshot { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Take the frame that passed the dual check, if the session succeeded.
    pub async fn take_capture(&self) -> Result<Option<Frame>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::TakeCapture { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Current status without a round trip to the engine thread.
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the session engine on a dedicated OS thread.
///
/// Takes an already-loaded extractor, so a session can only start once
/// models are ready. Must be called from within a tokio runtime, which
/// hosts the session's timer tasks; otherwise fails with `NoRuntime`.
pub fn spawn_engine(
    session: SessionConfig,
    extractor: Box<dyn LandmarkExtractor>,
    decoder: Box<dyn QrDecoder>,
) -> Result<EngineHandle, EngineError> {
    let runtime = tokio::runtime::Handle::try_current()?;
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);
    let timer_tx = tx.downgrade();

    let session_id = Uuid::new_v4();
    let (status_tx, status_rx) = watch::channel(EngineStatus {
        session_id,
        step: Step::Init,
        last_error: None,
    });

    let mut state = EngineState {
        controller: SessionController::new(session),
        extractor,
        decoder,
        session_id,
        capture: None,
        pending_timer: None,
        runtime,
        timer_tx,
        status_tx,
    };

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                state.handle(req);
            }
            state.cancel_timer();
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        tx,
        status: status_rx,
    })
}

struct EngineState {
    controller: SessionController,
    extractor: Box<dyn LandmarkExtractor>,
    decoder: Box<dyn QrDecoder>,
    session_id: Uuid,
    capture: Option<Frame>,
    pending_timer: Option<(TimerToken, tokio::task::JoinHandle<()>)>,
    runtime: tokio::runtime::Handle,
    timer_tx: mpsc::WeakSender<EngineRequest>,
    status_tx: watch::Sender<EngineStatus>,
}

impl EngineState {
    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Start { reply } => {
                let result = self.controller.start();
                if result.is_ok() {
                    tracing::info!(session = %self.session_id, "session started");
                }
                self.after_event(result.as_ref().err());
                let _ = reply.send(result);
            }
            EngineRequest::Frame { frame, reply } => {
                let result = self.run_frame(frame);
                self.after_event(result.as_ref().err());
                let _ = reply.send(result);
            }
            EngineRequest::Timeout { token } => {
                let result = self.controller.on_timeout(token);
                if let Err(e) = &result {
                    tracing::warn!(session = %self.session_id, error = %e, "session timer fired");
                }
                self.after_event(result.as_ref().err());
            }
            EngineRequest::Reset { reply } => {
                self.cancel_timer();
                self.controller.reset();
                self.capture = None;
                self.session_id = Uuid::new_v4();
                tracing::info!(session = %self.session_id, "engine reset");
                self.publish(None);
                let _ = reply.send(());
            }
            EngineRequest::Snapshot { reply } => {
                let _ = reply.send(self.controller.snapshot());
            }
            EngineRequest::TakeCapture { reply } => {
                let _ = reply.send(self.capture.take());
            }
        }
    }

    /// Extract, decode (dual check only) and advance the controller.
    fn run_frame(&mut self, frame: Frame) -> Result<FrameReport, SessionError> {
        let options = self.controller.config().detector;
        let decoder: Option<&mut dyn QrDecoder> = if self.controller.wants_qr() {
            Some(self.decoder.as_mut())
        } else {
            None
        };
        let obs = Observation::capture(&frame, self.extractor.as_mut(), decoder, &options)?;
        let face_detected = obs.detection.is_some();
        let qr = obs.qr.clone();

        let outcome = self.controller.observe(obs)?;
        tracing::debug!(
            seq = frame.seq,
            face_detected,
            step = %outcome.step,
            "frame processed"
        );

        let seq = frame.seq;
        if outcome.changed && outcome.step == Step::Success {
            self.capture = Some(frame);
        }

        Ok(FrameReport {
            seq,
            face_detected,
            qr,
            outcome,
        })
    }

    fn after_event(&mut self, error: Option<&SessionError>) {
        self.schedule_timer();
        self.publish(error.cloned());
    }

    /// Schedule the controller's armed deadline if it is not already running.
    fn schedule_timer(&mut self) {
        let Some(request) = self.controller.armed_timer() else {
            self.cancel_timer();
            return;
        };
        if matches!(&self.pending_timer, Some((token, _)) if *token == request.token) {
            return;
        }
        self.cancel_timer();

        let weak = self.timer_tx.clone();
        let token = request.token;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(request.after).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(EngineRequest::Timeout { token }).await;
            }
        });
        tracing::debug!(kind = ?token.kind(), after_ms = request.after.as_millis() as u64, "timer armed");
        self.pending_timer = Some((token, task));
    }

    fn cancel_timer(&mut self) {
        if let Some((_, task)) = self.pending_timer.take() {
            task.abort();
        }
    }

    fn publish(&self, last_error: Option<SessionError>) {
        self.status_tx.send_replace(EngineStatus {
            session_id: self.session_id,
            step: self.controller.step(),
            last_error,
        });
    }
}
