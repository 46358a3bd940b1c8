//! Verification session controller.
//!
//! `Init → BaselineCapture → LivenessChallenge → DualCheck → Success | Failed`
//!
//! The controller is synchronous and owns all session state. It never sleeps:
//! steps with a deadline arm a [`TimerToken`], the runtime schedules it, and
//! calls [`SessionController::on_timeout`] when it fires. Tokens are bound to
//! the session epoch, so a timer scheduled before [`SessionController::reset`]
//! has no effect afterwards.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::event_log::{EventLog, LogEntry};
use crate::extractor::{self, LandmarkExtractor};
use crate::liveness::{LivenessEvaluator, LivenessMode, LivenessSignal, LivenessThresholds};
use crate::matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::qr::{self, QrDecoder, QrGate, QrOutcome};
use crate::types::{Descriptor, Detection, DetectorOptions, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Init,
    BaselineCapture,
    LivenessChallenge,
    DualCheck,
    Success,
    Failed,
}

impl Step {
    pub fn is_terminal(self) -> bool {
        matches!(self, Step::Success | Step::Failed)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Init => "init",
            Step::BaselineCapture => "baseline capture",
            Step::LivenessChallenge => "liveness challenge",
            Step::DualCheck => "dual check",
            Step::Success => "success",
            Step::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a session ended in [`Step::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    LivenessTimeout,
    DualCheckExhausted { attempts: u32 },
}

impl From<FailureReason> for SessionError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::LivenessTimeout => SessionError::LivenessTimeout,
            FailureReason::DualCheckExhausted { attempts } => {
                SessionError::DualCheckExhausted { attempts }
            }
        }
    }
}

/// Session tuning. Every bound is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Token the QR code shown during the dual check must decode to.
    pub expected_qr: String,
    /// Maximum Euclidean descriptor distance accepted as the same person.
    pub match_threshold: f32,
    pub liveness: LivenessThresholds,
    pub liveness_mode: LivenessMode,
    /// How long to wait for a face before reporting `NoFaceDetected`.
    pub baseline_timeout_ms: u64,
    /// How long the subject has to complete the liveness challenge.
    pub liveness_timeout_ms: u64,
    /// Dual-check attempts allowed before the session fails.
    pub dual_check_retries: u32,
    pub detector: DetectorOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expected_qr: "DEMO_CLASSROOM".to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            liveness: LivenessThresholds::default(),
            liveness_mode: LivenessMode::Blink,
            baseline_timeout_ms: 10_000,
            liveness_timeout_ms: 8_000,
            dual_check_retries: 5,
            detector: DetectorOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    Baseline,
    Liveness,
}

/// Identifies one armed deadline. Only the currently armed token is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    epoch: u64,
    serial: u64,
    kind: TimerKind,
}

impl TimerToken {
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// A deadline the runtime must schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub token: TimerToken,
    pub after: Duration,
}

/// One frame's worth of extractor and decoder output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub detection: Option<Detection>,
    /// Decoded QR payload, if a code was found in the same frame.
    pub qr: Option<String>,
}

impl Observation {
    /// Run the collaborators on a frame. The decoder is optional so callers
    /// only pay for QR decoding while the session is in the dual check.
    pub fn capture(
        frame: &Frame,
        extractor: &mut dyn LandmarkExtractor,
        decoder: Option<&mut dyn QrDecoder>,
        options: &DetectorOptions,
    ) -> Result<Self, SessionError> {
        let detection = extractor::detect(extractor, frame, options)?;
        let qr = decoder.and_then(|d| qr::scan(d, frame)).map(|code| code.data);
        Ok(Self { detection, qr })
    }
}

/// Identity and QR results of one dual-check attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DualCheckReport {
    pub identity: MatchResult,
    pub qr: QrOutcome,
    /// Failed attempts so far, including this one if it failed.
    pub attempts: u32,
}

impl DualCheckReport {
    pub fn passed(&self) -> bool {
        self.identity.is_match && self.qr.is_match()
    }
}

/// What a successful controller call did.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub step: Step,
    /// The call moved the session to a different step.
    pub changed: bool,
    /// Liveness evaluation for this frame, while in the challenge.
    pub signal: Option<LivenessSignal>,
    /// Result of this frame's dual-check attempt, if it was one.
    pub dual_check: Option<DualCheckReport>,
}

/// Read-only view of the session for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub step: Step,
    pub has_baseline: bool,
    pub blink_seen: bool,
    pub mouth_seen: bool,
    pub dual_check_attempts: u32,
    pub liveness_samples: usize,
    pub failure: Option<FailureReason>,
    pub log: Vec<LogEntry>,
}

/// Single-writer verification state machine.
#[derive(Debug, Clone)]
pub struct SessionController {
    config: SessionConfig,
    matcher: EuclideanMatcher,
    qr_gate: QrGate,
    step: Step,
    baseline: Option<Descriptor>,
    liveness: LivenessEvaluator,
    blink_seen: bool,
    mouth_seen: bool,
    attempts: u32,
    failure: Option<FailureReason>,
    armed: Option<TimerToken>,
    epoch: u64,
    next_serial: u64,
    log: EventLog,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            matcher: EuclideanMatcher::new(config.match_threshold),
            qr_gate: QrGate::new(config.expected_qr.clone()),
            liveness: LivenessEvaluator::new(config.liveness),
            config,
            step: Step::Init,
            baseline: None,
            blink_seen: false,
            mouth_seen: false,
            attempts: 0,
            failure: None,
            armed: None,
            epoch: 0,
            next_serial: 0,
            log: EventLog::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn baseline(&self) -> Option<&Descriptor> {
        self.baseline.as_ref()
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn dual_check_attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the next observation should include a QR decode.
    pub fn wants_qr(&self) -> bool {
        self.step == Step::DualCheck
    }

    /// The deadline currently armed, if any.
    pub fn armed_timer(&self) -> Option<TimerRequest> {
        let token = self.armed?;
        let ms = match token.kind {
            TimerKind::Baseline => self.config.baseline_timeout_ms,
            TimerKind::Liveness => self.config.liveness_timeout_ms,
        };
        Some(TimerRequest {
            token,
            after: Duration::from_millis(ms),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            step: self.step,
            has_baseline: self.baseline.is_some(),
            blink_seen: self.blink_seen,
            mouth_seen: self.mouth_seen,
            dual_check_attempts: self.attempts,
            liveness_samples: self.liveness.len(),
            failure: self.failure,
            log: self.log.entries().cloned().collect(),
        }
    }

    /// `Init → BaselineCapture`.
    pub fn start(&mut self) -> Result<Outcome, SessionError> {
        if self.step != Step::Init {
            return Err(SessionError::InvalidInput(format!(
                "cannot start a session in step '{}'",
                self.step
            )));
        }
        self.config.liveness.validate()?;
        self.transition(Step::BaselineCapture, "session started; look at the camera");
        self.arm(TimerKind::Baseline);
        Ok(self.outcome(true))
    }

    /// Feed one frame's observation.
    ///
    /// Terminal transitions are reported as the matching error after the
    /// controller has already moved to [`Step::Failed`].
    pub fn observe(&mut self, obs: Observation) -> Result<Outcome, SessionError> {
        match self.step {
            Step::BaselineCapture => Ok(self.observe_baseline(obs)),
            Step::LivenessChallenge => Ok(self.observe_liveness(obs)),
            Step::DualCheck => self.observe_dual_check(obs),
            Step::Init | Step::Success | Step::Failed => Ok(self.outcome(false)),
        }
    }

    /// Deliver a fired deadline. Stale tokens are ignored.
    pub fn on_timeout(&mut self, token: TimerToken) -> Result<Outcome, SessionError> {
        if self.armed != Some(token) {
            tracing::debug!(?token, epoch = self.epoch, "ignoring stale timer");
            return Ok(self.outcome(false));
        }
        self.armed = None;

        match (token.kind, self.step) {
            (TimerKind::Baseline, Step::BaselineCapture) => {
                let secs = self.config.baseline_timeout_ms as f64 / 1000.0;
                self.log
                    .push(format!("no face detected within {secs:.1}s; still waiting"));
                tracing::info!("baseline capture timed out; re-arming");
                self.arm(TimerKind::Baseline);
                Err(SessionError::NoFaceDetected)
            }
            (TimerKind::Liveness, Step::LivenessChallenge) => {
                Err(self.fail(FailureReason::LivenessTimeout))
            }
            (kind, step) => {
                tracing::warn!(?kind, %step, "armed timer does not match step");
                Ok(self.outcome(false))
            }
        }
    }

    /// Return to a freshly initialised session.
    pub fn reset(&mut self) {
        let epoch = self.epoch + 1;
        let next_serial = self.next_serial;
        *self = Self::new(self.config.clone());
        self.epoch = epoch;
        self.next_serial = next_serial;
        tracing::info!(epoch, "session reset");
    }

    fn observe_baseline(&mut self, obs: Observation) -> Outcome {
        let Some(detection) = obs.detection else {
            return self.outcome(false);
        };
        self.baseline = Some(detection.descriptor);
        self.transition(
            Step::LivenessChallenge,
            match self.config.liveness_mode {
                LivenessMode::Blink => "baseline captured; please blink",
                LivenessMode::BlinkAndMouth => "baseline captured; please blink and open your mouth",
            },
        );
        self.arm(TimerKind::Liveness);
        self.outcome(true)
    }

    fn observe_liveness(&mut self, obs: Observation) -> Outcome {
        let Some(detection) = obs.detection else {
            return self.outcome(false);
        };
        let signal = self.liveness.evaluate(&detection.landmarks);
        tracing::debug!(ear = signal.ear, mar = signal.mar, "liveness sample");

        if signal.blink && !self.blink_seen {
            self.blink_seen = true;
            self.log.push(format!("blink detected (EAR {:.2})", signal.ear));
        }
        if signal.mouth_open && !self.mouth_seen {
            self.mouth_seen = true;
            self.log.push(format!("mouth opened (MAR {:.2})", signal.mar));
        }

        let satisfied = match self.config.liveness_mode {
            LivenessMode::Blink => self.blink_seen,
            LivenessMode::BlinkAndMouth => self.blink_seen && self.mouth_seen,
        };
        let changed = if satisfied {
            self.armed = None;
            self.transition(Step::DualCheck, "liveness confirmed; show the QR code");
            true
        } else {
            false
        };

        Outcome {
            signal: Some(signal),
            ..self.outcome(changed)
        }
    }

    fn observe_dual_check(&mut self, obs: Observation) -> Result<Outcome, SessionError> {
        let (Some(detection), Some(decoded)) = (obs.detection, obs.qr) else {
            return Ok(self.outcome(false));
        };

        let identity = self
            .matcher
            .compare(self.baseline.as_ref(), Some(&detection.descriptor))?;
        let qr = self.qr_gate.evaluate(Some(&decoded));

        if identity.is_match && qr.is_match() {
            let report = DualCheckReport {
                identity,
                qr,
                attempts: self.attempts,
            };
            self.release_biometrics();
            self.transition(
                Step::Success,
                format!("identity and QR verified (distance {:.3})", identity.distance),
            );
            return Ok(Outcome {
                dual_check: Some(report),
                ..self.outcome(true)
            });
        }

        self.attempts += 1;
        self.log.push(format!(
            "check {} of {} failed: identity {} (distance {:.3}), QR {}",
            self.attempts,
            self.config.dual_check_retries,
            if identity.is_match { "ok" } else { "mismatch" },
            identity.distance,
            if qr.is_match() { "ok" } else { "mismatch" },
        ));
        tracing::info!(
            attempts = self.attempts,
            distance = identity.distance,
            qr_ok = qr.is_match(),
            "dual check attempt failed"
        );

        if self.attempts >= self.config.dual_check_retries {
            return Err(self.fail(FailureReason::DualCheckExhausted {
                attempts: self.attempts,
            }));
        }

        Ok(Outcome {
            dual_check: Some(DualCheckReport {
                identity,
                qr,
                attempts: self.attempts,
            }),
            ..self.outcome(false)
        })
    }

    fn arm(&mut self, kind: TimerKind) {
        self.next_serial += 1;
        self.armed = Some(TimerToken {
            epoch: self.epoch,
            serial: self.next_serial,
            kind,
        });
    }

    fn fail(&mut self, reason: FailureReason) -> SessionError {
        self.release_biometrics();
        self.failure = Some(reason);
        let err = SessionError::from(reason);
        self.transition(Step::Failed, format!("verification failed: {err}"));
        err
    }

    /// Terminal steps keep no biometric data around.
    fn release_biometrics(&mut self) {
        self.baseline = None;
        self.liveness.reset();
        self.armed = None;
    }

    fn transition(&mut self, to: Step, message: impl Into<String>) {
        let from = self.step;
        let message = message.into();
        tracing::info!(%from, %to, "{message}");
        self.step = to;
        self.log.push(message);
    }

    fn outcome(&self, changed: bool) -> Outcome {
        Outcome {
            step: self.step,
            changed,
            signal: None,
            dual_check: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::detection;

    const OPEN: f32 = 0.30;
    const SHUT: f32 = 0.10;

    fn face_obs(ear: f32, mar: f32) -> Observation {
        Observation {
            detection: Some(detection(ear, mar, 0.0)),
            qr: None,
        }
    }

    fn dual_obs(delta: f32, qr: &str) -> Observation {
        Observation {
            detection: Some(detection(OPEN, 0.0, delta)),
            qr: Some(qr.to_string()),
        }
    }

    fn controller() -> SessionController {
        SessionController::new(SessionConfig::default())
    }

    fn to_dual_check(ctrl: &mut SessionController) {
        ctrl.start().unwrap();
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        ctrl.observe(face_obs(SHUT, 0.0)).unwrap();
        let out = ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        assert_eq!(out.step, Step::DualCheck);
    }

    #[test]
    fn test_start_arms_baseline_timer() {
        let mut ctrl = controller();
        let out = ctrl.start().unwrap();
        assert_eq!(out.step, Step::BaselineCapture);
        assert!(out.changed);
        let timer = ctrl.armed_timer().unwrap();
        assert_eq!(timer.token.kind(), TimerKind::Baseline);
        assert_eq!(timer.after, Duration::from_secs(10));
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut ctrl = controller();
        ctrl.start().unwrap();
        assert!(matches!(ctrl.start(), Err(SessionError::InvalidInput(_))));
    }

    #[test]
    fn test_start_rejects_collapsed_ear_band() {
        let mut ctrl = SessionController::new(SessionConfig {
            liveness: LivenessThresholds {
                ear_close: 0.21,
                ear_open: 0.21,
                ..LivenessThresholds::default()
            },
            ..SessionConfig::default()
        });
        assert!(matches!(ctrl.start(), Err(SessionError::InvalidInput(_))));
        assert_eq!(ctrl.step(), Step::Init);
        assert!(ctrl.armed_timer().is_none());
    }

    #[test]
    fn test_baseline_without_face_stays() {
        let mut ctrl = controller();
        ctrl.start().unwrap();
        let out = ctrl.observe(Observation::default()).unwrap();
        assert_eq!(out.step, Step::BaselineCapture);
        assert!(!out.changed);
        assert!(ctrl.baseline().is_none());
    }

    #[test]
    fn test_baseline_timeout_is_recoverable() {
        let mut ctrl = controller();
        ctrl.start().unwrap();
        let token = ctrl.armed_timer().unwrap().token;
        let err = ctrl.on_timeout(token).unwrap_err();
        assert_eq!(err, SessionError::NoFaceDetected);
        assert_eq!(ctrl.step(), Step::BaselineCapture);

        // Re-armed with a fresh token; the old one is now stale.
        let rearmed = ctrl.armed_timer().unwrap().token;
        assert_ne!(rearmed, token);
        assert!(ctrl.on_timeout(token).is_ok());

        // A face still advances the session afterwards.
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        assert_eq!(ctrl.step(), Step::LivenessChallenge);
    }

    #[test]
    fn test_baseline_then_liveness_timeout_fails() {
        let mut ctrl = controller();
        ctrl.start().unwrap();
        let out = ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        assert_eq!(out.step, Step::LivenessChallenge);
        assert!(ctrl.baseline().is_some());

        let timer = ctrl.armed_timer().unwrap();
        assert_eq!(timer.token.kind(), TimerKind::Liveness);
        assert_eq!(timer.after, Duration::from_secs(8));

        // Eyes stay open for the whole challenge.
        for _ in 0..20 {
            ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        }
        let err = ctrl.on_timeout(timer.token).unwrap_err();
        assert_eq!(err, SessionError::LivenessTimeout);
        assert_eq!(ctrl.step(), Step::Failed);
        assert_eq!(ctrl.failure(), Some(FailureReason::LivenessTimeout));
        assert!(ctrl.baseline().is_none());
        assert!(ctrl.armed_timer().is_none());
    }

    #[test]
    fn test_blink_advances_to_dual_check() {
        let mut ctrl = controller();
        to_dual_check(&mut ctrl);
        assert!(ctrl.snapshot().blink_seen);
        assert!(ctrl.armed_timer().is_none());
        assert!(ctrl.wants_qr());
    }

    #[test]
    fn test_blink_and_mouth_mode_needs_both() {
        let mut ctrl = SessionController::new(SessionConfig {
            liveness_mode: LivenessMode::BlinkAndMouth,
            ..SessionConfig::default()
        });
        ctrl.start().unwrap();
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        ctrl.observe(face_obs(SHUT, 0.0)).unwrap();
        let out = ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        assert!(out.signal.unwrap().blink);
        assert_eq!(out.step, Step::LivenessChallenge);

        let out = ctrl.observe(face_obs(OPEN, 0.7)).unwrap();
        assert!(out.signal.unwrap().mouth_open);
        assert_eq!(out.step, Step::DualCheck);
    }

    #[test]
    fn test_liveness_timer_after_success_is_stale() {
        let mut ctrl = controller();
        ctrl.start().unwrap();
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        let token = ctrl.armed_timer().unwrap().token;
        ctrl.observe(face_obs(SHUT, 0.0)).unwrap();
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        let out = ctrl.on_timeout(token).unwrap();
        assert_eq!(out.step, Step::DualCheck);
        assert!(!out.changed);
    }

    #[test]
    fn test_dual_check_identity_ok_qr_wrong_stays() {
        let mut ctrl = controller();
        to_dual_check(&mut ctrl);
        let out = ctrl.observe(dual_obs(0.3, "WRONG")).unwrap();
        assert_eq!(out.step, Step::DualCheck);
        let report = out.dual_check.unwrap();
        assert!(report.identity.is_match);
        assert!((report.identity.distance - 0.3).abs() < 1e-5);
        assert_eq!(report.qr, QrOutcome::Mismatch("WRONG".to_string()));
        assert_eq!(report.attempts, 1);
        assert_eq!(ctrl.dual_check_attempts(), 1);
    }

    #[test]
    fn test_dual_check_qr_ok_identity_wrong_stays() {
        let mut ctrl = controller();
        to_dual_check(&mut ctrl);
        let out = ctrl.observe(dual_obs(0.9, "DEMO_CLASSROOM")).unwrap();
        assert_eq!(out.step, Step::DualCheck);
        assert!(!out.dual_check.unwrap().identity.is_match);
    }

    #[test]
    fn test_dual_check_success() {
        let mut ctrl = controller();
        to_dual_check(&mut ctrl);
        let out = ctrl.observe(dual_obs(0.3, "DEMO_CLASSROOM")).unwrap();
        assert_eq!(out.step, Step::Success);
        assert!(out.changed);
        assert!(out.dual_check.unwrap().passed());
        assert!(ctrl.baseline().is_none());
    }

    #[test]
    fn test_dual_check_needs_face_and_code() {
        let mut ctrl = controller();
        to_dual_check(&mut ctrl);
        let no_code = ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        let no_face = ctrl
            .observe(Observation {
                detection: None,
                qr: Some("DEMO_CLASSROOM".to_string()),
            })
            .unwrap();
        assert!(no_code.dual_check.is_none());
        assert!(no_face.dual_check.is_none());
        assert_eq!(ctrl.dual_check_attempts(), 0);
        assert_eq!(ctrl.step(), Step::DualCheck);
    }

    #[test]
    fn test_dual_check_budget_exhausted() {
        let mut ctrl = SessionController::new(SessionConfig {
            dual_check_retries: 3,
            ..SessionConfig::default()
        });
        to_dual_check(&mut ctrl);
        ctrl.observe(dual_obs(0.3, "WRONG")).unwrap();
        ctrl.observe(dual_obs(0.3, "WRONG")).unwrap();
        let err = ctrl.observe(dual_obs(0.3, "WRONG")).unwrap_err();
        assert_eq!(err, SessionError::DualCheckExhausted { attempts: 3 });
        assert_eq!(ctrl.step(), Step::Failed);

        // Terminal: a perfect frame no longer helps.
        let out = ctrl.observe(dual_obs(0.0, "DEMO_CLASSROOM")).unwrap();
        assert_eq!(out.step, Step::Failed);
    }

    #[test]
    fn test_init_cannot_reach_success_without_start() {
        let mut ctrl = controller();
        let foreign = {
            let mut other = controller();
            other.start().unwrap();
            other.armed_timer().unwrap().token
        };
        for _ in 0..3 {
            ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
            ctrl.observe(face_obs(SHUT, 0.7)).unwrap();
            ctrl.observe(dual_obs(0.0, "DEMO_CLASSROOM")).unwrap();
            ctrl.on_timeout(foreign).unwrap();
        }
        assert_eq!(ctrl.step(), Step::Init);
        assert!(ctrl.log().is_empty());
    }

    #[test]
    fn test_reset_from_failed_is_fresh() {
        let mut ctrl = controller();
        ctrl.start().unwrap();
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        let token = ctrl.armed_timer().unwrap().token;
        ctrl.on_timeout(token).unwrap_err();
        assert_eq!(ctrl.step(), Step::Failed);

        ctrl.reset();
        assert_eq!(ctrl.snapshot(), controller().snapshot());
        assert_eq!(ctrl.step(), Step::Init);
        assert!(ctrl.baseline().is_none());
        assert!(ctrl.log().is_empty());
        assert!(ctrl.failure().is_none());
    }

    #[test]
    fn test_timer_from_previous_session_ignored() {
        let mut ctrl = controller();
        ctrl.start().unwrap();
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        let old = ctrl.armed_timer().unwrap().token;

        ctrl.reset();
        ctrl.start().unwrap();
        ctrl.observe(face_obs(OPEN, 0.0)).unwrap();
        assert_eq!(ctrl.step(), Step::LivenessChallenge);

        let out = ctrl.on_timeout(old).unwrap();
        assert_eq!(out.step, Step::LivenessChallenge);
        let current = ctrl.armed_timer().unwrap().token;
        assert_ne!(current.epoch(), old.epoch());
    }

    #[test]
    fn test_every_transition_logged() {
        let mut ctrl = controller();
        to_dual_check(&mut ctrl);
        ctrl.observe(dual_obs(0.1, "DEMO_CLASSROOM")).unwrap();
        let msgs: Vec<_> = ctrl.log().entries().map(|e| e.message.clone()).collect();
        assert!(msgs[0].starts_with("identity and QR verified"));
        assert!(msgs.iter().any(|m| m.starts_with("blink detected")));
        assert!(msgs.last().unwrap().starts_with("session started"));
    }

    #[test]
    fn test_observation_capture_skips_decoder_when_absent() {
        use crate::extractor::ExtractorError;
        use crate::qr::{DecoderError, QrCode};
        use crate::types::RawDetection;

        struct Nothing;
        impl LandmarkExtractor for Nothing {
            fn extract(
                &mut self,
                _: &Frame,
                _: &DetectorOptions,
            ) -> Result<Option<RawDetection>, ExtractorError> {
                Ok(None)
            }
        }
        struct Always;
        impl QrDecoder for Always {
            fn decode(&mut self, _: &Frame) -> Result<Option<QrCode>, DecoderError> {
                Ok(Some(QrCode {
                    data: "DEMO_CLASSROOM".into(),
                    location: None,
                }))
            }
        }

        let frame = Frame::empty(7);
        let opts = DetectorOptions::default();
        let obs = Observation::capture(&frame, &mut Nothing, None, &opts).unwrap();
        assert_eq!(obs, Observation::default());

        let mut dec = Always;
        let obs = Observation::capture(&frame, &mut Nothing, Some(&mut dec), &opts).unwrap();
        assert_eq!(obs.qr.as_deref(), Some("DEMO_CLASSROOM"));
    }
}
