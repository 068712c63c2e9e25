//! Playback controller - drives one media slot until it plays, and keeps it playing
//!
//! Coordinates:
//! - Attribute configuration, source assignment and load
//! - Metadata and readiness waits, each raced against a timeout
//! - `play()` invocation and failure classification
//! - Retry scheduling with a fixed backoff, up to the profile's ceiling
//! - Self-healing of unexpected pauses and stalls while playing
//! - Teardown of timers, listeners and the element on every exit path
//!
//! Each controller runs as one tokio task that exclusively owns its session
//! and its element. Media events, timer expiries and `play()` settlements are
//! funnelled into that task as signals stamped with the attempt generation
//! that produced them, so transitions are applied one at a time and anything
//! left over from an abandoned attempt is recognised and dropped.

use crate::{
    config::ControllerConfig,
    diagnostics::{DiagnosticContext, DiagnosticEvent, DiagnosticRecord, DiagnosticsLog, SelfHealAction},
    error::PlaybackFailure,
    media::{ListenerGuard, MediaAttributes, MediaElement, MediaEvent},
    profile::{resolve_or_raw, DeviceProfile, DeviceProfiler, Environment},
    session::{FailureOutcome, PlaybackSession, Transition},
    timer::PendingTasks,
    types::*,
    Error, Result,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Requests from the presentation layer
#[derive(Debug)]
enum Command {
    Retry,
    SetSource(String),
}

/// What a pending task was waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Wait {
    MetadataTimeout,
    ReadinessTimeout,
    Warmup,
    Backoff,
    PlayRequest,
    Resume,
    StallReload,
    SelfHealPlay,
    HealCheck,
}

#[derive(Debug)]
enum SignalKind {
    Media(MediaEvent),
    Timer(Wait),
    PlaySettled(std::result::Result<(), String>),
    SelfHealSettled(std::result::Result<(), String>),
}

/// Input to the controller task, stamped with the generation that produced it
#[derive(Debug)]
struct Signal {
    generation: Generation,
    kind: SignalKind,
}

impl SignalKind {
    fn label(&self) -> String {
        match self {
            SignalKind::Media(event) => event.name().to_string(),
            SignalKind::Timer(wait) => format!("{:?}", wait),
            SignalKind::PlaySettled(Ok(())) => "play_resolved".to_string(),
            SignalKind::PlaySettled(Err(_)) => "play_rejected".to_string(),
            SignalKind::SelfHealSettled(Ok(())) => "self_heal_resolved".to_string(),
            SignalKind::SelfHealSettled(Err(_)) => "self_heal_rejected".to_string(),
        }
    }
}

/// Builder for [`PlaybackController`]
pub struct ControllerBuilder {
    element: Arc<dyn MediaElement>,
    profile: DeviceProfile,
    config: ControllerConfig,
    page_origin: Option<Url>,
}

impl ControllerBuilder {
    /// Use an explicit device profile
    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Use a configuration (timing knobs, diagnostics capacity)
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Origin used to absolutize relative sources
    pub fn page_origin(mut self, origin: Url) -> Self {
        self.page_origin = Some(origin);
        self
    }

    /// Classify `env` with the configured tuning and use the result
    pub fn environment(mut self, env: &Environment) -> Self {
        self.profile = DeviceProfiler::with_config(&self.config).classify(env);
        if let Some(origin) = &env.page_origin {
            self.page_origin = Some(origin.clone());
        }
        self
    }

    /// Start driving the element towards playing `source`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, source: impl Into<String>) -> PlaybackController {
        let source = source.into();
        let session_id = SessionId::new();
        let resolved = resolve_or_raw(&self.profile, &source, self.page_origin.as_ref());
        let session = PlaybackSession::new(source, resolved, self.profile.max_retries);

        let (view_tx, view_rx) = watch::channel(session.view(self.profile.classification));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let diagnostics = Arc::new(DiagnosticsLog::new(session_id, self.config.diagnostics_capacity));

        info!(
            session_id = %session_id,
            device = %self.profile.classification,
            max_retries = self.profile.max_retries,
            source = %session.source_url(),
            "Playback controller started"
        );

        let driver = Driver {
            pending: PendingTasks::new(),
            listener: None,
            _lease: ElementLease {
                element: self.element.clone(),
            },
            element: self.element,
            attributes: MediaAttributes::signage(self.profile.preload_strategy),
            profile: self.profile.clone(),
            config: self.config,
            page_origin: self.page_origin,
            session,
            view_tx,
            diagnostics: diagnostics.clone(),
            signal_tx,
            attempt_live: false,
            can_play: false,
            play_requested: false,
            healing: None,
        };

        let task = tokio::spawn(driver.run(command_rx, signal_rx));

        PlaybackController {
            session_id,
            profile: self.profile,
            commands: command_tx,
            view_rx,
            diagnostics,
            task,
        }
    }
}

/// Handle to a running playback controller
///
/// Dropping the handle unmounts the controller: its task cancels every
/// pending wait, detaches its listener, pauses the element and clears the
/// source.
pub struct PlaybackController {
    session_id: SessionId,
    profile: DeviceProfile,
    commands: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<PlaybackView>,
    diagnostics: Arc<DiagnosticsLog>,
    task: JoinHandle<()>,
}

impl PlaybackController {
    /// Start building a controller for `element`
    pub fn builder(element: Arc<dyn MediaElement>) -> ControllerBuilder {
        ControllerBuilder {
            element,
            profile: DeviceProfile::interactive(),
            config: ControllerConfig::default(),
            page_origin: None,
        }
    }

    /// Classify `env` once and start playing `source` on `element`
    pub fn for_environment(
        element: Arc<dyn MediaElement>,
        env: &Environment,
        config: ControllerConfig,
        source: impl Into<String>,
    ) -> Self {
        Self::builder(element).config(config).environment(env).spawn(source)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Current view
    pub fn view(&self) -> PlaybackView {
        self.view_rx.borrow().clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.view_rx.borrow().state
    }

    /// Subscribe to view changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackView> {
        self.view_rx.clone()
    }

    /// Wait until the view satisfies `predicate`
    pub async fn wait_for(&self, mut predicate: impl FnMut(&PlaybackView) -> bool) -> Result<PlaybackView> {
        let mut rx = self.view_rx.clone();
        let view = rx
            .wait_for(|view| predicate(view))
            .await
            .map_err(|_| Error::ControllerClosed)?;
        Ok(view.clone())
    }

    /// Ask for a manual retry
    ///
    /// Only accepted in [`PlaybackState::Error`]; returns `false` and does
    /// nothing otherwise.
    pub fn retry(&self) -> bool {
        if !self.view_rx.borrow().can_retry() {
            debug!(session_id = %self.session_id, "Manual retry ignored outside error state");
            return false;
        }
        self.commands.send(Command::Retry).is_ok()
    }

    /// Point the slot at another source; restarts from `Loading`
    pub fn set_source(&self, source: impl Into<String>) -> Result<()> {
        self.commands
            .send(Command::SetSource(source.into()))
            .map_err(|_| Error::ControllerClosed)
    }

    /// Retained diagnostic records, oldest first
    pub async fn diagnostics(&self) -> Vec<DiagnosticRecord> {
        self.diagnostics.records().await
    }

    /// State changes retained in the diagnostics, oldest first
    pub async fn transitions(&self) -> Vec<(PlaybackState, PlaybackState)> {
        self.diagnostics.state_changes().await
    }

    /// Receive diagnostic records as they are emitted
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<DiagnosticRecord> {
        self.diagnostics.subscribe()
    }

    /// Unmount and wait for teardown to finish
    pub async fn shutdown(self) {
        let PlaybackController { commands, task, session_id, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(session_id = %session_id, error = %e, "Playback controller task ended abnormally");
        }
    }
}

/// Pauses the element and clears its source when dropped
struct ElementLease {
    element: Arc<dyn MediaElement>,
}

impl Drop for ElementLease {
    fn drop(&mut self) {
        self.element.pause();
        self.element.clear_source();
    }
}

/// The controller task
///
/// Field order is teardown order: pending waits are aborted, then the
/// listener is detached, then the element is released.
struct Driver {
    pending: PendingTasks<Wait>,
    listener: Option<ListenerGuard>,
    _lease: ElementLease,
    element: Arc<dyn MediaElement>,
    attributes: MediaAttributes,
    profile: DeviceProfile,
    config: ControllerConfig,
    page_origin: Option<Url>,
    session: PlaybackSession,
    view_tx: watch::Sender<PlaybackView>,
    diagnostics: Arc<DiagnosticsLog>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    /// Source assigned and load issued for the current generation
    attempt_live: bool,
    /// Element reported it can begin playback during this attempt
    can_play: bool,
    /// Warmup armed or `play()` issued during this attempt
    play_requested: bool,
    /// Self-heal issued and not yet confirmed
    healing: Option<SelfHealAction>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        self.start_attempt().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(signal) = signals.recv() => self.handle_signal(signal).await,
            }
        }

        self.teardown().await;
    }

    fn context(&self) -> DiagnosticContext {
        DiagnosticContext {
            generation: self.session.generation(),
            retry_count: self.session.retry_count(),
            device_class: self.profile.classification,
        }
    }

    async fn emit(&self, event: DiagnosticEvent) {
        self.diagnostics.emit(self.context(), event).await;
    }

    async fn transitioned(&self, transition: Transition) {
        self.view_tx.send_replace(self.session.view(self.profile.classification));
        self.emit(DiagnosticEvent::StateChange {
            from: transition.from,
            to: transition.to,
        })
        .await;
    }

    /// Drop everything belonging to the current attempt
    fn abandon_attempt(&mut self) {
        self.pending.cancel_all();
        self.listener = None;
        self.attempt_live = false;
        self.can_play = false;
        self.play_requested = false;
        self.healing = None;
    }

    /// Configure, assign, load, and start the metadata wait
    #[instrument(skip(self), fields(generation = %self.session.generation()))]
    async fn start_attempt(&mut self) {
        self.abandon_attempt();
        let generation = self.session.generation();

        // Attributes must be in place before the source is assigned
        self.element.apply_attributes(&self.attributes);

        let tx = self.signal_tx.clone();
        self.listener = Some(ListenerGuard::attach(
            self.element.clone(),
            Box::new(move |event| {
                let _ = tx.send(Signal {
                    generation,
                    kind: SignalKind::Media(event),
                });
            }),
        ));

        self.element.set_source(self.session.resolved_url());
        self.element.load();
        self.attempt_live = true;

        self.arm(Wait::MetadataTimeout, self.profile.metadata_timeout());
        self.emit(DiagnosticEvent::AttemptStarted {
            source: self.session.resolved_url().to_string(),
        })
        .await;
    }

    /// Arm a timer for the current generation
    fn arm(&mut self, wait: Wait, delay: std::time::Duration) {
        let tx = self.signal_tx.clone();
        let generation = self.session.generation();
        self.pending.arm(wait, delay, move || {
            let _ = tx.send(Signal {
                generation,
                kind: SignalKind::Timer(wait),
            });
        });
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Retry => {
                let Some((_, transition)) = self.session.manual_retry() else {
                    debug!(state = %self.session.state(), "Manual retry ignored");
                    return;
                };
                self.emit(DiagnosticEvent::ManualRetry).await;
                self.transitioned(transition).await;
                self.start_attempt().await;
            }
            Command::SetSource(source) => {
                self.abandon_attempt();
                self.element.pause();
                let resolved = resolve_or_raw(&self.profile, &source, self.page_origin.as_ref());
                let (_, transition) = self.session.change_source(source, resolved);
                self.emit(DiagnosticEvent::SourceChanged {
                    source: self.session.source_url().to_string(),
                })
                .await;
                self.transitioned(transition).await;
                self.start_attempt().await;
            }
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        if !self.session.is_current(signal.generation) {
            if !matches!(signal.kind, SignalKind::Media(MediaEvent::TimeUpdate(_))) {
                self.emit(DiagnosticEvent::StaleSignalDropped {
                    signal_generation: signal.generation,
                    signal: signal.kind.label(),
                })
                .await;
            }
            return;
        }

        let state = self.session.state();
        match signal.kind {
            SignalKind::Media(event) => self.handle_media_event(state, event).await,
            SignalKind::Timer(wait) => self.handle_timer(state, wait).await,
            SignalKind::PlaySettled(Ok(())) => {
                self.pending.cancel(Wait::ReadinessTimeout);
                if let Some(transition) = self.session.play_started(signal.generation) {
                    self.transitioned(transition).await;
                }
            }
            SignalKind::PlaySettled(Err(reason)) => {
                self.fail(PlaybackFailure::PlayRejected(reason)).await;
            }
            SignalKind::SelfHealSettled(Ok(())) => {
                debug!(action = ?self.healing, "Self-heal play resolved");
            }
            SignalKind::SelfHealSettled(Err(reason)) => {
                self.playback_lost(reason).await;
            }
        }
    }

    async fn handle_media_event(&mut self, state: PlaybackState, event: MediaEvent) {
        match (state, event) {
            (PlaybackState::Loading, MediaEvent::LoadedMetadata) => {
                self.pending.cancel(Wait::MetadataTimeout);
                if let Some(transition) = self.session.metadata_loaded(self.session.generation()) {
                    self.transitioned(transition).await;
                    self.arm(Wait::ReadinessTimeout, self.profile.play_ready_timeout());
                    self.begin_play_if_ready();
                }
            }
            (PlaybackState::Loading | PlaybackState::Ready, MediaEvent::CanPlay) => {
                self.can_play = true;
                self.begin_play_if_ready();
            }
            (PlaybackState::Loading | PlaybackState::Ready, MediaEvent::Error(reason)) => {
                self.fail(PlaybackFailure::MediaError(reason)).await;
            }
            (PlaybackState::Playing, MediaEvent::Pause) => {
                if !self.pending.is_armed(Wait::Resume) {
                    debug!("Unexpected pause while playing, resume scheduled");
                    self.arm(Wait::Resume, self.config.resume_delay());
                }
            }
            (PlaybackState::Playing, MediaEvent::Stalled) => {
                let buffered = self.element.buffered_ahead();
                if buffered < self.config.stall_buffer_threshold_secs && !self.pending.is_armed(Wait::StallReload) {
                    debug!(buffered, "Stalled with insufficient buffer, reload scheduled");
                    self.arm(Wait::StallReload, self.config.stall_reload_delay());
                }
            }
            (PlaybackState::Playing, MediaEvent::Error(reason)) => {
                warn!(reason = %reason, "Media error while playing, reload scheduled");
                if !self.pending.is_armed(Wait::StallReload) {
                    self.arm(Wait::StallReload, self.config.stall_reload_delay());
                }
            }
            (_, MediaEvent::TimeUpdate(_)) => {}
            (state, event) => {
                debug!(state = %state, event = event.name(), "Media event ignored");
            }
        }
    }

    async fn handle_timer(&mut self, state: PlaybackState, wait: Wait) {
        match (state, wait) {
            (PlaybackState::Loading, Wait::MetadataTimeout) => {
                self.fail(PlaybackFailure::MetadataTimeout).await;
            }
            (PlaybackState::Ready, Wait::ReadinessTimeout) => {
                self.fail(PlaybackFailure::ReadinessTimeout).await;
            }
            (PlaybackState::Ready, Wait::Warmup) => self.invoke_play(),
            (PlaybackState::Loading, Wait::Backoff) if !self.attempt_live => {
                self.start_attempt().await;
            }
            (PlaybackState::Playing, Wait::Resume) => {
                if self.element.is_paused() {
                    self.self_heal(SelfHealAction::Resume).await;
                }
            }
            (PlaybackState::Playing, Wait::StallReload) => {
                self.self_heal(SelfHealAction::Reload).await;
            }
            (PlaybackState::Playing, Wait::HealCheck) => {
                if self.element.is_paused() {
                    self.playback_lost("element still paused after self-heal".to_string()).await;
                } else {
                    let action = self.healing.take();
                    debug!(action = ?action, "Self-heal confirmed");
                }
            }
            (state, wait) => {
                debug!(state = %state, wait = ?wait, "Timer ignored");
            }
        }
    }

    /// Start the warmup or `play()` once metadata and readiness are both in
    fn begin_play_if_ready(&mut self) {
        if self.session.state() != PlaybackState::Ready || !self.can_play || self.play_requested {
            return;
        }
        self.play_requested = true;

        let warmup = self.profile.warmup_delay();
        if warmup.is_zero() {
            self.invoke_play();
        } else {
            debug!(warmup_ms = self.profile.warmup_delay_ms, "Delaying play until decoder settles");
            self.arm(Wait::Warmup, warmup);
        }
    }

    /// Call `play()` for the current generation; the settlement comes back as a signal
    fn invoke_play(&mut self) {
        let element = self.element.clone();
        let tx = self.signal_tx.clone();
        let generation = self.session.generation();
        self.pending.spawn(Wait::PlayRequest, async move {
            let result = element.play().await;
            let _ = tx.send(Signal {
                generation,
                kind: SignalKind::PlaySettled(result),
            });
        });
    }

    /// Reissue `play()` (after a `load()` for a reload) and schedule a check
    /// that the element actually left the paused state
    async fn self_heal(&mut self, action: SelfHealAction) {
        self.emit(DiagnosticEvent::SelfHeal { action }).await;
        self.healing = Some(action);

        if action == SelfHealAction::Reload {
            self.element.load();
        }

        let element = self.element.clone();
        let tx = self.signal_tx.clone();
        let generation = self.session.generation();
        self.pending.spawn(Wait::SelfHealPlay, async move {
            let result = element.play().await;
            let _ = tx.send(Signal {
                generation,
                kind: SignalKind::SelfHealSettled(result),
            });
        });
        self.arm(Wait::HealCheck, self.config.resume_delay());
    }

    /// Self-healing failed: restart from `Loading` behind the backoff
    async fn playback_lost(&mut self, reason: String) {
        let action = self.healing.unwrap_or(SelfHealAction::Resume);
        let Some((_, transition)) = self.session.playback_lost(self.session.generation()) else {
            return;
        };

        self.abandon_attempt();
        self.emit(DiagnosticEvent::SelfHealFailed { action, reason }).await;
        self.transitioned(transition).await;
        self.arm(Wait::Backoff, self.config.backoff());
        self.emit(DiagnosticEvent::RetryScheduled {
            delay_ms: self.config.backoff_ms,
        })
        .await;
    }

    /// Apply the retry guard to a failed attempt
    async fn fail(&mut self, failure: PlaybackFailure) {
        let generation = self.session.generation();
        let Some(outcome) = self.session.fail(generation, &failure) else {
            return;
        };

        // Nothing from the failed attempt may fire from here on
        self.abandon_attempt();
        self.emit(DiagnosticEvent::Failure {
            code: failure.code().to_string(),
            message: failure.to_string(),
        })
        .await;

        match outcome {
            FailureOutcome::Retry { transition, .. } => {
                self.transitioned(transition).await;
                self.arm(Wait::Backoff, self.config.backoff());
                self.emit(DiagnosticEvent::RetryScheduled {
                    delay_ms: self.config.backoff_ms,
                })
                .await;
            }
            FailureOutcome::Exhausted { message, transition } => {
                self.element.pause();
                self.transitioned(transition).await;
                warn!(message = %message, max_retries = self.session.max_retries(), "Playback retries exhausted");
            }
        }
    }

    async fn teardown(mut self) {
        self.abandon_attempt();
        self.emit(DiagnosticEvent::Teardown).await;
        // Dropping the driver releases the element through its lease
    }
}
