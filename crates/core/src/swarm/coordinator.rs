//! # Swarm Coordinator
//!
//! Runs the stages strictly in order against one [`RunContext`], streaming
//! a [`StageStatus`](super::events::StageStatus) for every transition and
//! progress notice, then exactly one terminal event. A failed stage ends
//! the run with the artifacts of every earlier stage intact. Once
//! cancellation is observed nothing further is emitted.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::context::{ApplicationRequest, RunContext, RunResult};
use super::events::{PipelineEvent, RunClock};
use super::pipeline::Pipeline;
use super::stage::{ProgressSender, Stage};
use crate::config::CoordinatorConfig;
use crate::error::{with_timeout, PipelineError};
use crate::skills::{default_stages, tools::Toolbox};

const PROGRESS_BUFFER: usize = 32;

pub struct Coordinator {
    config: CoordinatorConfig,
    stages: Vec<Box<dyn Stage>>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Coordinator over the eight application stages with fresh clients
    pub fn new(config: CoordinatorConfig) -> Self {
        let toolbox = Toolbox::new(&config);
        Self::with_toolbox(config, &toolbox)
    }

    /// Coordinator over the eight application stages sharing `toolbox`
    pub fn with_toolbox(config: CoordinatorConfig, toolbox: &Toolbox) -> Self {
        let stages = default_stages(&config, toolbox);
        Self::with_stages(config, stages)
    }

    pub fn with_stages(config: CoordinatorConfig, stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            config,
            stages,
            event_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set event channel for streaming
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Emit an event. Returns false once the run is cancelled; a closed
    /// receiver cancels the run.
    async fn emit(&self, event: PipelineEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if let Some(tx) = &self.event_tx {
            if tx.send(event).await.is_err() {
                tracing::info!("Event receiver dropped, cancelling run");
                self.cancel.cancel();
                return false;
            }
        }
        true
    }

    fn cancelled(&self, ctx: RunContext, pipeline: Pipeline, clock: &RunClock) -> RunResult {
        tracing::warn!(stage = pipeline.cursor() + 1, "Run cancelled");
        ctx.into_result(
            Some(PipelineError::Cancelled.to_string()),
            pipeline.into_statuses(),
            clock.started_at(),
        )
    }

    /// Run every stage on `input` and return the terminal result.
    #[tracing::instrument(skip_all, fields(professor = %input.professor_name, university = %input.university))]
    pub async fn run(&self, input: ApplicationRequest) -> RunResult {
        let clock = RunClock::start();
        let mut ctx = RunContext::new(input);
        let mut pipeline = Pipeline::new(self.stages.iter().map(|s| s.name()));
        let stage_timeout = self.config.timeouts.stage();

        for stage in &self.stages {
            if self.cancel.is_cancelled() {
                return self.cancelled(ctx, pipeline, &clock);
            }

            tracing::info!(stage = stage.name(), "Stage started");
            let status = pipeline
                .start(stage.opening_action(), clock.elapsed())
                .clone();
            if !self.emit(PipelineEvent::Status(status)).await {
                return self.cancelled(ctx, pipeline, &clock);
            }

            let (progress, mut rx) = ProgressSender::channel(self.cancel.clone(), PROGRESS_BUFFER);
            let mut notices = 0usize;
            let finished = {
                let work = with_timeout(stage.name(), stage_timeout, stage.execute(&ctx, &progress));
                tokio::pin!(work);
                loop {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break None,
                        Some(message) = rx.recv() => {
                            notices += 1;
                            let status = pipeline.report(&message, clock.elapsed()).clone();
                            if !self.emit(PipelineEvent::Status(status)).await {
                                break None;
                            }
                        }
                        result = &mut work => break Some(result),
                    }
                }
            };
            drop(progress);

            let Some(result) = finished else {
                return self.cancelled(ctx, pipeline, &clock);
            };

            // Notices sent just before the stage returned
            while let Ok(message) = rx.try_recv() {
                notices += 1;
                let status = pipeline.report(&message, clock.elapsed()).clone();
                if !self.emit(PipelineEvent::Status(status)).await {
                    return self.cancelled(ctx, pipeline, &clock);
                }
            }
            if self.cancel.is_cancelled() {
                return self.cancelled(ctx, pipeline, &clock);
            }

            let merged = result.and_then(|artifact| {
                let summary = artifact.summary();
                let snapshot = artifact.snapshot().unwrap_or_else(|e| {
                    tracing::warn!(stage = stage.name(), error = %e, "Could not snapshot stage output");
                    serde_json::Value::Null
                });
                ctx.merge(artifact)?;
                Ok((summary, snapshot))
            });

            match merged {
                Ok((summary, snapshot)) => {
                    if notices == 0 {
                        tracing::debug!(stage = stage.name(), "Stage finished without progress notices");
                    }
                    tracing::info!(stage = stage.name(), summary = %summary, "Stage complete");
                    let status = pipeline
                        .complete(&summary, snapshot, clock.elapsed())
                        .clone();
                    if !self.emit(PipelineEvent::Status(status)).await {
                        return self.cancelled(ctx, pipeline, &clock);
                    }
                }
                Err(e) => {
                    tracing::error!(stage = stage.name(), error = %format!("{:#}", e), "Stage failed");
                    let detail = format!("{:#}", e);
                    let status = pipeline.fail(&detail, clock.elapsed()).clone();
                    if !self.emit(PipelineEvent::Status(status)).await {
                        return self.cancelled(ctx, pipeline, &clock);
                    }

                    let result = ctx.into_result(
                        Some(format!("{} failed: {}", stage.name(), detail)),
                        pipeline.into_statuses(),
                        clock.started_at(),
                    );
                    self.emit(PipelineEvent::Error(Box::new(result.clone())))
                        .await;
                    return result;
                }
            }
        }

        tracing::info!(elapsed_ms = clock.elapsed().as_millis() as u64, "Run complete");
        let result = ctx.into_result(None, pipeline.into_statuses(), clock.started_at());
        self.emit(PipelineEvent::Complete(Box::new(result.clone())))
            .await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::artifact_registry::{EmailDraft, FitAnalysis, UserProfile};
    use crate::swarm::context::{StageArtifact, Upload};
    use crate::swarm::events::StageStatus;
    use crate::swarm::pipeline::StageState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    enum Behavior {
        Profile,
        Fit,
        EmailFromFit,
        FetchTimesOut,
        CancelMidway(CancellationToken),
    }

    struct FakeStage {
        name: &'static str,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl FakeStage {
        fn boxed(name: &'static str, behavior: Behavior) -> (Box<dyn Stage>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let stage = Box::new(FakeStage {
                name,
                behavior,
                calls: calls.clone(),
            });
            (stage, calls)
        }
    }

    #[async_trait]
    impl Stage for FakeStage {
        fn id(&self) -> &'static str {
            self.name
        }

        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(
            &self,
            ctx: &RunContext,
            progress: &ProgressSender,
        ) -> anyhow::Result<StageArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.send_update("Working on it...").await?;
            match &self.behavior {
                Behavior::Profile => Ok(StageArtifact::CvProfile {
                    cv_text: "cv".to_string(),
                    profile: UserProfile {
                        name: "Grace".to_string(),
                        ..Default::default()
                    },
                }),
                Behavior::Fit => {
                    progress.send_update("Comparing interests").await?;
                    Ok(StageArtifact::FitAnalysis(FitAnalysis {
                        overall_fit: "high".to_string(),
                        ..Default::default()
                    }))
                }
                Behavior::EmailFromFit => {
                    let fit = ctx.fit_analysis()?;
                    Ok(StageArtifact::Email(EmailDraft {
                        body: format!("Fit was {}", fit.overall_fit),
                        word_count: 3,
                        ..Default::default()
                    }))
                }
                Behavior::FetchTimesOut => {
                    let text: String = with_timeout(
                        "paper fetch",
                        Duration::from_secs(30),
                        std::future::pending(),
                    )
                    .await?;
                    Ok(StageArtifact::Email(EmailDraft {
                        body: text,
                        ..Default::default()
                    }))
                }
                Behavior::CancelMidway(token) => {
                    token.cancel();
                    progress.send_update("never delivered").await?;
                    Ok(StageArtifact::Email(EmailDraft::default()))
                }
            }
        }
    }

    fn input() -> ApplicationRequest {
        ApplicationRequest {
            professor_name: "Barbara Liskov".to_string(),
            university: "MIT".to_string(),
            cv: Upload {
                bytes: vec![1, 2, 3],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn statuses(events: &[PipelineEvent]) -> Vec<StageStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_successful_run_streams_ordered_statuses() {
        let (tx, mut rx) = mpsc::channel(256);
        let (profile, _) = FakeStage::boxed("CV Parser", Behavior::Profile);
        let (fit, _) = FakeStage::boxed("Fit Analyzer", Behavior::Fit);
        let (email, _) = FakeStage::boxed("Email Writer", Behavior::EmailFromFit);
        let coordinator =
            Coordinator::with_stages(CoordinatorConfig::default(), vec![profile, fit, email])
                .with_event_channel(tx);

        let result = coordinator.run(input()).await;
        let events = drain(&mut rx);

        assert!(result.success);
        assert_eq!(result.email.unwrap().body, "Fit was high");
        assert_eq!(result.user_profile.unwrap().name, "Grace");

        let statuses = statuses(&events);
        assert!(statuses.windows(2).all(|w| w[0].step <= w[1].step));
        assert!(statuses.windows(2).all(|w| w[0].elapsed_ms <= w[1].elapsed_ms));
        assert_eq!(statuses[0].state, StageState::Running);
        assert_eq!(statuses[1].current_action, "Working on it...");

        let fit_complete = statuses
            .iter()
            .find(|s| s.step == 2 && s.state == StageState::Complete)
            .unwrap();
        assert_eq!(fit_complete.current_action, "Fit: high");
        assert_eq!(fit_complete.progress, 100);
        assert!(fit_complete.output.is_some());

        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert!(matches!(events.last(), Some(PipelineEvent::Complete(_))));
        assert!(result.stages.iter().all(|s| s.state == StageState::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_fetch_fails_run_and_keeps_earlier_artifacts() {
        let (tx, mut rx) = mpsc::channel(256);
        let (fit, _) = FakeStage::boxed("Fit Analyzer", Behavior::Fit);
        let (stalled, _) = FakeStage::boxed("Paper Selector", Behavior::FetchTimesOut);
        let (email, email_calls) = FakeStage::boxed("Email Writer", Behavior::EmailFromFit);
        let coordinator =
            Coordinator::with_stages(CoordinatorConfig::default(), vec![fit, stalled, email])
                .with_event_channel(tx);

        let result = coordinator.run(input()).await;
        let events = drain(&mut rx);

        assert!(!result.success);
        assert_eq!(result.fit_analysis.unwrap().overall_fit, "high");
        assert!(result.email.is_none());
        let error = result.error.unwrap();
        assert!(error.starts_with("Paper Selector failed"));
        assert!(error.contains("timed out"));

        assert_eq!(email_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.stages[1].state, StageState::Error);
        assert_eq!(result.stages[2].state, StageState::Pending);
        assert!(statuses(&events).iter().all(|s| s.step <= 2));
        assert!(matches!(events.last(), Some(PipelineEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_emission() {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(256);
        let (fit, _) = FakeStage::boxed("Fit Analyzer", Behavior::Fit);
        let (cancel, _) =
            FakeStage::boxed("Paper Selector", Behavior::CancelMidway(token.clone()));
        let (email, email_calls) = FakeStage::boxed("Email Writer", Behavior::EmailFromFit);
        let coordinator =
            Coordinator::with_stages(CoordinatorConfig::default(), vec![fit, cancel, email])
                .with_event_channel(tx)
                .with_cancellation(token);

        let result = coordinator.run(input()).await;
        let events = drain(&mut rx);

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("run cancelled"));
        assert!(result.fit_analysis.is_some());
        assert_eq!(email_calls.load(Ordering::SeqCst), 0);
        assert!(events.iter().all(|e| !e.is_terminal()));
        assert!(statuses(&events)
            .iter()
            .all(|s| s.step < 2 || s.state == StageState::Running));
        assert!(statuses(&events).iter().all(|s| s.step <= 2));
    }

    #[tokio::test]
    async fn test_dropped_receiver_cancels_run() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let (fit, fit_calls) = FakeStage::boxed("Fit Analyzer", Behavior::Fit);
        let coordinator =
            Coordinator::with_stages(CoordinatorConfig::default(), vec![fit]).with_event_channel(tx);

        let result = coordinator.run(input()).await;
        assert!(!result.success);
        assert_eq!(fit_calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_second_write_to_artifact_fails_stage() {
        let (first, _) = FakeStage::boxed("Fit Analyzer", Behavior::Fit);
        let (second, _) = FakeStage::boxed("Fit Analyzer Again", Behavior::Fit);
        let coordinator = Coordinator::with_stages(CoordinatorConfig::default(), vec![first, second]);

        let result = coordinator.run(input()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("already merged"));
        assert!(result.fit_analysis.is_some());
    }

    #[tokio::test]
    async fn test_missing_upstream_artifact_is_stage_fatal() {
        let (email, _) = FakeStage::boxed("Email Writer", Behavior::EmailFromFit);
        let coordinator = Coordinator::with_stages(CoordinatorConfig::default(), vec![email]);

        let result = coordinator.run(input()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("fitAnalysis"));
    }
}
