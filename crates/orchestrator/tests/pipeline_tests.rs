use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use events::{ChannelSubscriber, ProgressEvent, ProgressKind};
use insights_core::{
    AnalysisSession, BusinessContext, Campaign, ClassificationReport, MenuImage, MenuItem,
    PredictionSet, RestaurantProfile, Stage, StageInputs, StageState,
};
use orchestrator::analyzers::{
    AnalyzerResult, CampaignGenerator, MenuExtraction, MenuExtractor,
};
use orchestrator::{
    AnalyzerError, Analyzers, InMemoryRegistry, PipelineError, PipelineOrchestrator, Requirement,
    StageContext, StageError, StageHandler, StatusPoller,
};
use store::{JsonFileStore, MemoryStore, SessionStore};
use tokio::sync::Notify;
use uuid::Uuid;

/// Returns the same three dishes for every image and counts calls.
#[derive(Default)]
struct StubMenu {
    calls: AtomicUsize,
}

#[async_trait]
impl MenuExtractor for StubMenu {
    async fn extract(&self, _image: &MenuImage) -> AnalyzerResult<MenuExtraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MenuExtraction {
            items: vec![
                MenuItem::new("Margherita", 11.0).with_cost(3.0),
                MenuItem::new("Lasagna", 14.0).with_cost(6.0),
                MenuItem::new("Tiramisu", 7.0).with_cost(2.0),
            ],
            confidence: 0.9,
        })
    }
}

struct BrokenCampaigns;

#[async_trait]
impl CampaignGenerator for BrokenCampaigns {
    async fn generate(
        &self,
        _classification: &ClassificationReport,
        _predictions: Option<&PredictionSet>,
    ) -> AnalyzerResult<Vec<Campaign>> {
        Err(AnalyzerError::Failed("copywriter offline".to_string()))
    }
}

/// Holds the first save that carries `gate_at` checkpoints until released.
struct GatedStore {
    inner: Arc<MemoryStore>,
    gate_at: usize,
    tripped: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(inner: Arc<MemoryStore>, gate_at: usize) -> Self {
        Self {
            inner,
            gate_at,
            tripped: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    async fn wait_until_held(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .unwrap();
    }
}

#[async_trait]
impl SessionStore for GatedStore {
    async fn save(&self, session: &AnalysisSession) -> store::Result<()> {
        if session.checkpoints.len() == self.gate_at && !self.tripped.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.save(session).await
    }

    async fn load(&self, id: Uuid) -> Option<AnalysisSession> {
        self.inner.load(id).await
    }

    async fn delete(&self, id: Uuid) -> store::Result<bool> {
        self.inner.delete(id).await
    }

    async fn list_ids(&self) -> store::Result<Vec<Uuid>> {
        self.inner.list_ids().await
    }
}

/// Writes a budget that cannot be serialized faithfully.
struct InfiniteBudget;

#[async_trait]
impl StageHandler for InfiniteBudget {
    fn stage(&self) -> Stage {
        Stage::ContextProcessing
    }

    fn requirement(&self) -> Requirement {
        Requirement::None
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        ctx.session.data.business_context = Some(BusinessContext {
            budget: Some(f64::INFINITY),
            ..Default::default()
        });
        ctx.think("Budget read", vec![], vec![], 0.5);
        Ok(())
    }
}

const SCENARIO_A: [Stage; 4] = [
    Stage::MenuExtraction,
    Stage::BcgClassification,
    Stage::SalesPrediction,
    Stage::CampaignGeneration,
];

fn orchestrator_with(store: Arc<dyn SessionStore>, analyzers: Analyzers) -> PipelineOrchestrator {
    PipelineOrchestrator::new(store).with_analyzers(analyzers)
}

fn working_analyzers() -> Analyzers {
    Analyzers::default().with_menu_extractor(Arc::new(StubMenu::default()))
}

fn menu_only() -> StageInputs {
    StageInputs::default().with_menu_image(MenuImage::new(vec![1, 2, 3]))
}

fn profile() -> RestaurantProfile {
    RestaurantProfile::new("Trattoria Roma").with_cuisine("italian")
}

#[tokio::test]
async fn test_menu_only_run_checkpoints_strategy_stages() {
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
    let id = orchestrator.create_session(profile()).await.unwrap();

    let report = orchestrator.run(id, menu_only()).await.unwrap();

    let stages: Vec<Stage> = report.checkpoints.iter().map(|c| c.stage).collect();
    assert_eq!(stages, SCENARIO_A.to_vec());
    assert!(report.checkpoints.iter().all(|c| c.success));
    assert_eq!(report.status, Stage::Completed);
    assert!(report.data.sales_records.is_none());
    assert!(report.data.campaigns.as_ref().is_some_and(|c| !c.is_empty()));
    assert_eq!(report.skipped.len(), Stage::PIPELINE.len() - SCENARIO_A.len());

    let status = orchestrator.get_status(id).await.unwrap();
    assert_eq!(status.current_stage, Stage::Completed);
    assert_eq!(status.progress, 1.0);
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn test_failing_stage_halts_with_last_success() {
    let analyzers = working_analyzers().with_campaign_generator(Arc::new(BrokenCampaigns));
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), analyzers);
    let id = orchestrator.create_session(profile()).await.unwrap();

    let err = orchestrator.run(id, menu_only()).await.unwrap_err();

    match err {
        PipelineError::StageExecution {
            session_id,
            stage,
            last_successful_stage,
            message,
            partial,
        } => {
            assert_eq!(session_id, id);
            assert_eq!(stage, Stage::CampaignGeneration);
            assert_eq!(last_successful_stage, Some(Stage::SalesPrediction));
            assert!(message.contains("copywriter offline"));
            assert!(partial.predictions.is_some());
            assert!(partial.campaigns.is_none());
        }
        other => panic!("unexpected error: {other}"),
    }

    let status = orchestrator.get_status(id).await.unwrap();
    assert_eq!(status.current_stage, Stage::Failed);
    let last = status.checkpoints.last().unwrap();
    assert_eq!(last.stage, Stage::CampaignGeneration);
    assert!(!last.success);
    assert!(last.error.is_some());
    assert!(status.checkpoints.iter().all(|c| c.stage <= Stage::CampaignGeneration));
    assert_eq!(
        status
            .stages
            .iter()
            .find(|s| s.stage == Stage::Verification)
            .map(|s| s.state),
        Some(StageState::Pending)
    );
}

#[tokio::test]
async fn test_resume_after_failure_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let analyzers = working_analyzers().with_campaign_generator(Arc::new(BrokenCampaigns));
        let orchestrator = orchestrator_with(store, analyzers);
        let id = orchestrator.create_session(profile()).await.unwrap();
        assert!(orchestrator.run(id, menu_only()).await.is_err());
        id
    };

    // Fresh process: empty registry, same directory.
    let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
    let menu = Arc::new(StubMenu::default());
    let orchestrator = orchestrator_with(
        store,
        Analyzers::default().with_menu_extractor(menu.clone()),
    );

    let resumed = orchestrator.resume(id).await.unwrap();
    assert_eq!(resumed.resume_point, Stage::SalesPrediction);
    assert_eq!(orchestrator.registry().get(id).map(|s| s.id), Some(id));

    let report = orchestrator.run(id, menu_only()).await.unwrap();

    assert_eq!(menu.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.status, Stage::Completed);
    let succeeded: Vec<Stage> = report
        .checkpoints
        .iter()
        .filter(|c| c.success)
        .map(|c| c.stage)
        .collect();
    assert_eq!(succeeded, SCENARIO_A.to_vec());
    assert!(report
        .checkpoints
        .windows(2)
        .all(|pair| pair[0].stage <= pair[1].stage));
    assert!(report.data.campaigns.is_some());
}

#[tokio::test]
async fn test_missing_sales_skips_dependent_stages() {
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
    let id = orchestrator.create_session(profile()).await.unwrap();
    let inputs = menu_only()
        .with_reviews(vec![
            "Delicious pasta and friendly staff".to_string(),
            "Slow service, cold pizza".to_string(),
        ])
        .with_business_context("We want to grow weekday lunch covers. Budget is $1,000.");

    let report = orchestrator.run(id, inputs).await.unwrap();

    for stage in [Stage::DataIngestion, Stage::SalesProcessing, Stage::Verification] {
        assert!(report.checkpoints.iter().all(|c| c.stage != stage));
        assert!(report.skipped.iter().any(|s| s.stage == stage));
    }
    assert!(report.data.sales_records.is_none());
    assert!(report.data.sales_summary.is_none());
    assert!(report.data.verification.is_none());
    assert!(report.data.sentiment.is_some());
    assert_eq!(report.data.business_context.as_ref().and_then(|c| c.budget), Some(1000.0));
}

#[tokio::test]
async fn test_sales_csv_feeds_classification() {
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
    let id = orchestrator.create_session(profile()).await.unwrap();
    let csv = "date,item,quantity,price\n\
               2024-03-01,Margherita,30,11.0\n\
               2024-03-01,Lasagna,5,14.0\n\
               2024-03-02,Tiramisu,12,7.0\n";

    let report = orchestrator
        .run(id, menu_only().with_sales_csv(csv))
        .await
        .unwrap();

    let summary = report.data.sales_summary.as_ref().unwrap();
    assert_eq!(summary.total_units, 47);
    assert_eq!(summary.days, 2);
    assert!(report.data.verification.as_ref().unwrap().verified);
    assert!(report
        .checkpoints
        .iter()
        .any(|c| c.stage == Stage::Verification && c.success));
}

#[tokio::test]
async fn test_profile_override_enables_discovery() {
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
    let id = orchestrator.create_session(profile()).await.unwrap();
    let inputs = StageInputs {
        profile: Some(profile().with_location("Bologna")),
        ..menu_only()
    };

    let report = orchestrator.run(id, inputs).await.unwrap();

    // Discovery has no backend, so it completes empty and enrichment is skipped.
    assert!(report
        .checkpoints
        .iter()
        .any(|c| c.stage == Stage::CompetitorDiscovery && c.success));
    assert_eq!(report.data.competitors.as_deref().map(<[_]>::len), Some(0));
    assert!(report.skipped.iter().any(|s| s.stage == Stage::CompetitorEnrichment));

    let status = orchestrator.get_status(id).await.unwrap();
    assert_eq!(status.profile.location.as_deref(), Some("Bologna"));
}

#[tokio::test]
async fn test_completed_session_is_not_rerun() {
    let menu = Arc::new(StubMenu::default());
    let orchestrator = orchestrator_with(
        Arc::new(MemoryStore::new()),
        Analyzers::default().with_menu_extractor(menu.clone()),
    );
    let id = orchestrator.create_session(profile()).await.unwrap();

    let first = orchestrator.run(id, menu_only()).await.unwrap();
    let second = orchestrator.run(id, menu_only()).await.unwrap();

    assert_eq!(menu.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unknown_session() {
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
    let id = uuid::Uuid::new_v4();

    assert!(orchestrator.get_status(id).await.is_none());
    assert!(orchestrator.resume(id).await.is_none());
    assert!(matches!(
        orchestrator.run(id, menu_only()).await,
        Err(PipelineError::SessionNotFound(missing)) if missing == id
    ));
}

#[tokio::test]
async fn test_corrupt_record_reads_as_unknown() {
    let store = Arc::new(MemoryStore::new());
    let id = uuid::Uuid::new_v4();
    store.insert_raw(id, "{\"id\": 12");
    let orchestrator = orchestrator_with(store, working_analyzers());

    assert!(orchestrator.get_status(id).await.is_none());
}

#[tokio::test]
async fn test_mark_failed_then_rerun() {
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
    let id = orchestrator.create_session(profile()).await.unwrap();

    let stopped = orchestrator.mark_failed(id, "operator stop").await.unwrap();
    assert!(stopped.is_failed());
    assert_eq!(stopped.last_error.as_deref(), Some("operator stop"));

    let report = orchestrator.run(id, menu_only()).await.unwrap();
    assert_eq!(report.status, Stage::Completed);

    assert!(matches!(
        orchestrator.mark_failed(id, "too late").await,
        Err(PipelineError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_list_sessions() {
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
    let a = orchestrator.create_session(profile()).await.unwrap();
    let b = orchestrator.create_session(profile()).await.unwrap();
    orchestrator.run(b, menu_only()).await.unwrap();

    let listed = orchestrator.list_sessions().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed
        .iter()
        .any(|e| e.session_id == a && e.current_stage == Stage::Initialized));
    assert!(listed
        .iter()
        .any(|e| e.session_id == b && e.current_stage == Stage::Completed));
}

fn is_transition(event: &ProgressEvent) -> bool {
    !matches!(
        event.kind,
        ProgressKind::StageStarted | ProgressKind::Thought { .. }
    )
}

#[tokio::test]
async fn test_push_and_pull_observe_the_same_transitions() {
    let orchestrator = Arc::new(orchestrator_with(
        Arc::new(MemoryStore::new()),
        working_analyzers(),
    ));
    let id = orchestrator.create_session(profile()).await.unwrap();
    let (subscriber, mut rx) = ChannelSubscriber::new(1024);
    orchestrator.subscribe_progress(id, Arc::new(subscriber));

    orchestrator.run(id, menu_only()).await.unwrap();

    let mut pushed = Vec::new();
    loop {
        let envelope = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let terminal = envelope.event.kind.is_terminal();
        pushed.push(envelope.event);
        if terminal {
            break;
        }
    }
    assert!(pushed
        .iter()
        .any(|e| matches!(e.kind, ProgressKind::Thought { .. })));
    let pushed: Vec<ProgressEvent> = pushed.into_iter().filter(is_transition).collect();

    let mut poller = StatusPoller::new(orchestrator.clone(), id);
    let pulled = poller.poll_once().await.unwrap();

    assert_eq!(pushed, pulled);
    assert!(orchestrator.unsubscribe_progress(id));
}

#[tokio::test]
async fn test_poller_stream_ends_on_failure() {
    use futures::StreamExt;

    let analyzers = working_analyzers().with_campaign_generator(Arc::new(BrokenCampaigns));
    let orchestrator = Arc::new(orchestrator_with(Arc::new(MemoryStore::new()), analyzers));
    let id = orchestrator.create_session(profile()).await.unwrap();
    let _ = orchestrator.run(id, menu_only()).await;

    let events: Vec<ProgressEvent> = StatusPoller::new(orchestrator, id)
        .with_interval(Duration::from_millis(10))
        .into_stream()
        .collect()
        .await;

    let last = events.last().unwrap();
    assert!(matches!(
        &last.kind,
        ProgressKind::PipelineFailed { last_successful_stage: Some(Stage::SalesPrediction), .. }
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, ProgressKind::StageFailed { .. })));
}

fn succeeded_stages(report: &orchestrator::PipelineReport) -> Vec<Stage> {
    report
        .checkpoints
        .iter()
        .filter(|c| c.success)
        .map(|c| c.stage)
        .collect()
}

#[tokio::test]
async fn test_out_of_range_price_row_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let csv = "date,item,quantity,price\n\
               2024-01-01,Margherita,10,1e308\n\
               2024-01-02,Margherita,2,11.0\n";
    let id = {
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let orchestrator = orchestrator_with(store, working_analyzers());
        let id = orchestrator.create_session(profile()).await.unwrap();
        let report = orchestrator
            .run(id, menu_only().with_sales_csv(csv))
            .await
            .unwrap();
        assert_eq!(report.status, Stage::Completed);
        assert_eq!(report.data.sales_records.as_ref().map(Vec::len), Some(1));
        id
    };

    let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
    let orchestrator = orchestrator_with(store, working_analyzers());
    let status = orchestrator.get_status(id).await.unwrap();
    assert_eq!(status.current_stage, Stage::Completed);
}

#[tokio::test]
async fn test_unstorable_stage_result_fails_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let orchestrator =
            orchestrator_with(store, working_analyzers()).with_handler(Arc::new(InfiniteBudget));
        let id = orchestrator.create_session(profile()).await.unwrap();

        match orchestrator.run(id, menu_only()).await {
            Err(PipelineError::StageExecution { stage, message, partial, .. }) => {
                assert_eq!(stage, Stage::ContextProcessing);
                assert!(message.contains("could not be persisted"));
                assert!(partial.business_context.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        id
    };

    let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
    let orchestrator = orchestrator_with(store, working_analyzers());
    let status = orchestrator.get_status(id).await.unwrap();
    assert_eq!(status.current_stage, Stage::Failed);
    let last = status.checkpoints.last().unwrap();
    assert_eq!(last.stage, Stage::ContextProcessing);
    assert!(!last.success);
}

#[tokio::test]
async fn test_mark_failed_during_checkpoint_save_is_kept() {
    let inner = Arc::new(MemoryStore::new());
    let store = Arc::new(GatedStore::new(inner.clone(), 1));
    let orchestrator = Arc::new(orchestrator_with(store.clone(), working_analyzers()));
    let id = orchestrator.create_session(profile()).await.unwrap();

    let run = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run(id, menu_only()).await }
    });
    store.wait_until_held().await;

    let stopped = orchestrator.mark_failed(id, "operator stop").await.unwrap();
    assert!(stopped.is_failed());
    store.release.notify_one();

    match run.await.unwrap() {
        Err(PipelineError::Stopped { session_id, reason }) => {
            assert_eq!(session_id, id);
            assert_eq!(reason, "operator stop");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let status = orchestrator.get_status(id).await.unwrap();
    assert!(status.is_failed());
    assert_eq!(status.last_error.as_deref(), Some("operator stop"));
    let stored = inner.load(id).await.unwrap();
    assert!(stored.is_failed());
    assert!(stored.checkpoints.is_empty());

    let report = orchestrator.run(id, menu_only()).await.unwrap();
    assert_eq!(succeeded_stages(&report), SCENARIO_A.to_vec());
}

#[tokio::test]
async fn test_in_flight_session_rejects_second_run_and_delete() {
    let inner = Arc::new(MemoryStore::new());
    let store = Arc::new(GatedStore::new(inner, 1));
    let orchestrator = Arc::new(orchestrator_with(store.clone(), working_analyzers()));
    let id = orchestrator.create_session(profile()).await.unwrap();

    let run = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run(id, menu_only()).await }
    });
    store.wait_until_held().await;

    assert!(orchestrator.is_running(id));
    assert!(matches!(
        orchestrator.run(id, menu_only()).await,
        Err(PipelineError::InvalidState(_))
    ));
    assert!(matches!(
        orchestrator.delete_session(id).await,
        Err(PipelineError::InvalidState(_))
    ));

    store.release.notify_one();
    assert_eq!(run.await.unwrap().unwrap().status, Stage::Completed);
    assert!(!orchestrator.is_running(id));
}

#[tokio::test]
async fn test_crash_mid_run_resumes_from_persisted_checkpoints() {
    let baseline = {
        let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers());
        let id = orchestrator.create_session(profile()).await.unwrap();
        orchestrator.run(id, menu_only()).await.unwrap()
    };

    let inner = Arc::new(MemoryStore::new());
    let gated = Arc::new(GatedStore::new(inner.clone(), 2));
    let crashed = Arc::new(orchestrator_with(gated.clone(), working_analyzers()));
    let id = crashed.create_session(profile()).await.unwrap();
    let run = tokio::spawn({
        let crashed = crashed.clone();
        async move { crashed.run(id, menu_only()).await }
    });
    gated.wait_until_held().await;
    run.abort();
    assert!(run.await.unwrap_err().is_cancelled());
    drop(crashed);

    let persisted = inner.load(id).await.unwrap();
    assert_eq!(persisted.checkpoints.len(), 1);

    // Fresh process over what reached the store.
    let menu = Arc::new(StubMenu::default());
    let orchestrator = orchestrator_with(
        inner,
        Analyzers::default().with_menu_extractor(menu.clone()),
    );
    let resumed = orchestrator.resume(id).await.unwrap();
    assert_eq!(resumed.resume_point, persisted.checkpoints[0].stage);

    let report = orchestrator.run(id, menu_only()).await.unwrap();

    assert_eq!(menu.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.checkpoints[..1], persisted.checkpoints[..]);
    assert_eq!(succeeded_stages(&report), SCENARIO_A.to_vec());
    assert_eq!(report.status, baseline.status);
    assert_eq!(report.data.menu, baseline.data.menu);
    assert_eq!(report.data.classification, baseline.data.classification);
    assert_eq!(
        report.data.campaigns.as_ref().map(Vec::len),
        baseline.data.campaigns.as_ref().map(Vec::len)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_stay_isolated() {
    let orchestrator = Arc::new(orchestrator_with(
        Arc::new(MemoryStore::new()),
        working_analyzers(),
    ));

    let mut sessions = Vec::new();
    for i in 0..8 {
        let name = format!("Kitchen {i}");
        let id = orchestrator
            .create_session(RestaurantProfile::new(name.clone()))
            .await
            .unwrap();
        let (subscriber, rx) = ChannelSubscriber::new(1024);
        orchestrator.subscribe_progress(id, Arc::new(subscriber));
        sessions.push((id, name, rx));
    }

    let runs = sessions.iter().map(|(id, _, _)| {
        let orchestrator = orchestrator.clone();
        let id = *id;
        tokio::spawn(async move { orchestrator.run(id, menu_only()).await })
    });
    let reports = futures::future::join_all(runs).await;

    for (report, (id, name, rx)) in reports.into_iter().zip(sessions.iter_mut()) {
        let report = report.unwrap().unwrap();
        assert_eq!(report.session_id, *id);
        assert_eq!(report.status, Stage::Completed);
        assert_eq!(succeeded_stages(&report), SCENARIO_A.to_vec());

        loop {
            let envelope = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(envelope.session_id, *id);
            if envelope.event.kind.is_terminal() {
                assert!(matches!(envelope.event.kind, ProgressKind::PipelineCompleted));
                break;
            }
        }

        let status = orchestrator.get_status(*id).await.unwrap();
        assert_eq!(status.profile.name, *name);
    }

    assert_eq!(orchestrator.list_sessions().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_list_includes_sessions_only_in_store() {
    let dir = tempfile::tempdir().unwrap();
    let (waiting, finished) = {
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let orchestrator = orchestrator_with(store, working_analyzers());
        let waiting = orchestrator.create_session(profile()).await.unwrap();
        let finished = orchestrator.create_session(profile()).await.unwrap();
        orchestrator.run(finished, menu_only()).await.unwrap();
        (waiting, finished)
    };

    let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
    let orchestrator = orchestrator_with(store, working_analyzers());
    assert!(orchestrator.registry().list().is_empty());

    let listed = orchestrator.list_sessions().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed
        .iter()
        .any(|e| e.session_id == waiting && e.current_stage == Stage::Initialized));
    assert!(listed
        .iter()
        .any(|e| e.session_id == finished && e.current_stage == Stage::Completed));
}

#[tokio::test]
async fn test_delete_session() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator_with(store.clone(), working_analyzers());
    let id = orchestrator.create_session(profile()).await.unwrap();
    orchestrator.run(id, menu_only()).await.unwrap();

    orchestrator.delete_session(id).await.unwrap();

    assert!(orchestrator.get_status(id).await.is_none());
    assert!(store.load(id).await.is_none());
    assert!(orchestrator.list_sessions().await.unwrap().is_empty());
    assert!(matches!(
        orchestrator.delete_session(id).await,
        Err(PipelineError::SessionNotFound(missing)) if missing == id
    ));
}

#[tokio::test]
async fn test_evicted_completed_session_reloads_from_store() {
    let registry = Arc::new(InMemoryRegistry::with_completed_capacity(1));
    let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), working_analyzers())
        .with_registry(registry.clone());
    let first = orchestrator.create_session(profile()).await.unwrap();
    let second = orchestrator.create_session(profile()).await.unwrap();
    orchestrator.run(first, menu_only()).await.unwrap();
    orchestrator.run(second, menu_only()).await.unwrap();

    assert_eq!(registry.completed_count(), 1);
    assert_eq!(registry.active_count(), 0);
    let status = orchestrator.get_status(first).await.unwrap();
    assert_eq!(status.current_stage, Stage::Completed);
    assert!(matches!(
        orchestrator.mark_failed(first, "too late").await,
        Err(PipelineError::InvalidState(_))
    ));
    assert_eq!(orchestrator.list_sessions().await.unwrap().len(), 2);
}
