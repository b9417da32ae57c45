//! Scenario tests for claim evaluation, submission and reconciliation.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::claims::{FileClaimStore, InMemoryClaimStore, TransitionOutcome};
    use crate::error::LedgerError;
    use crate::registry::{LandRecord, StaticLandRegistry};
    use crate::services::webhook_client::WebhookConfig;
    use crate::services::SimulatedLedger;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::watch;

    struct Harness {
        pipeline: Arc<ClaimPipeline>,
        ledger: Arc<SimulatedLedger>,
        store: Arc<InMemoryClaimStore>,
    }

    fn runtime() -> RuntimeConfig {
        RuntimeConfig {
            submit_timeout: Duration::from_millis(200),
            confirmation_timeout: Duration::from_millis(300),
            receipt_poll_interval: Duration::from_millis(10),
            reconcile_interval: Duration::from_millis(20),
            ..RuntimeConfig::default()
        }
    }

    fn registry() -> Arc<StaticLandRegistry> {
        let land = |land_id, farmer_id, crop: &str| LandRecord {
            land_id,
            farmer_id,
            crop_type: crop.to_string(),
            land_name: None,
            farmer_wallet: Some("0x8ba1f109551bd432803012645ac136ddd64dba72".to_string()),
        };
        Arc::new(StaticLandRegistry::with_lands([
            land(1, 10, "Wheat"),
            land(2, 20, "Maize"),
            land(3, 30, "Barley"),
        ]))
    }

    fn harness_with(
        ledger: SimulatedLedger,
        configure: impl FnOnce(ClaimPipelineBuilder) -> ClaimPipelineBuilder,
    ) -> Harness {
        let ledger = Arc::new(ledger);
        let store = Arc::new(InMemoryClaimStore::new());
        let builder = ClaimPipeline::builder(registry(), store.clone(), ledger.clone()).runtime(runtime());
        Harness {
            pipeline: Arc::new(configure(builder).build()),
            ledger,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(SimulatedLedger::new(), |b| b)
    }

    fn request(land_id: u64, farmer_id: u64, ndvi: f64, indicator: f64) -> EvaluateRequest {
        serde_json::from_value(json!({
            "farmer_id": farmer_id,
            "land_id": land_id,
            "model1": {
                "NDVI": ndvi, "SAVI": 0.45, "Chlorophyll_Content": 38.0,
                "Leaf_Area_Index": 2.4, "Temperature": 30.0, "Humidity": 52.0,
                "Rainfall": 85.0, "Soil_Moisture": 21.0,
                "Crop_Stress_Indicator": indicator
            },
            "model2": {
                "Expected_Yield": 3.2, "Crop_Stress_Indicator": indicator,
                "Canopy_Coverage": 65.0, "Pest_Damage": 6.0
            }
        }))
        .unwrap()
    }

    /// In-memory store that can refuse to record transactions and counts
    /// ledger outcomes that actually changed a claim
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryClaimStore,
        refuse_submissions: AtomicBool,
        settlements: AtomicUsize,
    }

    impl RecordingStore {
        fn refuse_submissions(&self, refuse: bool) {
            self.refuse_submissions.store(refuse, Ordering::SeqCst);
        }

        fn settlements(&self) -> usize {
            self.settlements.load(Ordering::SeqCst)
        }
    }

    impl ClaimStore for RecordingStore {
        fn create(&self, land_id: u64, farmer_id: u64) -> ClaimResult<ClaimRecord> {
            self.inner.create(land_id, farmer_id)
        }

        fn get(&self, id: ClaimId) -> ClaimResult<ClaimRecord> {
            self.inner.get(id)
        }

        fn transition(&self, id: ClaimId, transition: Transition) -> ClaimResult<TransitionOutcome> {
            let settles = matches!(transition, Transition::RecordLedgerOutcome { .. });
            if matches!(transition, Transition::RecordSubmission { .. })
                && self.refuse_submissions.load(Ordering::SeqCst)
            {
                return Err(ClaimError::storage("disk full"));
            }
            let outcome = self.inner.transition(id, transition)?;
            if settles && outcome.changed {
                self.settlements.fetch_add(1, Ordering::SeqCst);
            }
            Ok(outcome)
        }

        fn list(&self, status: Option<ClaimStatus>) -> ClaimResult<Vec<ClaimRecord>> {
            self.inner.list(status)
        }
    }

    fn recording_pipeline() -> (Arc<ClaimPipeline>, Arc<SimulatedLedger>, Arc<RecordingStore>) {
        let ledger = Arc::new(SimulatedLedger::new());
        let store = Arc::new(RecordingStore::default());
        let pipeline = ClaimPipeline::builder(registry(), store.clone(), ledger.clone())
            .runtime(runtime())
            .build();
        (Arc::new(pipeline), ledger, store)
    }

    fn transaction(response: &EvaluateResponse) -> TxHash {
        match &response.onchain_submission {
            OnchainSubmission::Submitted { transaction_id, .. } => transaction_id.clone(),
            other => panic!("expected a submitted transaction, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scenario_a_healthy_parcel() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(1, 10, 0.8, 10.0)).await.unwrap();

        assert!(!response.is_stressed);
        assert!(response.probability < 0.5);
        assert_eq!(response.probability, 0.41);
        assert_eq!(response.status, ClaimStatus::OnchainSubmitted);

        let (_, submission) = &h.ledger.submissions()[0];
        assert_eq!(submission.stress_level, 0);
        assert_eq!(submission.claim_id, response.claim_id.0);
    }

    #[tokio::test]
    async fn test_scenario_b_stressed_parcel() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();

        assert!(response.is_stressed);
        assert!(response.probability >= 0.5);
        assert!(response.payout_percentage > 50.0);
        assert_eq!(response.payout_percentage, 90.0);

        let (_, submission) = &h.ledger.submissions()[0];
        assert_eq!(submission.stress_level, 1);
        assert_eq!(submission.payout_scaled, 900_000);
    }

    #[tokio::test]
    async fn test_scenario_c_submission_then_settlement() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        let tx = transaction(&response);

        let claim = h.pipeline.claim(response.claim_id).unwrap();
        assert_eq!(claim.status(), ClaimStatus::OnchainSubmitted);
        assert_eq!(claim.onchain_status, Some(OnchainStatus::Pending));

        let pending = h.pipeline.tx_status(response.claim_id).await.unwrap();
        assert_eq!(pending.claim_status, ClaimStatus::OnchainSubmitted);
        assert!(pending.effects.is_none());

        h.ledger.confirm(&tx);
        let settled = h.pipeline.tx_status(response.claim_id).await.unwrap();
        assert_eq!(settled.claim_status, ClaimStatus::PaidOut);
        assert_eq!(settled.onchain_status, Some(OnchainStatus::Success));
        assert_eq!(settled.transaction_id, tx);
        assert!(settled.effects.unwrap().block_number.is_some());

        let again = h.pipeline.tx_status(response.claim_id).await.unwrap();
        assert_eq!(again.claim_status, ClaimStatus::PaidOut);
        assert_eq!(h.pipeline.claim(response.claim_id).unwrap().onchain_tx, Some(tx));
    }

    #[tokio::test]
    async fn test_healthy_claim_settles_without_payout() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(1, 10, 0.8, 10.0)).await.unwrap();
        h.ledger.confirm(&transaction(&response));

        let status = h.pipeline.tx_status(response.claim_id).await.unwrap();
        assert_eq!(status.claim_status, ClaimStatus::NoPayout);
    }

    #[tokio::test]
    async fn test_reverted_transaction_fails_claim() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        h.ledger.revert(&transaction(&response));

        let status = h.pipeline.tx_status(response.claim_id).await.unwrap();
        assert_eq!(status.claim_status, ClaimStatus::OnchainFailed);
        assert_eq!(status.onchain_status, Some(OnchainStatus::Failed));
    }

    #[tokio::test]
    async fn test_scenario_d_unreachable_ledger_keeps_verdict() {
        let h = harness();
        h.ledger.make_unreachable();

        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        assert_eq!(response.status, ClaimStatus::OnchainError);
        assert!(response.is_stressed);
        assert_eq!(response.payout_percentage, 90.0);
        match &response.onchain_submission {
            OnchainSubmission::Error { error } => assert!(error.contains("connection refused")),
            other => panic!("expected submission error, got {other:?}"),
        }

        let claim = h.pipeline.claim(response.claim_id).unwrap();
        assert_eq!(claim.status(), ClaimStatus::OnchainError);
        assert!(claim.onchain_tx.is_none());
        let verdict = claim.verdict.unwrap();
        assert!(verdict.is_stressed);
        assert_eq!(verdict.payout_percentage, 90.0);

        assert!(matches!(
            h.pipeline.tx_status(response.claim_id).await,
            Err(ClaimError::NoSubmission { .. })
        ));
    }

    #[tokio::test]
    async fn test_resubmission_after_error() {
        let h = harness();
        h.ledger.reject_submissions("nonce too low");
        let response = h.pipeline.submit_claim(request(1, 10, 0.3, 60.0)).await.unwrap();
        assert_eq!(response.status, ClaimStatus::OnchainError);

        h.ledger.accept_submissions();
        let record = h.pipeline.submit_verdict(response.claim_id).await.unwrap();
        assert_eq!(record.status(), ClaimStatus::OnchainSubmitted);
        assert_eq!(record.submission_attempts, 2);
        assert_eq!(h.ledger.submission_count(), 1);

        let err = h.pipeline.submit_verdict(response.claim_id).await.unwrap_err();
        assert!(matches!(err, ClaimError::DuplicateSubmission { .. }));
        assert_eq!(h.ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_scenario_e_unknown_crop_encodes_as_zero() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(3, 30, 0.5, 40.0)).await.unwrap();

        let claim = h.pipeline.claim(response.claim_id).unwrap();
        let features = claim.features.unwrap();
        assert_eq!(features.crop_type.as_deref(), Some("Barley"));
        // Unmapped crops share Wheat's code.
        assert_eq!(features.payout.crop_type_encoded, 0.0);
    }

    #[tokio::test]
    async fn test_submission_timeout_resolves_to_error() {
        let h = harness();
        h.ledger.stall_submissions(Duration::from_secs(10));

        let response = h.pipeline.submit_claim(request(1, 10, 0.2, 70.0)).await.unwrap();
        assert_eq!(response.status, ClaimStatus::OnchainError);
        let claim = h.pipeline.claim(response.claim_id).unwrap();
        assert!(claim.submission_error.unwrap().contains("timeout"));
        assert_eq!(h.ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_reference_creates_nothing() {
        let h = harness();
        let err = h.pipeline.submit_claim(request(1, 20, 0.5, 0.0)).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::InvalidReference {
                land_id: 1,
                farmer_id: 20
            }
        ));
        assert!(err.is_user_error());
        assert!(h.store.list(None).unwrap().is_empty());
        assert_eq!(h.ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_features_leave_claim_unevaluated() {
        let h = harness();
        let claim = h.pipeline.create_claim(2, 20).unwrap();
        let mut req = request(2, 20, 0.5, 20.0);
        req.model1.remove("Humidity");

        let err = h
            .pipeline
            .evaluate(claim.id, &req.model1, &req.model2)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::IncompleteFeatures { schema: "stress", .. }));
        assert_eq!(h.pipeline.claim(claim.id).unwrap().status(), ClaimStatus::Submitted);

        // The claim can still be evaluated once the payload is complete.
        let full = request(2, 20, 0.5, 20.0);
        let response = h.pipeline.evaluate(claim.id, &full.model1, &full.model2).await.unwrap();
        assert_eq!(response.claim_id, claim.id);
    }

    #[tokio::test]
    async fn test_reevaluation_is_rejected() {
        let h = harness();
        let req = request(1, 10, 0.8, 10.0);
        let response = h.pipeline.submit_claim(req.clone()).await.unwrap();

        let err = h
            .pipeline
            .evaluate(response.claim_id, &req.model1, &req.model2)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyEvaluated { .. }));
        assert_eq!(h.ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_status_of_unknown_claim() {
        let h = harness();
        let err = h.pipeline.tx_status(ClaimId(404)).await.unwrap_err();
        assert!(matches!(err, ClaimError::ClaimNotFound { claim_id: 404 }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_lookup_does_not_touch_claim() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        let before = h.pipeline.claim(response.claim_id).unwrap();

        h.ledger.fail_receipt_reads(1);
        let err = h.pipeline.tx_status(response.claim_id).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::Reconciliation {
                source: LedgerError::Unavailable { .. },
                ..
            }
        ));
        assert_eq!(h.pipeline.claim(response.claim_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_one_submission_in_flight_per_claim() {
        let h = harness();
        h.ledger.make_unreachable();
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        assert_eq!(response.status, ClaimStatus::OnchainError);

        h.ledger.stall_submissions(Duration::from_millis(50));
        let (first, second) = tokio::join!(
            h.pipeline.submit_verdict(response.claim_id),
            h.pipeline.submit_verdict(response.claim_id)
        );

        assert_eq!(first.unwrap().status(), ClaimStatus::OnchainSubmitted);
        assert!(matches!(second, Err(ClaimError::SubmissionInFlight { .. })));
        assert_eq!(h.ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_independent() {
        let h = harness();
        h.ledger.stall_submissions(Duration::from_millis(20));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let pipeline = Arc::clone(&h.pipeline);
                tokio::spawn(async move {
                    pipeline
                        .submit_claim(request(2, 20, 0.1 * f64::from(i), 50.0))
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.status, ClaimStatus::OnchainSubmitted);
            ids.push(response.claim_id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
        assert_eq!(h.ledger.submission_count(), 6);
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_mode() {
        let h = harness_with(SimulatedLedger::auto_settling(), |b| {
            b.mode(SubmissionMode::WaitForConfirmation)
        });
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        assert_eq!(response.status, ClaimStatus::PaidOut);
        match response.onchain_submission {
            OnchainSubmission::Submitted { onchain_status, .. } => {
                assert_eq!(onchain_status, OnchainStatus::Success)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_mode_gives_up_at_confirmation_timeout() {
        let h = harness_with(SimulatedLedger::new(), |b| {
            b.mode(SubmissionMode::WaitForConfirmation)
        });
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        assert_eq!(response.status, ClaimStatus::OnchainSubmitted);
    }

    #[tokio::test]
    async fn test_reconcile_pending_summary() {
        let h = harness();
        let paid = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        let waiting = h.pipeline.submit_claim(request(1, 10, 0.8, 10.0)).await.unwrap();
        h.ledger.make_unreachable();
        h.pipeline.submit_claim(request(1, 10, 0.5, 30.0)).await.unwrap();

        h.ledger.confirm(&transaction(&paid));
        let summary = h.pipeline.reconcile_pending().await.unwrap();
        assert_eq!(
            summary,
            ReconcileSummary {
                checked: 2,
                settled: 1,
                still_pending: 1,
                errors: 0,
            }
        );
        assert_eq!(
            h.pipeline.claim(waiting.claim_id).unwrap().status(),
            ClaimStatus::OnchainSubmitted
        );
        assert_eq!(h.pipeline.claims(Some(ClaimStatus::PaidOut)).unwrap().len(), 1);
        assert_eq!(h.pipeline.claims(Some(ClaimStatus::OnchainError)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_settles_queued_claims() {
        let (queue, receiver) = ReconcileQueue::channel();
        let h = harness_with(SimulatedLedger::new(), |b| b.reconcile_queue(queue));
        let worker = ReconcileWorker::new(h.pipeline.clone(), receiver, runtime().reconcile_interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = worker.spawn(shutdown_rx);

        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        h.ledger.confirm(&transaction(&response));

        let mut status = ClaimStatus::OnchainSubmitted;
        for _ in 0..100 {
            status = h.pipeline.claim(response.claim_id).unwrap().status();
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, ClaimStatus::PaidOut);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_worker_seeds_from_store_and_keeps_failed_lookups() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        let (_queue, receiver) = ReconcileQueue::channel();
        let mut worker = ReconcileWorker::new(h.pipeline.clone(), receiver, Duration::from_secs(1));

        assert_eq!(worker.seed().unwrap(), 1);

        h.ledger.fail_receipt_reads(1);
        let summary = worker.poll_once().await;
        assert_eq!(summary.errors, 1);
        assert_eq!(worker.pending(), vec![response.claim_id]);

        h.ledger.revert(&transaction(&response));
        let summary = worker.poll_once().await;
        assert_eq!(summary.settled, 1);
        assert!(worker.pending().is_empty());
        assert_eq!(
            h.pipeline.claim(response.claim_id).unwrap().status(),
            ClaimStatus::OnchainFailed
        );
    }

    #[tokio::test]
    async fn test_unrecorded_transaction_is_never_resent() {
        let (pipeline, ledger, store) = recording_pipeline();
        store.refuse_submissions(true);

        let response = pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        assert_eq!(response.status, ClaimStatus::Predicted);
        let tx = transaction(&response);
        assert_eq!(ledger.submissions()[0].0, tx);

        let err = pipeline.submit_verdict(response.claim_id).await.unwrap_err();
        assert!(matches!(err, ClaimError::Storage { .. }));
        assert_eq!(ledger.submission_count(), 1);

        store.refuse_submissions(false);
        let record = pipeline.submit_verdict(response.claim_id).await.unwrap();
        assert_eq!(record.status(), ClaimStatus::OnchainSubmitted);
        assert_eq!(record.onchain_tx, Some(tx));
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_records_held_transaction() {
        let (pipeline, ledger, store) = recording_pipeline();
        store.refuse_submissions(true);
        let response = pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        let tx = transaction(&response);

        store.refuse_submissions(false);
        ledger.confirm(&tx);
        let status = pipeline.tx_status(response.claim_id).await.unwrap();
        assert_eq!(status.claim_status, ClaimStatus::PaidOut);
        assert_eq!(status.transaction_id, tx);
        assert_eq!(ledger.submission_count(), 1);

        let err = pipeline.submit_verdict(response.claim_id).await.unwrap_err();
        assert!(matches!(err, ClaimError::DuplicateSubmission { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_reconciliation_settles_once() {
        let (pipeline, ledger, store) = recording_pipeline();
        let response = pipeline.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        ledger.confirm(&transaction(&response));

        let first = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.reconcile(response.claim_id).await }
        });
        let second = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.reconcile(response.claim_id).await }
        });
        let (first, second) = tokio::join!(first, second);

        for result in [first.unwrap(), second.unwrap()] {
            let (record, status) = result.unwrap();
            assert_eq!(record.status(), ClaimStatus::PaidOut);
            assert!(matches!(status, LedgerStatus::Success { .. }));
        }
        assert_eq!(store.settlements(), 1);
        assert_eq!(
            pipeline.claim(response.claim_id).unwrap().status(),
            ClaimStatus::PaidOut
        );
    }

    #[tokio::test]
    async fn test_worker_sees_claims_from_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());

        let watcher_store = Arc::new(FileClaimStore::open(dir.path()).unwrap());
        let watcher = Arc::new(
            ClaimPipeline::builder(registry(), watcher_store, ledger.clone())
                .runtime(runtime())
                .build(),
        );
        let (_queue, receiver) = ReconcileQueue::channel();
        let worker = ReconcileWorker::new(watcher, receiver, runtime().reconcile_interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = worker.spawn(shutdown_rx);

        // Separate store and pipeline on the same directory, no shared queue.
        let evaluator_store = Arc::new(FileClaimStore::open(dir.path()).unwrap());
        let evaluator = ClaimPipeline::builder(registry(), evaluator_store, ledger.clone())
            .runtime(runtime())
            .build();
        let response = evaluator.submit_claim(request(2, 20, 0.1, 90.0)).await.unwrap();
        ledger.confirm(&transaction(&response));

        let mut status = ClaimStatus::OnchainSubmitted;
        for _ in 0..100 {
            status = evaluator.claim(response.claim_id).unwrap().status();
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, ClaimStatus::PaidOut);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_disabled_webhook_is_reported_as_skipped() {
        let webhook = PredictionWebhook::new(WebhookConfig::default()).unwrap();
        let h = harness_with(SimulatedLedger::new(), |b| b.webhook(webhook));
        let response = h.pipeline.submit_claim(request(1, 10, 0.8, 10.0)).await.unwrap();
        assert!(matches!(
            response.notification,
            Some(NotificationOutcome::Skipped { .. })
        ));
        assert_eq!(response.status, ClaimStatus::OnchainSubmitted);
    }

    #[tokio::test]
    async fn test_response_serialization() {
        let h = harness();
        let response = h.pipeline.submit_claim(request(1, 10, 0.8, 10.0)).await.unwrap();
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status"], "onchain_submitted");
        assert_eq!(value["probability"], 0.41);
        assert!(value["onchain_submission"]["submitted"]["transaction_id"]
            .as_str()
            .unwrap()
            .starts_with("0x"));
        assert!(value.get("notification").is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn proptest_evaluation_is_deterministic(
            ndvi in 0.0f64..1.0,
            indicator in 0.0f64..100.0,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (a, b) = rt.block_on(async {
                let first = harness().pipeline.submit_claim(request(2, 20, ndvi, indicator)).await.unwrap();
                let second = harness().pipeline.submit_claim(request(2, 20, ndvi, indicator)).await.unwrap();
                (first, second)
            });

            prop_assert_eq!(a.is_stressed, b.is_stressed);
            prop_assert_eq!(a.probability, b.probability);
            prop_assert_eq!(a.payout_percentage, b.payout_percentage);
            prop_assert!((0.0..=1.0).contains(&a.probability));
            prop_assert!((0.0..=100.0).contains(&a.payout_percentage));
        }
    }
}
