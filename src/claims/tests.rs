//! Unit tests for claim lifecycle rules and claim stores.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::error::ClaimError;
    use crate::features::{FeatureMap, FeatureMerger, MergedFeatures};
    use crate::prediction::Verdict;
    use crate::services::ledger::TxHash;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn tx(n: u64) -> TxHash {
        TxHash::parse(&format!("0x{:064x}", n)).unwrap()
    }

    fn verdict(is_stressed: bool) -> Verdict {
        Verdict {
            is_stressed,
            stress_probability: if is_stressed { 0.92 } else { 0.31 },
            payout_percentage: if is_stressed { 64.25 } else { 3.0 },
            stress_model_version: "heuristic-stress-v1".to_string(),
            payout_model_version: "heuristic-payout-v1".to_string(),
        }
    }

    fn features() -> MergedFeatures {
        let stress: FeatureMap = serde_json::from_value(json!({
            "NDVI": 0.3, "SAVI": 0.2, "Chlorophyll_Content": 28.0,
            "Leaf_Area_Index": 1.4, "Temperature": 34.0, "Humidity": 30.0,
            "Rainfall": 12.0, "Soil_Moisture": 9.0
        }))
        .unwrap();
        let payout: FeatureMap = serde_json::from_value(json!({
            "Expected_Yield": 2.1, "Crop_Stress_Indicator": 70.0,
            "Canopy_Coverage": 40.0, "Pest_Damage": 12.0
        }))
        .unwrap();
        FeatureMerger::new().merge(&stress, &payout, "Maize").unwrap()
    }

    fn record_verdict(is_stressed: bool) -> Transition {
        Transition::RecordVerdict {
            verdict: verdict(is_stressed),
            features: features(),
        }
    }

    fn predicted_claim(is_stressed: bool) -> ClaimRecord {
        let mut claim = ClaimRecord::new(ClaimId(1), 10, 20, Utc::now());
        claim.apply(record_verdict(is_stressed), Utc::now()).unwrap();
        claim
    }

    #[test]
    fn test_new_claim_is_submitted() {
        let claim = ClaimRecord::new(ClaimId(1), 10, 20, Utc::now());
        assert_eq!(claim.status(), ClaimStatus::Submitted);
        assert!(claim.verdict.is_none());
    }

    #[test]
    fn test_verdict_is_write_once() {
        let mut claim = predicted_claim(true);
        assert_eq!(claim.status(), ClaimStatus::Predicted);

        let err = claim.apply(record_verdict(false), Utc::now()).unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyEvaluated { claim_id: 1 }));
        assert!(claim.verdict.as_ref().unwrap().is_stressed);
    }

    #[test]
    fn test_successful_settlement_paths() {
        let mut stressed = predicted_claim(true);
        assert!(stressed.apply(Transition::RecordSubmission { tx: tx(1) }, Utc::now()).unwrap());
        assert_eq!(stressed.status(), ClaimStatus::OnchainSubmitted);
        assert_eq!(stressed.onchain_status, Some(OnchainStatus::Pending));

        stressed
            .apply(
                Transition::RecordLedgerOutcome {
                    outcome: LedgerOutcome::Success,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(stressed.status(), ClaimStatus::PaidOut);

        let mut healthy = predicted_claim(false);
        healthy.apply(Transition::RecordSubmission { tx: tx(2) }, Utc::now()).unwrap();
        healthy
            .apply(
                Transition::RecordLedgerOutcome {
                    outcome: LedgerOutcome::Success,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(healthy.status(), ClaimStatus::NoPayout);
    }

    #[test]
    fn test_reverted_transaction() {
        let mut claim = predicted_claim(true);
        claim.apply(Transition::RecordSubmission { tx: tx(3) }, Utc::now()).unwrap();
        claim
            .apply(
                Transition::RecordLedgerOutcome {
                    outcome: LedgerOutcome::Failed,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(claim.status(), ClaimStatus::OnchainFailed);
        assert_eq!(claim.onchain_tx, Some(tx(3)));
    }

    #[test]
    fn test_repeated_outcome_is_noop() {
        let mut claim = predicted_claim(true);
        claim.apply(Transition::RecordSubmission { tx: tx(4) }, Utc::now()).unwrap();
        let success = Transition::RecordLedgerOutcome {
            outcome: LedgerOutcome::Success,
        };
        assert!(claim.apply(success.clone(), Utc::now()).unwrap());
        let settled_at = claim.updated_at;

        assert!(!claim.apply(success, Utc::now()).unwrap());
        assert_eq!(claim.updated_at, settled_at);

        let conflicting = Transition::RecordLedgerOutcome {
            outcome: LedgerOutcome::Failed,
        };
        assert!(matches!(
            claim.apply(conflicting, Utc::now()),
            Err(ClaimError::InvalidStateTransition { .. })
        ));
        assert_eq!(claim.status(), ClaimStatus::PaidOut);
    }

    #[test]
    fn test_transaction_is_never_overwritten() {
        let mut claim = predicted_claim(true);
        claim.apply(Transition::RecordSubmission { tx: tx(5) }, Utc::now()).unwrap();

        assert!(!claim.apply(Transition::RecordSubmission { tx: tx(5) }, Utc::now()).unwrap());
        let err = claim
            .apply(Transition::RecordSubmission { tx: tx(6) }, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ClaimError::DuplicateSubmission { .. }));
        assert_eq!(claim.onchain_tx, Some(tx(5)));
        assert_eq!(claim.submission_attempts, 1);
    }

    #[test]
    fn test_failure_keeps_verdict_and_allows_resubmission() {
        let mut claim = predicted_claim(true);
        let before = claim.verdict.clone();

        claim
            .apply(
                Transition::RecordSubmissionFailure {
                    reason: "connection refused".to_string(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(claim.status(), ClaimStatus::OnchainError);
        assert_eq!(claim.verdict, before);
        assert!(claim.onchain_tx.is_none());

        claim.apply(Transition::RecordSubmission { tx: tx(7) }, Utc::now()).unwrap();
        assert_eq!(claim.status(), ClaimStatus::OnchainSubmitted);
        assert!(claim.submission_error.is_none());
        assert_eq!(claim.submission_attempts, 2);
    }

    #[test]
    fn test_out_of_order_transitions_are_rejected() {
        let mut claim = ClaimRecord::new(ClaimId(9), 1, 1, Utc::now());
        assert!(claim.apply(Transition::RecordSubmission { tx: tx(8) }, Utc::now()).is_err());
        assert!(claim
            .apply(
                Transition::RecordSubmissionFailure {
                    reason: "x".to_string()
                },
                Utc::now()
            )
            .is_err());

        let mut claim = predicted_claim(false);
        assert!(claim
            .apply(
                Transition::RecordLedgerOutcome {
                    outcome: LedgerOutcome::Success
                },
                Utc::now()
            )
            .is_err());
        assert_eq!(claim.status(), ClaimStatus::Predicted);
    }

    #[test]
    fn test_status_names() {
        assert_eq!("onchain_error".parse::<ClaimStatus>(), Ok(ClaimStatus::OnchainError));
        assert!("settled".parse::<ClaimStatus>().is_err());
        assert_eq!(
            serde_json::to_value(ClaimStatus::OnchainSubmitted).unwrap(),
            json!("onchain_submitted")
        );
        for status in ClaimStatus::ALL {
            assert_eq!(status.as_str().parse::<ClaimStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryClaimStore::new();
        let first = store.create(10, 20).unwrap();
        let second = store.create(11, 20).unwrap();
        assert_eq!(first.id, ClaimId(1));
        assert_eq!(second.id, ClaimId(2));

        let outcome = store.transition(first.id, record_verdict(true)).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.record.status(), ClaimStatus::Predicted);

        assert_eq!(store.list(Some(ClaimStatus::Predicted)).unwrap().len(), 1);
        assert_eq!(store.list(Some(ClaimStatus::Submitted)).unwrap()[0].id, second.id);
        assert_eq!(store.list(None).unwrap().len(), 2);

        assert!(matches!(
            store.get(ClaimId(99)),
            Err(ClaimError::ClaimNotFound { claim_id: 99 })
        ));
    }

    #[test]
    fn test_failed_transition_leaves_store_untouched() {
        let store = InMemoryClaimStore::new();
        let claim = store.create(10, 20).unwrap();
        store.transition(claim.id, record_verdict(true)).unwrap();
        let before = store.get(claim.id).unwrap();

        assert!(store.transition(claim.id, record_verdict(false)).is_err());
        assert_eq!(store.get(claim.id).unwrap(), before);
    }

    #[test]
    fn test_file_store_round_trip_and_id_resume() {
        let dir = tempfile::tempdir().unwrap();
        let claims_dir = dir.path().join("claims");

        let submitted_tx = {
            let store = FileClaimStore::open(&claims_dir).unwrap();
            let claim = store.create(10, 20).unwrap();
            store.create(11, 21).unwrap();
            store.transition(claim.id, record_verdict(true)).unwrap();
            store
                .transition(claim.id, Transition::RecordSubmission { tx: tx(11) })
                .unwrap();
            tx(11)
        };

        assert!(claims_dir.join("1.json").exists());
        assert!(!claims_dir.join("1.tmp").exists());

        let reopened = FileClaimStore::open(&claims_dir).unwrap();
        let claim = reopened.get(ClaimId(1)).unwrap();
        assert_eq!(claim.status(), ClaimStatus::OnchainSubmitted);
        assert_eq!(claim.onchain_tx, Some(submitted_tx));
        assert_eq!(claim.features, Some(features()));

        let next = reopened.create(12, 22).unwrap();
        assert_eq!(next.id, ClaimId(3));
    }

    #[test]
    fn test_file_stores_share_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FileClaimStore::open(dir.path()).unwrap();
        let evaluator = FileClaimStore::open(dir.path()).unwrap();

        let claim = evaluator.create(10, 20).unwrap();
        evaluator.transition(claim.id, record_verdict(true)).unwrap();
        evaluator
            .transition(claim.id, Transition::RecordSubmission { tx: tx(7) })
            .unwrap();

        let pending = watcher.list(Some(ClaimStatus::OnchainSubmitted)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].onchain_tx, Some(tx(7)));

        watcher
            .transition(
                claim.id,
                Transition::RecordLedgerOutcome {
                    outcome: LedgerOutcome::Success,
                },
            )
            .unwrap();
        assert_eq!(evaluator.get(claim.id).unwrap().status(), ClaimStatus::PaidOut);
        assert_eq!(watcher.create(11, 21).unwrap().id, ClaimId(2));
    }

    #[test]
    fn test_file_store_rejects_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.json"), "{ truncated").unwrap();
        assert!(matches!(
            FileClaimStore::open(dir.path()),
            Err(ClaimError::Storage { .. })
        ));
    }

    #[test]
    fn test_concurrent_submissions_record_one_transaction() {
        let store = Arc::new(InMemoryClaimStore::new());
        let claim = store.create(10, 20).unwrap();
        store.transition(claim.id, record_verdict(true)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.transition(claim.id, Transition::RecordSubmission { tx: tx(100 + n) })
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|result| result.as_ref().map_or(false, |o| o.changed))
            .count();

        assert_eq!(accepted, 1);
        let stored = store.get(claim.id).unwrap();
        assert_eq!(stored.submission_attempts, 1);
        assert!(stored.onchain_tx.is_some());
    }

    fn arb_transition() -> impl Strategy<Value = Transition> {
        prop_oneof![
            any::<bool>().prop_map(record_verdict),
            (1u64..4).prop_map(|n| Transition::RecordSubmission { tx: tx(n) }),
            Just(Transition::RecordSubmissionFailure {
                reason: "timeout".to_string()
            }),
            Just(Transition::RecordLedgerOutcome {
                outcome: LedgerOutcome::Success
            }),
            Just(Transition::RecordLedgerOutcome {
                outcome: LedgerOutcome::Failed
            }),
        ]
    }

    proptest! {
        #[test]
        fn proptest_transitions_only_move_forward(
            transitions in proptest::collection::vec(arb_transition(), 1..24)
        ) {
            let mut claim = ClaimRecord::new(ClaimId(1), 1, 1, Utc::now());
            let mut first_tx: Option<TxHash> = None;

            for transition in transitions {
                let before = claim.clone();
                match claim.apply(transition, Utc::now()) {
                    Ok(_) => {
                        prop_assert!(before.status().can_advance_to(claim.status()));
                    }
                    Err(_) => {
                        prop_assert_eq!(&claim, &before);
                    }
                }

                if let Some(tx) = &claim.onchain_tx {
                    let recorded = first_tx.get_or_insert_with(|| tx.clone()).clone();
                    prop_assert_eq!(&recorded, tx);
                }
                if before.verdict.is_some() {
                    prop_assert_eq!(&before.verdict, &claim.verdict);
                }
            }
        }
    }
}
