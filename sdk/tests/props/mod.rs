//! Property tests for replay determinism and decision matching

use chrono::Utc;
use proptest::prelude::*;
use std::sync::Arc;
use weft_core::decision::{Decision, UpsertWorkflowSearchAttributesAttributes};
use weft_core::{
    decision_matches_event, EventAttributes, HistoryEvent, NoMoreHistory, SearchAttributes,
    WorkflowTaskResponse,
};
use weft_sdk::prelude::*;
use weft_sdk::testing::HistoryBuilder;
use weft_sdk::ExecutionCache;

/// Schedules `n` activities at once and completes with their results in order
async fn fan_out(ctx: Arc<dyn WorkflowContext>, input: Payload) -> WorkflowResult<Payload> {
    let n: u32 = serde_json::from_slice(&input)?;
    let steps = (0..n)
        .map(|_| ctx.execute_activity_raw("step", Vec::new(), ActivityOptions::default()))
        .collect::<Vec<_>>();
    let mut output = Vec::new();
    for result in futures::future::join_all(steps).await {
        output.extend(result?);
    }
    Ok(output)
}

fn cold_handler() -> WorkflowTaskHandler {
    let registry = WorkflowRegistry::new();
    registry.register_fn("fan-out", fan_out).unwrap();
    WorkflowTaskHandler::with_cache(
        Arc::new(registry),
        Arc::new(ExecutionCache::new(4)),
        WorkerOptions::new("default", "default-tl"),
    )
    .unwrap()
}

fn fan_out_history(n: u32, completed: &[u32]) -> HistoryBuilder {
    let mut history = HistoryBuilder::new()
        .workflow_started("fan-out", serde_json::to_vec(&n).unwrap())
        .decision_round();
    for id in 1..=n {
        history = history.activity_scheduled(&id.to_string(), "step", Vec::new());
    }
    for id in completed {
        history = history.activity_completed(&id.to_string(), id.to_string().into_bytes());
    }
    history.decision_task()
}

fn replay_once(history: &HistoryBuilder) -> (Vec<u8>, String) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let response = runtime
        .block_on(cold_handler().process_workflow_task(
            history.workflow_task(WorkflowExecution::new("fan-1", "run-1")),
            &NoMoreHistory,
        ))
        .unwrap();
    match response {
        WorkflowTaskResponse::DecisionTaskCompleted {
            decisions,
            decision_checksum,
            ..
        } => (serde_json::to_vec(&decisions).unwrap(), decision_checksum),
        other => panic!("unexpected response {:?}", other),
    }
}

fn completion_order() -> impl Strategy<Value = (u32, Vec<u32>)> {
    (1..6u32).prop_flat_map(|n| {
        let ids: Vec<u32> = (1..=n).collect();
        (
            Just(n),
            proptest::sample::subsequence(ids, 0..=n as usize).prop_shuffle(),
        )
    })
}

fn search_attributes(fields: &[(String, Vec<u8>)]) -> SearchAttributes {
    fields.iter().cloned().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_cold_replays_are_byte_identical((n, completed) in completion_order()) {
        let history = fan_out_history(n, &completed);

        let (first, first_checksum) = replay_once(&history);
        let (second, second_checksum) = replay_once(&history);

        prop_assert_eq!(first, second);
        prop_assert_eq!(first_checksum, second_checksum);
    }

    #[test]
    fn prop_all_results_complete_in_schedule_order((n, completed) in completion_order()) {
        let history = fan_out_history(n, &completed);
        let (decisions, _) = replay_once(&history);
        let decisions: Vec<Decision> = serde_json::from_slice(&decisions).unwrap();

        if completed.len() == n as usize {
            let expected: Vec<u8> = (1..=n).flat_map(|id| id.to_string().into_bytes()).collect();
            prop_assert!(matches!(
                &decisions[..],
                [Decision::CompleteWorkflowExecution(complete)] if complete.result == expected
            ));
        } else {
            prop_assert!(decisions.is_empty());
        }
    }

    #[test]
    fn prop_search_attribute_match_ignores_insertion_order(
        fields in proptest::collection::btree_map(
            "[a-z]{1,8}",
            proptest::collection::vec(any::<u8>(), 0..8),
            0..6,
        ),
        seed in any::<u64>(),
    ) {
        let ordered: Vec<(String, Vec<u8>)> = fields.into_iter().collect();
        let mut shuffled = ordered.clone();
        if !shuffled.is_empty() {
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
        }

        let decision = Decision::UpsertWorkflowSearchAttributes(
            UpsertWorkflowSearchAttributesAttributes {
                search_attributes: Some(search_attributes(&ordered)),
            },
        );
        let event = HistoryEvent::new(
            5,
            Utc::now(),
            EventAttributes::UpsertWorkflowSearchAttributes {
                search_attributes: Some(search_attributes(&shuffled)),
                decision_task_completed_event_id: 4,
            },
        );

        prop_assert!(decision_matches_event(&decision, &event));
    }
}
