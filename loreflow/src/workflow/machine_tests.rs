use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::config::{LoreflowConfig, PollingConfig};
use crate::core::{JobId, JobSnapshot, JobUpdate, LorePiece, StageKey};
use crate::errors::LoreflowError;
use crate::events::CollectingEventSink;
use crate::testing::{candidates_for, sample_story, ScriptStep, ScriptedBackend};

fn machine_with(backend: &Arc<ScriptedBackend>) -> (StageMachine, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let ctx = WorkflowContext::new(backend.clone()).with_events(sink.clone());
    (StageMachine::new(ctx), sink)
}

async fn complete_stage(machine: &mut StageMachine) {
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
    assert!(machine.select_index(0));
    assert!(machine.advance().await);
}

async fn drive_to_story(machine: &mut StageMachine) {
    machine.start().await;
    for _ in 0..5 {
        complete_stage(machine).await;
    }
    assert_eq!(machine.current_stage().key, StageKey::FinalStory);
}

#[test]
fn test_new_machine_is_idle() {
    let backend = Arc::new(ScriptedBackend::new());
    let (machine, _) = machine_with(&backend);

    assert_eq!(machine.phase(), StagePhase::Idle);
    assert_eq!(machine.current_stage().key, StageKey::Character);
    assert!(machine.job_id().is_none());
    assert_eq!(
        machine.progress(),
        StageProgress {
            position: 0,
            total: 6,
            completed: 0
        }
    );
    assert_eq!(backend.start_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_issues_first_job_without_lore() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, sink) = machine_with(&backend);

    machine.start().await;

    assert_eq!(machine.phase(), StagePhase::AwaitingJob);
    assert_eq!(machine.job_id().map(JobId::as_str), Some("job-1"));
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].stage, StageKey::Character);
    assert!(requests[0].selected_lore.is_empty());
    assert_eq!(
        sink.event_types(),
        vec!["workflow.stage_entered", "workflow.job_issued"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_settles_with_candidates() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, sink) = machine_with(&backend);

    machine.start().await;
    let phase = machine.wait_until_settled().await.unwrap();

    assert_eq!(phase, StagePhase::CandidatesReady);
    assert_eq!(machine.candidates(), candidates_for(StageKey::Character).as_slice());
    assert_eq!(machine.job_status().map(|s| s.progress), Some(100));
    assert_eq!(sink.events_of_type("workflow.job_succeeded").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_select_only_displayed_candidates() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, _) = machine_with(&backend);
    machine.start().await;

    // Nothing on display yet.
    assert!(!machine.select_index(0));

    machine.wait_until_settled().await.unwrap();
    let stranger = LorePiece::new("character", "Nobody", "Not generated here.");
    assert!(!machine.select(&stranger));
    assert!(!machine.select_index(9));
    assert!(machine.selection().is_none());

    assert!(machine.select_index(1));
    assert_eq!(machine.selection(), candidates_for(StageKey::Character).get(1));
    assert!(!machine.select_index(1));
    assert!(machine.select_index(2));
    assert_eq!(machine.selection().map(|s| s.name.as_str()), Some("Brother Ansel"));
}

#[tokio::test(start_paused = true)]
async fn test_advance_requires_selection() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, _) = machine_with(&backend);
    machine.start().await;
    machine.wait_until_settled().await.unwrap();

    assert!(!machine.can_advance());
    assert!(!machine.advance().await);
    assert_eq!(machine.current_stage().key, StageKey::Character);

    assert!(machine.select_index(0));
    assert!(machine.can_advance());
    assert!(machine.advance().await);

    assert_eq!(machine.current_stage().key, StageKey::Faction);
    assert!(machine.selection().is_none());
    assert!(machine.candidates().is_empty());
    let chosen = &candidates_for(StageKey::Character)[0];
    assert_eq!(machine.selected_lore().get(StageKey::Character), Some(chosen));

    let faction_requests = backend.requests_for(StageKey::Faction);
    assert_eq!(faction_requests.len(), 1);
    assert_eq!(faction_requests[0].selected_lore.stages(), vec![StageKey::Character]);
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_allowed_once_per_stage() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, sink) = machine_with(&backend);
    machine.start().await;
    machine.wait_until_settled().await.unwrap();
    assert!(machine.select_index(0));

    assert!(machine.can_regenerate());
    assert!(machine.regenerate().await);
    assert!(machine.has_regenerated());
    assert!(machine.selection().is_none());
    assert!(machine.candidates().is_empty());
    assert_eq!(machine.phase(), StagePhase::AwaitingJob);
    assert!(!machine.can_regenerate());

    machine.wait_until_settled().await.unwrap();
    assert!(!machine.can_regenerate());
    assert!(!machine.regenerate().await);
    assert_eq!(backend.start_calls(), 2);
    assert_eq!(sink.events_of_type("workflow.regenerated").len(), 1);

    // The allowance resets on the next stage.
    assert!(machine.select_index(0));
    assert!(machine.advance().await);
    machine.wait_until_settled().await.unwrap();
    assert!(!machine.has_regenerated());
    assert!(machine.can_regenerate());
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_blocked_while_job_in_flight() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, _) = machine_with(&backend);
    machine.start().await;

    assert!(!machine.can_regenerate());
    assert!(!machine.regenerate().await);
    assert_eq!(backend.start_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_does_not_use_regeneration() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(StageKey::Character, vec![ScriptStep::running(10), ScriptStep::failed("model refused")]);
    let (mut machine, sink) = machine_with(&backend);
    machine.start().await;

    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::Failed);
    assert_eq!(machine.error(), Some("model refused"));
    assert!(!machine.can_advance());
    assert_eq!(sink.events_of_type("workflow.job_failed").len(), 1);

    assert!(machine.retry().await);
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
    assert!(machine.error().is_none());
    assert!(!machine.has_regenerated());
    assert!(machine.can_regenerate());
    assert!(!machine.retry().await);
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_after_failure() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(StageKey::Character, vec![ScriptStep::failed("timeout upstream")]);
    let (mut machine, _) = machine_with(&backend);
    machine.start().await;
    machine.wait_until_settled().await.unwrap();

    assert!(machine.can_regenerate());
    assert!(machine.regenerate().await);
    assert!(machine.has_regenerated());
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_is_retryable() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.fail_next_starts(1);
    let (mut machine, _) = machine_with(&backend);

    machine.start().await;
    assert_eq!(machine.phase(), StagePhase::Failed);
    assert!(machine.job_id().is_none());
    assert!(machine.error().is_some_and(|e| e.contains("503")));

    assert!(machine.retry().await);
    assert_eq!(machine.phase(), StagePhase::AwaitingJob);
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
    assert_eq!(backend.start_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_job_updates_are_discarded() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(StageKey::Character, vec![ScriptStep::running(10)]);
    let (mut machine, sink) = machine_with(&backend);
    machine.start().await;
    assert_eq!(machine.job_id().map(JobId::as_str), Some("job-1"));

    machine.enter_stage(StageKey::Character).await.unwrap();
    assert_eq!(machine.job_id().map(JobId::as_str), Some("job-2"));

    let late = JobUpdate::new(
        "job-1",
        JobSnapshot::succeeded(json!([{"name": "Ghost", "description": "", "type": "character"}])),
    );
    assert!(!machine.apply_update(late));
    assert!(machine.candidates().is_empty());
    assert_eq!(machine.phase(), StagePhase::AwaitingJob);
    assert_eq!(sink.events_of_type("workflow.stale_update_discarded").len(), 1);

    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
    assert_eq!(machine.candidates(), candidates_for(StageKey::Character).as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_job_stops_polling() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(StageKey::Character, vec![ScriptStep::running(10)]);
    backend.script(StageKey::Character, vec![ScriptStep::running(20)]);
    let (mut machine, _) = machine_with(&backend);
    machine.start().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    machine.enter_stage(StageKey::Character).await.unwrap();
    machine.leave_stage();
    let seen = backend.status_calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.status_calls(), seen);
    assert_eq!(machine.phase(), StagePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_updates_after_settling_are_ignored() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, _) = machine_with(&backend);
    machine.start().await;
    machine.wait_until_settled().await.unwrap();

    assert!(!machine.apply_update(JobUpdate::new("job-1", JobSnapshot::failed("late"))));
    assert_eq!(machine.phase(), StagePhase::CandidatesReady);
    assert!(machine.next_update().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_result_fails_stage() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(StageKey::Character, vec![ScriptStep::succeeded(json!({"oops": true}))]);
    backend.script(StageKey::Character, vec![ScriptStep::succeeded(json!([]))]);
    let (mut machine, _) = machine_with(&backend);

    machine.start().await;
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::Failed);
    assert!(machine.error().is_some_and(|e| e.contains("malformed")));

    assert!(machine.retry().await);
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::Failed);
    assert!(machine.error().is_some_and(|e| e.contains("no candidates")));
}

#[tokio::test(start_paused = true)]
async fn test_mismatched_type_tag_is_accepted() {
    let backend = Arc::new(ScriptedBackend::new());
    let relics = candidates_for(StageKey::Relic);
    backend.script(StageKey::Character, vec![ScriptStep::succeeded(json!(relics))]);
    let (mut machine, _) = machine_with(&backend);

    machine.start().await;
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
    assert_eq!(machine.candidates(), relics.as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_full_run_produces_story() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, sink) = machine_with(&backend);
    drive_to_story(&mut machine).await;

    assert!(!machine.can_regenerate());
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::Complete);
    assert!(machine.is_complete());
    assert_eq!(machine.story(), Some(&sample_story()));

    let story_requests = backend.requests_for(StageKey::FinalStory);
    assert_eq!(story_requests.len(), 1);
    assert_eq!(
        story_requests[0].selected_lore.stages(),
        vec![
            StageKey::Character,
            StageKey::Faction,
            StageKey::Setting,
            StageKey::Event,
            StageKey::Relic,
        ]
    );
    let body = serde_json::to_value(&story_requests[0]).unwrap();
    assert_eq!(body["stage"], json!("final_story"));
    assert_eq!(body["selected_lore"]["relic"]["name"], json!("The Tide Compass"));

    assert_eq!(
        machine.progress(),
        StageProgress {
            position: 5,
            total: 6,
            completed: 5
        }
    );
    assert_eq!(sink.events_of_type("workflow.completed").len(), 1);
    assert_eq!(sink.events_of_type("workflow.advanced").len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_complete_machine_ignores_operations() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, _) = machine_with(&backend);
    drive_to_story(&mut machine).await;
    machine.wait_until_settled().await.unwrap();
    let calls = backend.start_calls();

    assert!(!machine.select_index(0));
    assert!(!machine.regenerate().await);
    assert!(!machine.retry().await);
    assert!(!machine.advance().await);
    assert_eq!(backend.start_calls(), calls);
    assert_eq!(machine.phase(), StagePhase::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_story_failure_retries_with_full_lore() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(StageKey::FinalStory, vec![ScriptStep::failed("story too long")]);
    let (mut machine, _) = machine_with(&backend);
    drive_to_story(&mut machine).await;

    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::Failed);
    assert!(!machine.can_regenerate());
    assert!(machine.retry().await);
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::Complete);

    let story_requests = backend.requests_for(StageKey::FinalStory);
    assert_eq!(story_requests.len(), 2);
    assert_eq!(story_requests[0], story_requests[1]);
    assert_eq!(story_requests[1].selected_lore.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_story_stage_requires_every_selection() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, _) = machine_with(&backend);

    let err = machine.enter_stage(StageKey::FinalStory).await.unwrap_err();
    match err {
        LoreflowError::MissingSelections { stage, missing } => {
            assert_eq!(stage, StageKey::FinalStory);
            assert_eq!(missing.len(), 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.start_calls(), 0);
    assert_eq!(machine.current_stage().key, StageKey::Character);
}

#[tokio::test(start_paused = true)]
async fn test_restart_discards_lore() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, sink) = machine_with(&backend);
    machine.start().await;
    complete_stage(&mut machine).await;
    complete_stage(&mut machine).await;
    assert_eq!(machine.selected_lore().len(), 2);

    machine.restart().await;

    assert_eq!(machine.current_stage().key, StageKey::Character);
    assert!(machine.selected_lore().is_empty());
    assert!(machine.story().is_none());
    assert_eq!(machine.phase(), StagePhase::AwaitingJob);
    let last = backend.requests().pop().unwrap();
    assert_eq!(last.stage, StageKey::Character);
    assert!(last.selected_lore.is_empty());
    assert_eq!(sink.events_of_type("workflow.restarted").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_settle_timeout() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(StageKey::Character, vec![ScriptStep::running(5)]);
    let config = LoreflowConfig::new().with_polling(PollingConfig::default().with_settle_timeout(10.0));
    let ctx = WorkflowContext::new(backend.clone()).with_config(config);
    let mut machine = StageMachine::new(ctx);
    machine.start().await;

    let err = machine.wait_until_settled().await.unwrap_err();
    assert!(matches!(err, LoreflowError::Timeout(d) if d == Duration::from_secs(10)));
    assert_eq!(machine.phase(), StagePhase::AwaitingJob);
}

#[tokio::test(start_paused = true)]
async fn test_unusable_settle_timeout_is_config_error() {
    let backend = Arc::new(ScriptedBackend::new());
    let config = LoreflowConfig::new().with_polling(PollingConfig::default().with_settle_timeout(1e300));
    let ctx = WorkflowContext::new(backend.clone()).with_config(config);
    let mut machine = StageMachine::new(ctx);
    machine.start().await;

    let err = machine.wait_until_settled().await.unwrap_err();
    assert!(matches!(err, LoreflowError::Config(_)));
    assert_eq!(machine.phase(), StagePhase::AwaitingJob);
}

#[tokio::test(start_paused = true)]
async fn test_refused_advance_commits_nothing() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, sink) = machine_with(&backend);
    machine.enter_stage(StageKey::Relic).await.unwrap();
    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
    assert!(machine.select_index(0));

    // The story stage still lacks the four earlier selections.
    assert!(!machine.advance().await);

    assert_eq!(machine.current_stage().key, StageKey::Relic);
    assert!(machine.selected_lore().is_empty());
    assert_eq!(machine.selection(), candidates_for(StageKey::Relic).first());
    assert_eq!(machine.phase(), StagePhase::CandidatesReady);
    assert!(sink.events_of_type("workflow.advanced").is_empty());
    assert_eq!(backend.start_calls(), 1);
}

#[tokio::test]
async fn test_wait_without_job() {
    let backend = Arc::new(ScriptedBackend::new());
    let (mut machine, _) = machine_with(&backend);

    let err = machine.wait_until_settled().await.unwrap_err();
    assert!(matches!(err, LoreflowError::NoActiveJob(StageKey::Character)));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_errors_do_not_fail_stage() {
    let backend = Arc::new(ScriptedBackend::new());
    let steps = vec![
        ScriptStep::error(503, "busy"),
        ScriptStep::error(500, "oops"),
        ScriptStep::succeeded(json!(candidates_for(StageKey::Character))),
    ];
    backend.script(StageKey::Character, steps);
    let (mut machine, _) = machine_with(&backend);
    machine.start().await;

    assert_eq!(machine.wait_until_settled().await.unwrap(), StagePhase::CandidatesReady);
    assert_eq!(backend.status_calls(), 3);
}
