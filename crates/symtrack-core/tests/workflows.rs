//! End-to-end turns through the orchestrator with the model unavailable,
//! exercising the deterministic degraded paths.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use symtrack_core::{ChatModel, ClientConnection, DomainError, HealthChatOrchestrator, ModelPolicy};
use symtrack_provider::{LlmProvider, LlmRequest, LlmResponse, LlmRouter, ProviderRegistry};
use symtrack_schema::EpisodeStage;
use symtrack_store::HealthStore;
use uuid::Uuid;

struct DownProvider;

#[async_trait]
impl LlmProvider for DownProvider {
    async fn chat(&self, _request: LlmRequest) -> Result<LlmResponse> {
        Err(anyhow!("connection refused"))
    }
}

fn offline_model() -> ChatModel {
    let mut registry = ProviderRegistry::new();
    registry.register("down", Arc::new(DownProvider));
    ChatModel::new(
        Arc::new(LlmRouter::new(registry, vec![])),
        ModelPolicy {
            primary: "down/none".into(),
            fallbacks: vec![],
        },
        256,
    )
}

fn harness() -> (HealthStore, HealthChatOrchestrator) {
    let store = HealthStore::open_in_memory().unwrap();
    let orchestrator = HealthChatOrchestrator::new(store.clone(), offline_model());
    (store, orchestrator)
}

#[tokio::test]
async fn symptom_report_creates_episodes_and_events() {
    let (store, orchestrator) = harness();
    let user_id = Uuid::new_v4();
    let connection = Arc::new(ClientConnection::detached());

    let response = orchestrator
        .process_message(user_id, "I have a headache and a fever", None, connection)
        .await
        .unwrap();

    let episodes = store.active_episodes(user_id).await.unwrap();
    assert_eq!(episodes.len(), 2);
    for episode in &episodes {
        assert_eq!(episode.stage, EpisodeStage::Mentioned);
    }
    let mut names: Vec<_> = episodes.iter().map(|e| e.symptom_name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["fever", "headache"]);

    let added: Vec<_> = response
        .events
        .iter()
        .filter(|e| e.kind() == "symptom-added")
        .collect();
    assert_eq!(added.len(), 2);
    assert_eq!(response.events.first().unwrap().kind(), "processing");
    assert_eq!(response.events.last().unwrap().kind(), "completed");

    assert!(response.message.contains("headache"));
    assert!(response.message.contains("fever"));
}

#[tokio::test]
async fn repeated_symptom_in_one_message_counts_once() {
    let (store, orchestrator) = harness();
    let user_id = Uuid::new_v4();

    orchestrator
        .process_message(
            user_id,
            "My headache is back, the headache is awful",
            None,
            Arc::new(ClientConnection::detached()),
        )
        .await
        .unwrap();

    assert_eq!(store.active_episodes(user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn assessment_request_creates_row_with_fallback_values() {
    let (store, orchestrator) = harness();
    let user_id = Uuid::new_v4();
    let connection = Arc::new(ClientConnection::detached());

    let first = orchestrator
        .process_message(user_id, "I have a headache", None, connection.clone())
        .await
        .unwrap();

    let connection = Arc::new(ClientConnection::detached());
    let response = orchestrator
        .process_message(
            user_id,
            "can you give me an assessment?",
            Some(first.conversation_id),
            connection,
        )
        .await
        .unwrap();
    assert_eq!(response.conversation_id, first.conversation_id);

    let assessments = store.list_assessments(user_id).await.unwrap();
    assert_eq!(assessments.len(), 1);
    let assessment = &assessments[0];
    assert_eq!(assessment.hypothesis, "General health concern");
    assert_eq!(assessment.confidence, 0.7);
    assert!(assessment.differentials.is_none());
    assert_eq!(assessment.recommended_action.as_str(), "see-gp");
    assert_eq!(assessment.linked_episodes.len(), 1);
    assert_eq!(assessment.linked_episodes[0].weight, 1.0);

    let kinds: Vec<_> = response.events.iter().map(|e| e.kind()).collect();
    let generating_pos = kinds
        .iter()
        .position(|k| *k == "assessment-generating")
        .unwrap();
    let created_pos = kinds
        .iter()
        .position(|k| *k == "assessment-created")
        .unwrap();
    let analyzing_pos = kinds
        .iter()
        .position(|k| *k == "assessment-analyzing")
        .unwrap();
    let complete_pos = kinds
        .iter()
        .position(|k| *k == "assessment-complete")
        .unwrap();
    assert!(generating_pos < created_pos);
    assert!(created_pos < analyzing_pos);
    assert!(analyzing_pos < complete_pos);
    assert_eq!(
        kinds.iter().filter(|k| **k == "assessment-created").count(),
        1
    );
    assert_eq!(
        kinds.iter().filter(|k| **k == "assessment-complete").count(),
        1
    );
}

#[tokio::test]
async fn non_assessment_turn_creates_no_assessment() {
    let (store, orchestrator) = harness();
    let user_id = Uuid::new_v4();
    let connection = Arc::new(ClientConnection::detached());

    let response = orchestrator
        .process_message(user_id, "thanks, feeling okay today", None, connection)
        .await
        .unwrap();

    assert!(store.list_assessments(user_id).await.unwrap().is_empty());
    assert!(response
        .events
        .iter()
        .all(|e| !e.kind().starts_with("assessment-")));
}

#[tokio::test]
async fn both_turns_are_persisted_with_events() {
    let (store, orchestrator) = harness();
    let user_id = Uuid::new_v4();

    let response = orchestrator
        .process_message(
            user_id,
            "I have a cough",
            None,
            Arc::new(ClientConnection::detached()),
        )
        .await
        .unwrap();

    let messages = store
        .conversation_messages(response.conversation_id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role.as_str(), "user");
    assert_eq!(messages[0].content, "I have a cough");
    assert!(messages[0].status_events.is_empty());
    assert_eq!(messages[1].role.as_str(), "assistant");
    assert_eq!(messages[1].status_events.len(), response.events.len());
}

#[tokio::test]
async fn foreign_conversation_id_is_rejected() {
    let (store, orchestrator) = harness();
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let conversation = store.create_conversation(owner).await.unwrap();

    let err = orchestrator
        .process_message(
            intruder,
            "I have a headache",
            Some(conversation.id),
            Arc::new(ClientConnection::detached()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DomainError>(),
        Some(DomainError::ConversationNotFound(id)) if *id == conversation.id
    ));
}

#[tokio::test]
async fn unknown_conversation_id_starts_a_fresh_one() {
    let (_store, orchestrator) = harness();
    let user_id = Uuid::new_v4();
    let bogus = Uuid::new_v4();

    let response = orchestrator
        .process_message(
            user_id,
            "I have a headache",
            Some(bogus),
            Arc::new(ClientConnection::detached()),
        )
        .await
        .unwrap();
    assert_ne!(response.conversation_id, bogus);
}
