use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use symtrack_schema::{
    Assessment, ConversationPhase, EpisodeLink, NextAction, RecommendedCare,
};
use symtrack_store::HealthStore;
use uuid::Uuid;

use crate::connection::ClientConnection;
use crate::context::ConversationContext;
use crate::error::DomainError;

use super::ToolReply;

/// Input for creating an assessment.
#[derive(Debug, Clone)]
pub struct AssessmentDraft {
    pub hypothesis: String,
    pub confidence: f64,
    pub differentials: Option<Vec<String>>,
    pub reasoning: String,
    pub recommended_action: RecommendedCare,
    pub negative_finding_ids: Vec<Uuid>,
    /// Explicit episode weighting; when absent, weight is split equally
    /// across all active episodes.
    pub weights: Option<Vec<EpisodeLink>>,
}

/// Partial update for an existing assessment; `None` fields are untouched.
/// A supplied weight set replaces the existing links wholesale.
#[derive(Debug, Clone, Default)]
pub struct AssessmentPatch {
    pub hypothesis: Option<String>,
    pub confidence: Option<f64>,
    pub differentials: Option<Vec<String>>,
    pub reasoning: Option<String>,
    pub recommended_action: Option<RecommendedCare>,
    pub negative_finding_ids: Option<Vec<Uuid>>,
    pub weights: Option<Vec<EpisodeLink>>,
}

pub struct AssessmentTools {
    store: HealthStore,
    connection: Arc<ClientConnection>,
}

impl AssessmentTools {
    pub fn new(store: HealthStore, connection: Arc<ClientConnection>) -> Self {
        Self { store, connection }
    }

    /// Create an assessment for the active conversation.
    ///
    /// Creation is never terminal: the reply carries
    /// `NextAction::CompleteAssessment` and the caller must follow with
    /// [`complete_assessment`](Self::complete_assessment).
    pub async fn create_assessment(
        &self,
        ctx: &mut ConversationContext,
        draft: AssessmentDraft,
    ) -> Result<ToolReply<Assessment>> {
        let conversation_id = match ctx.conversation_id {
            Some(id) => id,
            None => return Ok(ToolReply::fail(DomainError::NoActiveConversation)),
        };

        let linked_episodes = draft
            .weights
            .unwrap_or_else(|| Assessment::equal_weights(&ctx.active_episode_ids()));

        let assessment = Assessment {
            id: Uuid::new_v4(),
            user_id: ctx.user_id,
            conversation_id,
            hypothesis: draft.hypothesis,
            confidence: Assessment::clamp_confidence(draft.confidence),
            differentials: Assessment::normalize_differentials(draft.differentials),
            reasoning: draft.reasoning,
            recommended_action: draft.recommended_action,
            negative_finding_ids: draft.negative_finding_ids,
            linked_episodes,
            created_at: Utc::now(),
        };
        self.store.insert_assessment(assessment.clone()).await?;

        ctx.current_assessment = Some(assessment.clone());
        ctx.advance_phase(ConversationPhase::Assessing);
        self.connection.send_assessment_created(&assessment);
        self.connection
            .send_assessment_analyzing("Analyzing episode relationships");

        Ok(ToolReply::ok_with(
            assessment,
            NextAction::CompleteAssessment,
        ))
    }

    pub async fn update_assessment(
        &self,
        ctx: &mut ConversationContext,
        assessment_id: Option<Uuid>,
        patch: AssessmentPatch,
    ) -> Result<ToolReply<Assessment>> {
        let target_id = match assessment_id.or(ctx.current_assessment.as_ref().map(|a| a.id)) {
            Some(id) => id,
            None => return Ok(ToolReply::fail(DomainError::NoAssessmentToComplete)),
        };
        let mut assessment = match self.store.get_assessment(target_id).await? {
            Some(assessment) if assessment.user_id == ctx.user_id => assessment,
            _ => return Ok(ToolReply::fail(DomainError::AssessmentNotFound(target_id))),
        };

        if let Some(hypothesis) = patch.hypothesis {
            assessment.hypothesis = hypothesis;
        }
        if let Some(confidence) = patch.confidence {
            assessment.confidence = Assessment::clamp_confidence(confidence);
        }
        if let Some(differentials) = patch.differentials {
            assessment.differentials = Assessment::normalize_differentials(Some(differentials));
        }
        if let Some(reasoning) = patch.reasoning {
            assessment.reasoning = reasoning;
        }
        if let Some(action) = patch.recommended_action {
            assessment.recommended_action = action;
        }
        if let Some(negative_ids) = patch.negative_finding_ids {
            assessment.negative_finding_ids = negative_ids;
        }
        let replace_links = patch.weights.is_some();
        if let Some(weights) = patch.weights {
            assessment.linked_episodes = weights;
        }

        self.store
            .update_assessment(assessment.clone(), replace_links)
            .await?;
        if ctx
            .current_assessment
            .as_ref()
            .is_some_and(|a| a.id == assessment.id)
        {
            ctx.current_assessment = Some(assessment.clone());
        }

        Ok(ToolReply::ok(assessment))
    }

    /// Phase/notification boundary only: advances the conversation to the
    /// recommending phase and notifies the client. The assessment row is
    /// not touched.
    pub async fn complete_assessment(
        &self,
        ctx: &mut ConversationContext,
        assessment_id: Option<Uuid>,
    ) -> Result<ToolReply<Assessment>> {
        let assessment = match assessment_id {
            Some(id) => match self.store.get_assessment(id).await? {
                Some(assessment) if assessment.user_id == ctx.user_id => assessment,
                _ => return Ok(ToolReply::fail(DomainError::AssessmentNotFound(id))),
            },
            None => match ctx.current_assessment.clone() {
                Some(assessment) => assessment,
                None => return Ok(ToolReply::fail(DomainError::NoAssessmentToComplete)),
            },
        };

        ctx.advance_phase(ConversationPhase::Recommending);
        self.connection
            .send_assessment_complete(assessment.id, "Assessment complete");

        Ok(ToolReply::ok_with(
            assessment,
            NextAction::SubmitFinalResponse,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::SymptomTrackerTools;

    fn draft(confidence: f64) -> AssessmentDraft {
        AssessmentDraft {
            hypothesis: "Tension headache".into(),
            confidence,
            differentials: Some(vec![" migraine ".into(), "".into()]),
            reasoning: "stress pattern".into(),
            recommended_action: RecommendedCare::SeeGp,
            negative_finding_ids: vec![],
            weights: None,
        }
    }

    async fn context_with_episodes(
        store: &HealthStore,
        connection: &Arc<ClientConnection>,
        names: &[&str],
    ) -> ConversationContext {
        let user_id = Uuid::new_v4();
        let conversation = store.create_conversation(user_id).await.unwrap();
        let mut ctx = ConversationContext::new(user_id, Some(conversation.id));
        let symptom_tools = SymptomTrackerTools::new(store.clone(), connection.clone());
        for name in names {
            symptom_tools
                .create_symptom_with_episode(&mut ctx, name, None)
                .await
                .unwrap();
        }
        ctx
    }

    #[tokio::test]
    async fn create_requires_active_conversation() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let tools = AssessmentTools::new(store, connection);
        let mut ctx = ConversationContext::new(Uuid::new_v4(), None);

        let reply = tools.create_assessment(&mut ctx, draft(0.5)).await.unwrap();
        assert!(reply.is_err());
        assert_eq!(reply.error.as_deref(), Some("no conversation active"));
        assert_eq!(reply.next, NextAction::SubmitFinalResponse);
    }

    #[tokio::test]
    async fn create_clamps_confidence_and_normalizes() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let mut ctx = context_with_episodes(&store, &connection, &["headache"]).await;
        let tools = AssessmentTools::new(store.clone(), connection);

        let reply = tools.create_assessment(&mut ctx, draft(1.5)).await.unwrap();
        let assessment = reply.value.unwrap();
        assert_eq!(assessment.confidence, 1.0);
        assert_eq!(assessment.differentials.as_deref(), Some(&["migraine".to_string()][..]));

        let reply = tools.create_assessment(&mut ctx, draft(-0.2)).await.unwrap();
        assert_eq!(reply.value.unwrap().confidence, 0.0);
    }

    #[tokio::test]
    async fn default_weights_split_equally_over_active_episodes() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let mut ctx =
            context_with_episodes(&store, &connection, &["headache", "fever", "nausea"]).await;
        let tools = AssessmentTools::new(store.clone(), connection);

        let assessment = tools
            .create_assessment(&mut ctx, draft(0.6))
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(assessment.linked_episodes.len(), 3);
        let total: f64 = assessment.linked_episodes.iter().map(|l| l.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for link in &assessment.linked_episodes {
            assert!((link.weight - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn create_emits_created_then_analyzing_and_demands_completion() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let mut ctx = context_with_episodes(&store, &connection, &["headache"]).await;
        let tools = AssessmentTools::new(store.clone(), connection.clone());

        let reply = tools.create_assessment(&mut ctx, draft(0.7)).await.unwrap();
        assert_eq!(reply.next, NextAction::CompleteAssessment);
        assert_eq!(ctx.phase, ConversationPhase::Assessing);

        let kinds: Vec<_> = connection.events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["symptom-added", "assessment-created", "assessment-analyzing"]
        );
    }

    #[tokio::test]
    async fn complete_without_target_fails_descriptively() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let tools = AssessmentTools::new(store, connection);
        let mut ctx = ConversationContext::new(Uuid::new_v4(), None);

        let reply = tools.complete_assessment(&mut ctx, None).await.unwrap();
        assert!(reply.is_err());
        assert_eq!(reply.error.as_deref(), Some("no assessment to complete"));
    }

    #[tokio::test]
    async fn complete_advances_phase_and_notifies() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let mut ctx = context_with_episodes(&store, &connection, &["headache"]).await;
        let tools = AssessmentTools::new(store.clone(), connection.clone());

        let created = tools
            .create_assessment(&mut ctx, draft(0.7))
            .await
            .unwrap()
            .value
            .unwrap();
        let reply = tools
            .complete_assessment(&mut ctx, Some(created.id))
            .await
            .unwrap();
        assert_eq!(reply.value.unwrap().id, created.id);
        assert_eq!(ctx.phase, ConversationPhase::Recommending);
        assert_eq!(
            connection.events().last().unwrap().kind(),
            "assessment-complete"
        );

        // Completion does not mutate the row.
        let stored = store.get_assessment(created.id).await.unwrap().unwrap();
        assert_eq!(stored.hypothesis, created.hypothesis);
        assert_eq!(stored.confidence, created.confidence);
    }

    #[tokio::test]
    async fn update_replaces_weight_links_when_supplied() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let mut ctx = context_with_episodes(&store, &connection, &["headache", "fever"]).await;
        let tools = AssessmentTools::new(store.clone(), connection);

        let created = tools
            .create_assessment(&mut ctx, draft(0.7))
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(created.linked_episodes.len(), 2);

        let keep = ctx.active_episodes[0].id;
        let reply = tools
            .update_assessment(
                &mut ctx,
                Some(created.id),
                AssessmentPatch {
                    confidence: Some(2.0),
                    weights: Some(vec![EpisodeLink {
                        episode_id: keep,
                        weight: 1.0,
                        reasoning: Some("dominant complaint".into()),
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let updated = reply.value.unwrap();
        assert_eq!(updated.confidence, 1.0);
        assert_eq!(updated.linked_episodes.len(), 1);
        assert_eq!(updated.linked_episodes[0].episode_id, keep);

        let stored = store.get_assessment(created.id).await.unwrap().unwrap();
        assert_eq!(stored.linked_episodes.len(), 1);
    }

    #[tokio::test]
    async fn update_unknown_assessment_fails() {
        let store = HealthStore::open_in_memory().unwrap();
        let connection = Arc::new(ClientConnection::detached());
        let tools = AssessmentTools::new(store, connection);
        let mut ctx = ConversationContext::new(Uuid::new_v4(), None);

        let reply = tools
            .update_assessment(&mut ctx, Some(Uuid::new_v4()), AssessmentPatch::default())
            .await
            .unwrap();
        assert!(reply.is_err());
    }
}
