use std::collections::HashMap;

use anyhow::Result;
use symtrack_schema::{
    Assessment, ConversationPhase, Episode, NegativeFinding, Symptom,
};
use symtrack_store::HealthStore;
use uuid::Uuid;

/// Per-turn aggregate of a user's active health state.
///
/// Hydrated once before any workflow runs and passed explicitly into every
/// tool call; tools keep it consistent with storage as they mutate, so a
/// turn never re-reads mid-flight. Discarded after the turn is persisted.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub user_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub active_episodes: Vec<Episode>,
    pub active_symptoms: Vec<Symptom>,
    /// Most-recent-episode index keyed by lowercased symptom name; avoids
    /// duplicate episode creation within a turn.
    pub recent_episodes_by_symptom: HashMap<String, Episode>,
    pub negative_findings: Vec<NegativeFinding>,
    pub current_assessment: Option<Assessment>,
    pub phase: ConversationPhase,
}

impl ConversationContext {
    pub fn new(user_id: Uuid, conversation_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            conversation_id,
            active_episodes: Vec::new(),
            active_symptoms: Vec::new(),
            recent_episodes_by_symptom: HashMap::new(),
            negative_findings: Vec::new(),
            current_assessment: None,
            phase: ConversationPhase::Exploring,
        }
    }

    pub fn episode_for_symptom(&self, symptom_name: &str) -> Option<&Episode> {
        self.recent_episodes_by_symptom
            .get(&symptom_name.trim().to_lowercase())
    }

    /// Track a newly created episode in the working set and the
    /// by-symptom index.
    pub fn record_episode(&mut self, episode: Episode) {
        self.recent_episodes_by_symptom
            .insert(episode.symptom_name.to_lowercase(), episode.clone());
        self.active_episodes.push(episode);
    }

    /// Replace an episode's in-memory copy after a mutation.
    pub fn replace_episode(&mut self, episode: Episode) {
        if let Some(existing) = self.active_episodes.iter_mut().find(|e| e.id == episode.id) {
            *existing = episode.clone();
        }
        self.recent_episodes_by_symptom
            .insert(episode.symptom_name.to_lowercase(), episode);
    }

    /// Drop a resolved episode from the active working set.
    pub fn remove_episode(&mut self, episode_id: Uuid) {
        self.active_episodes.retain(|e| e.id != episode_id);
        self.recent_episodes_by_symptom
            .retain(|_, e| e.id != episode_id);
    }

    pub fn record_symptom(&mut self, symptom: Symptom) {
        if !self.active_symptoms.iter().any(|s| s.id == symptom.id) {
            self.active_symptoms.push(symptom);
        }
    }

    pub fn advance_phase(&mut self, target: ConversationPhase) {
        self.phase.advance_to(target);
    }

    pub fn active_episode_ids(&self) -> Vec<Uuid> {
        self.active_episodes.iter().map(|e| e.id).collect()
    }
}

/// Builds a fully hydrated [`ConversationContext`] from storage.
pub struct ContextService {
    store: HealthStore,
}

impl ContextService {
    const NEGATIVE_FINDING_LIMIT: usize = 20;

    pub fn new(store: HealthStore) -> Self {
        Self { store }
    }

    /// Load everything a turn needs up front: active episodes (with
    /// symptom names), known symptoms, recent negative findings and the
    /// conversation's existing assessment if there is one.
    pub async fn hydrate(
        &self,
        user_id: Uuid,
        conversation_id: Option<Uuid>,
    ) -> Result<ConversationContext> {
        let mut ctx = ConversationContext::new(user_id, conversation_id);

        for episode in self.store.active_episodes(user_id).await? {
            ctx.record_episode(episode);
        }
        ctx.active_symptoms = self.store.list_symptoms(user_id).await?;
        ctx.negative_findings = self
            .store
            .recent_negative_findings(user_id, Self::NEGATIVE_FINDING_LIMIT)
            .await?;

        if let Some(conversation_id) = conversation_id {
            ctx.current_assessment = self
                .store
                .assessment_for_conversation(conversation_id)
                .await?;
        }

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use symtrack_schema::{EpisodeStatus, RecommendedCare};

    async fn seed_episode(store: &HealthStore, user_id: Uuid, name: &str) -> Episode {
        let symptom = store
            .get_or_create_symptom(user_id, name, None)
            .await
            .unwrap();
        let episode = Episode::new(symptom.id, user_id, symptom.name.clone());
        store.insert_episode(episode.clone()).await.unwrap();
        episode
    }

    #[tokio::test]
    async fn hydrate_loads_active_state() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        seed_episode(&store, user_id, "headache").await;
        let mut resolved = seed_episode(&store, user_id, "cough").await;
        resolved.status = EpisodeStatus::Resolved;
        resolved.resolved_at = Some(Utc::now());
        store.update_episode(resolved).await.unwrap();

        let service = ContextService::new(store);
        let ctx = service.hydrate(user_id, None).await.unwrap();
        assert_eq!(ctx.active_episodes.len(), 1);
        assert_eq!(ctx.active_symptoms.len(), 2);
        assert!(ctx.episode_for_symptom("Headache").is_some());
        assert!(ctx.episode_for_symptom("cough").is_none());
        assert_eq!(ctx.phase, ConversationPhase::Exploring);
    }

    #[tokio::test]
    async fn hydrate_picks_up_existing_assessment() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let conversation = store.create_conversation(user_id).await.unwrap();
        store
            .insert_assessment(symtrack_schema::Assessment {
                id: Uuid::new_v4(),
                user_id,
                conversation_id: conversation.id,
                hypothesis: "Cold".into(),
                confidence: 0.4,
                differentials: None,
                reasoning: "sniffles".into(),
                recommended_action: RecommendedCare::SelfCare,
                negative_finding_ids: vec![],
                linked_episodes: vec![],
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let service = ContextService::new(store);
        let ctx = service
            .hydrate(user_id, Some(conversation.id))
            .await
            .unwrap();
        assert!(ctx.current_assessment.is_some());
    }

    #[test]
    fn resolved_episode_leaves_working_set() {
        let user_id = Uuid::new_v4();
        let mut ctx = ConversationContext::new(user_id, None);
        let episode = Episode::new(Uuid::new_v4(), user_id, "fever");
        let id = episode.id;
        ctx.record_episode(episode);
        assert_eq!(ctx.active_episodes.len(), 1);

        ctx.remove_episode(id);
        assert!(ctx.active_episodes.is_empty());
        assert!(ctx.episode_for_symptom("fever").is_none());
    }
}
