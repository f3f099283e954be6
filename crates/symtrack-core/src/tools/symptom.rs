use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use symtrack_schema::{
    Episode, EpisodeStage, EpisodeStatus, EpisodeUpdate, NegativeFinding, TimelineEntry,
};
use symtrack_store::HealthStore;
use uuid::Uuid;

use crate::connection::ClientConnection;
use crate::context::ConversationContext;
use crate::error::DomainError;

use super::ToolReply;

/// Symptom and episode mutations invoked by the workflows.
///
/// Every mutator writes through the store, keeps the passed-in context
/// consistent, and notifies the client fire-and-forget.
pub struct SymptomTrackerTools {
    store: HealthStore,
    connection: Arc<ClientConnection>,
}

impl SymptomTrackerTools {
    pub fn new(store: HealthStore, connection: Arc<ClientConnection>) -> Self {
        Self { store, connection }
    }

    /// Get-or-create the symptom and open an episode for it.
    ///
    /// Idempotent per turn: if the context already tracks an episode for
    /// this symptom name, that episode is returned and nothing new is
    /// created; a symptom mentioned twice in one message counts once.
    pub async fn create_symptom_with_episode(
        &self,
        ctx: &mut ConversationContext,
        name: &str,
        description: Option<String>,
    ) -> Result<ToolReply<Episode>> {
        if let Some(existing) = ctx.episode_for_symptom(name) {
            return Ok(ToolReply::ok(existing.clone()));
        }

        let symptom = self
            .store
            .get_or_create_symptom(ctx.user_id, name, description)
            .await?;
        let episode = Episode::new(symptom.id, ctx.user_id, symptom.name.clone());
        self.store.insert_episode(episode.clone()).await?;

        ctx.record_symptom(symptom);
        ctx.record_episode(episode.clone());
        self.connection.send_symptom_added(&episode);

        Ok(ToolReply::ok(episode))
    }

    /// Partial update: only provided fields overwrite; the stage is
    /// recomputed and never regresses.
    pub async fn update_episode(
        &self,
        ctx: &mut ConversationContext,
        episode_id: Uuid,
        update: EpisodeUpdate,
    ) -> Result<ToolReply<Episode>> {
        let mut episode = match self.find_episode(ctx, episode_id).await? {
            Some(episode) => episode,
            None => return Ok(ToolReply::fail(DomainError::EpisodeNotFound(episode_id))),
        };

        episode.apply(&update);
        self.store.update_episode(episode.clone()).await?;
        ctx.replace_episode(episode.clone());
        self.connection.send_symptom_updated(&episode);

        Ok(ToolReply::ok(episode))
    }

    /// Mark an episode as related to an earlier one. The related id is
    /// accepted as the caller claims it; only the episode being staged is
    /// validated.
    pub async fn link_episode_to_existing(
        &self,
        ctx: &mut ConversationContext,
        episode_id: Uuid,
        related_episode_id: Uuid,
    ) -> Result<ToolReply<Episode>> {
        let mut episode = match self.find_episode(ctx, episode_id).await? {
            Some(episode) => episode,
            None => return Ok(ToolReply::fail(DomainError::EpisodeNotFound(episode_id))),
        };

        episode.stage = EpisodeStage::Linked;
        episode.timeline.push(TimelineEntry {
            at: Utc::now(),
            note: format!("linked to episode {related_episode_id}"),
        });
        self.store.update_episode(episode.clone()).await?;
        ctx.replace_episode(episode.clone());
        self.connection.send_symptom_updated(&episode);

        Ok(ToolReply::ok(episode))
    }

    pub async fn resolve_episode(
        &self,
        ctx: &mut ConversationContext,
        episode_id: Uuid,
    ) -> Result<ToolReply<Episode>> {
        let mut episode = match self.find_episode(ctx, episode_id).await? {
            Some(episode) => episode,
            None => return Ok(ToolReply::fail(DomainError::EpisodeNotFound(episode_id))),
        };

        episode.status = EpisodeStatus::Resolved;
        episode.resolved_at = Some(Utc::now());
        self.store.update_episode(episode.clone()).await?;
        ctx.remove_episode(episode.id);
        self.connection.send_symptom_resolved(&episode);

        Ok(ToolReply::ok(episode))
    }

    pub async fn record_negative_finding(
        &self,
        ctx: &mut ConversationContext,
        symptom_name: &str,
        episode_id: Option<Uuid>,
    ) -> Result<ToolReply<NegativeFinding>> {
        let finding = NegativeFinding {
            id: Uuid::new_v4(),
            user_id: ctx.user_id,
            symptom_name: symptom_name.trim().to_string(),
            episode_id,
            recorded_at: Utc::now(),
        };
        self.store.insert_negative_finding(finding.clone()).await?;
        ctx.negative_findings.push(finding.clone());

        Ok(ToolReply::ok(finding))
    }

    pub fn active_episodes<'a>(&self, ctx: &'a ConversationContext) -> &'a [Episode] {
        &ctx.active_episodes
    }

    pub async fn symptom_history(
        &self,
        ctx: &ConversationContext,
        symptom_name: &str,
    ) -> Result<Vec<Episode>> {
        self.store
            .episodes_for_symptom(ctx.user_id, symptom_name)
            .await
    }

    /// Prefer the in-context copy (already reflects this turn's edits);
    /// fall back to storage for episodes outside the working set, checking
    /// ownership.
    async fn find_episode(
        &self,
        ctx: &ConversationContext,
        episode_id: Uuid,
    ) -> Result<Option<Episode>> {
        if let Some(episode) = ctx.active_episodes.iter().find(|e| e.id == episode_id) {
            return Ok(Some(episode.clone()));
        }
        let episode = self.store.get_episode(episode_id).await?;
        Ok(episode.filter(|e| e.user_id == ctx.user_id))
    }
}
