use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use symtrack_schema::{ChatMessage, ChatRole, HealthChatResponse};
use symtrack_store::HealthStore;
use uuid::Uuid;

use crate::connection::ClientConnection;
use crate::context::ContextService;
use crate::error::DomainError;
use crate::extract::ChatModel;
use crate::tools::{AssessmentTools, SymptomTrackerTools};
use crate::workflow::{classify_intent, AssessmentWorkflow, Intent, SymptomTrackingWorkflow};

/// Entry point for a chat turn: resolves the conversation, hydrates
/// context, routes the message to the right workflow and persists both
/// sides of the exchange.
pub struct HealthChatOrchestrator {
    store: HealthStore,
    context: ContextService,
    model: ChatModel,
}

impl HealthChatOrchestrator {
    pub fn new(store: HealthStore, model: ChatModel) -> Self {
        let context = ContextService::new(store.clone());
        Self {
            store,
            context,
            model,
        }
    }

    pub async fn process_message(
        &self,
        user_id: Uuid,
        message: &str,
        conversation_id: Option<Uuid>,
        connection: Arc<ClientConnection>,
    ) -> Result<HealthChatResponse> {
        let conversation = match conversation_id {
            Some(id) => match self.store.get_conversation(id).await? {
                Some(conversation) if conversation.user_id == user_id => conversation,
                // Another user's conversation is reported as missing.
                Some(_) => return Err(DomainError::ConversationNotFound(id).into()),
                None => self.store.create_conversation(user_id).await?,
            },
            None => self.store.create_conversation(user_id).await?,
        };

        let mut ctx = self
            .context
            .hydrate(user_id, Some(conversation.id))
            .await?;

        // The user's message is recorded before processing; losing it on a
        // storage hiccup would be worse than a duplicate turn, so failure
        // here is logged, not fatal.
        if let Err(e) = self
            .store
            .insert_message(ChatMessage {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                role: ChatRole::User,
                content: message.to_string(),
                status_events: Vec::new(),
                created_at: Utc::now(),
            })
            .await
        {
            tracing::warn!(conversation_id = %conversation.id, "failed to persist user message: {e:#}");
        }

        connection.send_processing("Looking at your message");

        let run = match classify_intent(message) {
            Intent::CreateAssessment => {
                let tools = AssessmentTools::new(self.store.clone(), connection.clone());
                AssessmentWorkflow::new(self.model.clone(), tools, connection.clone())
                    .run(&mut ctx, message)
                    .await
            }
            Intent::Other => {
                let tools = SymptomTrackerTools::new(self.store.clone(), connection.clone());
                SymptomTrackingWorkflow::new(self.model.clone(), tools)
                    .run(&mut ctx, message)
                    .await
            }
        };

        connection.send_completed("Done");

        let events = connection.events();
        if let Err(e) = self
            .store
            .insert_message(ChatMessage {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                role: ChatRole::Assistant,
                content: run.response.clone(),
                status_events: events.clone(),
                created_at: Utc::now(),
            })
            .await
        {
            tracing::warn!(conversation_id = %conversation.id, "failed to persist assistant message: {e:#}");
        }

        Ok(HealthChatResponse {
            conversation_id: conversation.id,
            message: run.response,
            events,
        })
    }
}
