use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of an episode. Ordered: a stage never regresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStage {
    Mentioned,
    Explored,
    Characterized,
    Linked,
}

impl EpisodeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStage::Mentioned => "mentioned",
            EpisodeStage::Explored => "explored",
            EpisodeStage::Characterized => "characterized",
            EpisodeStage::Linked => "linked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mentioned" => Some(EpisodeStage::Mentioned),
            "explored" => Some(EpisodeStage::Explored),
            "characterized" => Some(EpisodeStage::Characterized),
            "linked" => Some(EpisodeStage::Linked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Active,
    Resolved,
    Chronic,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Active => "active",
            EpisodeStatus::Resolved => "resolved",
            EpisodeStatus::Chronic => "chronic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EpisodeStatus::Active),
            "resolved" => Some(EpisodeStatus::Resolved),
            "chronic" => Some(EpisodeStatus::Chronic),
            _ => None,
        }
    }
}

/// Conversation phase. Advances monotonically within a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ConversationPhase {
    Exploring,
    Assessing,
    Recommending,
}

impl ConversationPhase {
    /// Advance to `target` only if it is later than the current phase.
    pub fn advance_to(&mut self, target: ConversationPhase) {
        if target > *self {
            *self = target;
        }
    }
}

/// Care level recommended by an assessment. Wire format is kebab-case and
/// must round-trip exactly through storage and the REST surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedCare {
    SelfCare,
    SeeGp,
    UrgentCare,
    Emergency,
}

impl RecommendedCare {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedCare::SelfCare => "self-care",
            RecommendedCare::SeeGp => "see-gp",
            RecommendedCare::UrgentCare => "urgent-care",
            RecommendedCare::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "self-care" => Some(RecommendedCare::SelfCare),
            "see-gp" => Some(RecommendedCare::SeeGp),
            "urgent-care" => Some(RecommendedCare::UrgentCare),
            "emergency" => Some(RecommendedCare::Emergency),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symptom {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub note: String,
}

/// One tracked occurrence of a symptom for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub symptom_id: Uuid,
    pub user_id: Uuid,
    /// Joined from the symptom row on load.
    pub symptom_name: String,
    pub stage: EpisodeStage,
    pub status: EpisodeStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub relievers: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
}

impl Episode {
    pub fn new(symptom_id: Uuid, user_id: Uuid, symptom_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symptom_id,
            user_id,
            symptom_name: symptom_name.into(),
            stage: EpisodeStage::Mentioned,
            status: EpisodeStatus::Active,
            started_at: Utc::now(),
            resolved_at: None,
            severity: None,
            location: None,
            frequency: None,
            triggers: Vec::new(),
            relievers: Vec::new(),
            pattern: None,
            timeline: Vec::new(),
        }
    }

    /// Number of filled detail fields, used for stage transitions.
    pub fn detail_count(&self) -> usize {
        let mut count = 0;
        if self.severity.is_some() {
            count += 1;
        }
        if self.location.is_some() {
            count += 1;
        }
        if self.frequency.is_some() {
            count += 1;
        }
        if !self.triggers.is_empty() {
            count += 1;
        }
        if !self.relievers.is_empty() {
            count += 1;
        }
        if self.pattern.is_some() {
            count += 1;
        }
        count
    }

    /// Recompute the stage from filled detail fields. Only ever upgrades:
    /// >=3 details promotes to characterized, >=1 to explored. An episode
    /// already linked stays linked.
    pub fn recompute_stage(&mut self) {
        let count = self.detail_count();
        if count >= 3 {
            self.promote_to(EpisodeStage::Characterized);
        } else if count >= 1 {
            self.promote_to(EpisodeStage::Explored);
        }
    }

    fn promote_to(&mut self, target: EpisodeStage) {
        if target > self.stage {
            self.stage = target;
        }
    }

    /// Apply a partial update: only provided fields overwrite, then the
    /// stage is recomputed. Severity is a 1-10 scale; out-of-range input
    /// is clamped rather than rejected.
    pub fn apply(&mut self, update: &EpisodeUpdate) {
        if let Some(severity) = update.severity {
            self.severity = Some(severity.clamp(1, 10));
        }
        if let Some(location) = &update.location {
            self.location = Some(location.clone());
        }
        if let Some(frequency) = &update.frequency {
            self.frequency = Some(frequency.clone());
        }
        if let Some(triggers) = &update.triggers {
            self.triggers = triggers.clone();
        }
        if let Some(relievers) = &update.relievers {
            self.relievers = relievers.clone();
        }
        if let Some(pattern) = &update.pattern {
            self.pattern = Some(pattern.clone());
        }
        self.recompute_stage();
    }
}

/// Partial episode update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeUpdate {
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub triggers: Option<Vec<String>>,
    #[serde(default)]
    pub relievers: Option<Vec<String>>,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Weighted link between an assessment and an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeLink {
    pub episode_id: Uuid,
    pub weight: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// AI-generated diagnostic hypothesis tied to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub hypothesis: String,
    pub confidence: f64,
    #[serde(default)]
    pub differentials: Option<Vec<String>>,
    pub reasoning: String,
    pub recommended_action: RecommendedCare,
    #[serde(default)]
    pub negative_finding_ids: Vec<Uuid>,
    #[serde(default)]
    pub linked_episodes: Vec<EpisodeLink>,
    pub created_at: DateTime<Utc>,
}

impl Assessment {
    pub fn clamp_confidence(raw: f64) -> f64 {
        raw.clamp(0.0, 1.0)
    }

    /// Trim entries, drop blanks, collapse to None when nothing survives.
    pub fn normalize_differentials(raw: Option<Vec<String>>) -> Option<Vec<String>> {
        let cleaned: Vec<String> = raw?
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    /// Equal 1/N split across the given episodes.
    pub fn equal_weights(episode_ids: &[Uuid]) -> Vec<EpisodeLink> {
        if episode_ids.is_empty() {
            return Vec::new();
        }
        let weight = 1.0 / episode_ids.len() as f64;
        episode_ids
            .iter()
            .map(|id| EpisodeLink {
                episode_id: *id,
                weight,
                reasoning: None,
            })
            .collect()
    }
}

/// Explicit record that a named symptom is denied or absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeFinding {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symptom_name: String,
    #[serde(default)]
    pub episode_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

/// A persisted chat message. Assistant messages carry the status events
/// emitted while the turn was processed, for replay in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub status_events: Vec<StatusEvent>,
    pub created_at: DateTime<Utc>,
}

/// Progress notification payload, one variant per event kind.
///
/// Serializes as `{"type": "<kind>", ...camelCase fields}`; the timestamp
/// is added by the enclosing [`StatusEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StatusUpdate {
    #[serde(rename_all = "camelCase")]
    SymptomAdded {
        episode_id: Uuid,
        symptom_name: String,
        #[serde(default)]
        location: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SymptomUpdated { episode_id: Uuid, symptom_name: String },
    #[serde(rename_all = "camelCase")]
    SymptomResolved { episode_id: Uuid, symptom_name: String },
    AssessmentGenerating { message: String },
    AssessmentAnalyzing { message: String },
    #[serde(rename_all = "camelCase")]
    AssessmentCreated {
        assessment_id: Uuid,
        hypothesis: String,
        confidence: f64,
    },
    #[serde(rename_all = "camelCase")]
    AssessmentComplete { assessment_id: Uuid, message: String },
    Processing { message: String },
    Completed { message: String },
}

impl StatusUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            StatusUpdate::SymptomAdded { .. } => "symptom-added",
            StatusUpdate::SymptomUpdated { .. } => "symptom-updated",
            StatusUpdate::SymptomResolved { .. } => "symptom-resolved",
            StatusUpdate::AssessmentGenerating { .. } => "assessment-generating",
            StatusUpdate::AssessmentAnalyzing { .. } => "assessment-analyzing",
            StatusUpdate::AssessmentCreated { .. } => "assessment-created",
            StatusUpdate::AssessmentComplete { .. } => "assessment-complete",
            StatusUpdate::Processing { .. } => "processing",
            StatusUpdate::Completed { .. } => "completed",
        }
    }
}

/// A status update stamped at creation time.
///
/// Wire shape: `{"type": ..., "timestamp": ISO8601, ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub update: StatusUpdate,
}

impl StatusEvent {
    pub fn now(update: StatusUpdate) -> Self {
        Self {
            timestamp: Utc::now(),
            update,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.update.kind()
    }
}

/// Hint returned by every tool call telling the workflow how to proceed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Continue,
    SubmitFinalResponse,
    CompleteAssessment,
}

/// Final result of one message-processing turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChatResponse {
    pub conversation_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub events: Vec<StatusEvent>,
}
