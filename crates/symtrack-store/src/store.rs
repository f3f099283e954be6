use crate::migrations::run_migrations;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use symtrack_schema::{
    Assessment, ChatMessage, ChatRole, Conversation, Episode, EpisodeLink, EpisodeStage,
    EpisodeStatus, NegativeFinding, RecommendedCare, Symptom,
};
use tokio::task;
use uuid::Uuid;

/// SQLite-backed persistence for all symptom-tracking entities.
///
/// The connection is blocking; every public method hops onto a blocking
/// task so callers can await it from async workflows.
#[derive(Clone)]
pub struct HealthStore {
    db: Arc<Mutex<Connection>>,
}

impl HealthStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    // ============================================================
    // Conversations and messages
    // ============================================================

    pub async fn create_conversation(&self, user_id: Uuid) -> Result<Conversation> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conversation = Conversation {
                id: Uuid::new_v4(),
                user_id,
                started_at: Utc::now(),
            };
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO conversations (id, user_id, started_at) VALUES (?1, ?2, ?3)",
                params![
                    conversation.id.to_string(),
                    conversation.user_id.to_string(),
                    conversation.started_at.to_rfc3339(),
                ],
            )?;
            Ok::<Conversation, anyhow::Error>(conversation)
        })
        .await?
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let found = conn
                .query_row(
                    "SELECT id, user_id, started_at FROM conversations WHERE id = ?1",
                    params![id.to_string()],
                    row_to_conversation,
                )
                .optional()?;
            Ok::<Option<Conversation>, anyhow::Error>(found)
        })
        .await?
    }

    /// Delete a conversation. Messages and assessments cascade; this is the
    /// only hard-delete path in the system.
    pub async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let deleted = conn.execute(
                "DELETE FROM conversations WHERE id = ?1",
                params![id.to_string()],
            )?;
            Ok::<bool, anyhow::Error>(deleted > 0)
        })
        .await?
    }

    pub async fn insert_message(&self, message: ChatMessage) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let events = serde_json::to_string(&message.status_events)?;
            let conn = lock(&db)?;
            conn.execute(
                r#"
                INSERT INTO messages (id, conversation_id, role, content, status_events, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.role.as_str(),
                    message.content,
                    events,
                    message.created_at.to_rfc3339(),
                ],
            )?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn conversation_messages(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                r#"
                SELECT id, conversation_id, role, content, status_events, created_at
                FROM messages
                WHERE conversation_id = ?1
                ORDER BY created_at ASC
                "#,
            )?;
            let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok::<Vec<ChatMessage>, anyhow::Error>(messages)
        })
        .await?
    }

    // ============================================================
    // Symptoms
    // ============================================================

    /// Look up a symptom by name (case-insensitive per user), creating the
    /// row when it does not exist yet.
    pub async fn get_or_create_symptom(
        &self,
        user_id: Uuid,
        name: &str,
        description: Option<String>,
    ) -> Result<Symptom> {
        let db = Arc::clone(&self.db);
        let name = name.trim().to_string();
        task::spawn_blocking(move || {
            if name.is_empty() {
                return Err(anyhow!("symptom name must not be empty"));
            }
            let conn = lock(&db)?;
            let existing = conn
                .query_row(
                    r#"
                    SELECT id, user_id, name, description, created_at
                    FROM symptoms
                    WHERE user_id = ?1 AND lower(name) = lower(?2)
                    "#,
                    params![user_id.to_string(), name],
                    row_to_symptom,
                )
                .optional()?;
            if let Some(symptom) = existing {
                return Ok(symptom);
            }

            let symptom = Symptom {
                id: Uuid::new_v4(),
                user_id,
                name,
                description,
                created_at: Utc::now(),
            };
            conn.execute(
                r#"
                INSERT INTO symptoms (id, user_id, name, description, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    symptom.id.to_string(),
                    symptom.user_id.to_string(),
                    symptom.name,
                    symptom.description,
                    symptom.created_at.to_rfc3339(),
                ],
            )?;
            Ok::<Symptom, anyhow::Error>(symptom)
        })
        .await?
    }

    pub async fn list_symptoms(&self, user_id: Uuid) -> Result<Vec<Symptom>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                r#"
                SELECT id, user_id, name, description, created_at
                FROM symptoms
                WHERE user_id = ?1
                ORDER BY name ASC
                "#,
            )?;
            let rows = stmt.query_map(params![user_id.to_string()], row_to_symptom)?;
            let mut symptoms = Vec::new();
            for row in rows {
                symptoms.push(row?);
            }
            Ok::<Vec<Symptom>, anyhow::Error>(symptoms)
        })
        .await?
    }

    // ============================================================
    // Episodes
    // ============================================================

    pub async fn insert_episode(&self, episode: Episode) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let triggers = serde_json::to_string(&episode.triggers)?;
            let relievers = serde_json::to_string(&episode.relievers)?;
            let timeline = serde_json::to_string(&episode.timeline)?;
            let conn = lock(&db)?;
            conn.execute(
                r#"
                INSERT INTO episodes (
                    id, symptom_id, user_id, stage, status, started_at, resolved_at,
                    severity, location, frequency, triggers, relievers, pattern, timeline
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    episode.id.to_string(),
                    episode.symptom_id.to_string(),
                    episode.user_id.to_string(),
                    episode.stage.as_str(),
                    episode.status.as_str(),
                    episode.started_at.to_rfc3339(),
                    episode.resolved_at.map(|t| t.to_rfc3339()),
                    episode.severity.map(|s| s as i64),
                    episode.location,
                    episode.frequency,
                    triggers,
                    relievers,
                    episode.pattern,
                    timeline,
                ],
            )?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn get_episode(&self, id: Uuid) -> Result<Option<Episode>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let found = conn
                .query_row(
                    &format!("{EPISODE_SELECT} WHERE e.id = ?1"),
                    params![id.to_string()],
                    row_to_episode,
                )
                .optional()?;
            Ok::<Option<Episode>, anyhow::Error>(found)
        })
        .await?
    }

    /// Persist the full mutable state of an episode. Partial-update
    /// semantics are applied in memory before this is called.
    pub async fn update_episode(&self, episode: Episode) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let triggers = serde_json::to_string(&episode.triggers)?;
            let relievers = serde_json::to_string(&episode.relievers)?;
            let timeline = serde_json::to_string(&episode.timeline)?;
            let conn = lock(&db)?;
            let updated = conn.execute(
                r#"
                UPDATE episodes SET
                    stage = ?2, status = ?3, resolved_at = ?4, severity = ?5,
                    location = ?6, frequency = ?7, triggers = ?8, relievers = ?9,
                    pattern = ?10, timeline = ?11
                WHERE id = ?1
                "#,
                params![
                    episode.id.to_string(),
                    episode.stage.as_str(),
                    episode.status.as_str(),
                    episode.resolved_at.map(|t| t.to_rfc3339()),
                    episode.severity.map(|s| s as i64),
                    episode.location,
                    episode.frequency,
                    triggers,
                    relievers,
                    episode.pattern,
                    timeline,
                ],
            )?;
            if updated == 0 {
                return Err(anyhow!("episode not found: {}", episode.id));
            }
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    /// All active episodes for a user, joined with the symptom name.
    pub async fn active_episodes(&self, user_id: Uuid) -> Result<Vec<Episode>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(&format!(
                "{EPISODE_SELECT} WHERE e.user_id = ?1 AND e.status = 'active' ORDER BY e.started_at ASC"
            ))?;
            let rows = stmt.query_map(params![user_id.to_string()], row_to_episode)?;
            let mut episodes = Vec::new();
            for row in rows {
                episodes.push(row?);
            }
            Ok::<Vec<Episode>, anyhow::Error>(episodes)
        })
        .await?
    }

    /// Full episode history for a symptom name, newest first.
    pub async fn episodes_for_symptom(
        &self,
        user_id: Uuid,
        symptom_name: &str,
    ) -> Result<Vec<Episode>> {
        let db = Arc::clone(&self.db);
        let symptom_name = symptom_name.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(&format!(
                "{EPISODE_SELECT} WHERE e.user_id = ?1 AND lower(s.name) = lower(?2) ORDER BY e.started_at DESC"
            ))?;
            let rows = stmt.query_map(params![user_id.to_string(), symptom_name], row_to_episode)?;
            let mut episodes = Vec::new();
            for row in rows {
                episodes.push(row?);
            }
            Ok::<Vec<Episode>, anyhow::Error>(episodes)
        })
        .await?
    }

    // ============================================================
    // Negative findings
    // ============================================================

    pub async fn insert_negative_finding(&self, finding: NegativeFinding) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            conn.execute(
                r#"
                INSERT INTO negative_findings (id, user_id, symptom_name, episode_id, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    finding.id.to_string(),
                    finding.user_id.to_string(),
                    finding.symptom_name,
                    finding.episode_id.map(|id| id.to_string()),
                    finding.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn recent_negative_findings(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<NegativeFinding>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                r#"
                SELECT id, user_id, symptom_name, episode_id, recorded_at
                FROM negative_findings
                WHERE user_id = ?1
                ORDER BY recorded_at DESC
                LIMIT ?2
                "#,
            )?;
            let rows = stmt.query_map(
                params![user_id.to_string(), limit as i64],
                row_to_negative_finding,
            )?;
            let mut findings = Vec::new();
            for row in rows {
                findings.push(row?);
            }
            Ok::<Vec<NegativeFinding>, anyhow::Error>(findings)
        })
        .await?
    }

    // ============================================================
    // Assessments
    // ============================================================

    /// Insert the assessment row and its episode links in one transaction.
    pub async fn insert_assessment(&self, assessment: Assessment) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let differentials = assessment
                .differentials
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let negative_ids = serde_json::to_string(&assessment.negative_finding_ids)?;
            let conn = lock(&db)?;
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                r#"
                INSERT INTO assessments (
                    id, user_id, conversation_id, hypothesis, confidence, differentials,
                    reasoning, recommended_action, negative_finding_ids, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    assessment.id.to_string(),
                    assessment.user_id.to_string(),
                    assessment.conversation_id.to_string(),
                    assessment.hypothesis,
                    assessment.confidence,
                    differentials,
                    assessment.reasoning,
                    assessment.recommended_action.as_str(),
                    negative_ids,
                    assessment.created_at.to_rfc3339(),
                ],
            )?;
            insert_links(&tx, assessment.id, &assessment.linked_episodes)?;
            tx.commit()?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    /// Update an assessment row. When `replace_links` is set, existing
    /// episode links are removed and the supplied set is inserted; links
    /// are never merged.
    pub async fn update_assessment(&self, assessment: Assessment, replace_links: bool) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let differentials = assessment
                .differentials
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let negative_ids = serde_json::to_string(&assessment.negative_finding_ids)?;
            let conn = lock(&db)?;
            let tx = conn.unchecked_transaction()?;
            let updated = tx.execute(
                r#"
                UPDATE assessments SET
                    hypothesis = ?2, confidence = ?3, differentials = ?4,
                    reasoning = ?5, recommended_action = ?6, negative_finding_ids = ?7
                WHERE id = ?1
                "#,
                params![
                    assessment.id.to_string(),
                    assessment.hypothesis,
                    assessment.confidence,
                    differentials,
                    assessment.reasoning,
                    assessment.recommended_action.as_str(),
                    negative_ids,
                ],
            )?;
            if updated == 0 {
                return Err(anyhow!("assessment not found: {}", assessment.id));
            }
            if replace_links {
                tx.execute(
                    "DELETE FROM assessment_episode_links WHERE assessment_id = ?1",
                    params![assessment.id.to_string()],
                )?;
                insert_links(&tx, assessment.id, &assessment.linked_episodes)?;
            }
            tx.commit()?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let found = conn
                .query_row(
                    &format!("{ASSESSMENT_SELECT} WHERE id = ?1"),
                    params![id.to_string()],
                    row_to_assessment,
                )
                .optional()?;
            let found = match found {
                Some(mut assessment) => {
                    assessment.linked_episodes = load_links(&conn, assessment.id)?;
                    Some(assessment)
                }
                None => None,
            };
            Ok::<Option<Assessment>, anyhow::Error>(found)
        })
        .await?
    }

    /// Most recent assessment for a conversation, if any.
    pub async fn assessment_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Assessment>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let found = conn
                .query_row(
                    &format!(
                        "{ASSESSMENT_SELECT} WHERE conversation_id = ?1 ORDER BY created_at DESC LIMIT 1"
                    ),
                    params![conversation_id.to_string()],
                    row_to_assessment,
                )
                .optional()?;
            let found = match found {
                Some(mut assessment) => {
                    assessment.linked_episodes = load_links(&conn, assessment.id)?;
                    Some(assessment)
                }
                None => None,
            };
            Ok::<Option<Assessment>, anyhow::Error>(found)
        })
        .await?
    }

    pub async fn list_assessments(&self, user_id: Uuid) -> Result<Vec<Assessment>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(&format!(
                "{ASSESSMENT_SELECT} WHERE user_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map(params![user_id.to_string()], row_to_assessment)?;
            let mut assessments = Vec::new();
            for row in rows {
                assessments.push(row?);
            }
            for assessment in &mut assessments {
                assessment.linked_episodes = load_links(&conn, assessment.id)?;
            }
            Ok::<Vec<Assessment>, anyhow::Error>(assessments)
        })
        .await?
    }
}

const EPISODE_SELECT: &str = r#"
    SELECT e.id, e.symptom_id, e.user_id, s.name, e.stage, e.status, e.started_at,
           e.resolved_at, e.severity, e.location, e.frequency, e.triggers,
           e.relievers, e.pattern, e.timeline
    FROM episodes e
    JOIN symptoms s ON s.id = e.symptom_id
"#;

const ASSESSMENT_SELECT: &str = r#"
    SELECT id, user_id, conversation_id, hypothesis, confidence, differentials,
           reasoning, recommended_action, negative_finding_ids, created_at
    FROM assessments
"#;

fn lock(db: &Arc<Mutex<Connection>>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|_| anyhow!("failed to lock sqlite connection"))
}

fn insert_links(conn: &Connection, assessment_id: Uuid, links: &[EpisodeLink]) -> Result<()> {
    for link in links {
        conn.execute(
            r#"
            INSERT INTO assessment_episode_links (assessment_id, episode_id, weight, reasoning)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                assessment_id.to_string(),
                link.episode_id.to_string(),
                link.weight,
                link.reasoning,
            ],
        )?;
    }
    Ok(())
}

fn load_links(conn: &Connection, assessment_id: Uuid) -> Result<Vec<EpisodeLink>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT episode_id, weight, reasoning
        FROM assessment_episode_links
        WHERE assessment_id = ?1
        "#,
    )?;
    let rows = stmt.query_map(params![assessment_id.to_string()], |row| {
        let episode_id: String = row.get(0)?;
        Ok(EpisodeLink {
            episode_id: parse_uuid(0, &episode_id)?,
            weight: row.get(1)?,
            reasoning: row.get(2)?,
        })
    })?;
    let mut links = Vec::new();
    for row in rows {
        links.push(row?);
    }
    Ok(links)
}

fn conversion_err(idx: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, detail.into())
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_err(idx, format!("invalid uuid {raw}: {e}")))
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, format!("invalid timestamp {raw}: {e}")))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_err(idx, format!("invalid json column: {e}")))
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let started_at: String = row.get(2)?;
    Ok(Conversation {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        started_at: parse_ts(2, &started_at)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let status_events: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(ChatMessage {
        id: parse_uuid(0, &id)?,
        conversation_id: parse_uuid(1, &conversation_id)?,
        role: ChatRole::parse(&role)
            .ok_or_else(|| conversion_err(2, format!("invalid role: {role}")))?,
        content: row.get(3)?,
        status_events: parse_json(4, &status_events)?,
        created_at: parse_ts(5, &created_at)?,
    })
}

fn row_to_symptom(row: &Row) -> rusqlite::Result<Symptom> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    Ok(Symptom {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_ts(4, &created_at)?,
    })
}

fn row_to_episode(row: &Row) -> rusqlite::Result<Episode> {
    let id: String = row.get(0)?;
    let symptom_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let stage: String = row.get(4)?;
    let status: String = row.get(5)?;
    let started_at: String = row.get(6)?;
    let resolved_at: Option<String> = row.get(7)?;
    let severity: Option<i64> = row.get(8)?;
    let triggers: String = row.get(11)?;
    let relievers: String = row.get(12)?;
    let timeline: String = row.get(14)?;
    Ok(Episode {
        id: parse_uuid(0, &id)?,
        symptom_id: parse_uuid(1, &symptom_id)?,
        user_id: parse_uuid(2, &user_id)?,
        symptom_name: row.get(3)?,
        stage: EpisodeStage::parse(&stage)
            .ok_or_else(|| conversion_err(4, format!("invalid stage: {stage}")))?,
        status: EpisodeStatus::parse(&status)
            .ok_or_else(|| conversion_err(5, format!("invalid status: {status}")))?,
        started_at: parse_ts(6, &started_at)?,
        resolved_at: resolved_at.as_deref().map(|s| parse_ts(7, s)).transpose()?,
        severity: severity.map(|s| s as u8),
        location: row.get(9)?,
        frequency: row.get(10)?,
        triggers: parse_json(11, &triggers)?,
        relievers: parse_json(12, &relievers)?,
        pattern: row.get(13)?,
        timeline: parse_json(14, &timeline)?,
    })
}

fn row_to_negative_finding(row: &Row) -> rusqlite::Result<NegativeFinding> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let episode_id: Option<String> = row.get(3)?;
    let recorded_at: String = row.get(4)?;
    Ok(NegativeFinding {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        symptom_name: row.get(2)?,
        episode_id: episode_id.as_deref().map(|s| parse_uuid(3, s)).transpose()?,
        recorded_at: parse_ts(4, &recorded_at)?,
    })
}

fn row_to_assessment(row: &Row) -> rusqlite::Result<Assessment> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let conversation_id: String = row.get(2)?;
    let differentials: Option<String> = row.get(5)?;
    let recommended_action: String = row.get(7)?;
    let negative_ids: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(Assessment {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        conversation_id: parse_uuid(2, &conversation_id)?,
        hypothesis: row.get(3)?,
        confidence: row.get(4)?,
        differentials: differentials
            .as_deref()
            .map(|s| parse_json(5, s))
            .transpose()?,
        reasoning: row.get(6)?,
        recommended_action: RecommendedCare::parse(&recommended_action).ok_or_else(|| {
            conversion_err(7, format!("invalid recommended action: {recommended_action}"))
        })?,
        negative_finding_ids: parse_json(8, &negative_ids)?,
        linked_episodes: Vec::new(),
        created_at: parse_ts(9, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use symtrack_schema::{StatusEvent, StatusUpdate};

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
    async fn symptom_get_or_create_is_case_insensitive() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let first = store
            .get_or_create_symptom(user_id, "Headache", None)
            .await
            .unwrap();
        let second = store
            .get_or_create_symptom(user_id, "headache", Some("pounding".into()))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_symptoms(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn symptoms_are_scoped_per_user() {
        let store = HealthStore::open_in_memory().unwrap();
        let a = store
            .get_or_create_symptom(Uuid::new_v4(), "fever", None)
            .await
            .unwrap();
        let b = store
            .get_or_create_symptom(Uuid::new_v4(), "fever", None)
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn episode_round_trips_with_details() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let mut episode = seed_episode(&store, user_id, "headache").await;

        episode.severity = Some(7);
        episode.location = Some("behind the eyes".into());
        episode.triggers = vec!["bright light".into(), "stress".into()];
        episode.recompute_stage();
        store.update_episode(episode.clone()).await.unwrap();

        let loaded = store.get_episode(episode.id).await.unwrap().unwrap();
        assert_eq!(loaded.symptom_name, "headache");
        assert_eq!(loaded.severity, Some(7));
        assert_eq!(loaded.triggers, vec!["bright light", "stress"]);
        assert_eq!(loaded.stage, EpisodeStage::Characterized);
    }

    #[tokio::test]
    async fn update_missing_episode_fails() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let symptom = store
            .get_or_create_symptom(user_id, "cough", None)
            .await
            .unwrap();
        let episode = Episode::new(symptom.id, user_id, "cough");
        let err = store.update_episode(episode).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn active_episodes_excludes_resolved() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let mut resolved = seed_episode(&store, user_id, "nausea").await;
        seed_episode(&store, user_id, "fever").await;

        resolved.status = EpisodeStatus::Resolved;
        resolved.resolved_at = Some(Utc::now());
        store.update_episode(resolved).await.unwrap();

        let active = store.active_episodes(user_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symptom_name, "fever");
    }

    #[tokio::test]
    async fn episode_history_is_newest_first() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let symptom = store
            .get_or_create_symptom(user_id, "migraine", None)
            .await
            .unwrap();
        let mut old = Episode::new(symptom.id, user_id, "migraine");
        old.started_at = Utc::now() - chrono::TimeDelta::try_days(7).unwrap();
        store.insert_episode(old.clone()).await.unwrap();
        let recent = Episode::new(symptom.id, user_id, "migraine");
        store.insert_episode(recent.clone()).await.unwrap();

        let history = store
            .episodes_for_symptom(user_id, "Migraine")
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, recent.id);
        assert_eq!(history[1].id, old.id);
    }

    #[tokio::test]
    async fn assessment_round_trips_exactly() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let conversation = store.create_conversation(user_id).await.unwrap();
        let episode = seed_episode(&store, user_id, "headache").await;

        let assessment = Assessment {
            id: Uuid::new_v4(),
            user_id,
            conversation_id: conversation.id,
            hypothesis: "Tension headache".into(),
            confidence: 0.7,
            differentials: Some(vec!["migraine".into()]),
            reasoning: "recurring, stress-linked".into(),
            recommended_action: RecommendedCare::SeeGp,
            negative_finding_ids: vec![Uuid::new_v4()],
            linked_episodes: vec![EpisodeLink {
                episode_id: episode.id,
                weight: 1.0,
                reasoning: Some("primary complaint".into()),
            }],
            created_at: Utc::now(),
        };
        store.insert_assessment(assessment.clone()).await.unwrap();

        let loaded = store.get_assessment(assessment.id).await.unwrap().unwrap();
        assert_eq!(loaded.confidence, 0.7);
        assert_eq!(loaded.recommended_action, RecommendedCare::SeeGp);
        assert_eq!(loaded.differentials.as_deref(), Some(&["migraine".to_string()][..]));
        assert_eq!(loaded.linked_episodes.len(), 1);
        assert_eq!(loaded.linked_episodes[0].episode_id, episode.id);
        assert_eq!(loaded.negative_finding_ids, assessment.negative_finding_ids);
    }

    #[tokio::test]
    async fn update_assessment_replaces_links_not_merges() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let conversation = store.create_conversation(user_id).await.unwrap();
        let first = seed_episode(&store, user_id, "headache").await;
        let second = seed_episode(&store, user_id, "fever").await;

        let mut assessment = Assessment {
            id: Uuid::new_v4(),
            user_id,
            conversation_id: conversation.id,
            hypothesis: "Viral infection".into(),
            confidence: 0.6,
            differentials: None,
            reasoning: "fever and headache together".into(),
            recommended_action: RecommendedCare::SelfCare,
            negative_finding_ids: vec![],
            linked_episodes: vec![EpisodeLink {
                episode_id: first.id,
                weight: 1.0,
                reasoning: None,
            }],
            created_at: Utc::now(),
        };
        store.insert_assessment(assessment.clone()).await.unwrap();

        assessment.linked_episodes = vec![EpisodeLink {
            episode_id: second.id,
            weight: 1.0,
            reasoning: None,
        }];
        store
            .update_assessment(assessment.clone(), true)
            .await
            .unwrap();

        let loaded = store.get_assessment(assessment.id).await.unwrap().unwrap();
        assert_eq!(loaded.linked_episodes.len(), 1);
        assert_eq!(loaded.linked_episodes[0].episode_id, second.id);
    }

    #[tokio::test]
    async fn messages_persist_status_events_for_replay() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let conversation = store.create_conversation(user_id).await.unwrap();

        let message = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            role: ChatRole::Assistant,
            content: "I've noted your headache.".into(),
            status_events: vec![StatusEvent::now(StatusUpdate::SymptomAdded {
                episode_id: Uuid::new_v4(),
                symptom_name: "headache".into(),
                location: None,
            })],
            created_at: Utc::now(),
        };
        store.insert_message(message.clone()).await.unwrap();

        let messages = store
            .conversation_messages(conversation.id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status_events.len(), 1);
        assert_eq!(messages[0].status_events[0].kind(), "symptom-added");
    }

    #[tokio::test]
    async fn conversation_delete_cascades() {
        let store = HealthStore::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let conversation = store.create_conversation(user_id).await.unwrap();
        let episode = seed_episode(&store, user_id, "dizziness").await;

        store
            .insert_message(ChatMessage {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                role: ChatRole::User,
                content: "I feel dizzy".into(),
                status_events: vec![],
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .insert_assessment(Assessment {
                id: Uuid::new_v4(),
                user_id,
                conversation_id: conversation.id,
                hypothesis: "Dehydration".into(),
                confidence: 0.5,
                differentials: None,
                reasoning: "single symptom".into(),
                recommended_action: RecommendedCare::SelfCare,
                negative_finding_ids: vec![],
                linked_episodes: vec![EpisodeLink {
                    episode_id: episode.id,
                    weight: 1.0,
                    reasoning: None,
                }],
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.delete_conversation(conversation.id).await.unwrap());
        assert!(store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .conversation_messages(conversation.id)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .assessment_for_conversation(conversation.id)
            .await
            .unwrap()
            .is_none());
        // Episodes survive conversation deletion.
        assert!(store.get_episode(episode.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_missing_conversation_returns_false() {
        let store = HealthStore::open_in_memory().unwrap();
        assert!(!store.delete_conversation(Uuid::new_v4()).await.unwrap());
    }
}
