use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashSet;

type Migration = (i64, &'static str);

fn migrations() -> Vec<Migration> {
    vec![
        (
            1,
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                started_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                status_events TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
            "#,
        ),
        (
            2,
            r#"
            CREATE TABLE IF NOT EXISTS symptoms (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_symptoms_user_name ON symptoms(user_id, lower(name));

            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                symptom_id TEXT NOT NULL REFERENCES symptoms(id),
                user_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                resolved_at TEXT,
                severity INTEGER,
                location TEXT,
                frequency TEXT,
                triggers TEXT NOT NULL,
                relievers TEXT NOT NULL,
                pattern TEXT,
                timeline TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_user_status ON episodes(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_episodes_symptom ON episodes(symptom_id, started_at DESC);

            CREATE TABLE IF NOT EXISTS negative_findings (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                symptom_name TEXT NOT NULL,
                episode_id TEXT,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_negative_findings_user ON negative_findings(user_id, recorded_at DESC);
            "#,
        ),
        (
            3,
            r#"
            CREATE TABLE IF NOT EXISTS assessments (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                hypothesis TEXT NOT NULL,
                confidence REAL NOT NULL,
                differentials TEXT,
                reasoning TEXT NOT NULL,
                recommended_action TEXT NOT NULL,
                negative_finding_ids TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assessments_user ON assessments(user_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_assessments_conversation ON assessments(conversation_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS assessment_episode_links (
                assessment_id TEXT NOT NULL REFERENCES assessments(id) ON DELETE CASCADE,
                episode_id TEXT NOT NULL,
                weight REAL NOT NULL,
                reasoning TEXT,
                PRIMARY KEY (assessment_id, episode_id)
            );
            "#,
        ),
    ]
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS __schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )?;

    let mut stmt = conn.prepare("SELECT version FROM __schema_version")?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    let mut applied = HashSet::new();
    for row in rows {
        applied.insert(row?);
    }

    for (version, sql) in migrations() {
        if applied.contains(&version) {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO __schema_version(version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;
        tx.commit()?;
        tracing::info!("applied schema migration {version}");
    }

    Ok(())
}
