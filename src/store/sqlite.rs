//! SQLite-backed Task Store
//!
//! The store is the single source of truth for swarms, agents, tasks and
//! intervention events. The coordinator, scheduler and monitor all read
//! and mutate it from independent loops, so every access is serialized
//! through one connection guarded by a mutex; WAL mode keeps readers
//! cheap.

use super::{EventKind, InterventionEvent, Result, StoreError};
use crate::scheduler::find_cycle;
use crate::slo::SloReport;
use crate::swarm::{
    derive_status, AgentHealth, AgentId, AgentRecord, AgentStatus, CapabilitySet, RoleRoutes,
    Swarm, SwarmId, SwarmMetadata, SwarmPlan, SwarmSnapshot, SwarmStatus, Task, TaskId,
    TaskPayload, TaskStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// The swarm Task Store
pub struct SwarmStore {
    conn: Mutex<Connection>,
}

impl SwarmStore {
    /// Open or create a store database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Init(e.to_string()))?;
        }

        tracing::info!(path = %path.as_ref().display(), "Opening swarm store");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests and embedded use)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS swarms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'idle',
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                swarm_id TEXT NOT NULL,
                capabilities TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'idle',
                last_heartbeat TEXT NOT NULL,
                tasks_completed INTEGER NOT NULL DEFAULT 0,
                tasks_failed INTEGER NOT NULL DEFAULT 0,
                avg_execution_secs REAL NOT NULL DEFAULT 0.0,
                FOREIGN KEY (swarm_id) REFERENCES swarms(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                swarm_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                priority INTEGER NOT NULL DEFAULT 5,
                dependencies TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (swarm_id) REFERENCES swarms(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                swarm_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                details TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS slo_results (
                id TEXT PRIMARY KEY,
                swarm_id TEXT NOT NULL,
                report TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_agents_swarm ON agents(swarm_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_swarm ON tasks(swarm_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks(agent_id);
            CREATE INDEX IF NOT EXISTS idx_events_task ON events(task_id);
            CREATE INDEX IF NOT EXISTS idx_slo_swarm ON slo_results(swarm_id);
            "#,
        )?;
        Ok(())
    }

    /// Register a planner-submitted swarm
    ///
    /// Validates the plan (declared agents, known dependencies, role
    /// coverage) and rejects cyclic dependency graphs before anything is
    /// written; on success inserts the swarm, its agents and its tasks in
    /// one transaction and returns the generated swarm id.
    pub fn start_swarm(&self, plan: &SwarmPlan, routes: &RoleRoutes) -> crate::Result<SwarmId> {
        plan.validate(routes)?;

        let swarm_id = SwarmId::generate();
        if let Some(cycle) = find_cycle(&plan.tasks) {
            let path = cycle
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(crate::WaggleError::CycleDetected {
                swarm: swarm_id,
                path,
            });
        }

        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(StoreError::from)?;

        tx.execute(
            "INSERT INTO swarms (id, name, status, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                swarm_id.as_str(),
                plan.name,
                SwarmStatus::Idle.as_str(),
                serde_json::to_string(&plan.metadata).map_err(StoreError::from)?,
                now.to_rfc3339(),
            ],
        )
        .map_err(StoreError::from)?;

        for agent in &plan.agents {
            tx.execute(
                r#"
                INSERT INTO agents
                (id, swarm_id, capabilities, status, last_heartbeat)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    agent.id.as_str(),
                    swarm_id.as_str(),
                    serde_json::to_string(&agent.capabilities).map_err(StoreError::from)?,
                    AgentStatus::Idle.as_str(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(StoreError::from)?;
        }

        for task in &plan.tasks {
            tx.execute(
                r#"
                INSERT INTO tasks
                (id, swarm_id, agent_id, description, status, priority,
                 dependencies, payload, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    task.id.as_str(),
                    swarm_id.as_str(),
                    task.agent_id.as_str(),
                    task.description,
                    task.status.as_str(),
                    task.priority,
                    serde_json::to_string(&task.dependencies).map_err(StoreError::from)?,
                    serde_json::to_string(&task.payload).map_err(StoreError::from)?,
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .map_err(StoreError::from)?;
        }

        tx.commit().map_err(StoreError::from)?;

        tracing::info!(
            swarm = %swarm_id,
            agents = plan.agents.len(),
            tasks = plan.tasks.len(),
            "Swarm registered"
        );
        Ok(swarm_id)
    }

    /// Fetch a swarm record
    pub fn swarm(&self, id: &SwarmId) -> Result<Swarm> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, status, metadata, created_at FROM swarms WHERE id = ?1",
            params![id.as_str()],
            row_to_swarm,
        )
        .optional()?
        .ok_or_else(|| StoreError::SwarmNotFound(id.to_string()))
    }

    /// Fetch the full swarm view (swarm record, agents, tasks)
    pub fn snapshot(&self, id: &SwarmId) -> Result<SwarmSnapshot> {
        let swarm = self.swarm(id)?;
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, swarm_id, capabilities, status, last_heartbeat,
                   tasks_completed, tasks_failed, avg_execution_secs
            FROM agents WHERE swarm_id = ?1 ORDER BY rowid
            "#,
        )?;
        let agents = stmt
            .query_map(params![id.as_str()], row_to_agent)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!("{} WHERE swarm_id = ?1 ORDER BY rowid", TASK_SELECT))?;
        let tasks = stmt
            .query_map(params![id.as_str()], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(SwarmSnapshot {
            swarm,
            agents,
            tasks,
        })
    }

    /// Fetch a single task
    pub fn task(&self, id: &TaskId) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{} WHERE id = ?1", TASK_SELECT),
            params![id.as_str()],
            row_to_task,
        )
        .optional()?
        .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))
    }

    /// Pending tasks assigned to an agent, most urgent first
    pub fn tasks_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE agent_id = ?1 AND status = 'pending' ORDER BY priority DESC, rowid",
            TASK_SELECT
        ))?;
        let tasks = stmt
            .query_map(params![agent_id.as_str()], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Update a task's status, bumping its updated_at timestamp
    pub fn update_task_status(&self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Persist an agent's health record
    pub fn update_agent(&self, record: &AgentRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE agents
            SET capabilities = ?1, status = ?2, last_heartbeat = ?3,
                tasks_completed = ?4, tasks_failed = ?5, avg_execution_secs = ?6
            WHERE id = ?7
            "#,
            params![
                serde_json::to_string(&record.health.capabilities)?,
                record.health.status.as_str(),
                record.health.last_heartbeat.to_rfc3339(),
                record.health.tasks_completed as i64,
                record.health.tasks_failed as i64,
                record.health.avg_execution_secs,
                record.id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::AgentNotFound(record.id.to_string()));
        }
        Ok(())
    }

    /// Refresh an agent's heartbeat timestamp
    pub fn record_heartbeat(&self, agent_id: &AgentId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE agents SET last_heartbeat = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), agent_id.as_str()],
        )?;
        Ok(())
    }

    /// Set a swarm's status directly (used for external pause/resume)
    pub fn update_swarm_status(&self, id: &SwarmId, status: SwarmStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE swarms SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::SwarmNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Recompute and persist a swarm's derived aggregate status
    ///
    /// An externally paused swarm stays paused.
    pub fn refresh_swarm_status(&self, id: &SwarmId) -> Result<SwarmStatus> {
        let snapshot = self.snapshot(id)?;
        if snapshot.swarm.status == SwarmStatus::Paused {
            return Ok(SwarmStatus::Paused);
        }
        let status = derive_status(&snapshot.tasks);
        self.update_swarm_status(id, status)?;
        Ok(status)
    }

    /// Failed tasks updated within the window, most urgent first
    ///
    /// The window keeps the monitor from resurrecting stale failures.
    pub fn failed_tasks(&self, window: Duration) -> Result<Vec<Task>> {
        let cutoff = cutoff_rfc3339(window);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'failed' AND updated_at > ?1 ORDER BY priority DESC, rowid",
            TASK_SELECT
        ))?;
        let tasks = stmt
            .query_map(params![cutoff], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Agents currently marked as working, across all swarms
    pub fn working_agents(&self) -> Result<Vec<AgentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, swarm_id, capabilities, status, last_heartbeat,
                   tasks_completed, tasks_failed, avg_execution_secs
            FROM agents WHERE status = 'working' ORDER BY rowid
            "#,
        )?;
        let agents = stmt
            .query_map([], row_to_agent)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(agents)
    }

    /// Append an intervention event (never overwritten)
    pub fn record_event(&self, event: &InterventionEvent) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO events (id, task_id, swarm_id, kind, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.id,
                event.task_id.as_str(),
                event.swarm_id.as_str(),
                event.kind.as_str(),
                event.details,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All intervention events for a task, oldest first
    pub fn events_for_task(&self, task_id: &TaskId) -> Result<Vec<InterventionEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, task_id, swarm_id, kind, details, created_at
            FROM events WHERE task_id = ?1 ORDER BY rowid
            "#,
        )?;
        let events = stmt
            .query_map(params![task_id.as_str()], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Number of retry interventions within the window
    pub fn recent_interventions(&self, window: Duration) -> Result<usize> {
        let cutoff = cutoff_rfc3339(window);
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE kind = 'retry' AND created_at > ?1",
            params![cutoff],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Retry attempts already spent on a task (store-resident retry state)
    pub fn retry_count(&self, task_id: &TaskId) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE task_id = ?1 AND kind = 'retry'",
            params![task_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Whether a terminal exhaustion event was already recorded for a task
    pub fn has_exhaustion_event(&self, task_id: &TaskId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE task_id = ?1 AND kind = 'retries_exhausted'",
            params![task_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Task counts grouped by status, across all swarms
    pub fn status_counts(&self) -> Result<HashMap<TaskStatus, usize>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((TaskStatus::from_str(&status), count as usize))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    /// Share of retried tasks that later completed, as a percentage
    ///
    /// 100% when nothing has been retried yet.
    pub fn retry_success_rate(&self) -> Result<f64> {
        let conn = self.conn.lock().unwrap();
        let retried: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT task_id) FROM events WHERE kind = 'retry'",
            [],
            |row| row.get(0),
        )?;
        if retried == 0 {
            return Ok(100.0);
        }

        let completed: i64 = conn.query_row(
            r#"
            SELECT COUNT(DISTINCT e.task_id)
            FROM events e JOIN tasks t ON t.id = e.task_id
            WHERE e.kind = 'retry' AND t.status = 'completed'
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(completed as f64 / retried as f64 * 100.0)
    }

    /// Append an SLO compliance report (the gate never mutates prior state)
    pub fn record_slo(&self, report: &SloReport) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO slo_results (id, swarm_id, report, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                format!("slo-{}", crate::swarm::unique_suffix()),
                report.swarm_id.as_str(),
                serde_json::to_string(report)?,
                report.evaluated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All recorded SLO reports for a swarm, oldest first
    pub fn slo_for_swarm(&self, id: &SwarmId) -> Result<Vec<SloReport>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT report FROM slo_results WHERE swarm_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![id.as_str()], |row| {
            let raw: String = row.get(0)?;
            serde_json::from_str::<SloReport>(&raw).map_err(|e| conversion_error(0, e))
        })?;
        let reports = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reports)
    }
}

const TASK_SELECT: &str = r#"
    SELECT id, swarm_id, agent_id, description, status, priority,
           dependencies, payload, created_at, updated_at
    FROM tasks
"#;

fn conversion_error(idx: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_swarm(row: &rusqlite::Row) -> rusqlite::Result<Swarm> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let status: String = row.get(2)?;
    let metadata_raw: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    let metadata: SwarmMetadata =
        serde_json::from_str(&metadata_raw).map_err(|e| conversion_error(3, e))?;

    Ok(Swarm {
        id: SwarmId::new(id),
        name,
        status: SwarmStatus::from_str(&status),
        metadata,
        created_at: parse_timestamp(&created_at),
    })
}

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<AgentRecord> {
    let id: String = row.get(0)?;
    let swarm_id: String = row.get(1)?;
    let capabilities_raw: String = row.get(2)?;
    let status: String = row.get(3)?;
    let last_heartbeat: String = row.get(4)?;
    let tasks_completed: i64 = row.get(5)?;
    let tasks_failed: i64 = row.get(6)?;
    let avg_execution_secs: f64 = row.get(7)?;

    let capabilities: CapabilitySet =
        serde_json::from_str(&capabilities_raw).map_err(|e| conversion_error(2, e))?;

    Ok(AgentRecord {
        id: AgentId::new(id),
        swarm_id: SwarmId::new(swarm_id),
        health: AgentHealth {
            capabilities,
            status: AgentStatus::from_str(&status),
            last_heartbeat: parse_timestamp(&last_heartbeat),
            tasks_completed: tasks_completed as u64,
            tasks_failed: tasks_failed as u64,
            avg_execution_secs,
        },
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let swarm_id: String = row.get(1)?;
    let agent_id: String = row.get(2)?;
    let description: String = row.get(3)?;
    let status: String = row.get(4)?;
    let priority: i32 = row.get(5)?;
    let dependencies_raw: String = row.get(6)?;
    let payload_raw: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    let dependencies: Vec<TaskId> =
        serde_json::from_str(&dependencies_raw).map_err(|e| conversion_error(6, e))?;
    let payload: TaskPayload =
        serde_json::from_str(&payload_raw).map_err(|e| conversion_error(7, e))?;

    Ok(Task {
        id: TaskId::new(id),
        swarm_id: SwarmId::new(swarm_id),
        agent_id: AgentId::new(agent_id),
        description,
        status: TaskStatus::from_str(&status),
        priority,
        dependencies,
        payload,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<InterventionEvent> {
    let id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let swarm_id: String = row.get(2)?;
    let kind: String = row.get(3)?;
    let details: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(InterventionEvent {
        id,
        task_id: TaskId::new(task_id),
        swarm_id: SwarmId::new(swarm_id),
        kind: EventKind::from_str(&kind),
        details,
        created_at: parse_timestamp(&created_at),
    })
}

fn cutoff_rfc3339(window: Duration) -> String {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
    (Utc::now() - window).to_rfc3339()
}
