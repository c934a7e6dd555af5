//! Database module for the taskboard server

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StoreError};
use crate::models::{SEED_STATES, STATE_DONE, Task, TaskPatch, TaskState, User};

const SELECT_TASK: &str = "SELECT t.idTask, t.userID, t.stateID, t.nome_task, t.descrizione,
        t.data_aggiunta, t.data_fine, t.data_completamento, s.nome_stato
     FROM task t JOIN state s ON s.idState = t.stateID";

const SELECT_USER: &str = "SELECT idUtente, nome, cognome, email, role, password FROM utenti";

/// Fields of a task about to be inserted, already validated by the caller
#[derive(Debug, Clone)]
pub struct TaskInsert<'a> {
    pub user_id: i64,
    pub state_id: i64,
    pub nome_task: &'a str,
    pub descrizione: &'a str,
    pub data_fine: NaiveDate,
}

/// Thread-safe database wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

/// Timestamps are stored as fixed-width RFC 3339 text so that SQL ordering on
/// the column matches chronological ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        state_id: row.get(2)?,
        nome_task: row.get(3)?,
        descrizione: row.get(4)?,
        data_aggiunta: row.get(5)?,
        data_fine: row.get(6)?,
        data_completamento: row.get(7)?,
        nome_stato: row.get(8)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<(User, String)> {
    let user = User {
        id: row.get(0)?,
        nome: row.get(1)?,
        cognome: row.get(2)?,
        email: row.get(3)?,
        role: row.get::<_, i32>(4)? != 0,
    };
    Ok((user, row.get(5)?))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Internal(format!("failed to create database directory: {e}"))
            })?;
        }

        Self::with_connection(Connection::open(path)?)
    }

    /// Private in-memory database, used by tests and throwaway servers
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Internal("database mutex poisoned".to_string()))
    }

    /// Initialize the database schema and seed the state lookup
    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS utenti (
                idUtente INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL DEFAULT '',
                cognome TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS state (
                idState INTEGER PRIMARY KEY,
                nome_stato TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task (
                idTask INTEGER PRIMARY KEY AUTOINCREMENT,
                userID INTEGER NOT NULL,
                stateID INTEGER NOT NULL DEFAULT 0,
                nome_task TEXT NOT NULL,
                descrizione TEXT NOT NULL DEFAULT '',
                data_aggiunta TEXT NOT NULL,
                data_fine TEXT NOT NULL,
                data_completamento TEXT,
                FOREIGN KEY (userID) REFERENCES utenti(idUtente) ON DELETE CASCADE,
                FOREIGN KEY (stateID) REFERENCES state(idState)
            );

            CREATE TABLE IF NOT EXISTS sessioni (
                token TEXT PRIMARY KEY,
                userID INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (userID) REFERENCES utenti(idUtente) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_task_user_due ON task(userID, data_fine);
            CREATE INDEX IF NOT EXISTS idx_task_added ON task(data_aggiunta);
            CREATE INDEX IF NOT EXISTS idx_sessioni_expires ON sessioni(expires_at);
            "#,
        )?;

        for (id, label) in SEED_STATES {
            conn.execute(
                "INSERT OR IGNORE INTO state (idState, nome_stato) VALUES (?1, ?2)",
                params![id, label],
            )?;
        }

        Ok(())
    }

    // Users

    /// Insert a new user; the email must not be registered yet
    pub fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        nome: &str,
        cognome: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO utenti (email, password, nome, cognome) VALUES (?1, ?2, ?3, ?4)",
            params![email, password_hash, nome, cognome],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::Conflict("Email già registrata".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user together with the stored password hash
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<(User, String)>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{SELECT_USER} WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn has_user(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        Self::user_exists(&conn, user_id)
    }

    fn user_exists(conn: &Connection, user_id: i64) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT idUtente FROM utenti WHERE idUtente = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // Sessions

    pub fn create_session(&self, user_id: i64, token: &str, ttl: chrono::Duration) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO sessioni (token, userID, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, timestamp(&now), timestamp(&(now + ttl))],
        )?;
        Ok(())
    }

    /// Resolve a live session token to its user
    pub fn session_user(&self, token: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT u.idUtente, u.nome, u.cognome, u.email, u.role, u.password
                 FROM sessioni s JOIN utenti u ON u.idUtente = s.userID
                 WHERE s.token = ?1 AND s.expires_at > ?2",
                params![token, timestamp(&Utc::now())],
                user_from_row,
            )
            .optional()?;
        Ok(found.map(|(user, _)| user))
    }

    /// Returns whether a session was removed
    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM sessioni WHERE token = ?1", params![token])?;
        Ok(removed > 0)
    }

    /// Drop every session of the user with this email, returning how many
    pub fn revoke_sessions_for(&self, email: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM sessioni WHERE userID IN (SELECT idUtente FROM utenti WHERE email = ?1)",
            params![email],
        )?;
        Ok(removed)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM sessioni WHERE expires_at <= ?1",
            params![timestamp(&Utc::now())],
        )?;
        Ok(removed)
    }

    // States

    pub fn list_states(&self) -> Result<Vec<TaskState>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT idState, nome_stato FROM state ORDER BY idState")?;
        let rows = stmt.query_map([], |row| {
            Ok(TaskState {
                id: row.get(0)?,
                nome_stato: row.get(1)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn state_exists(conn: &Connection, state_id: i64) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT idState FROM state WHERE idState = ?1",
                params![state_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // Tasks

    /// Tasks of one user, by due date then most recently added first
    pub fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_TASK} WHERE t.userID = ?1
             ORDER BY t.data_fine ASC, t.data_aggiunta DESC, t.idTask DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], task_from_row)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Fetch one task. With `owner` set, tasks of other users are reported as
    /// missing.
    pub fn get_task(&self, task_id: i64, owner: Option<i64>) -> Result<Task> {
        let conn = self.conn()?;
        Self::fetch_task(&conn, task_id, owner)
    }

    fn fetch_task(conn: &Connection, task_id: i64, owner: Option<i64>) -> Result<Task> {
        conn.query_row(
            &format!("{SELECT_TASK} WHERE t.idTask = ?1 AND (?2 IS NULL OR t.userID = ?2)"),
            params![task_id, owner],
            task_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("Task non trovato"))
    }

    pub fn create_task(&self, task: &TaskInsert<'_>) -> Result<Task> {
        let conn = self.conn()?;

        if !Self::user_exists(&conn, task.user_id)? {
            return Err(StoreError::validation(format!(
                "Utente {} inesistente",
                task.user_id
            )));
        }
        if !Self::state_exists(&conn, task.state_id)? {
            return Err(StoreError::validation(format!(
                "Stato {} inesistente",
                task.state_id
            )));
        }

        // Creation timestamps never go backwards, even if the wall clock does
        let latest: Option<DateTime<Utc>> =
            conn.query_row("SELECT MAX(data_aggiunta) FROM task", [], |row| row.get(0))?;
        let now = Utc::now();
        let added = latest.map_or(now, |latest| latest.max(now));

        let completed = (task.state_id == STATE_DONE).then(|| timestamp(&added));

        conn.execute(
            r#"INSERT INTO task (userID, stateID, nome_task, descrizione, data_aggiunta,
               data_fine, data_completamento)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                task.user_id,
                task.state_id,
                task.nome_task,
                task.descrizione,
                timestamp(&added),
                task.data_fine,
                completed,
            ],
        )?;

        Self::fetch_task(&conn, conn.last_insert_rowid(), None)
    }

    /// Coalesce-merge the provided fields into the task
    pub fn update_task(&self, task_id: i64, owner: Option<i64>, patch: &TaskPatch) -> Result<Task> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"UPDATE task SET
                   nome_task = COALESCE(?3, nome_task),
                   descrizione = COALESCE(?4, descrizione),
                   data_fine = COALESCE(?5, data_fine)
               WHERE idTask = ?1 AND (?2 IS NULL OR userID = ?2)"#,
            params![
                task_id,
                owner,
                patch.nome_task,
                patch.descrizione,
                patch.data_fine,
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::not_found("Task non trovato"));
        }

        Self::fetch_task(&conn, task_id, None)
    }

    /// Move a task to another state. Entering the terminal state stamps the
    /// completion date unless it is already set; leaving it clears the date.
    pub fn change_state(&self, task_id: i64, owner: Option<i64>, state_id: i64) -> Result<Task> {
        let conn = self.conn()?;

        if !Self::state_exists(&conn, state_id)? {
            return Err(StoreError::validation(format!(
                "Stato {state_id} inesistente"
            )));
        }

        let updated = conn.execute(
            r#"UPDATE task SET
                   stateID = ?3,
                   data_completamento = CASE
                       WHEN ?3 = ?4 THEN COALESCE(data_completamento, ?5)
                       ELSE NULL
                   END
               WHERE idTask = ?1 AND (?2 IS NULL OR userID = ?2)"#,
            params![
                task_id,
                owner,
                state_id,
                STATE_DONE,
                timestamp(&Utc::now())
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::not_found("Task non trovato"));
        }

        Self::fetch_task(&conn, task_id, None)
    }

    /// Hard delete
    pub fn delete_task(&self, task_id: i64, owner: Option<i64>) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM task WHERE idTask = ?1 AND (?2 IS NULL OR userID = ?2)",
            params![task_id, owner],
        )?;

        if deleted == 0 {
            return Err(StoreError::not_found("Task non trovato"));
        }
        Ok(())
    }
}
