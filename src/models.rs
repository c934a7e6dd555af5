//! Data models shared between the task store and the client cache
//!
//! Field names follow the wire format of the JSON API (`idTask`, `nome_task`,
//! `data_fine`, ...), which in turn mirrors the relational schema.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Initial state of a freshly created task ("Da fare")
pub const STATE_TODO: i64 = 0;
/// "In corso"
pub const STATE_IN_PROGRESS: i64 = 1;
/// Terminal state ("Completato")
pub const STATE_DONE: i64 = 2;

/// Seed rows for the `state` lookup table
pub const SEED_STATES: [(i64, &str); 3] = [
    (STATE_TODO, "Da fare"),
    (STATE_IN_PROGRESS, "In corso"),
    (STATE_DONE, "Completato"),
];

/// A registered user, as returned to clients (never carries the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "idUtente")]
    pub id: i64,
    pub nome: String,
    pub cognome: String,
    pub email: String,
    /// Elevated account
    #[serde(default)]
    pub role: bool,
}

/// Entry of the task state lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(rename = "idState")]
    pub id: i64,
    pub nome_stato: String,
}

/// A task joined with the label of its state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "idTask")]
    pub id: i64,
    #[serde(rename = "userID")]
    pub user_id: i64,
    #[serde(rename = "stateID")]
    pub state_id: i64,
    pub nome_task: String,
    #[serde(default)]
    pub descrizione: String,
    pub data_aggiunta: DateTime<Utc>,
    #[serde(with = "lenient_date")]
    pub data_fine: NaiveDate,
    #[serde(default)]
    pub data_completamento: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nome_stato: String,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.state_id == STATE_DONE
    }
}

/// Body of `POST /api/register`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub cognome: Option<String>,
}

/// Body of `POST /api/login`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Successful login: the user record plus the session token to present as
/// `Authorization: Bearer <token>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

/// Body of `POST /api/tasks`
///
/// Every field is optional at the serde level so that missing fields surface
/// as validation errors with a readable message instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(rename = "stateID", default, skip_serializing_if = "Option::is_none")]
    pub state_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descrizione: Option<String>,
    #[serde(
        default,
        with = "lenient_date::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_fine: Option<NaiveDate>,
}

/// Body of `PUT /api/tasks/:taskId`; omitted or null fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descrizione: Option<String>,
    #[serde(
        default,
        with = "lenient_date::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_fine: Option<NaiveDate>,
}

/// Body of `PUT /api/tasks/:taskId/state`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateChange {
    #[serde(rename = "stateID", default)]
    pub state_id: Option<i64>,
}

/// Confirmation returned by `DELETE /api/tasks/:taskId`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedTask {
    pub message: String,
    #[serde(rename = "idTask")]
    pub id: i64,
}

/// Plain `{message}` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

/// Error body returned for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Due dates travel as `YYYY-MM-DD`. Browsers tend to send full RFC 3339
/// date-times instead, so those are accepted too and truncated to their date.
pub mod lenient_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid date: {raw}")))
    }

    pub mod option {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer, de::Error};

        pub fn serialize<S: Serializer>(
            date: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => super::serialize(date, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid date: {raw}"))),
            }
        }
    }
}
