use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The active grid session: the month shaping the column schema and the
/// filtered subset currently on display (`None` = whole roster).
pub struct GridView {
    pub month: NaiveDate,
    pub visible: Option<Vec<String>>,
}

pub struct AppState {
    pub db: Connection,
    pub view: Option<GridView>,
}
