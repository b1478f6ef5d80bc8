use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: i32,
    #[sqlx(rename = "option_text")]
    pub text: String,
    pub votes: i64,
}

/// Point-in-time view of every tally plus the poll question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub question: String,
    pub options: Vec<PollOption>,
}
