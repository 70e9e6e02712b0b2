use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered turns of one session. Turns are only ever appended; the whole
/// history goes away with the session on reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_turn(&mut self, role: TurnRole, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
        self.updated_at = Utc::now();
    }

    /// Records a completed question/answer pair.
    pub fn record_exchange(&mut self, query: impl Into<String>, answer: impl Into<String>) {
        self.add_turn(TurnRole::User, query);
        self.add_turn(TurnRole::Agent, answer);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Renders the history as `Role: content` lines for the prompt memory slot.
    pub fn render_memory(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Agent => "Agent",
        }
    }
}
