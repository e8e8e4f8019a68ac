/// `init` message. Must be the first message sent on a connection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InitEvent {
    session_id: String,
}

impl InitEvent {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// `update_progress` message. Advisory bookkeeping so the server can resume
/// narration from the right sentence later.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UpdateProgressEvent {
    session_id: String,
    sentence_index: u64,
}

impl UpdateProgressEvent {
    pub fn new(session_id: &str, sentence_index: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            sentence_index,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn sentence_index(&self) -> u64 {
        self.sentence_index
    }
}
