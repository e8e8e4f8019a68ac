/// `session_initialized` message
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionInitializedEvent {
    session_id: String,
}

impl SessionInitializedEvent {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// `error` message
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    /// Human readable description of what went wrong on the server
    message: String,
}

impl ErrorEvent {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
