/// The single authoritative state of a reading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Uploading,
    Connecting,
    Reading,
    Listening,
    Processing,
    Answering,
    Paused,
    Ended,
}

impl SessionStatus {
    /// True for every status that implies a live connection to the server.
    pub fn is_connected(self) -> bool {
        !matches!(self, Self::Idle | Self::Uploading)
    }

    /// Binary frames received in these statuses belong to an answer.
    pub fn expects_answer_audio(self) -> bool {
        matches!(self, Self::Processing | Self::Answering)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Connecting => "connecting",
            Self::Reading => "reading",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Answering => "answering",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults_to_idle() {
        assert_eq!(SessionStatus::default(), SessionStatus::Idle);
    }

    #[test]
    fn test_answer_audio_routing() {
        assert!(SessionStatus::Answering.expects_answer_audio());
        assert!(SessionStatus::Processing.expects_answer_audio());
        assert!(!SessionStatus::Reading.expects_answer_audio());
        assert!(!SessionStatus::Connecting.expects_answer_audio());
    }

    #[test]
    fn test_status_serializes_as_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Listening).unwrap();
        assert_eq!(json, "\"listening\"");
    }
}
