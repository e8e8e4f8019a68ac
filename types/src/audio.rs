/// Sample rate of the PCM16 microphone frames the server expects.
pub const CLIENT_PCM16_SAMPLE_RATE: u32 = 48_000;

/// One of the two logical playback queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Document narration.
    Reading,
    /// Spoken answers to the user's questions. Always preempts `Reading`.
    Answering,
}

impl Channel {
    /// Selection order: the first channel has priority.
    pub const PRIORITY: [Channel; 2] = [Channel::Answering, Channel::Reading];

    pub fn index(self) -> usize {
        match self {
            Channel::Reading => 0,
            Channel::Answering => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Reading => "reading",
            Channel::Answering => "answering",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
