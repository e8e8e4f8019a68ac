/// Frame counters for one transport, readable while it runs.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    text_sent: u64,
    audio_sent: u64,
    text_received: u64,
    audio_received: u64,
    malformed_received: u64,
    dropped_sends: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_text_sent(&mut self) {
        self.text_sent += 1;
    }

    pub(crate) fn record_audio_sent(&mut self) {
        self.audio_sent += 1;
    }

    pub(crate) fn record_text_received(&mut self) {
        self.text_received += 1;
    }

    pub(crate) fn record_audio_received(&mut self) {
        self.audio_received += 1;
    }

    pub(crate) fn record_malformed(&mut self) {
        self.malformed_received += 1;
    }

    pub(crate) fn record_dropped_send(&mut self) {
        self.dropped_sends += 1;
    }

    pub fn text_sent(&self) -> u64 {
        self.text_sent
    }

    pub fn audio_sent(&self) -> u64 {
        self.audio_sent
    }

    pub fn text_received(&self) -> u64 {
        self.text_received
    }

    pub fn audio_received(&self) -> u64 {
        self.audio_received
    }

    pub fn malformed_received(&self) -> u64 {
        self.malformed_received
    }

    pub fn dropped_sends(&self) -> u64 {
        self.dropped_sends
    }
}
