use crate::utils::capture::MicCapture;

/// Receives PCM16 LE mono frames from a capture pipeline.
pub type FrameCallback = Box<dyn FnMut(Vec<u8>) + Send>;

/// Push-to-talk microphone. Frames flow to the callback given at creation
/// only between `start` and `stop`. `stop` returns after the last partial
/// frame has been handed to the callback.
pub trait VoiceCapture: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

impl VoiceCapture for MicCapture {
    fn start(&mut self) {
        tracing::debug!("capture started");
        MicCapture::start(self);
    }

    fn stop(&mut self) {
        MicCapture::stop(self);
        tracing::debug!("capture stopped");
    }
}
