//! Per-call bridge session state. Owned by its session's entry in
//! `BridgeManager`'s map and mutated only while holding that entry's lock —
//! no cross-session synchronization is needed once a session is created.

use std::time::Instant;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAudioSource {
    Web,
    Twilio,
}

pub struct SessionState {
    pub session_id: String,
    pub call_id: Uuid,
    pub source: CallAudioSource,
    pub primary_agent_id: String,
    pub twilio_stream_sid: Option<String>,

    stt_buffer: Vec<u8>,
    locked_speaker: Option<String>,
    pending_transcription: String,
    last_final_at: Option<Instant>,
    ducking_until: Option<Instant>,
    pub voice_id: Option<String>,
}

impl SessionState {
    pub fn new(session_id: String, call_id: Uuid, source: CallAudioSource, primary_agent_id: String) -> Self {
        Self {
            session_id,
            call_id,
            source,
            primary_agent_id,
            twilio_stream_sid: None,
            stt_buffer: Vec::new(),
            locked_speaker: None,
            pending_transcription: String::new(),
            last_final_at: None,
            ducking_until: None,
            voice_id: None,
        }
    }

    /// Appends `chunk` to the STT buffer, dropping the oldest bytes if the
    /// cap is exceeded, and drains a forwardable slice once the forwarding
    /// threshold is met.
    pub fn push_audio(&mut self, chunk: &[u8], threshold: usize, cap: usize) -> Option<Vec<u8>> {
        self.stt_buffer.extend_from_slice(chunk);
        if self.stt_buffer.len() > cap {
            let excess = self.stt_buffer.len() - cap;
            self.stt_buffer.drain(0..excess);
        }
        if self.stt_buffer.len() >= threshold {
            Some(std::mem::take(&mut self.stt_buffer))
        } else {
            None
        }
    }

    pub fn is_ducking(&self) -> bool {
        self.ducking_until.map(|t| Instant::now() < t).unwrap_or(false)
    }

    pub fn start_ducking(&mut self, duration: std::time::Duration) {
        self.ducking_until = Some(Instant::now() + duration);
    }

    /// Speaker-lock gate: the first non-empty speaker id seen wins for the
    /// rest of the session; transcripts from any other speaker are
    /// discarded.
    pub fn accepts_speaker(&mut self, speaker_id: Option<&str>) -> bool {
        match (&self.locked_speaker, speaker_id) {
            (None, Some(id)) => {
                self.locked_speaker = Some(id.to_string());
                true
            }
            (None, None) => true,
            (Some(locked), Some(id)) => locked == id,
            (Some(_), None) => true,
        }
    }

    /// Appends final text to the debounce buffer.
    pub fn append_pending(&mut self, text: &str) {
        if !self.pending_transcription.is_empty() {
            self.pending_transcription.push(' ');
        }
        self.pending_transcription.push_str(text);
        self.last_final_at = Some(Instant::now());
    }

    /// Returns and clears the pending buffer if `debounce` has elapsed
    /// since the last append without a subsequent flush.
    pub fn take_pending_if_stale(&mut self, debounce: std::time::Duration) -> Option<String> {
        if self.pending_transcription.is_empty() {
            return None;
        }
        let stale = self.last_final_at.map(|t| t.elapsed() >= debounce).unwrap_or(false);
        if stale {
            self.last_final_at = None;
            Some(std::mem::take(&mut self.pending_transcription))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionState {
        SessionState::new("session-1".to_string(), Uuid::new_v4(), CallAudioSource::Web, "agent-1".to_string())
    }

    #[test]
    fn push_audio_withholds_chunks_below_threshold() {
        let mut state = session();
        assert!(state.push_audio(&[0u8; 10], 20, 100).is_none());
        let drained = state.push_audio(&[0u8; 10], 20, 100);
        assert_eq!(drained.map(|v| v.len()), Some(20));
    }

    #[test]
    fn push_audio_drops_oldest_bytes_past_cap() {
        let mut state = session();
        state.push_audio(&[1u8; 50], 1000, 60);
        let drained = state.push_audio(&[2u8; 50], 60, 60).expect("threshold met");
        assert_eq!(drained.len(), 60);
        // The oldest 40 bytes of the first chunk were evicted by the cap.
        assert!(drained.iter().filter(|&&b| b == 1).count() <= 10);
    }

    #[test]
    fn accepts_speaker_locks_onto_the_first_nonempty_speaker() {
        let mut state = session();
        assert!(state.accepts_speaker(Some("caller-a")));
        assert!(state.accepts_speaker(Some("caller-a")));
        assert!(!state.accepts_speaker(Some("caller-b")));
        // An event with no speaker id at all is never rejected.
        assert!(state.accepts_speaker(None));
    }

    #[test]
    fn take_pending_if_stale_requires_the_debounce_window_to_elapse() {
        let mut state = session();
        state.append_pending("hello");
        assert!(state.take_pending_if_stale(std::time::Duration::from_secs(60)).is_none());
        assert!(state.take_pending_if_stale(std::time::Duration::from_secs(0)).is_some());
    }

    #[test]
    fn append_pending_joins_multiple_finals_with_a_space() {
        let mut state = session();
        state.append_pending("hello");
        state.append_pending("world");
        let text = state.take_pending_if_stale(std::time::Duration::from_secs(0)).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn ducking_expires_after_its_duration() {
        let mut state = session();
        assert!(!state.is_ducking());
        state.start_ducking(std::time::Duration::from_millis(0));
        // Zero-duration ducking has already expired by the time we check.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!state.is_ducking());
    }
}
