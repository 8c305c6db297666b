//! `call_transcripts` persistence: per-utterance STT/TTS log entries
//! reported by the telephony adapter and voice bridge.

use sqlx::sqlite::SqlitePool;
use voxrelay_core::CallTranscript;

use crate::error::Result;

fn speaker_to_str(s: &voxrelay_core::SpeakerType) -> &'static str {
    match s {
        voxrelay_core::SpeakerType::User => "user",
        voxrelay_core::SpeakerType::Agent => "agent",
    }
}

pub async fn insert(pool: &SqlitePool, t: &CallTranscript) -> Result<()> {
    sqlx::query(
        "INSERT INTO call_transcripts \
         (call_id, speaker_type, speaker_id, content, audio_file_path, audio_duration_ms, stt_confidence, ts) \
         VALUES (?,?,?,?,?,?,?,?)",
    )
    .bind(t.call_id.to_string())
    .bind(speaker_to_str(&t.speaker_type))
    .bind(&t.speaker_id)
    .bind(&t.content)
    .bind(&t.audio_file_path)
    .bind(t.audio_duration_ms)
    .bind(t.stt_confidence)
    .bind(t.ts)
    .execute(pool)
    .await?;
    Ok(())
}
