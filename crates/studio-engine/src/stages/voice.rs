use studio_contracts::pipeline::VoiceTrack;

use super::StageError;

/// Accepts the narration script and, when the caller rendered it elsewhere,
/// the audio. Speech synthesis is not done here.
pub fn run_voice(script: &str, audio: Option<Vec<u8>>) -> Result<VoiceTrack, StageError> {
    let script = script.trim();
    if script.is_empty() {
        return Err(StageError::Validation("Voice script required".to_string()));
    }
    Ok(VoiceTrack {
        script: script.to_string(),
        audio: audio.filter(|bytes| !bytes.is_empty()),
    })
}
