use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionType {
    #[default]
    Subtle,
    Talking,
    Cinematic,
    Walking,
}

impl MotionType {
    pub const ALL: [MotionType; 4] = [
        MotionType::Subtle,
        MotionType::Talking,
        MotionType::Cinematic,
        MotionType::Walking,
    ];

    /// Unknown or missing names map to `Subtle`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        let normalized = raw.unwrap_or_default().trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MotionType::Subtle => "subtle",
            MotionType::Talking => "talking",
            MotionType::Cinematic => "cinematic",
            MotionType::Walking => "walking",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            MotionType::Subtle => "A person with subtle natural motion, gentle breathing, soft micro head movements, blinking naturally. Static camera, cinematic lighting.",
            MotionType::Talking => "A person speaking naturally to camera with expressive gestures, head nods, engaging facial expressions. Slight camera drift.",
            MotionType::Cinematic => "Cinematic slow motion shot of a person with dramatic lighting, confident slow turn, dramatic pause. Slow dolly in camera movement.",
            MotionType::Walking => "A person walking naturally toward camera with confident stride, arms swinging naturally. Tracking camera movement.",
        }
    }
}

impl fmt::Display for MotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a motion run. Only provider errors are errors; running out of
/// poll time is an outcome, and the remote job keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionOutcome {
    Completed { video: Vec<u8>, mime_type: String },
    TimedOut { operation: String, waited: Duration },
    Empty { operation: String },
}

impl MotionOutcome {
    pub fn video(&self) -> Option<&[u8]> {
        match self {
            MotionOutcome::Completed { video, .. } => Some(video),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            MotionOutcome::Completed { .. } => "Motion video generated with VEO 3.1!".to_string(),
            MotionOutcome::TimedOut { waited, .. } => {
                format!("Video generation timed out after {}s", waited.as_secs())
            }
            MotionOutcome::Empty { .. } => {
                "Video generation completed but no video returned".to_string()
            }
        }
    }
}

pub const MOTION_SUGGESTION: &str =
    "VEO may be processing. Try again or use external tools like Kling AI or Runway.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExternalTool {
    pub name: &'static str,
    pub url: &'static str,
}

pub const EXTERNAL_VIDEO_TOOLS: [ExternalTool; 3] = [
    ExternalTool {
        name: "Kling AI",
        url: "https://klingai.com",
    },
    ExternalTool {
        name: "Runway",
        url: "https://runwayml.com",
    },
    ExternalTool {
        name: "Pika Labs",
        url: "https://pika.art",
    },
];
