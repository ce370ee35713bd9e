use serde::{Deserialize, Serialize};

/// Preferred container/codec when the caller does not choose one
pub const DEFAULT_MIME_TYPE: &str = "video/webm;codecs=vp9";
pub const DEFAULT_VIDEO_BITS_PER_SECOND: u32 = 2_500_000;
pub const DEFAULT_AUDIO_BITS_PER_SECOND: u32 = 128_000;
pub const DEFAULT_AUDIO_CHANNELS: u8 = 2;
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Recorder configuration as supplied by the host application
///
/// Field names follow the web layer (`mimeType`, `frameRate`, ...) so the
/// same JSON object can be handed across unchanged. Missing fields take the
/// defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderOptions {
    /// Preferred container/codec identifier
    pub mime_type: String,
    /// Target video bitrate
    pub video_bits_per_second: u32,
    /// Target audio bitrate
    pub audio_bits_per_second: u32,
    /// Audio channel count (1-8)
    pub audio_channels: u8,
    /// Frames per second for canvas capture and the frame-copy loop (1-120)
    pub frame_rate: u32,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            video_bits_per_second: DEFAULT_VIDEO_BITS_PER_SECOND,
            audio_bits_per_second: DEFAULT_AUDIO_BITS_PER_SECOND,
            audio_channels: DEFAULT_AUDIO_CHANNELS,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

/// Validation error for RecorderOptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl RecorderOptions {
    /// Overlay a (possibly partial) JSON object on top of the defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json).map_err(|e| ConfigError {
            field: "options".to_string(),
            message: format!("Malformed recorder options: {}", e),
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 || self.frame_rate > 120 {
            return Err(ConfigError {
                field: "frameRate".to_string(),
                message: "Frame rate must be between 1 and 120".to_string(),
            });
        }

        if self.video_bits_per_second == 0 {
            return Err(ConfigError {
                field: "videoBitsPerSecond".to_string(),
                message: "Video bitrate must be positive".to_string(),
            });
        }

        if self.audio_bits_per_second == 0 {
            return Err(ConfigError {
                field: "audioBitsPerSecond".to_string(),
                message: "Audio bitrate must be positive".to_string(),
            });
        }

        if self.audio_channels == 0 || self.audio_channels > 8 {
            return Err(ConfigError {
                field: "audioChannels".to_string(),
                message: "Audio channels must be between 1 and 8".to_string(),
            });
        }

        Ok(())
    }

    /// Snapshot handed to the encoder once the codec has been resolved
    pub fn encoder_options(&self, resolved_mime_type: &str) -> EncoderOptions {
        EncoderOptions {
            mime_type: resolved_mime_type.to_string(),
            video_bits_per_second: self.video_bits_per_second,
            audio_bits_per_second: self.audio_bits_per_second,
            audio_channels: self.audio_channels,
            frame_rate: self.frame_rate,
        }
    }
}

/// Immutable encoder configuration for one capture session
///
/// An empty `mime_type` leaves the container/codec choice to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderOptions {
    pub mime_type: String,
    pub video_bits_per_second: u32,
    pub audio_bits_per_second: u32,
    pub audio_channels: u8,
    pub frame_rate: u32,
}
