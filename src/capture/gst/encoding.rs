// Container/codec identifiers mapped onto GStreamer elements

use crate::codec::MimeType;
use crate::config::EncoderOptions;
use tracing::{debug, warn};

/// VP8 encoders in order of preference
pub(super) const VP8_ENCODERS: &[&str] = &[
    "vaapivp8enc", // Intel/AMD iGPU via VA-API
    "vp8enc",      // Software (libvpx)
];

/// VP9 encoders in order of preference
pub(super) const VP9_ENCODERS: &[&str] = &[
    "vaapivp9enc", // Intel/AMD iGPU via VA-API
    "vp9enc",      // Software (libvpx)
];

/// H.264 encoders in order of preference (hardware first, then software fallback)
pub(super) const H264_ENCODERS: &[&str] = &[
    "vaapih264enc", // Intel/AMD iGPU via VA-API
    "nvh264enc",    // NVIDIA via NVENC
    "x264enc",      // Software fallback (libx264)
];

/// AAC audio encoders in order of preference
pub(super) const AAC_ENCODERS: &[&str] = &["fdkaacenc", "voaacenc", "avenc_aac"];

/// Opus audio encoders
pub(super) const OPUS_ENCODERS: &[&str] = &["opusenc"];

/// Elements needed to produce one container/codec combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingPlan {
    pub muxer: &'static str,
    pub video_encoders: &'static [&'static str],
    pub audio_encoders: &'static [&'static str],
}

/// What the backend produces when no identifier was requested
pub(super) const DEFAULT_MIME_TYPE: &str = "video/webm;codecs=vp8,opus";

const WEBM_VP8: EncodingPlan = EncodingPlan {
    muxer: "webmmux",
    video_encoders: VP8_ENCODERS,
    audio_encoders: OPUS_ENCODERS,
};

/// Map an identifier onto muxer and encoder candidates
///
/// Returns None for containers or codecs this adapter cannot produce. The
/// empty identifier maps to WebM/VP8.
pub fn plan_for(mime_type: &str) -> Option<EncodingPlan> {
    let Some(mime) = MimeType::parse(mime_type) else {
        return Some(WEBM_VP8);
    };

    let wants = |prefix: &str| mime.codecs.iter().any(|c| c.starts_with(prefix));
    let plan = match mime.essence.as_str() {
        "video/webm" if wants("vp9") || wants("vp09") => EncodingPlan {
            video_encoders: VP9_ENCODERS,
            ..WEBM_VP8
        },
        "video/webm" => WEBM_VP8,
        "video/mp4" => EncodingPlan {
            muxer: "mp4mux",
            video_encoders: H264_ENCODERS,
            audio_encoders: AAC_ENCODERS,
        },
        "video/x-matroska" => EncodingPlan {
            muxer: "matroskamux",
            video_encoders: if wants("vp9") { VP9_ENCODERS } else { H264_ENCODERS },
            audio_encoders: OPUS_ENCODERS,
        },
        _ => return None,
    };

    // Explicit codecs the container above cannot carry
    let unknown = mime.codecs.iter().any(|c| {
        !["vp8", "vp9", "vp09", "avc1", "h264", "opus", "mp4a"]
            .iter()
            .any(|known| c.starts_with(known))
    });
    if unknown {
        debug!("Unsupported codec list in '{}'", mime_type);
        return None;
    }

    Some(plan)
}

/// First element in `candidates` the registry can actually instantiate
pub fn detect_available_element(candidates: &[&'static str]) -> Option<&'static str> {
    // Ensure GStreamer is initialized (safe to call multiple times)
    if gstreamer::init().is_err() {
        warn!("Failed to initialize GStreamer for element detection");
        return None;
    }

    for name in candidates {
        if let Some(factory) = gstreamer::ElementFactory::find(name) {
            // Verify the factory can create an element (plugin is fully loaded)
            if factory.create().build().is_ok() {
                debug!("Found available element: {}", name);
                return Some(name);
            }
        }
    }
    None
}

/// Elements resolved for one encoder session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEncoding {
    pub muxer: &'static str,
    pub video_encoder: &'static str,
    pub audio_encoder: Option<&'static str>,
}

impl EncodingPlan {
    /// Probe the registry for every element this plan needs
    pub fn resolve(&self, with_audio: bool) -> Option<ResolvedEncoding> {
        let muxer = detect_available_element(&[self.muxer]);
        let video_encoder = detect_available_element(self.video_encoders);
        let (Some(muxer), Some(video_encoder)) = (muxer, video_encoder) else {
            warn!("No video encoder/muxer available for {}", self.muxer);
            return None;
        };

        let audio_encoder = if with_audio {
            let found = detect_available_element(self.audio_encoders);
            if found.is_none() {
                warn!("No audio encoder available for {}", self.muxer);
                return None;
            }
            found
        } else {
            None
        };

        Some(ResolvedEncoding {
            muxer,
            video_encoder,
            audio_encoder,
        })
    }
}

/// Bitrate property for a video encoder, in the unit the element expects
pub fn video_bitrate_property(encoder: &str, options: &EncoderOptions) -> String {
    let bps = options.video_bits_per_second;
    match encoder {
        "vp8enc" | "vp9enc" => format!("target-bitrate={}", bps),
        // kbit/s
        "x264enc" | "nvh264enc" | "vaapih264enc" | "vaapivp8enc" | "vaapivp9enc" => {
            format!("bitrate={}", (bps / 1000).max(1))
        }
        _ => String::new(),
    }
}

/// Bitrate property for an audio encoder (all candidates take bit/s)
pub fn audio_bitrate_property(encoder: &str, options: &EncoderOptions) -> String {
    if encoder.is_empty() {
        return String::new();
    }
    format!("bitrate={}", options.audio_bits_per_second)
}
