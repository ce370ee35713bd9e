// Container/codec identifiers and the fallback chain used when arming an encoder

use tracing::{debug, warn};

/// Generic container tried when the preferred codec is unsupported
pub const FALLBACK_MIME_TYPE: &str = "video/webm";

/// Empty identifier: let the backend pick its own default
pub const HOST_DEFAULT_MIME_TYPE: &str = "";

/// A parsed `type/subtype;codecs=a,b` identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    pub essence: String,
    pub codecs: Vec<String>,
}

impl MimeType {
    /// Parse a media type string. Returns None for the empty (host default) identifier.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();
        if essence.is_empty() || !essence.contains('/') {
            return None;
        }

        let mut codecs = Vec::new();
        for param in parts {
            let Some((key, val)) = param.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("codecs") {
                codecs.extend(
                    val.trim()
                        .trim_matches('"')
                        .split(',')
                        .map(|c| c.trim().to_ascii_lowercase())
                        .filter(|c| !c.is_empty()),
                );
            }
        }

        Some(Self { essence, codecs })
    }

    /// File extension for the container
    pub fn extension(&self) -> &'static str {
        match self.essence.as_str() {
            "video/webm" | "audio/webm" => "webm",
            "video/mp4" | "audio/mp4" => "mp4",
            "video/x-matroska" => "mkv",
            "video/ogg" | "audio/ogg" => "ogg",
            _ => "bin",
        }
    }
}

/// Candidates in the order they are tried: preferred, generic container, host default
pub fn fallback_chain(preferred: &str) -> Vec<&str> {
    let mut chain = Vec::with_capacity(3);
    for candidate in [preferred, FALLBACK_MIME_TYPE, HOST_DEFAULT_MIME_TYPE] {
        if !chain.contains(&candidate) {
            chain.push(candidate);
        }
    }
    chain
}

/// Pick the first supported identifier from the fallback chain
///
/// The host default is always accepted, so this never fails.
pub fn resolve_mime_type(preferred: &str, is_supported: impl Fn(&str) -> bool) -> String {
    for candidate in fallback_chain(preferred) {
        if candidate == HOST_DEFAULT_MIME_TYPE {
            warn!(
                "Neither '{}' nor '{}' is supported, using backend default",
                preferred, FALLBACK_MIME_TYPE
            );
            return String::new();
        }
        if is_supported(candidate) {
            if candidate != preferred {
                warn!("'{}' unsupported, falling back to '{}'", preferred, candidate);
            } else {
                debug!("Using preferred mime type '{}'", candidate);
            }
            return candidate.to_string();
        }
    }
    String::new()
}
