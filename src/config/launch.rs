//! Launch Context
//!
//! Carries the optional transport-encoded override found on the launch URL.
//! The override is base64 of `URL <url>|ANON <key>`.

use crate::config::defaults::{KEY_MARKER, OVERRIDE_PARAM, SEGMENT_SEPARATOR, URL_MARKER};
use crate::error::{Result, YardlineError};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use reqwest::Url;
use thiserror::Error;

/// Backend url and key carried by a decoded override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePair {
    pub backend_url: String,
    pub api_key: String,
}

/// Why an override was ignored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideRejected {
    #[error("override is not valid base64")]
    NotBase64,

    #[error("decoded override is not UTF-8")]
    NotUtf8,

    #[error("no token after the URL marker")]
    MissingUrl,

    #[error("no token after the ANON marker")]
    MissingKey,
}

/// What the application was launched with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    encoded_override: Option<String>,
}

impl LaunchContext {
    /// A launch with no override
    pub fn empty() -> Self {
        Self::default()
    }

    /// Use the given encoded override verbatim
    pub fn with_override(encoded: impl Into<String>) -> Self {
        Self {
            encoded_override: Some(encoded.into()),
        }
    }

    /// Read the override from the `config` query parameter of a launch URL
    pub fn from_url(launch_url: &str) -> Result<Self> {
        let url = Url::parse(launch_url).map_err(|e| {
            YardlineError::Config(format!("Invalid launch URL '{}': {}", launch_url, e))
        })?;
        Ok(Self::from_parsed(&url))
    }

    /// Read the override from a bare query string (`a=b&config=...`)
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        match Url::parse("http://localhost/") {
            Ok(mut url) => {
                url.set_query(Some(query));
                Self::from_parsed(&url)
            }
            Err(_) => Self::empty(),
        }
    }

    fn from_parsed(url: &Url) -> Self {
        let encoded_override = url
            .query_pairs()
            .find(|(name, _)| name == OVERRIDE_PARAM)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.trim().is_empty());
        Self { encoded_override }
    }

    /// The raw encoded override, if one was supplied
    pub fn encoded_override(&self) -> Option<&str> {
        self.encoded_override.as_deref()
    }

    /// Decode the override, if one was supplied
    pub fn decode(&self) -> Option<std::result::Result<OverridePair, OverrideRejected>> {
        self.encoded_override.as_deref().map(decode_override)
    }
}

/// Decode an override value into its url and key
pub fn decode_override(encoded: &str) -> std::result::Result<OverridePair, OverrideRejected> {
    // form decoding turns '+' into ' '
    let encoded = encoded.trim().replace(' ', "+");

    let bytes = [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(&encoded).ok())
        .ok_or(OverrideRejected::NotBase64)?;
    let text = String::from_utf8(bytes).map_err(|_| OverrideRejected::NotUtf8)?;

    let backend_url = marker_token(&text, URL_MARKER).ok_or(OverrideRejected::MissingUrl)?;
    let api_key = marker_token(&text, KEY_MARKER).ok_or(OverrideRejected::MissingKey)?;

    Ok(OverridePair {
        backend_url,
        api_key,
    })
}

/// Encode a url and key the way [`decode_override`] expects
pub fn encode_override(backend_url: &str, api_key: &str) -> String {
    STANDARD.encode(format!(
        "{} {}{}{} {}",
        URL_MARKER, backend_url, SEGMENT_SEPARATOR, KEY_MARKER, api_key
    ))
}

/// First non-whitespace token after `marker` at the start of a segment
fn marker_token(text: &str, marker: &str) -> Option<String> {
    text.split(SEGMENT_SEPARATOR).find_map(|segment| {
        let rest = segment.trim_start().strip_prefix(marker)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        rest.split_whitespace().next().map(str::to_string)
    })
}
