//! Remote font fetching
//!
//! A family/weight/style is looked up in two GETs: the style endpoint
//! returns CSS whose `src: url(...)` points at the font binary.

use super::FontKey;
use crate::config::EngineConfig;
use crate::error::FontFetchError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FONT_URL: Regex = Regex::new(r"src:\s*url\(([^)]+)\)").unwrap();
}

/// Fetches the binary for a remote font key
pub trait FontFetcher {
    fn fetch(&self, key: &FontKey) -> Result<Vec<u8>, FontFetchError>;
}

/// Style descriptor URL for one family/weight/style
pub fn css_url(endpoint: &str, family: &str, weight: u16, italic: bool) -> String {
    format!(
        "{}?family={}:ital,wght@{},{}&display=swap",
        endpoint,
        family.replace(' ', "+"),
        if italic { 1 } else { 0 },
        weight
    )
}

/// First font binary URL in a style descriptor
pub fn extract_font_url(css: &str) -> Option<String> {
    FONT_URL.captures(css).map(|caps| {
        caps[1]
            .trim()
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string()
    })
}

/// Blocking HTTP fetcher for native hosts
#[cfg(feature = "remote-fonts")]
pub struct HttpFontFetcher {
    agent: ureq::Agent,
    endpoint: String,
    user_agent: String,
}

#[cfg(feature = "remote-fonts")]
impl HttpFontFetcher {
    pub fn new(config: &EngineConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(config.font_fetch_timeout_secs))
            .build();
        Self {
            agent,
            endpoint: config.font_css_endpoint.clone(),
            user_agent: config.font_user_agent.clone(),
        }
    }
}

#[cfg(feature = "remote-fonts")]
impl FontFetcher for HttpFontFetcher {
    fn fetch(&self, key: &FontKey) -> Result<Vec<u8>, FontFetchError> {
        use std::io::Read;

        let query_name = super::remote_family(&key.family)
            .map(|f| f.query_name)
            .unwrap_or(key.family.as_str());
        let url = css_url(&self.endpoint, query_name, key.weight, key.italic);

        let css = self
            .agent
            .get(&url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| FontFetchError::new(&key.family, e.to_string()))?
            .into_string()
            .map_err(|e| FontFetchError::new(&key.family, e.to_string()))?;

        let font_url = extract_font_url(&css)
            .ok_or_else(|| FontFetchError::new(&key.family, "no font URL in style descriptor"))?;

        let mut data = Vec::new();
        self.agent
            .get(&font_url)
            .call()
            .map_err(|e| FontFetchError::new(&key.family, e.to_string()))?
            .into_reader()
            .read_to_end(&mut data)
            .map_err(|e| FontFetchError::new(&key.family, e.to_string()))?;
        Ok(data)
    }
}

/// Fetcher for hosts without network access: every lookup fails, so only
/// preloaded cache entries resolve
pub struct OfflineFontFetcher;

impl FontFetcher for OfflineFontFetcher {
    fn fetch(&self, key: &FontKey) -> Result<Vec<u8>, FontFetchError> {
        Err(FontFetchError::new(&key.family, "font not preloaded"))
    }
}

/// The default fetcher for this build
pub fn default_fetcher(config: &EngineConfig) -> Box<dyn FontFetcher> {
    #[cfg(feature = "remote-fonts")]
    {
        Box::new(HttpFontFetcher::new(config))
    }
    #[cfg(not(feature = "remote-fonts"))]
    {
        let _ = config;
        Box::new(OfflineFontFetcher)
    }
}
