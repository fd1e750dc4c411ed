// Host- and script-keyed remote backends. The backends' wire protocols are
// opaque here: callers register implementations and the gate routes to them.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::listing::{Dialect, Listing};
use crate::utils;

/// Hosts that entries may legitimately point at even though they differ from
/// the directory's own host.
pub const REMOTE_HOST_WHITELIST: &[&str] = &[
    "drive.google.com",
    "www.googleapis.com",
    "blitzfiles.tech",
];

pub fn is_whitelisted_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| REMOTE_HOST_WHITELIST.contains(&host))
        .unwrap_or(false)
}

/// Dialect forced by the host alone, before any structural probing.
pub fn host_dialect(url: &Url) -> Option<Dialect> {
    match url.host_str()? {
        "ipfs.io" | "gateway.ipfs.io" => Some(Dialect::Ipfs),
        "blitzfiles.tech" => Some(Dialect::Blitzfiles),
        _ => None,
    }
}

/// Classify a Google-Drive-index frontend by its script URL.
pub fn classify_script_url(src: &str) -> Option<Dialect> {
    let file = src
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if file.contains("bhadoo") {
        Some(Dialect::BhadooIndex)
    } else if file.contains("go2index") {
        Some(Dialect::Go2Index)
    } else if file.contains("goindex") {
        Some(Dialect::GoIndex)
    } else if file.contains("gdindex") {
        Some(Dialect::GdIndex)
    } else {
        None
    }
}

pub fn is_google_drive_dialect(dialect: Dialect) -> bool {
    matches!(
        dialect,
        Dialect::BhadooIndex | Dialect::GoIndex | Dialect::Go2Index | Dialect::GdIndex
    )
}

/// A remote listing backend (Google-Drive-index family, Blitzfiles). The
/// crate routes to these; their protocol lives with the implementor.
pub trait RemoteBackend: Sync {
    fn extract(&self, client: &Client, url: &Url) -> Result<Listing>;
}

#[derive(Default)]
pub struct RemoteRegistry {
    backends: HashMap<Dialect, Box<dyn RemoteBackend>>,
}

impl RemoteRegistry {
    pub fn register(&mut self, dialect: Dialect, backend: Box<dyn RemoteBackend>) {
        self.backends.insert(dialect, backend);
    }

    pub fn get(&self, dialect: Dialect) -> Option<&dyn RemoteBackend> {
        self.backends.get(&dialect).map(|b| b.as_ref())
    }
}

impl fmt::Debug for RemoteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRegistry")
            .field("dialects", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Deserialize)]
struct SourceMap {
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug)]
pub struct RemoteGate {
    sourcemap_comment: Regex,
}

impl Default for RemoteGate {
    fn default() -> Self {
        Self {
            sourcemap_comment: Regex::new(r"//[#@]\s*sourceMappingURL=(\S+)").unwrap(),
        }
    }
}

impl RemoteGate {
    /// Walk `<script src>` tags and classify each against the known
    /// Google-Drive-index frontends. A bundled `app.min.js` is fetched and
    /// its sourcemap's source list is classified as well.
    pub fn scan_scripts(&self, doc: &Html, base: &Url, client: &Client) -> Option<Dialect> {
        let selector = Selector::parse("script[src]").unwrap();
        for script in doc.select(&selector) {
            let src = match script.value().attr("src") {
                Some(src) => src,
                None => continue,
            };
            if let Some(dialect) = classify_script_url(src) {
                return Some(dialect);
            }
            if src.ends_with("app.min.js") {
                match self.classify_via_sourcemap(base, src, client) {
                    Ok(Some(dialect)) => return Some(dialect),
                    Ok(None) => {}
                    Err(e) => {
                        // sub-fetch failures never fail the directory
                        warn!("Sourcemap probe for {} failed: {:?}", src, e);
                    }
                }
            }
        }
        None
    }

    fn classify_via_sourcemap(
        &self,
        base: &Url,
        src: &str,
        client: &Client,
    ) -> Result<Option<Dialect>> {
        let script_url = base.join(src)?;
        let body = utils::get(client, script_url.clone())?.text()?;
        let map_ref = match self.sourcemap_comment.captures(&body) {
            Some(captures) => captures.get(1).unwrap().as_str().to_string(),
            None => return Ok(None),
        };
        let map_url = script_url.join(&map_ref)?;
        debug!("Fetching sourcemap {}", map_url);
        let map: SourceMap = utils::get(client, map_url)?.json()?;
        for source in &map.sources {
            if let Some(dialect) = classify_script_url(source) {
                return Ok(Some(dialect));
            }
        }
        Ok(None)
    }
}
