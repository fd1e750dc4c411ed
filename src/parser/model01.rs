// A JSON-backed filemanager page: the static HTML is an empty shell and a
// script.js that $.get()s a recursive index of the whole share.

use anyhow::Result;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use super::{DialectParser, ParseContext};
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug, Deserialize)]
struct ModelNode {
    name: String,
    #[serde(default)]
    path: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    items: Vec<ModelNode>,
}

#[derive(Debug)]
pub struct Model01Parser {
    index_call: Regex,
}

impl Default for Model01Parser {
    fn default() -> Self {
        Self {
            index_call: Regex::new(r#"\$\.get\(\s*['"]([^'"]+)['"]"#).unwrap(),
        }
    }
}

impl DialectParser for Model01Parser {
    fn dialect(&self) -> Dialect {
        Dialect::Model01
    }

    fn extract(&self, doc: &Html, base: &Url, ctx: &ParseContext) -> Result<Option<Listing>> {
        let filemanager = Selector::parse("div.filemanager").unwrap();
        if doc.select(&filemanager).next().is_none() {
            return Ok(None);
        }
        let script_selector = Selector::parse(r#"script[src*="script.js"]"#).unwrap();
        let script_src = match doc
            .select(&script_selector)
            .next()
            .and_then(|el| el.value().attr("src"))
        {
            Some(src) => src,
            None => return Ok(None),
        };
        let client = match ctx.client {
            Some(client) => client,
            None => return Ok(None),
        };
        ctx.checkpoint()?;

        // sub-fetch failures degrade to "no model", never to a dead directory
        match self.fetch_index(client, base, script_src) {
            Ok(Some(root)) => Ok(Some(materialize(&root, base))),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Model index fetch for {} failed: {:?}", base, e);
                Ok(None)
            }
        }
    }
}

impl Model01Parser {
    fn fetch_index(
        &self,
        client: &reqwest::blocking::Client,
        base: &Url,
        script_src: &str,
    ) -> Result<Option<ModelNode>> {
        let script_url = base.join(script_src)?;
        let script = utils::get(client, script_url)?.text()?;
        let index_path = match self.index_call.captures(&script) {
            Some(captures) => captures.get(1).unwrap().as_str().to_string(),
            None => return Ok(None),
        };
        let index_url = base.join(&index_path)?;
        let root: ModelNode = utils::get(client, index_url)?.json()?;
        Ok(Some(root))
    }
}

/// Emit the children of the node whose path matches the page URL; the tree
/// root when no deeper node matches.
fn materialize(root: &ModelNode, base: &Url) -> Listing {
    let wanted = base.path().trim_matches('/');
    let node = find_node(root, wanted).unwrap_or(root);
    let mut listing = Listing::default();
    for child in &node.items {
        // model paths are share-relative; resolve them against this page
        let href = if child.path.is_empty() {
            child.name.clone()
        } else if wanted.is_empty() {
            child.path.clone()
        } else {
            child
                .path
                .strip_prefix(&format!("{}/", wanted))
                .unwrap_or(child.path.as_str())
                .to_string()
        };
        let is_dir = child.kind == "folder" || child.kind == "directory" || !child.items.is_empty();
        let url = match base.join(&href) {
            Ok(url) => url,
            Err(_) => continue,
        };
        if is_dir {
            listing.push_subdir(SubdirEntry::new(url, child.name.clone()));
        } else {
            let size = child
                .size
                .filter(|size| *size >= 0)
                .map(|size| FileSize::Precise(size as u64));
            listing.push_file(FileEntry::new(url, child.name.clone(), size));
        }
    }
    listing
}

fn find_node<'a>(node: &'a ModelNode, wanted: &str) -> Option<&'a ModelNode> {
    if node.path.trim_matches('/') == wanted && !wanted.is_empty() {
        return Some(node);
    }
    node.items
        .iter()
        .filter(|child| !child.items.is_empty() || child.kind == "folder")
        .find_map(|child| find_node(child, wanted))
}
