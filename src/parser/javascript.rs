// Listings drawn client-side through _d("name", ...) / _f("name", size,
// "date") calls embedded in the page script. No script is executed; the
// call arguments are lifted straight out of the source.

use anyhow::Result;
use regex::Regex;
use scraper::Html;
use url::Url;

use super::{DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug)]
pub struct JavaScriptDrawnParser {
    validator: LinkValidator,
    dir_call: Regex,
    file_call: Regex,
}

impl Default for JavaScriptDrawnParser {
    fn default() -> Self {
        Self {
            validator: LinkValidator::default(),
            dir_call: Regex::new(r#"_d\(\s*["']([^"']+)["']\s*(?:,\s*["']?([^"',)]*)["']?)?\s*\)"#)
                .unwrap(),
            file_call: Regex::new(
                r#"_f\(\s*["']([^"']+)["']\s*,\s*["']?([^"',)]*)["']?\s*(?:,\s*["']?([^"',)]*)["']?)?\s*\)"#,
            )
            .unwrap(),
        }
    }
}

impl DialectParser for JavaScriptDrawnParser {
    fn dialect(&self) -> Dialect {
        Dialect::JavaScriptDrawn
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let html = doc.html();
        let mut listing = Listing::default();
        for captures in self.dir_call.captures_iter(&html) {
            let name = captures.get(1).unwrap().as_str().trim().trim_end_matches('/');
            if name.is_empty() || !self.validator.is_valid(name, name, None) {
                continue;
            }
            let href = format!("{}/", name);
            if let Ok(url) = base.join(&href) {
                listing.push_subdir(SubdirEntry::new(url, name.to_string()));
            }
        }
        for captures in self.file_call.captures_iter(&html) {
            let name = captures.get(1).unwrap().as_str().trim();
            if name.is_empty() || !self.validator.is_valid(name, name, None) {
                continue;
            }
            let size = captures
                .get(2)
                .and_then(|m| FileSize::parse(m.as_str().trim()));
            if let Ok(url) = base.join(name) {
                let mut entry = FileEntry::new(url, name.to_string(), size);
                entry.mtime = captures
                    .get(3)
                    .and_then(|m| utils::parse_listing_datetime(m.as_str()));
                listing.push_file(entry);
            }
        }
        if listing.is_empty() {
            Ok(None)
        } else {
            Ok(Some(listing))
        }
    }
}
