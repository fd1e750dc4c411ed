// The late fallback chain: ul#root lists, bootstrap .list-group lists,
// plain <ul>, and finally every anchor on the page.

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{get_real_name_from_href, in_noise, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

/// Shared item routine: first valid anchor in `scope`, classified by the
/// resolved URL, size taken from a trailing text fragment when one parses.
fn push_item(
    listing: &mut Listing,
    validator: &LinkValidator,
    base: &Url,
    scope: ElementRef,
    a: &Selector,
) {
    let anchor = match scope.select(a).find(|el| validator.is_valid_element(el)) {
        Some(anchor) => anchor,
        None => return,
    };
    push_anchor(listing, base, anchor, Some(scope));
}

fn push_anchor(listing: &mut Listing, base: &Url, anchor: ElementRef, scope: Option<ElementRef>) {
    let href = anchor.value().attr("href").unwrap_or_default();
    let url = match base.join(href) {
        Ok(url) => url,
        Err(_) => return,
    };
    let mut name = get_real_name_from_href(href);
    if name.is_empty() {
        name = anchor
            .text()
            .collect::<String>()
            .trim()
            .trim_end_matches('/')
            .to_string();
    }
    if name.is_empty() {
        return;
    }

    if url.path().ends_with('/') && url.query().is_none() {
        listing.push_subdir(SubdirEntry::new(url, name));
        return;
    }

    // a size may trail the anchor inside the same item
    let size = scope.and_then(|scope| {
        let text: String = scope.text().collect();
        let anchor_text: String = anchor.text().collect();
        let rest = text.replace(anchor_text.as_str(), "");
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.len() >= 2 {
            if let Some(size) = FileSize::parse(&tokens[tokens.len() - 2..].join(" ")) {
                return Some(size);
            }
        }
        tokens.last().and_then(|token| FileSize::parse(token))
    });
    listing.push_file(FileEntry::new(url, name, size));
}

fn extract_list_items(
    doc: &Html,
    base: &Url,
    validator: &LinkValidator,
    item_selector: &str,
    filter_noise: bool,
) -> Option<Listing> {
    let items = Selector::parse(item_selector).unwrap();
    let a = Selector::parse("a[href]").unwrap();
    let mut listing = Listing::default();
    let mut saw_items = false;
    for item in doc.select(&items) {
        if filter_noise && in_noise(&item) {
            continue;
        }
        saw_items = true;
        push_item(&mut listing, validator, base, item, &a);
    }
    if saw_items {
        Some(listing)
    } else {
        None
    }
}

#[derive(Debug, Default)]
pub struct RootUlParser {
    validator: LinkValidator,
}

impl DialectParser for RootUlParser {
    fn dialect(&self) -> Dialect {
        Dialect::RootUl
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        Ok(extract_list_items(doc, base, &self.validator, "ul#root li", false))
    }
}

#[derive(Debug, Default)]
pub struct ListGroupParser {
    validator: LinkValidator,
}

impl DialectParser for ListGroupParser {
    fn dialect(&self) -> Dialect {
        Dialect::ListGroup
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        Ok(extract_list_items(doc, base, &self.validator, ".list-group li", true))
    }
}

#[derive(Debug, Default)]
pub struct GenericUlParser {
    validator: LinkValidator,
}

impl DialectParser for GenericUlParser {
    fn dialect(&self) -> Dialect {
        Dialect::GenericUl
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        Ok(extract_list_items(doc, base, &self.validator, "ul li", true))
    }
}

/// Last resort: every anchor in the document, chrome filtered out.
#[derive(Debug, Default)]
pub struct AnchorOnlyParser {
    validator: LinkValidator,
}

impl DialectParser for AnchorOnlyParser {
    fn dialect(&self) -> Dialect {
        Dialect::AnchorOnly
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let a = Selector::parse("a[href]").unwrap();
        let mut listing = Listing::default();
        for anchor in doc.select(&a) {
            if in_noise(&anchor) || !self.validator.is_valid_element(&anchor) {
                continue;
            }
            // anchors leading off-host are navigation, not entries
            if let Ok(url) = base.join(anchor.value().attr("href").unwrap_or_default()) {
                if !utils::same_host_and_directory_file(base, &url) {
                    continue;
                }
            }
            push_anchor(&mut listing, base, anchor, None);
        }
        Ok(Some(listing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn ctx(session: &Session) -> ParseContext<'_> {
        ParseContext {
            client: None,
            session,
            check_parents: true,
        }
    }

    #[test]
    fn test_root_ul() {
        let html = r#"<ul id="root">
            <li><a href="../">..</a></li>
            <li><a href="iso/">iso/</a></li>
            <li><a href="netboot.img">netboot.img</a> 48 MB</li>
        </ul>"#;
        let session = Session::default();
        let doc = Html::parse_document(html);
        let listing = RootUlParser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx(&session))
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "iso");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "netboot.img");
        assert!(listing.files[0].size.is_some());
    }

    #[test]
    fn test_generic_ul_skips_nav() {
        let html = r#"
        <nav><ul><li><a href="/about.html">About</a></li></ul></nav>
        <ul><li><a href="data/">data/</a></li></ul>"#;
        let session = Session::default();
        let doc = Html::parse_document(html);
        let listing = GenericUlParser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx(&session))
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "data");
        assert!(listing.files.is_empty());
    }

    #[test]
    fn test_anchor_only_same_host() {
        let html = r#"
        <a href="http://elsewhere.example/x">mirror</a>
        <a href="sub/">sub</a>
        <a href="b.gz">b.gz</a>"#;
        let session = Session::default();
        let doc = Html::parse_document(html);
        let listing = AnchorOnlyParser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx(&session))
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "b.gz");
    }
}
