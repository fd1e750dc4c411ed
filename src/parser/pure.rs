// Pure/Godir themed listings (table.listing-table). These pages render a
// breadcrumb of the directory they actually describe; a mismatch against
// the requested URL means the server rewrote the path under us, and the
// page must be refused rather than indexed somewhere wrong.

use anyhow::Result;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use scraper::{Html, Selector};
use url::Url;

use super::{DialectParser, FriendlyError, ParseContext};
use crate::anchors::LinkValidator;
use crate::headers::{ColumnKind, HeaderClassifier};
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug, Default)]
pub struct PureGodirParser {
    validator: LinkValidator,
    classifier: HeaderClassifier,
}

impl DialectParser for PureGodirParser {
    fn dialect(&self) -> Dialect {
        Dialect::PureGodir
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let row_selector = Selector::parse("table.listing-table tbody tr").unwrap();
        if doc.select(&row_selector).next().is_none() {
            return Ok(None);
        }

        if !self.breadcrumb_matches(doc, base) {
            return Err(FriendlyError(format!(
                "breadcrumbs do not match the requested path {}",
                base.path()
            ))
            .into());
        }

        let table_selector = Selector::parse("table.listing-table").unwrap();
        let table = doc.select(&table_selector).next().unwrap();
        let columns = self.classifier.classify(table);

        let a = Selector::parse("a[href]").unwrap();
        let td = Selector::parse("td").unwrap();

        let mut listing = Listing::default();
        listing.header_count = columns.named_count();
        for row in doc.select(&row_selector) {
            let anchor = match row.select(&a).find(|el| self.validator.is_valid_element(el)) {
                Some(anchor) => anchor,
                None => continue,
            };
            let href = anchor.value().attr("href").unwrap_or_default();
            let url = match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let name = anchor
                .text()
                .collect::<String>()
                .trim()
                .trim_end_matches('/')
                .to_string();

            let cells: Vec<_> = row.select(&td).collect();
            let size_text = columns
                .column_of(ColumnKind::FileSize)
                .and_then(|idx| cells.get(idx - 1))
                .map(|cell| cell.text().collect::<String>());
            let mtime = columns
                .column_of(ColumnKind::Modified)
                .and_then(|idx| cells.get(idx - 1))
                .and_then(|cell| utils::parse_listing_datetime(&cell.text().collect::<String>()));

            if url.path().ends_with('/') {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
                let size = size_text.as_deref().and_then(FileSize::parse);
                let mut entry = FileEntry::new(url, name, size);
                entry.mtime = mtime;
                listing.push_file(entry);
            }
        }
        Ok(Some(listing))
    }
}

impl PureGodirParser {
    /// Rebuild the path the breadcrumbs describe and compare it to the URL
    /// path, accepting either the raw or the percent-encoded rendition.
    fn breadcrumb_matches(&self, doc: &Html, base: &Url) -> bool {
        let crumb = Selector::parse(".breadcrumb a, .breadcrumb span, .breadcrumbs a").unwrap();
        let segments: Vec<String> = doc
            .select(&crumb)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty() && text != "/" && text != "~" && text != "Home")
            .collect();
        let mut crumb_path = String::from("/");
        for segment in &segments {
            crumb_path.push_str(segment);
            crumb_path.push('/');
        }

        let encoded: String = crumb_path
            .split('/')
            .map(|seg| utf8_percent_encode(seg, NON_ALPHANUMERIC).to_string())
            .collect::<Vec<_>>()
            .join("/");
        let actual = base.path();
        let actual_decoded = percent_decode_str(actual).decode_utf8_lossy();
        crumb_path == actual || crumb_path == actual_decoded || encoded == actual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn try_parse(html: &str, base: &str) -> Result<Option<Listing>> {
        let session = Session::default();
        let ctx = ParseContext {
            client: None,
            session: &session,
            check_parents: true,
        };
        let doc = Html::parse_document(html);
        PureGodirParser::default().extract(&doc, &Url::parse(base).unwrap(), &ctx)
    }

    const PAGE: &str = r#"
        <ol class="breadcrumb"><a href="/">Home</a><a href="/x/">x</a></ol>
        <table class="listing-table">
            <thead><tr><th>Name</th><th>Size</th><th>Date</th></tr></thead>
            <tbody>
                <tr><td><a href="/x/sub/">sub/</a></td><td>-</td><td>2024-01-01 00:00</td></tr>
                <tr><td><a href="/x/a.txt">a.txt</a></td><td>12K</td><td>2024-01-01 00:00</td></tr>
            </tbody>
        </table>"#;

    #[test]
    fn test_breadcrumb_match() {
        let listing = try_parse(PAGE, "http://h/x/").unwrap().unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "sub");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "a.txt");
    }

    #[test]
    fn test_breadcrumb_mismatch_is_friendly_error() {
        // page says /x/ but we asked for /y/
        let err = try_parse(PAGE, "http://h/y/").unwrap_err();
        assert!(err.downcast_ref::<FriendlyError>().is_some());
    }

    #[test]
    fn test_not_pure_page() {
        let html = r#"<table><tr><td><a href="a">a</a></td></tr></table>"#;
        assert!(try_parse(html, "http://h/").unwrap().is_none());
    }
}
