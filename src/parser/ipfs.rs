// IPFS gateway listings: a table of [icon, name, hash, size], selected by
// host rather than by structure.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{get_real_name_from_href, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};

#[derive(Debug, Default)]
pub struct IpfsParser {
    validator: LinkValidator,
}

impl DialectParser for IpfsParser {
    fn dialect(&self) -> Dialect {
        Dialect::Ipfs
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let row_selector = Selector::parse("table tr").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let size_cell = Selector::parse("td:nth-child(3)").unwrap();
        let th = Selector::parse("th").unwrap();

        let mut listing = Listing::default();
        let mut saw_rows = false;
        for row in doc.select(&row_selector) {
            if row.select(&th).next().is_some() {
                continue;
            }
            saw_rows = true;
            let anchor = match row.select(&a).find(|el| self.validator.is_valid_element(el)) {
                Some(anchor) => anchor,
                None => continue,
            };
            let href = anchor.value().attr("href").unwrap_or_default();
            let url = match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let mut name = anchor.text().collect::<String>().trim().to_string();
            if name.is_empty() {
                name = get_real_name_from_href(href);
            }
            if name.is_empty() {
                continue;
            }

            let size = row
                .select(&size_cell)
                .next()
                .and_then(|cell| FileSize::parse(&cell.text().collect::<String>()));
            if url.path().ends_with('/') || size.is_none() {
                listing.push_subdir(SubdirEntry::new(url, name.trim_end_matches('/').to_string()));
            } else {
                listing.push_file(FileEntry::new(url, name, size));
            }
        }
        if saw_rows {
            Ok(Some(listing))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn test_ipfs_gateway_table() {
        let html = r#"<table>
            <tr><th></th><th>Name</th><th>Size</th></tr>
            <tr><td>📁</td><td><a href="/ipfs/Qm1/photos/">photos</a></td><td>-</td></tr>
            <tr><td>📄</td><td><a href="/ipfs/Qm1/cat.png">cat.png</a></td><td>443 kB</td></tr>
        </table>"#;
        let session = Session::default();
        let ctx = ParseContext {
            client: None,
            session: &session,
            check_parents: true,
        };
        let doc = Html::parse_document(html);
        let listing = IpfsParser::default()
            .extract(&doc, &Url::parse("https://ipfs.io/ipfs/Qm1/").unwrap(), &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "photos");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "cat.png");
        assert!(listing.files[0].size.is_some());
    }
}
