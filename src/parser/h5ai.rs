// h5ai renders a #fallback table for clients without JavaScript.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{get_real_name_from_href, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug, Default)]
pub struct H5aiParser {
    validator: LinkValidator,
}

impl DialectParser for H5aiParser {
    fn dialect(&self) -> Dialect {
        Dialect::H5ai
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let row_selector = Selector::parse("#fallback table tr").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let td = Selector::parse("td").unwrap();
        let th = Selector::parse("th").unwrap();

        let mut listing = Listing::default();
        let mut saw_rows = false;
        for row in doc.select(&row_selector) {
            saw_rows = true;
            if row.select(&th).next().is_some() {
                continue;
            }
            let anchor = match row.select(&a).find(|el| self.validator.is_valid_element(el)) {
                Some(anchor) => anchor,
                None => continue,
            };
            let href = anchor.value().attr("href").unwrap_or_default();
            let url = match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let mut name = get_real_name_from_href(href);
            if name.is_empty() {
                name = anchor.text().collect::<String>().trim_end_matches('/').to_string();
            }

            let cells: Vec<_> = row.select(&td).collect();
            // fallback table: icon, name, date, size
            let mtime = cells
                .get(2)
                .and_then(|cell| utils::parse_listing_datetime(&cell.text().collect::<String>()));
            let size_text = cells.get(3).map(|cell| cell.text().collect::<String>());

            if url.path().ends_with('/') {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
                let size = size_text.as_deref().and_then(FileSize::parse);
                let mut entry = FileEntry::new(url, name, size);
                entry.mtime = mtime;
                listing.push_file(entry);
            }
        }
        if saw_rows {
            Ok(Some(listing))
        } else {
            Ok(None)
        }
    }
}
