// HFS (HTTP File Server) listings: #files with .item entries, folders
// tagged item-type-folder.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{element_class_contains, get_real_name_from_href, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};

#[derive(Debug, Default)]
pub struct HfsParser {
    validator: LinkValidator,
}

impl DialectParser for HfsParser {
    fn dialect(&self) -> Dialect {
        Dialect::Hfs
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let item_selector = Selector::parse("div#files .item").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let size_selector = Selector::parse(".item-size, .size").unwrap();

        let mut listing = Listing::default();
        let mut saw_items = false;
        for item in doc.select(&item_selector) {
            saw_items = true;
            let anchor = match item.select(&a).find(|el| self.validator.is_valid_element(el)) {
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
                name = anchor.text().collect::<String>().trim().to_string();
            }
            if name.is_empty() {
                continue;
            }

            if element_class_contains(&item, "item-type-folder") {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
                let size = item
                    .select(&size_selector)
                    .next()
                    .and_then(|el| FileSize::parse(&el.text().collect::<String>()));
                listing.push_file(FileEntry::new(url, name, size));
            }
        }
        if saw_items {
            Ok(Some(listing))
        } else {
            Ok(None)
        }
    }
}
