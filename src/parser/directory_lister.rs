// Directory Lister (directorylister.com): #file-list entries with a
// FontAwesome icon deciding folder vs file.
// https://github.com/DirectoryLister/DirectoryLister/blob/0283f14aa1fbd97796f753e8d6105c752546050f/app/views/components/file.twig

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{element_class_contains, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug, Default)]
pub struct DirectoryListerParser {
    validator: LinkValidator,
}

impl DialectParser for DirectoryListerParser {
    fn dialect(&self) -> Dialect {
        Dialect::DirectoryLister
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let li_selector = Selector::parse("#content ul#file-list li").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let icon = Selector::parse("i").unwrap();
        let name_selector = Selector::parse("div.flex-1.truncate").unwrap();
        let size_selector = Selector::parse("div.hidden.whitespace-nowrap.text-right.mx-2").unwrap();
        let mtime_selector =
            Selector::parse("div.hidden.whitespace-nowrap.text-right.truncate.ml-2").unwrap();

        let mut listing = Listing::default();
        let mut saw_items = false;
        for li in doc.select(&li_selector) {
            saw_items = true;
            let anchor = match li.select(&a).find(|el| self.validator.is_valid_element(el)) {
                Some(anchor) => anchor,
                None => continue,
            };
            let href = anchor.value().attr("href").unwrap_or_default();
            let url = match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let name = li
                .select(&name_selector)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_else(|| anchor.text().collect::<String>());
            let name = name.trim().to_string();
            if name.is_empty() || name == ".." {
                continue;
            }

            let size_text = li
                .select(&size_selector)
                .next()
                .map(|el| el.text().collect::<String>());
            let mtime = li
                .select(&mtime_selector)
                .next()
                .and_then(|el| utils::parse_listing_datetime(&el.text().collect::<String>()));

            let is_dir = li
                .select(&icon)
                .next()
                .map(|el| element_class_contains(&el, "fa-folder"))
                .unwrap_or(false)
                || size_text.as_deref().map(str::trim) == Some("—");
            if is_dir {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
                let size = size_text.as_deref().and_then(FileSize::parse);
                let mut entry = FileEntry::new(url, name, size);
                entry.mtime = mtime;
                listing.push_file(entry);
            }
        }
        if saw_items {
            Ok(Some(listing))
        } else {
            Ok(None)
        }
    }
}
