// Material-Design (mdui) lists. Three header variants exist in the wild:
// an icon cell with data-sort, ?sortby= header links, and plain text; all
// are skipped, and data-sort-* attributes on entries win over cell text.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{element_class_contains, get_real_name_from_href, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug, Default)]
pub struct MaterialListParser {
    validator: LinkValidator,
}

impl DialectParser for MaterialListParser {
    fn dialect(&self) -> Dialect {
        Dialect::MaterialList
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let li_selector = Selector::parse("ul.mdui-list li").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let icon = Selector::parse("i.mdui-icon").unwrap();

        let mut listing = Listing::default();
        let mut saw_items = false;
        for li in doc.select(&li_selector) {
            if is_header_item(&li) {
                continue;
            }
            saw_items = true;
            let anchor = match li
                .select(&a)
                .find(|el| self.validator.is_valid_element(el))
            {
                Some(anchor) => anchor,
                None => continue,
            };
            let href = anchor.value().attr("href").unwrap_or_default();
            let url = match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            };

            let sort_name = li.value().attr("data-sort-name").map(str::to_string);
            let mut name = sort_name.unwrap_or_else(|| get_real_name_from_href(href));
            if name.is_empty() {
                name = anchor.text().collect::<String>().trim().to_string();
            }
            if name.is_empty() {
                continue;
            }

            let size = li
                .value()
                .attr("data-sort-size")
                .and_then(FileSize::parse)
                .or_else(|| trailing_size(&li.text().collect::<String>()));
            let mtime = li
                .value()
                .attr("data-sort-date")
                .and_then(utils::parse_listing_datetime);

            let is_dir = url.path().ends_with('/')
                || li
                    .select(&icon)
                    .next()
                    .map(|el| el.text().collect::<String>().trim() == "folder")
                    .unwrap_or(false);
            if is_dir {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
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

/// Sort headers come as an icon cell with data-sort, a ?sortby= link, or a
/// bare text row without an entry link.
fn is_header_item(li: &scraper::ElementRef) -> bool {
    if li.value().attr("data-sort").is_some() {
        return true;
    }
    let a = Selector::parse("a[href]").unwrap();
    for anchor in li.select(&a) {
        if let Some(href) = anchor.value().attr("href") {
            if href.contains("?sortby=") || href.contains("&sortby=") {
                return true;
            }
        }
    }
    element_class_contains(li, "mdui-list-item-title")
        && li.select(&a).next().is_none()
        && li.value().attr("data-sort-name").is_none()
}

/// A size rendered at the end of the entry text, "1.4 GB" or "1392".
fn trailing_size(text: &str) -> Option<FileSize> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() >= 2 {
        if let Some(size) = FileSize::parse(&tokens[tokens.len() - 2..].join(" ")) {
            return Some(size);
        }
    }
    tokens.last().and_then(|token| FileSize::parse(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn test_mdui_list() {
        let html = r#"<ul class="mdui-list">
            <li data-sort><i class="mdui-icon" data-sort>sort</i></li>
            <li data-sort-name="shows" data-sort-date="2024-02-02 08:00"><a href="shows/"><i class="mdui-icon">folder</i>shows</a></li>
            <li data-sort-name="ep1.mkv" data-sort-size="1.4 GB" data-sort-date="2024-02-02 08:10"><a href="ep1.mkv"><i class="mdui-icon">movie</i>ep1.mkv 1.4 GB</a></li>
        </ul>"#;
        let session = Session::default();
        let ctx = ParseContext {
            client: None,
            session: &session,
            check_parents: true,
        };
        let doc = Html::parse_document(html);
        let listing = MaterialListParser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "shows");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "ep1.mkv");
        assert!(listing.files[0].size.is_some());
        assert!(listing.files[0].mtime.is_some());
    }

    #[test]
    fn test_sortby_header_skipped() {
        let html = r#"<ul class="mdui-list">
            <li><a href="?sortby=name">Name</a></li>
            <li><a href="data/">data</a></li>
        </ul>"#;
        let session = Session::default();
        let ctx = ParseContext {
            client: None,
            session: &session,
            check_parents: true,
        };
        let doc = Html::parse_document(html);
        let listing = MaterialListParser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert!(listing.files.is_empty());
    }
}
