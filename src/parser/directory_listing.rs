// directorylisting.com script output: li entries under #directory-listing,
// metadata in data- attributes when present.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{element_class_contains, get_real_name_from_href, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};

#[derive(Debug, Default)]
pub struct DirectoryListingComParser {
    validator: LinkValidator,
}

impl DialectParser for DirectoryListingComParser {
    fn dialect(&self) -> Dialect {
        Dialect::DirectoryListingCom
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let li_selector = Selector::parse("#directory-listing li, .directory-listing li").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let size_selector = Selector::parse(".file-size, .size").unwrap();

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
            let mut name = li
                .value()
                .attr("data-name")
                .map(|name| name.to_string())
                .unwrap_or_else(|| get_real_name_from_href(href));
            if name.is_empty() {
                name = anchor.text().collect::<String>().trim().to_string();
            }
            if name.is_empty() || name == ".." {
                continue;
            }

            let is_dir = url.path().ends_with('/')
                || element_class_contains(&li, "directory")
                || li.value().attr("data-type") == Some("directory");
            if is_dir {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
                let size = li
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn test_directory_listing_com() {
        let html = r#"<ul id="directory-listing">
            <li data-name=".." data-type="directory"><a href="../">..</a></li>
            <li data-name="games" data-type="directory"><a href="games/">games</a></li>
            <li data-name="rom.zip" data-type="file"><a href="rom.zip">rom.zip</a><span class="file-size">32 MB</span></li>
        </ul>"#;
        let session = Session::default();
        let ctx = ParseContext {
            client: None,
            session: &session,
            check_parents: true,
        };
        let doc = Html::parse_document(html);
        let listing = DirectoryListingComParser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "games");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "rom.zip");
    }
}
