// Two ad-hoc DIV layouts seen in the wild: a #listing of rows with the
// name in <strong> and size in <em>, and a #filelist of .tb-row entries
// where folders carry data-href and files a .sz cell.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{element_class_contains, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};

#[derive(Debug, Default)]
pub struct CustomDiv1Parser {
    validator: LinkValidator,
}

impl DialectParser for CustomDiv1Parser {
    fn dialect(&self) -> Dialect {
        Dialect::CustomDiv1
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let entry_selector = Selector::parse("div#listing div").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let strong = Selector::parse("strong").unwrap();
        let em = Selector::parse("em").unwrap();

        let mut listing = Listing::default();
        let mut saw_entries = false;
        for entry in doc.select(&entry_selector) {
            saw_entries = true;
            let anchor = match entry.select(&a).find(|el| self.validator.is_valid_element(el)) {
                Some(anchor) => anchor,
                None => continue,
            };
            let href = anchor.value().attr("href").unwrap_or_default();
            let url = match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let name = entry
                .select(&strong)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_else(|| anchor.text().collect::<String>());
            let name = name.trim().trim_end_matches('/').to_string();
            if name.is_empty() {
                continue;
            }
            let size = entry
                .select(&em)
                .next()
                .and_then(|el| FileSize::parse(&el.text().collect::<String>()));

            if url.path().ends_with('/') || size.is_none() && href.ends_with('/') {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
                listing.push_file(FileEntry::new(url, name, size));
            }
        }
        if saw_entries {
            Ok(Some(listing))
        } else {
            Ok(None)
        }
    }
}

#[derive(Debug, Default)]
pub struct CustomDiv2Parser {
    validator: LinkValidator,
}

impl DialectParser for CustomDiv2Parser {
    fn dialect(&self) -> Dialect {
        Dialect::CustomDiv2
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let row_selector = Selector::parse("div#filelist .tb-row").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let sz = Selector::parse(".sz").unwrap();

        let mut listing = Listing::default();
        let mut saw_rows = false;
        for row in doc.select(&row_selector) {
            let is_folder = element_class_contains(&row, "folder");
            let is_file = element_class_contains(&row, "afile");
            if !is_folder && !is_file {
                continue;
            }
            saw_rows = true;

            if is_folder {
                // folders navigate via data-href
                let href = match row.value().attr("data-href") {
                    Some(href) => href,
                    None => continue,
                };
                if !self.validator.is_valid(href, "", None) {
                    continue;
                }
                let url = match base.join(href) {
                    Ok(url) => url,
                    Err(_) => continue,
                };
                let name = row
                    .text()
                    .collect::<String>()
                    .trim()
                    .trim_end_matches('/')
                    .to_string();
                if name.is_empty() {
                    continue;
                }
                listing.push_subdir(SubdirEntry::new(url, name));
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
            let name = anchor.text().collect::<String>().trim().to_string();
            if name.is_empty() {
                continue;
            }
            let size = row
                .select(&sz)
                .next()
                .and_then(|el| FileSize::parse(&el.text().collect::<String>()));
            listing.push_file(FileEntry::new(url, name, size));
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

    fn ctx(session: &Session) -> ParseContext<'_> {
        ParseContext {
            client: None,
            session,
            check_parents: true,
        }
    }

    #[test]
    fn test_custom_div_1() {
        let html = r#"<div id="listing">
            <div><a href="books/"><strong>books/</strong></a></div>
            <div><a href="b.epub"><strong>b.epub</strong></a> <em>2.3 MB</em></div>
        </div>"#;
        let session = Session::default();
        let doc = Html::parse_document(html);
        let listing = CustomDiv1Parser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx(&session))
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "books");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "b.epub");
        assert!(listing.files[0].size.is_some());
    }

    #[test]
    fn test_custom_div_2() {
        let html = r#"<div id="filelist">
            <div class="tb-row folder" data-href="sub/">sub</div>
            <div class="tb-row afile"><a href="x.rar">x.rar</a><span class="sz">700 MB</span></div>
        </div>"#;
        let session = Session::default();
        let doc = Html::parse_document(html);
        let listing = CustomDiv2Parser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx(&session))
            .unwrap()
            .unwrap();
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "sub");
        assert_eq!(listing.subdirs[0].url.as_str(), "http://h/p/sub/");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "x.rar");
    }
}
