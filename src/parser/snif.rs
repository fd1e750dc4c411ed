// Snif (Simple navigable index file) tables: table.snif with a .snHeading
// header row and per-cell classes.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

use super::{element_class_contains, get_real_name_from_href, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::headers::{ColumnKind, HeaderClassifier};
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug, Default)]
pub struct SnifParser {
    validator: LinkValidator,
    classifier: HeaderClassifier,
}

impl DialectParser for SnifParser {
    fn dialect(&self) -> Dialect {
        Dialect::Snif
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let table_selector = Selector::parse("table.snif").unwrap();
        let table = match doc.select(&table_selector).next() {
            Some(table) => table,
            None => return Ok(None),
        };
        let columns = self.classifier.classify(table);

        let tr = Selector::parse("tr").unwrap();
        let td = Selector::parse("td").unwrap();
        let a = Selector::parse("a[href]").unwrap();

        let mut listing = Listing::default();
        listing.header_count = columns.named_count();
        for row in table.select(&tr) {
            if element_class_contains(&row, "snheading") {
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
                name = anchor.text().collect::<String>().trim().to_string();
            }

            let cells: Vec<_> = row.select(&td).collect();
            let cell_with_class = |needle: &str| {
                cells
                    .iter()
                    .find(|cell| element_class_contains(cell, needle))
                    .map(|cell| cell.text().collect::<String>())
            };
            let size_text = cell_with_class("size").or_else(|| {
                columns
                    .column_of(ColumnKind::FileSize)
                    .and_then(|idx| cells.get(idx - 1))
                    .map(|cell| cell.text().collect::<String>())
            });
            let mtime = cell_with_class("date")
                .or_else(|| {
                    columns
                        .column_of(ColumnKind::Modified)
                        .and_then(|idx| cells.get(idx - 1))
                        .map(|cell| cell.text().collect::<String>())
                })
                .and_then(|text| utils::parse_listing_datetime(&text));

            let is_dir = url.path().ends_with('/')
                || element_class_contains(&row, "sndir")
                || size_text
                    .as_deref()
                    .map(|text| text.trim().eq_ignore_ascii_case("dir"))
                    .unwrap_or(false);
            if is_dir {
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
