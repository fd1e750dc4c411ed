// Generic tabular listings: Apache/IIS/ad-hoc tables with (or without)
// labeled header columns.

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{
    element_class_contains, element_has_class, get_real_name_from_href, in_noise, query_param,
    DialectParser, ParseContext,
};
use crate::anchors::LinkValidator;
use crate::headers::{ColumnKind, ColumnMap, HeaderClassifier};
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

#[derive(Debug, Default)]
pub struct TablesParser {
    validator: LinkValidator,
    classifier: HeaderClassifier,
}

struct TableCandidate {
    listing: Listing,
    named_headers: usize,
    // every directory row came from a ?dir= style link
    dir_query_only: bool,
}

impl DialectParser for TablesParser {
    fn dialect(&self) -> Dialect {
        Dialect::Tables
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let table_selector = Selector::parse("table").unwrap();
        let mut candidates = Vec::new();
        for table in doc.select(&table_selector) {
            if is_nested_table(&table) || in_noise(&table) {
                continue;
            }
            if let Some(candidate) = self.extract_table(table, base)? {
                if !candidate.listing.is_empty() {
                    candidates.push(candidate);
                }
            }
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        // Two tables can split the listing: one of subdirectories (rows
        // keyed by ?dir=) and one of files. Merge instead of picking.
        let split = candidates.len() > 1
            && candidates
                .iter()
                .any(|c| c.dir_query_only && !c.listing.subdirs.is_empty() && c.listing.files.is_empty())
            && candidates
                .iter()
                .any(|c| !c.listing.files.is_empty() && c.listing.subdirs.is_empty());
        if split {
            let mut merged = Listing::default();
            for candidate in candidates {
                merged.header_count = merged.header_count.max(candidate.named_headers);
                merged.subdirs.extend(candidate.listing.subdirs);
                merged.files.extend(candidate.listing.files);
            }
            return Ok(Some(merged));
        }

        let best = candidates
            .into_iter()
            .max_by_key(|c| {
                (
                    c.named_headers,
                    c.listing.subdirs.len() + c.listing.files.len(),
                )
            })
            .unwrap();
        let mut listing = best.listing;
        listing.header_count = best.named_headers;
        Ok(Some(listing))
    }
}

impl TablesParser {
    fn extract_table(&self, table: ElementRef, base: &Url) -> Result<Option<TableCandidate>> {
        let mut columns = self.classifier.classify(table);
        if columns.named_count() == 0 {
            let heuristic = self.classifier.heuristic(table);
            if heuristic.named_count() > 0 {
                columns = heuristic;
            }
        }

        let tr = Selector::parse("tr").unwrap();
        let td = Selector::parse("td").unwrap();
        let a = Selector::parse("a[href]").unwrap();
        let th = Selector::parse("th").unwrap();

        let mut listing = Listing::default();
        let mut dir_query_only = true;
        let mut skipped_first = false;
        for row in table.select(&tr) {
            if nearest_table(&row).map(|t| t.id()) != Some(table.id()) {
                continue;
            }
            if row.select(&th).next().is_some() || element_has_class(&row, "snHeading") {
                continue;
            }
            if columns.remove_first_row && !skipped_first {
                skipped_first = true;
                continue;
            }
            self.extract_row(table, row, &td, &a, &columns, base, &mut listing, &mut dir_query_only);
        }

        Ok(Some(TableCandidate {
            named_headers: columns.named_count(),
            dir_query_only: dir_query_only && !listing.subdirs.is_empty(),
            listing,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_row(
        &self,
        table: ElementRef,
        row: ElementRef,
        td: &Selector,
        a: &Selector,
        columns: &ColumnMap,
        base: &Url,
        listing: &mut Listing,
        dir_query_only: &mut bool,
    ) {
        // content of nested tables never belongs to this row
        let cells: Vec<_> = row
            .select(td)
            .filter(|cell| nearest_table(cell).map(|t| t.id()) == Some(table.id()))
            .collect();
        if cells.is_empty() {
            return;
        }

        let anchor = match row
            .select(a)
            .filter(|el| nearest_table(el).map(|t| t.id()) == Some(table.id()))
            .find(|el| self.validator.is_valid_element(el))
        {
            Some(anchor) => anchor,
            None => return,
        };
        let href = anchor.value().attr("href").unwrap_or_default();
        let link_text: String = anchor.text().collect();
        let link_text = link_text.trim().to_string();

        let name_cell_text = columns
            .column_of(ColumnKind::FileName)
            .and_then(|idx| cells.get(idx - 1))
            .map(|cell| cell.text().collect::<String>())
            .unwrap_or_else(|| link_text.clone());
        if name_cell_text.to_lowercase().contains("parent directory") {
            return;
        }

        let url = match base.join(href) {
            Ok(url) => url,
            Err(_) => return,
        };

        let size_text = columns
            .column_of(ColumnKind::FileSize)
            .and_then(|idx| cells.get(idx - 1))
            .map(|cell| cell.text().collect::<String>());
        let mtime = columns
            .column_of(ColumnKind::Modified)
            .and_then(|idx| cells.get(idx - 1))
            .and_then(|cell| utils::parse_listing_datetime(&cell.text().collect::<String>()));
        let description = columns
            .column_of(ColumnKind::Description)
            .and_then(|idx| cells.get(idx - 1))
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty());

        let dir_query = ["folder", "directory", "dirname", "dir"]
            .iter()
            .find_map(|key| query_param(&url, key).map(|value| (*key, value)));

        if is_directory_row(&row, &cells, &url, dir_query.is_some()) {
            if dir_query.is_none() {
                *dir_query_only = false;
            }
            let name = directory_name(&url, &anchor, &link_text, dir_query);
            let mut entry = SubdirEntry::new(url, name);
            entry.description = description;
            listing.push_subdir(entry);
            return;
        }

        if let Some(entry) = file_row(
            &url,
            href,
            &anchor,
            &link_text,
            size_text.as_deref(),
            columns.column_of(ColumnKind::FileSize).is_some(),
        ) {
            let mut entry = entry;
            entry.mtime = mtime;
            entry.description = description;
            listing.push_file(entry);
        }
    }
}

fn nearest_table<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "table")
}

fn is_nested_table(table: &ElementRef) -> bool {
    nearest_table(table).is_some()
}

/// Any signal flips the row to a directory.
fn is_directory_row(row: &ElementRef, cells: &[ElementRef], url: &Url, has_dir_query: bool) -> bool {
    if has_dir_query {
        return true;
    }
    if element_class_contains(row, "dir") {
        return true;
    }
    let img = Selector::parse("img").unwrap();
    let icon = Selector::parse("i").unwrap();
    for cell in cells {
        for image in cell.select(&img) {
            if image.value().attr("alt") == Some("[DIR]") {
                return true;
            }
            if let Some(src) = image.value().attr("src") {
                let src = src.to_lowercase();
                if src.contains("dir") || src.contains("folder") {
                    return true;
                }
            }
            if element_class_contains(&image, "folder") {
                return true;
            }
        }
        for i in cell.select(&icon) {
            if element_class_contains(&i, "folder") {
                return true;
            }
        }
    }
    // icon-less autoindex tables mark directories by the trailing slash alone
    url.path().ends_with('/') && url.query().is_none()
}

fn directory_name(
    url: &Url,
    anchor: &ElementRef,
    link_text: &str,
    dir_query: Option<(&str, String)>,
) -> String {
    if let Some((key, value)) = dir_query {
        if key == "folder" {
            if let Ok(decoded) = BASE64.decode(value.as_bytes()) {
                if let Ok(name) = String::from_utf8(decoded) {
                    return name;
                }
            }
        }
        let name = value.trim_end_matches('/');
        return name.rsplit('/').next().unwrap_or(name).to_string();
    }
    if element_has_class(anchor, "name") && !link_text.is_empty() {
        return link_text.trim_end_matches('/').to_string();
    }
    utils::decoded_last_segment(url).unwrap_or_else(|| link_text.trim_end_matches('/').to_string())
}

fn file_row(
    url: &Url,
    href: &str,
    anchor: &ElementRef,
    link_text: &str,
    size_text: Option<&str>,
    has_size_header: bool,
) -> Option<FileEntry> {
    let file_query = query_param(url, "file");
    let trailing_slash = href.ends_with('/');

    let accepted = if file_query.is_some() {
        true
    } else if query_param(url, "dir").is_some() {
        false
    } else if !has_size_header {
        !trailing_slash
    } else {
        let text = size_text.unwrap_or_default().trim().to_string();
        let parsed = FileSize::parse(&text);
        !trailing_slash
            && parsed.map(|s| s.get_estimated() > 0).unwrap_or(false)
            && !text.to_lowercase().contains("item")
    };
    if !accepted {
        return None;
    }

    let name = if let Some(name) = file_query {
        name
    } else if let Some(remote) = query_param(url, "url") {
        remote
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&remote)
            .to_string()
    } else {
        let segment = get_real_name_from_href(href);
        if segment.is_empty() || element_has_class(anchor, "name") {
            if link_text.is_empty() {
                segment
            } else {
                link_text.to_string()
            }
        } else {
            segment
        }
    };
    if name.is_empty() {
        return None;
    }

    let size = size_text.and_then(FileSize::parse);
    Some(FileEntry::new(url.clone(), name, size))
}
