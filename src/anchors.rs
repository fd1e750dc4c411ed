// Classify an anchor as a navigable entry or a decorative/parent/sort link.

use regex::Regex;
use scraper::ElementRef;

const REJECTED_HREFS: &[&str] = &["", "/", "..", "../", "./.", "./..", "#"];

#[derive(Debug, Clone)]
pub struct LinkValidator {
    sort_link: Regex,
}

impl Default for LinkValidator {
    fn default() -> Self {
        Self {
            // Column/order sort links: ?N=A, ?M=D, ?S=?A and the Apache
            // two-parameter form ?C=N;O=A.
            sort_link: Regex::new(r"\?[CNMSDO]=\??[ADNMS]?(?:[;&][CNMSDO]=\??[ADNMS]?)*$").unwrap(),
        }
    }
}

impl LinkValidator {
    pub fn is_valid(&self, href: &str, text: &str, title: Option<&str>) -> bool {
        if REJECTED_HREFS.contains(&href) {
            return false;
        }
        let lower = href.to_lowercase();
        if lower.starts_with("javascript:") || lower.starts_with("mailto:") {
            return false;
        }
        let text = text.trim();
        if text == ".." || text == "." || text == "Name" {
            return false;
        }
        if text.eq_ignore_ascii_case("parent directory")
            || text.eq_ignore_ascii_case("[to parent directory]")
        {
            return false;
        }
        if title == Some("..") {
            return false;
        }
        if href.contains("&expand") {
            return false;
        }
        let last_segment = href.split('?').next().unwrap_or("").split('/').last();
        let is_dirlist_asp = last_segment == Some("DirectoryList.asp");
        if self.sort_link.is_match(href) && !is_dirlist_asp {
            return false;
        }
        if is_dirlist_asp && text.is_empty() {
            return false;
        }
        true
    }

    /// Convenience wrapper for a scraper anchor element.
    pub fn is_valid_element(&self, a: &ElementRef) -> bool {
        let href = match a.value().attr("href") {
            Some(href) => href,
            None => return false,
        };
        let text: String = a.text().collect();
        self.is_valid(href, &text, a.value().attr("title"))
    }
}
