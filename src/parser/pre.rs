// Preformatted-text listings: one line per entry inside <pre>, eight line
// shapes tried in fixed order. The ordering is the contract; the first
// matching rule fixes the row's interpretation.

use anyhow::Result;
use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use url::Url;

use super::{get_real_name_from_href, DialectParser, ParseContext};
use crate::anchors::LinkValidator;
use crate::listing::{Dialect, FileEntry, FileSize, Listing, SubdirEntry};
use crate::utils;

// anchor with href in either quote style
const A: &str = r#"<a[^>]*?href\s*=\s*(?:"(?P<href>[^"]*)"|'(?P<href2>[^']*)')[^>]*>(?P<text>.*?)</a>"#;
// the literal <dir> marker, raw or entity-encoded, and the bare DIR token
const DIR: &str = r"(?:&lt;dir&gt;|<dir>|DIR)";
const SIZE: &str = r"(?P<size>[\d.,]+\s*[KMGTPE]?i?B?|-)";

#[derive(Debug)]
struct LineRule {
    tag: &'static str,
    regex: Regex,
}

fn rule(tag: &'static str, pattern: String) -> LineRule {
    LineRule {
        tag,
        regex: RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .unwrap(),
    }
}

#[derive(Debug)]
pub struct PreFormattedParser {
    validator: LinkValidator,
    splitter: Regex,
    rules: Vec<LineRule>,
}

impl Default for PreFormattedParser {
    fn default() -> Self {
        let rules = vec![
            // Apache classic: [icon] <a> modified size description
            rule(
                "apache-classic",
                format!(
                    r"^\s*(?:<img[^>]*>\s*)?{A}\s+(?P<date>\d{{1,2}}-\w{{3}}-\d{{4}}\s+\d{{2}}:\d{{2}}|\d{{4}}-\d{{2}}-\d{{2}}\s+\d{{2}}:\d{{2}})\s+(?:(?P<dir>{DIR})|{SIZE})\s*(?P<desc>.*?)\s*$"
                ),
            ),
            // compact: <a> datetime size
            rule(
                "anchor-datetime-size",
                format!(
                    r"^\s*{A}\s+(?P<date>\d{{4}}-\d{{2}}-\d{{2}}\s+\d{{2}}:\d{{2}}(?::\d{{2}})?)\s+(?:(?P<dir>{DIR})|{SIZE})\s*$"
                ),
            ),
            // date [icon] size <a>, directories carry a literal marker
            rule(
                "date-size-anchor",
                format!(
                    r"^\s*(?P<date>\d{{1,4}}[-/.]\d{{1,2}}[-/.]\d{{1,4}}(?:\s+\d{{1,2}}:\d{{2}}(?::\d{{2}})?)?)\s*(?:<img[^>]*>\s*)?(?:(?P<dir>{DIR})|{SIZE})\s+{A}\s*$"
                ),
            ),
            // IIS verbose: Weekday, Month d, yyyy h:mm AP size <a>
            rule(
                "iis-verbose",
                format!(
                    r"^\s*(?P<date>\w+,\s+\w+\s+\d{{1,2}},\s+\d{{4}}\s+\d{{1,2}}:\d{{2}}\s*[AP]M)\s+(?:(?P<dir>{DIR})|{SIZE})\s+{A}\s*$"
                ),
            ),
            // Korean IIS: date 오전/오후 h:mm size <a>
            rule(
                "iis-korean",
                format!(
                    r"^\s*(?P<date>\d{{4}}-\d{{2}}-\d{{2}}\s+(?:오전|오후)\s+\d{{1,2}}:\d{{2}})\s+(?:(?P<dir>{DIR})|{SIZE})\s+{A}\s*$"
                ),
            ),
            // IIS short: m/d/yyyy h:mm AP size <a>
            rule(
                "iis-short",
                format!(
                    r"^\s*(?P<date>\d{{1,2}}/\d{{1,2}}/\d{{4}}\s+\d{{1,2}}:\d{{2}}\s*[AP]M)\s+(?:(?P<dir>{DIR})|{SIZE})\s+{A}\s*$"
                ),
            ),
            // Unix ls -l: drwxr-xr-x n owner group size date <a>
            rule(
                "unix-ls",
                format!(
                    r"^\s*(?P<mode>[dl-])[rwxsStT-]{{9}}[+.]?\s+\d+\s+\S+\s+\S+\s+(?P<rawsize>-?\d+)\s+(?P<date>\w{{3}}\s+\d{{1,2}}\s+(?:\d{{4}}|\d{{1,2}}:\d{{2}}))\s+{A}/?\s*$"
                ),
            ),
            // bare anchor with optional trailing slash or size
            rule(
                "anchor-only",
                format!(r"^\s*{A}\s*(?P<slash>/)?\s*(?:(?P<dir>{DIR})|{SIZE})?\s*$"),
            ),
        ];
        Self {
            validator: LinkValidator::default(),
            splitter: RegexBuilder::new(r"\r\n|\r|\n|<br\s*/?>|<hr[^>]*>")
                .case_insensitive(true)
                .build()
                .unwrap(),
            rules,
        }
    }
}

impl DialectParser for PreFormattedParser {
    fn dialect(&self) -> Dialect {
        Dialect::PreFormatted
    }

    fn extract(&self, doc: &Html, base: &Url, _ctx: &ParseContext) -> Result<Option<Listing>> {
        let pre = Selector::parse("pre").unwrap();
        let mut listing = Listing::default();
        let mut matched_any = false;
        for block in doc.select(&pre) {
            matched_any = true;
            let html = block.inner_html();
            for line in self.splitter.split(&html) {
                self.extract_line(line, base, &mut listing);
            }
        }
        if matched_any && !listing.is_empty() {
            Ok(Some(listing))
        } else {
            Ok(None)
        }
    }
}

impl PreFormattedParser {
    fn extract_line(&self, line: &str, base: &Url, listing: &mut Listing) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        for rule in &self.rules {
            let captures = match rule.regex.captures(line) {
                Some(captures) => captures,
                None => continue,
            };
            let href = captures
                .name("href")
                .or_else(|| captures.name("href2"))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let text = captures
                .name("text")
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            if text.is_empty() || !self.validator.is_valid(href, text, None) {
                return;
            }
            let url = match base.join(href) {
                Ok(url) => url,
                Err(_) => return,
            };

            let raw_size = captures
                .name("rawsize")
                .and_then(|m| m.as_str().parse::<i64>().ok());
            let is_directory = captures.name("dir").is_some()
                || captures.name("slash").is_some()
                || captures.name("mode").map(|m| m.as_str()) == Some("d")
                || url.path().ends_with('/');

            let mut name = get_real_name_from_href(href);
            if name.is_empty() {
                name = text.trim_end_matches('/').to_string();
            }

            if is_directory {
                listing.push_subdir(SubdirEntry::new(url, name));
            } else {
                let size = match raw_size {
                    // negative counts are 4-GiB wrap artifacts, not sizes
                    Some(size) if size < 0 => None,
                    Some(size) => Some(FileSize::Precise(size as u64)),
                    None => captures
                        .name("size")
                        .and_then(|m| FileSize::parse(m.as_str())),
                };
                let mut entry = FileEntry::new(url, name, size);
                entry.mtime = captures
                    .name("date")
                    .and_then(|m| utils::parse_listing_datetime(m.as_str()));
                entry.description = captures
                    .name("desc")
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|text| !text.is_empty());
                listing.push_file(entry);
            }
            tracing::trace!("pre line matched {}", rule.tag);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn parse(html: &str) -> Listing {
        let session = Session::default();
        let ctx = ParseContext {
            client: None,
            session: &session,
            check_parents: true,
        };
        let doc = Html::parse_document(html);
        PreFormattedParser::default()
            .extract(&doc, &Url::parse("http://h/p/").unwrap(), &ctx)
            .unwrap()
            .unwrap_or_default()
    }

    #[test]
    fn test_apache_classic() {
        let html = concat!(
            "<pre>",
            r#"<img src="/icons/back.gif" alt="[PARENTDIR]"> <a href="/">Parent Directory</a>                       -"#,
            "\n",
            r#"<img src="/icons/folder.gif" alt="[DIR]"> <a href="sub/">sub/</a>            01-Jan-2020 10:00    -"#,
            "\n",
            r#"<img src="/icons/text.gif" alt="[TXT]"> <a href="a.txt">a.txt</a>            01-Jan-2020 10:00  12K readme"#,
            "</pre>",
        );
        let listing = parse(html);
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "sub");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "a.txt");
        assert_eq!(listing.files[0].size.unwrap().get_estimated(), 12288);
        assert_eq!(listing.files[0].description.as_deref(), Some("readme"));
    }

    #[test]
    fn test_unix_ls() {
        let html = concat!(
            "<pre>",
            r#"drwxr-xr-x 4 u g 4096 Jan 1 10:00 <a href="d/">d</a>"#,
            "\n",
            r#"-rw-r--r-- 1 u g 1048576 Jan 2 11:30 <a href="big.iso">big.iso</a>"#,
            "\n",
            r#"-rw-r--r-- 1 u g -123456 Jan 2 11:30 <a href="wrapped.bin">wrapped.bin</a>"#,
            "</pre>",
        );
        let listing = parse(html);
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "d");
        assert_eq!(listing.files.len(), 2);
        assert_eq!(
            listing.files[0].size,
            Some(FileSize::Precise(1048576))
        );
        // negative raw size collapses to unknown
        assert_eq!(listing.files[1].size, None);
    }

    #[test]
    fn test_iis_short() {
        let html = concat!(
            "<pre>",
            r#" 1/5/2020 10:00 AM &lt;dir&gt; <a href="stuff/">stuff</a>"#,
            "<br>",
            r#" 1/5/2020 10:02 AM 4096 <a href="doc.pdf">doc.pdf</a>"#,
            "</pre>",
        );
        let listing = parse(html);
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "stuff");
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].size, Some(FileSize::Precise(4096)));
    }

    #[test]
    fn test_anchor_only_fallback() {
        let html = r#"<pre><a href="sub/">sub</a>
<a href="a.bin">a.bin</a> 12K
<a href="b.bin">b.bin</a> -</pre>"#;
        let listing = parse(html);
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.files.len(), 2);
        assert_eq!(listing.files[0].size.unwrap().get_estimated(), 12288);
        assert_eq!(listing.files[1].size, None);
    }

    #[test]
    fn test_no_pre_block() {
        let html = r#"<table><tr><td><a href="a">a</a></td></tr></table>"#;
        let session = Session::default();
        let ctx = ParseContext {
            client: None,
            session: &session,
            check_parents: true,
        };
        let doc = Html::parse_document(html);
        let result = PreFormattedParser::default()
            .extract(&doc, &Url::parse("http://h/").unwrap(), &ctx)
            .unwrap();
        assert!(result.is_none());
    }
}
