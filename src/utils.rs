use anyhow::Result;
use chrono::NaiveDateTime;
use percent_encoding::percent_decode_str;
use tracing::warn;
use url::Url;

#[macro_export]
macro_rules! build_client {
    ($client: ty, $args: expr) => {{
        <$client>::builder()
            .user_agent($args.user_agent.clone())
            .build()
            .unwrap()
    }};
}

pub fn again<T>(closure: impl Fn() -> Result<T>, retry: usize) -> Result<T> {
    let mut count = 0;
    loop {
        match closure() {
            Ok(x) => return Ok(x),
            Err(e) => {
                warn!("Error: {:?}, retrying {}/{}", e, count, retry);
                count += 1;
                if count > retry {
                    return Err(e);
                }
            }
        }
    }
}

pub fn get(client: &reqwest::blocking::Client, url: Url) -> Result<reqwest::blocking::Response> {
    Ok(client.get(url).send()?.error_for_status()?)
}

/// Filenames that servers serve for the bare directory URL. Two URLs
/// differing only by one of these must compare equal.
const DEFAULT_FILENAMES: &[&str] = &["index.php", "index.shtml", "DirectoryList.asp"];

pub fn replace_common_default_filenames(path: &str) -> String {
    let mut path = path.to_string();
    for name in DEFAULT_FILENAMES {
        path = path.replace(name, "");
    }
    path
}

/// Remove the classic Apache column/order sort parameters, but only when the
/// query carries exactly those two. Anything else passes through unchanged.
pub fn strip_sort_query(url: &Url) -> Url {
    let query = match url.query() {
        Some(q) => q,
        None => return url.clone(),
    };
    let keys: Vec<&str> = query
        .split(['&', ';'])
        .map(|pair| pair.split('=').next().unwrap_or(""))
        .collect();
    if keys.len() == 2 && keys.contains(&"C") && keys.contains(&"O") {
        let mut url = url.clone();
        url.set_query(None);
        url
    } else {
        url.clone()
    }
}

pub fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
}

/// Last non-empty path segment, percent-decoded. `None` for the root path.
pub fn decoded_last_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

fn scoped_path(url: &Url) -> String {
    replace_common_default_filenames(url.path())
}

/// True when `check` names the same directory as `base` or one below it on
/// the same host. Default filenames are erased before comparing.
pub fn same_host_and_directory_dir(base: &Url, check: &Url) -> bool {
    if base == check {
        return true;
    }
    if base.host_str() != check.host_str() {
        return false;
    }
    scoped_path(check).starts_with(&scoped_path(base))
}

/// File variant: additionally tolerates `base` carrying a trailing filename.
pub fn same_host_and_directory_file(base: &Url, check: &Url) -> bool {
    if same_host_and_directory_dir(base, check) {
        return true;
    }
    if base.host_str() != check.host_str() {
        return false;
    }
    let base_path = scoped_path(base);
    let base_dir = match base_path.rfind('/') {
        Some(idx) => &base_path[..=idx],
        None => return false,
    };
    scoped_path(check).starts_with(base_dir)
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d-%b-%Y %H:%M",
    "%Y-%b-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%A, %B %d, %Y %I:%M %p",
    "%d.%m.%Y %H:%M",
];

/// Best-effort parse of whatever timestamp format a listing renders.
pub fn parse_listing_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sort_query() {
        let url = Url::parse("http://h/p/?C=N;O=A").unwrap();
        assert_eq!(strip_sort_query(&url).as_str(), "http://h/p/");
        let url = Url::parse("http://h/p/?C=N&O=A").unwrap();
        assert_eq!(strip_sort_query(&url).as_str(), "http://h/p/");
        // not the sort pair: untouched
        let url = Url::parse("http://h/p/?dir=films").unwrap();
        assert_eq!(strip_sort_query(&url), url);
        let url = Url::parse("http://h/p/?C=N").unwrap();
        assert_eq!(strip_sort_query(&url), url);
    }

    #[test]
    fn test_strip_sort_query_idempotent() {
        let url = Url::parse("http://h/p/?C=M;O=D").unwrap();
        let once = strip_sort_query(&url);
        assert_eq!(strip_sort_query(&once), once);
    }

    #[test]
    fn test_replace_common_default_filenames() {
        assert_eq!(replace_common_default_filenames("/a/index.php"), "/a/");
        assert_eq!(replace_common_default_filenames("/a/index.shtml"), "/a/");
        assert_eq!(
            replace_common_default_filenames("/a/DirectoryList.asp"),
            "/a/"
        );
        // idempotent
        let once = replace_common_default_filenames("/a/index.php");
        assert_eq!(replace_common_default_filenames(&once), once);
    }

    #[test]
    fn test_same_host_and_directory() {
        let base = Url::parse("http://h/p/").unwrap();
        assert!(same_host_and_directory_dir(
            &base,
            &Url::parse("http://h/p/sub/").unwrap()
        ));
        assert!(!same_host_and_directory_dir(
            &base,
            &Url::parse("http://other/p/sub/").unwrap()
        ));
        assert!(!same_host_and_directory_dir(
            &base,
            &Url::parse("http://h/elsewhere/").unwrap()
        ));
        // default filename on either side compares equal
        assert!(same_host_and_directory_dir(
            &Url::parse("http://h/p/index.php").unwrap(),
            &Url::parse("http://h/p/sub/").unwrap()
        ));
    }

    #[test]
    fn test_same_host_and_directory_file() {
        let base = Url::parse("http://h/p/listing.html").unwrap();
        assert!(same_host_and_directory_file(
            &base,
            &Url::parse("http://h/p/a.txt").unwrap()
        ));
        assert!(!same_host_and_directory_file(
            &base,
            &Url::parse("http://h/q/a.txt").unwrap()
        ));
    }

    #[test]
    fn test_decoded_last_segment() {
        let url = Url::parse("http://h/films/The%20Thing/").unwrap();
        assert_eq!(decoded_last_segment(&url).unwrap(), "The Thing");
        let url = Url::parse("http://h/").unwrap();
        assert_eq!(decoded_last_segment(&url), None);
    }

    #[test]
    fn test_parse_listing_datetime() {
        assert!(parse_listing_datetime("2024-03-10 04:45:24").is_some());
        assert!(parse_listing_datetime("09-Oct-2015 16:12").is_some());
        assert!(parse_listing_datetime("1/5/2020 10:00 AM").is_some());
        assert!(parse_listing_datetime("not a date").is_none());
    }
}
