use std::fmt;

use anyhow::Result;
use percent_encoding::percent_decode_str;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::listing::{Dialect, DirArena, DirId, Listing};
use crate::remote::{self, RemoteGate, RemoteRegistry};
use crate::sanitize;
use crate::session::Session;

pub mod custom_div;
pub mod directory_lister;
pub mod directory_listing;
pub mod h5ai;
pub mod hfs;
pub mod ipfs;
pub mod javascript;
pub mod lists;
pub mod material;
pub mod model01;
pub mod pre;
pub mod pure;
pub mod snif;
pub mod tables;

/// Expected structured refusal (e.g. a breadcrumb that contradicts the
/// URL). Logged at info, still flips the directory to `error`.
#[derive(Debug)]
pub struct FriendlyError(pub String);

impl fmt::Display for FriendlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FriendlyError {}

/// The caller asked to stop. Passes through the error envelope untouched.
#[derive(Debug)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cancelled")
    }
}

impl std::error::Error for Cancelled {}

pub struct ParseContext<'a> {
    pub client: Option<&'a Client>,
    pub session: &'a Session,
    pub check_parents: bool,
}

impl ParseContext<'_> {
    pub fn checkpoint(&self) -> Result<()> {
        if self.session.is_cancelled() {
            Err(Cancelled.into())
        } else {
            Ok(())
        }
    }
}

/// One listing dialect. `extract` returns `Ok(None)` when the page does not
/// have this shape; errors abort the whole parse.
pub trait DialectParser: Sync {
    fn dialect(&self) -> Dialect;
    fn extract(&self, doc: &Html, base: &Url, ctx: &ParseContext) -> Result<Option<Listing>>;
}

pub struct HtmlParser {
    probes: Vec<Box<dyn DialectParser>>,
    ipfs: ipfs::IpfsParser,
    model01: model01::Model01Parser,
    gate: RemoteGate,
    registry: RemoteRegistry,
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new(RemoteRegistry::default())
    }
}

impl HtmlParser {
    pub fn new(registry: RemoteRegistry) -> Self {
        // Order is load-bearing: earlier probes pre-empt later ones.
        let probes: Vec<Box<dyn DialectParser>> = vec![
            Box::<directory_listing::DirectoryListingComParser>::default(),
            Box::<h5ai::H5aiParser>::default(),
            Box::<snif::SnifParser>::default(),
            Box::<pure::PureGodirParser>::default(),
            Box::<custom_div::CustomDiv1Parser>::default(),
            Box::<custom_div::CustomDiv2Parser>::default(),
            Box::<hfs::HfsParser>::default(),
            Box::<pre::PreFormattedParser>::default(),
            Box::<javascript::JavaScriptDrawnParser>::default(),
            Box::<lists::RootUlParser>::default(),
            Box::<tables::TablesParser>::default(),
            Box::<material::MaterialListParser>::default(),
            Box::<directory_lister::DirectoryListerParser>::default(),
            Box::<lists::ListGroupParser>::default(),
            Box::<lists::GenericUlParser>::default(),
            Box::<lists::AnchorOnlyParser>::default(),
        ];
        Self {
            probes,
            ipfs: ipfs::IpfsParser::default(),
            model01: model01::Model01Parser::default(),
            gate: RemoteGate::default(),
            registry,
        }
    }

    /// Core entry point: parse one page of HTML into the directory node
    /// `dir`. Parse failures land on the node as `error=true`; the only
    /// `Err` this returns is cancellation.
    pub fn parse_html(
        &self,
        arena: &mut DirArena,
        dir: DirId,
        html: &str,
        ctx: &ParseContext,
    ) -> Result<()> {
        let base = arena.get(dir).url.clone();
        let doc = Html::parse_document(html);
        match self.dispatch(&doc, &base, ctx) {
            Ok((dialect, mut listing)) => {
                let symlinked = sanitize::sanitize(arena, dir, &mut listing, ctx.check_parents);
                let node = arena.get_mut(dir);
                node.dialect = dialect;
                node.parsed = true;
                if symlinked {
                    warn!("{} mirrors an ancestor, dropping as symlink loop", base);
                    node.error = true;
                    return Ok(());
                }
                node.header_count = listing.header_count;
                node.description = listing.description.take();
                node.files = listing.files;
                for sub in listing.subdirs {
                    let id = arena.alloc(sub.url, Some(dir));
                    let child = arena.get_mut(id);
                    if !sub.name.is_empty() {
                        child.name = sub.name;
                    }
                    child.description = sub.description;
                    arena.get_mut(dir).subdirs.push(id);
                }
                Ok(())
            }
            Err(e) => {
                if e.downcast_ref::<Cancelled>().is_some() {
                    return Err(e);
                }
                if let Some(friendly) = e.downcast_ref::<FriendlyError>() {
                    info!("Refusing {}: {}", base, friendly);
                } else {
                    warn!("Failed to parse {}: {:?}", base, e);
                }
                let node = arena.get_mut(dir);
                node.parsed = false;
                node.error = true;
                node.subdirs.clear();
                node.files.clear();
                Ok(())
            }
        }
    }

    fn dispatch(
        &self,
        doc: &Html,
        base: &Url,
        ctx: &ParseContext,
    ) -> Result<(Option<Dialect>, Listing)> {
        ctx.checkpoint()?;

        // host-keyed backends come before any structural probing
        if let Some(dialect) = remote::host_dialect(base) {
            if dialect == Dialect::Ipfs {
                if let Some(listing) = self.ipfs.extract(doc, base, ctx)? {
                    return Ok((Some(Dialect::Ipfs), listing));
                }
            } else {
                let listing = self.delegate(dialect, base, ctx)?;
                return Ok((Some(dialect), listing));
            }
        }

        // script-keyed backends (Google-Drive-index family)
        if let Some(client) = ctx.client {
            if let Some(dialect) = self.gate.scan_scripts(doc, base, client) {
                if remote::is_google_drive_dialect(dialect) {
                    // these frontends throttle hard; serialize the crawl
                    ctx.session.clamp_threads(1);
                }
                let listing = self.delegate(dialect, base, ctx)?;
                return Ok((Some(dialect), listing));
            }
        }

        let mut chosen: Option<(Dialect, Listing)> = None;
        for probe in &self.probes {
            ctx.checkpoint()?;
            if let Some(listing) = probe.extract(doc, base, ctx)? {
                if !listing.is_empty() {
                    debug!("{} matched {}", base, probe.dialect());
                    chosen = Some((probe.dialect(), listing));
                    break;
                }
            }
        }

        // a JSON-backed page may carry a decoy static listing; the model
        // index wins whenever it is present
        if let Some(listing) = self.model01.extract(doc, base, ctx)? {
            if !listing.is_empty() {
                chosen = Some((Dialect::Model01, listing));
            }
        }

        match chosen {
            Some((dialect, listing)) => Ok((Some(dialect), listing)),
            None => {
                let noscript = Selector::parse("noscript").unwrap();
                if doc.select(&noscript).next().is_some() {
                    debug!("{}: no entries and a <noscript> block, probably a JavaScript challenge", base);
                }
                Ok((None, Listing::default()))
            }
        }
    }

    fn delegate(&self, dialect: Dialect, base: &Url, ctx: &ParseContext) -> Result<Listing> {
        ctx.checkpoint()?;
        let backend = self
            .registry
            .get(dialect)
            .ok_or_else(|| FriendlyError(format!("no {} backend registered", dialect)))?;
        let client = ctx
            .client
            .ok_or_else(|| FriendlyError(format!("{} needs an HTTP client", dialect)))?;
        backend.extract(client, base)
    }
}

// Shared helpers for the dialect extractors.

pub(crate) fn get_real_name_from_href(href: &str) -> String {
    let path = href.split(['?', '#']).next().unwrap_or("");
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

pub(crate) fn element_class_contains(el: &ElementRef, needle: &str) -> bool {
    el.value()
        .attr("class")
        .map(|c| c.to_lowercase().contains(needle))
        .unwrap_or(false)
}

pub(crate) fn element_has_class(el: &ElementRef, class: &str) -> bool {
    el.value()
        .attr("class")
        .map(|c| c.split_whitespace().any(|x| x.eq_ignore_ascii_case(class)))
        .unwrap_or(false)
}

pub(crate) fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k.as_ref() == key)
        .map(|(_, v)| v.into_owned())
}

/// True for elements living inside chrome we never index: navigation bars,
/// sidebars, breadcrumbs.
pub(crate) fn in_noise(el: &ElementRef) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
        let value = ancestor.value();
        value.name() == "nav"
            || value.id() == Some("sidebar")
            || element_has_class(&ancestor, "breadcrumb")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{FileEntry, FileSize};
    use crate::remote::RemoteBackend;

    fn ctx<'a>(session: &'a Session) -> ParseContext<'a> {
        ParseContext {
            client: None,
            session,
            check_parents: true,
        }
    }

    #[test]
    fn test_get_real_name_from_href() {
        assert_eq!(get_real_name_from_href("a/b%20c/"), "b c");
        assert_eq!(get_real_name_from_href("./movie.mkv?x=1"), "movie.mkv");
        assert_eq!(get_real_name_from_href("sub/"), "sub");
    }

    #[test]
    fn test_empty_page_yields_no_dialect() {
        let session = Session::default();
        let parser = HtmlParser::default();
        let mut arena = DirArena::new();
        let dir = arena.alloc(Url::parse("http://h/p/").unwrap(), None);
        parser
            .parse_html(&mut arena, dir, "<html><body></body></html>", &ctx(&session))
            .unwrap();
        let node = arena.get(dir);
        assert!(node.parsed);
        assert!(!node.error);
        assert!(node.subdirs.is_empty());
        assert!(node.files.is_empty());
        assert_eq!(node.dialect, None);
    }

    #[test]
    fn test_dispatcher_order_specific_beats_generic() {
        // an h5ai page also contains plain anchors; the earlier probe wins
        let html = r#"<html><body>
            <div id="fallback"><table>
              <tr><th>Name</th><th>Date</th><th>Size</th></tr>
              <tr><td><a href="sub/">sub</a></td><td>2024-01-01 10:00</td><td>-</td></tr>
              <tr><td><a href="a.txt">a.txt</a></td><td>2024-01-01 10:00</td><td>12K</td></tr>
            </table></div>
        </body></html>"#;
        let session = Session::default();
        let parser = HtmlParser::default();
        let mut arena = DirArena::new();
        let dir = arena.alloc(Url::parse("http://h/p/").unwrap(), None);
        parser.parse_html(&mut arena, dir, html, &ctx(&session)).unwrap();
        assert_eq!(arena.get(dir).dialect, Some(Dialect::H5ai));
    }

    struct StubDrive;

    impl RemoteBackend for StubDrive {
        fn extract(&self, _client: &Client, url: &Url) -> Result<Listing> {
            let mut listing = Listing::default();
            listing.push_file(FileEntry::new(
                url.join("drive-file.bin").unwrap(),
                "drive-file.bin".to_string(),
                Some(FileSize::Precise(1)),
            ));
            Ok(listing)
        }
    }

    #[test]
    fn test_google_drive_script_clamps_threads() {
        let html = r#"<html><head><script src="bhadoo.js"></script></head><body></body></html>"#;
        let session = Session::new(8);
        let client = Client::new();
        let mut registry = RemoteRegistry::default();
        registry.register(Dialect::BhadooIndex, Box::new(StubDrive));
        let parser = HtmlParser::new(registry);
        let mut arena = DirArena::new();
        let dir = arena.alloc(Url::parse("http://h/p/").unwrap(), None);
        let ctx = ParseContext {
            client: Some(&client),
            session: &session,
            check_parents: true,
        };
        parser.parse_html(&mut arena, dir, html, &ctx).unwrap();
        let node = arena.get(dir);
        assert_eq!(node.dialect, Some(Dialect::BhadooIndex));
        assert!(!node.error);
        assert_eq!(node.files.len(), 1);
        assert_eq!(session.max_threads(), 1);
    }

    #[test]
    fn test_unregistered_backend_is_friendly_error() {
        let html = r#"<html><head><script src="goindex.js"></script></head><body></body></html>"#;
        let session = Session::new(4);
        let client = Client::new();
        let parser = HtmlParser::default();
        let mut arena = DirArena::new();
        let dir = arena.alloc(Url::parse("http://h/p/").unwrap(), None);
        let ctx = ParseContext {
            client: Some(&client),
            session: &session,
            check_parents: true,
        };
        parser.parse_html(&mut arena, dir, html, &ctx).unwrap();
        let node = arena.get(dir);
        assert!(node.error);
        assert!(node.files.is_empty() && node.subdirs.is_empty());
        // the clamp still happened before delegation failed
        assert_eq!(session.max_threads(), 1);
    }

    #[test]
    fn test_apache_table_end_to_end() {
        let html = r#"<html><body><table>
            <tr><th><img alt="[ICO]"></th><th>Name</th><th>Last modified</th><th>Size</th></tr>
            <tr><td><img alt="[PARENTDIR]"></td><td><a href="/">Parent Directory</a></td><td></td><td>-</td></tr>
            <tr><td><img alt="[DIR]"></td><td><a href="sub/">sub/</a></td><td>2020-01-01 10:00</td><td>-</td></tr>
            <tr><td><img alt="[   ]"></td><td><a href="a.txt">a.txt</a></td><td>2020-01-01 10:00</td><td>12K</td></tr>
            <tr><td><img alt="[   ]"></td><td><a href="http://mirror.example/a.txt">off-host</a></td><td></td><td>1K</td></tr>
        </table></body></html>"#;
        let session = Session::default();
        let parser = HtmlParser::default();
        let mut arena = DirArena::new();
        let dir = arena.alloc(Url::parse("http://h/p/").unwrap(), None);
        parser.parse_html(&mut arena, dir, html, &ctx(&session)).unwrap();
        let node = arena.get(dir);
        assert_eq!(node.dialect, Some(Dialect::Tables));
        assert!(!node.error);
        assert_eq!(node.subdirs.len(), 1);
        let sub = arena.get(node.subdirs[0]);
        assert_eq!(sub.url.as_str(), "http://h/p/sub/");
        assert_eq!(sub.name, "sub");
        assert_eq!(sub.parent, Some(dir));
        let node = arena.get(dir);
        assert_eq!(node.files.len(), 1);
        assert_eq!(node.files[0].url.as_str(), "http://h/p/a.txt");
        assert_eq!(node.files[0].name, "a.txt");
        assert_eq!(node.files[0].size.unwrap().get_estimated(), 12288);
    }

    #[test]
    fn test_symlink_loop_end_to_end() {
        let html = "<pre><a href=\"b/\">b/</a>\n<a href=\"x.txt\">x.txt</a> 10</pre>";
        let session = Session::default();
        let parser = HtmlParser::default();
        let mut arena = DirArena::new();
        let root = arena.alloc(Url::parse("http://h/a/").unwrap(), None);
        parser.parse_html(&mut arena, root, html, &ctx(&session)).unwrap();
        assert_eq!(arena.get(root).subdirs.len(), 1);
        let child = arena.get(root).subdirs[0];

        // the child serves the exact same listing: a filesystem cycle
        parser.parse_html(&mut arena, child, html, &ctx(&session)).unwrap();
        let node = arena.get(child);
        assert!(node.error);
        assert!(node.subdirs.is_empty());
        assert!(node.files.is_empty());
    }

    #[test]
    fn test_cancellation_surfaces() {
        let session = Session::default();
        session.cancel();
        let parser = HtmlParser::default();
        let mut arena = DirArena::new();
        let dir = arena.alloc(Url::parse("http://h/p/").unwrap(), None);
        let err = parser
            .parse_html(&mut arena, dir, "<html></html>", &ctx(&session))
            .unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }
}
