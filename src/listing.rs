// Data model for parsed directory listings

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use url::Url;

use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    B,
    K,
    M,
    G,
    T,
    P,
}

impl SizeUnit {
    pub fn get_exp(&self) -> u32 {
        match self {
            Self::B => 0,
            Self::K => 1,
            Self::M => 2,
            Self::G => 3,
            Self::T => 4,
            Self::P => 5,
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'B' => Some(Self::B),
            'K' => Some(Self::K),
            'M' => Some(Self::M),
            'G' => Some(Self::G),
            'T' => Some(Self::T),
            'P' => Some(Self::P),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileSize {
    Precise(u64),
    HumanizedBinary(f64, SizeUnit),
    HumanizedDecimal(f64, SizeUnit),
}

impl FileSize {
    /// Split a humanized size like "1.2 GB" or "262.1K" into number and unit.
    pub fn get_humanized(s: &str) -> (f64, SizeUnit) {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_alphabetic())
            .unwrap_or(s.len());
        let (num, unit) = s.split_at(split);
        let num: f64 = num.trim().replace(',', "").parse().unwrap_or(0.0);
        let unit = unit
            .trim()
            .chars()
            .next()
            .and_then(SizeUnit::from_prefix)
            .unwrap_or(SizeUnit::B);
        (num, unit)
    }

    pub fn get_estimated(&self) -> u64 {
        match self {
            Self::Precise(size) => *size,
            Self::HumanizedBinary(size, unit) => {
                (size * 1024_f64.powi(unit.get_exp() as i32)) as u64
            }
            Self::HumanizedDecimal(size, unit) => {
                (size * 1000_f64.powi(unit.get_exp() as i32)) as u64
            }
        }
    }

    /// Parse free text into a size. Returns `None` for anything that is not
    /// a usable size: "-", "—", "<Directory>", "0.00b", negative counts
    /// (4-GiB wrap artifacts) and plain garbage.
    pub fn parse(text: &str) -> Option<FileSize> {
        let text = text.trim().replace('\u{a0}', " ");
        let text = text.trim();
        if text.is_empty() || text == "-" || text == "—" || text == "&mdash;" {
            return None;
        }
        if text.eq_ignore_ascii_case("<directory>") || text.eq_ignore_ascii_case("&lt;directory&gt;")
        {
            return None;
        }
        if text.eq_ignore_ascii_case("0.00b") {
            return None;
        }
        if text.starts_with('-') {
            return None;
        }
        let cleaned = text.replace(',', "");
        if cleaned.chars().all(|c| c.is_ascii_digit()) {
            return cleaned.parse().ok().map(FileSize::Precise);
        }
        // humanized form: needs a leading number and a known unit letter
        let split = cleaned.find(|c: char| c.is_alphabetic() || c == ' ')?;
        let (num, unit) = cleaned.split_at(split);
        let num: f64 = num.parse().ok()?;
        let unit = unit.trim();
        let first = unit.chars().next()?;
        let unit_kind = SizeUnit::from_prefix(first)?;
        // "kB"/"MB" style strings are reported with decimal multipliers by a
        // few indexers, but every dialect we meet in the wild rounds from
        // binary counts; bare letters and "KiB" are binary for sure.
        if unit.len() > 1 && !unit.contains('i') && unit.ends_with('B') && first.is_lowercase() {
            Some(FileSize::HumanizedDecimal(num, unit_kind))
        } else {
            Some(FileSize::HumanizedBinary(num, unit_kind))
        }
    }
}

impl fmt::Display for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            humansize::format_size(self.get_estimated(), humansize::BINARY)
        )
    }
}

/// Identifier of the extractor that produced a directory (diagnostics only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Tables,
    PreFormatted,
    H5ai,
    Snif,
    PureGodir,
    DirectoryListingCom,
    CustomDiv1,
    CustomDiv2,
    Hfs,
    JavaScriptDrawn,
    MaterialList,
    DirectoryLister,
    ListGroup,
    RootUl,
    GenericUl,
    AnchorOnly,
    Ipfs,
    Model01,
    BhadooIndex,
    GoIndex,
    Go2Index,
    GdIndex,
    Blitzfiles,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::PreFormatted => "pre",
            Self::H5ai => "h5ai",
            Self::Snif => "snif",
            Self::PureGodir => "pure-godir",
            Self::DirectoryListingCom => "directorylisting.com",
            Self::CustomDiv1 => "custom-div-1",
            Self::CustomDiv2 => "custom-div-2",
            Self::Hfs => "hfs",
            Self::JavaScriptDrawn => "javascript-drawn",
            Self::MaterialList => "material-list",
            Self::DirectoryLister => "directory-lister",
            Self::ListGroup => "list-group",
            Self::RootUl => "root-ul",
            Self::GenericUl => "generic-ul",
            Self::AnchorOnly => "anchor-only",
            Self::Ipfs => "ipfs",
            Self::Model01 => "model-01",
            Self::BhadooIndex => "bhadoo-index",
            Self::GoIndex => "goindex",
            Self::Go2Index => "go2index",
            Self::GdIndex => "gdindex",
            Self::Blitzfiles => "blitzfiles",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub url: Url,
    pub name: String,
    pub size: Option<FileSize>,
    pub mtime: Option<NaiveDateTime>,
    pub description: Option<String>,
}

impl FileEntry {
    pub fn new(url: Url, name: String, size: Option<FileSize>) -> Self {
        Self {
            url,
            name,
            size,
            mtime: None,
            description: None,
        }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.name)?;
        match self.size {
            Some(size) => write!(f, "{} ", size)?,
            None => write!(f, "? ")?,
        }
        write!(f, "{}", self.url)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubdirEntry {
    pub url: Url,
    pub name: String,
    pub description: Option<String>,
}

impl SubdirEntry {
    pub fn new(url: Url, name: String) -> Self {
        Self {
            url,
            name,
            description: None,
        }
    }
}

impl fmt::Display for SubdirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ {}", self.name, self.url)
    }
}

/// The pure result of parsing one page, before sanitization.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub subdirs: Vec<SubdirEntry>,
    pub files: Vec<FileEntry>,
    pub description: Option<String>,
    pub header_count: usize,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.subdirs.is_empty() && self.files.is_empty()
    }

    pub fn push_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    pub fn push_subdir(&mut self, entry: SubdirEntry) {
        self.subdirs.push(entry);
    }
}

/// Index into the arena `Vec<DirNode>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirId(pub u32);

impl DirId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One directory of the crawl tree. `parent` is a non-owning arena index so
/// ancestor walks (symlink detection) never form ownership cycles.
#[derive(Debug)]
pub struct DirNode {
    pub url: Url,
    pub name: String,
    pub parent: Option<DirId>,
    pub subdirs: Vec<DirId>,
    pub files: Vec<FileEntry>,
    pub description: Option<String>,
    pub dialect: Option<Dialect>,
    pub parsed: bool,
    pub error: bool,
    pub header_count: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub finished: bool,
}

/// Flat arena holding every directory discovered during a crawl.
#[derive(Debug, Default)]
pub struct DirArena {
    nodes: Vec<DirNode>,
}

impl DirArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, mut url: Url, parent: Option<DirId>) -> DirId {
        utils::ensure_trailing_slash(&mut url);
        let name = utils::decoded_last_segment(&url).unwrap_or_else(|| "ROOT".to_string());
        let id = DirId(self.nodes.len() as u32);
        self.nodes.push(DirNode {
            url,
            name,
            parent,
            subdirs: Vec::new(),
            files: Vec::new(),
            description: None,
            dialect: None,
            parsed: false,
            error: false,
            header_count: 0,
            start_time: None,
            finish_time: None,
            finished: false,
        });
        id
    }

    pub fn get(&self, id: DirId) -> &DirNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: DirId) -> &mut DirNode {
        &mut self.nodes[id.index()]
    }

    /// Parent chain of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: DirId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: self.get(id).parent,
        }
    }
}

pub struct Ancestors<'a> {
    arena: &'a DirArena,
    next: Option<DirId>,
}

impl Iterator for Ancestors<'_> {
    type Item = DirId;

    fn next(&mut self) -> Option<DirId> {
        let current = self.next?;
        self.next = self.arena.get(current).parent;
        Some(current)
    }
}
