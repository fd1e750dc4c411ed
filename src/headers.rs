// Assign each table column a semantic role from its header cell, falling
// back to a data-row scan when the headers say nothing.

use std::collections::BTreeMap;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::listing::FileSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnKind {
    Unknown,
    FileName,
    FileSize,
    Modified,
    Description,
    Type,
}

#[derive(Debug, Clone)]
pub struct HeaderInfo {
    pub header: String,
    pub kind: ColumnKind,
}

/// Mapping from 1-based column index to its semantic role.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    columns: BTreeMap<usize, HeaderInfo>,
    pub remove_first_row: bool,
}

impl ColumnMap {
    pub fn insert(&mut self, index: usize, info: HeaderInfo) {
        self.columns.insert(index, info);
    }

    pub fn column_of(&self, kind: ColumnKind) -> Option<usize> {
        self.columns
            .iter()
            .find(|(_, info)| info.kind == kind)
            .map(|(idx, _)| *idx)
    }

    pub fn info_of(&self, index: usize) -> Option<&HeaderInfo> {
        self.columns.get(&index)
    }

    pub fn kind_of(&self, index: usize) -> ColumnKind {
        self.columns
            .get(&index)
            .map(|info| info.kind)
            .unwrap_or(ColumnKind::Unknown)
    }

    /// Number of columns that classified to something.
    pub fn named_count(&self) -> usize {
        self.columns
            .values()
            .filter(|info| info.kind != ColumnKind::Unknown)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Match {
    Exact,
    Contains,
}

// Keyword table, first match wins. FileName keywords sit last so that
// "file size" never classifies as a name column. Data, not code: new
// locales are rows here.
const HEADER_KEYWORDS: &[(&str, Match, ColumnKind)] = &[
    ("lastmodified", Match::Exact, ColumnKind::Modified),
    ("modified", Match::Exact, ColumnKind::Modified),
    ("lastmodification", Match::Exact, ColumnKind::Modified),
    ("date", Match::Contains, ColumnKind::Modified),
    ("time", Match::Contains, ColumnKind::Modified),
    ("修改时间", Match::Contains, ColumnKind::Modified),
    ("修改日期", Match::Contains, ColumnKind::Modified),
    ("最終更新", Match::Contains, ColumnKind::Modified),
    ("type", Match::Exact, ColumnKind::Type),
    ("size", Match::Contains, ColumnKind::FileSize),
    ("taille", Match::Contains, ColumnKind::FileSize),
    ("大小", Match::Contains, ColumnKind::FileSize),
    ("サイズ", Match::Contains, ColumnKind::FileSize),
    ("description", Match::Exact, ColumnKind::Description),
    ("file", Match::Exact, ColumnKind::FileName),
    ("name", Match::Exact, ColumnKind::FileName),
    ("filename", Match::Exact, ColumnKind::FileName),
    ("directory", Match::Exact, ColumnKind::FileName),
    ("link", Match::Contains, ColumnKind::FileName),
    ("nom", Match::Contains, ColumnKind::FileName),
    ("文件", Match::Contains, ColumnKind::FileName),
    ("ファイル名", Match::Contains, ColumnKind::FileName),
];

/// Lowercase and strip everything that is not a letter or digit, so that
/// "Last modified" and "last_modified" share one token.
fn header_token(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

pub fn classify_token(token: &str) -> ColumnKind {
    if token.is_empty() {
        return ColumnKind::Unknown;
    }
    for (keyword, mode, kind) in HEADER_KEYWORDS {
        let hit = match mode {
            Match::Exact => token == *keyword,
            Match::Contains => token.contains(keyword),
        };
        if hit {
            return *kind;
        }
    }
    ColumnKind::Unknown
}

#[derive(Debug, Clone)]
pub struct HeaderClassifier {
    dateish: Regex,
}

impl Default for HeaderClassifier {
    fn default() -> Self {
        Self {
            dateish: Regex::new(
                r"\d{4}-\d{2}-\d{2}|\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}|\d{1,2}-\w{3}-\d{4}|\d{1,2}:\d{2}",
            )
            .unwrap(),
        }
    }
}

impl HeaderClassifier {
    /// Locate the header row of `table` and classify its cells. Cascades
    /// through the known header shapes; when none is found the map is empty
    /// and callers should try [`HeaderClassifier::heuristic`].
    pub fn classify(&self, table: ElementRef) -> ColumnMap {
        let tr = Selector::parse("tr").unwrap();
        let th = Selector::parse("th").unwrap();
        let td = Selector::parse("td").unwrap();
        let any_cell = Selector::parse("th, td").unwrap();

        // a row that owns <th> cells, unless its first cell spans columns
        // (a title bar, not a header)
        for row in table.select(&tr) {
            let ths: Vec<_> = row.select(&th).collect();
            if ths.is_empty() {
                continue;
            }
            if ths[0].value().attr("colspan").is_some() {
                break;
            }
            return map_from_cells(&ths, false);
        }

        // Snif renders its header as td cells on a .snHeading row
        let sn_heading = Selector::parse("tr.snHeading td, tr.snHeading th").unwrap();
        let cells: Vec<_> = table.select(&sn_heading).collect();
        if !cells.is_empty() {
            return map_from_cells(&cells, false);
        }

        let thead_cells = Selector::parse("thead td, thead th").unwrap();
        let cells: Vec<_> = table.select(&thead_cells).collect();
        if !cells.is_empty() {
            return map_from_cells(&cells, false);
        }

        if let Some(first_row) = table.select(&tr).next() {
            let cells: Vec<_> = first_row.select(&any_cell).collect();
            if cells.iter().any(|c| c.value().name() == "th") {
                return map_from_cells(&cells, false);
            }
            let cells: Vec<_> = first_row.select(&td).collect();
            if !cells.is_empty() {
                return map_from_cells(&cells, true);
            }
        }

        ColumnMap::default()
    }

    /// Fallback when every header classified as Unknown: scan the data rows
    /// and vote per column on what its cells look like.
    pub fn heuristic(&self, table: ElementRef) -> ColumnMap {
        let tr = Selector::parse("tr").unwrap();
        let td = Selector::parse("td").unwrap();
        let a = Selector::parse("a").unwrap();
        let img = Selector::parse("img").unwrap();

        // (sum of 1-based indices, occurrences) per role
        let mut votes: BTreeMap<ColumnKind, (usize, usize)> = BTreeMap::new();
        let mut vote = |kind: ColumnKind, index: usize| {
            let entry = votes.entry(kind).or_insert((0, 0));
            entry.0 += index;
            entry.1 += 1;
        };

        let mut max_columns = 0;
        for row in table.select(&tr) {
            let cells: Vec<_> = row.select(&td).collect();
            max_columns = max_columns.max(cells.len());
            for (idx, cell) in cells.iter().enumerate() {
                let index = idx + 1;
                let text: String = cell.text().collect();
                let text = text.trim();
                if cell.select(&a).next().is_some() {
                    vote(ColumnKind::FileName, index);
                }
                if cell.select(&img).next().is_some() {
                    vote(ColumnKind::Type, index);
                }
                if self.dateish.is_match(text) && crate::utils::parse_listing_datetime(text).is_some()
                {
                    vote(ColumnKind::Modified, index);
                }
                if let Some(size) = FileSize::parse(text) {
                    if size.get_estimated() > 0 {
                        vote(ColumnKind::FileSize, index);
                    }
                }
            }
        }

        let mut map = ColumnMap::default();
        for (kind, (sum, count)) in votes {
            if count == 0 {
                continue;
            }
            let avg = ((sum as f64 / count as f64).round()) as usize;
            if avg >= 1 && avg <= max_columns && map.kind_of(avg) == ColumnKind::Unknown {
                map.insert(
                    avg,
                    HeaderInfo {
                        header: String::new(),
                        kind,
                    },
                );
            }
        }
        map
    }
}

fn map_from_cells(cells: &[ElementRef], remove_first_row: bool) -> ColumnMap {
    let mut map = ColumnMap {
        remove_first_row,
        ..Default::default()
    };
    let mut index = 1;
    for cell in cells {
        let text: String = cell.text().collect();
        let token = header_token(&text);
        map.insert(
            index,
            HeaderInfo {
                header: text.trim().to_string(),
                kind: classify_token(&token),
            },
        );
        // colspan advances the column counter
        let span: usize = cell
            .value()
            .attr("colspan")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        index += span.max(1);
    }
    map
}
