use std::str::FromStr;

use regex::Regex;

/// A user-supplied path pattern, parsed straight from the command line.
#[derive(Debug, Clone)]
pub struct PathRegex {
    inner: Regex,
}

impl FromStr for PathRegex {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            inner: Regex::new(s)?,
        })
    }
}

impl PathRegex {
    pub fn is_match(&self, text: &str) -> bool {
        self.inner.is_match(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    Stop,
    Ok,
}

/// Decides whether a relative path should be crawled. Inclusions win over
/// exclusions.
#[derive(Debug, Clone, Default)]
pub struct ExclusionManager {
    exclude_regexes: Vec<PathRegex>,
    include_regexes: Vec<PathRegex>,
}

impl ExclusionManager {
    pub fn new(exclusions: Vec<PathRegex>, inclusions: Vec<PathRegex>) -> Self {
        Self {
            exclude_regexes: exclusions,
            include_regexes: inclusions,
        }
    }

    pub fn match_str(&self, text: &str) -> Comparison {
        for regex in &self.include_regexes {
            if regex.is_match(text) {
                return Comparison::Ok;
            }
        }
        for regex in &self.exclude_regexes {
            if regex.is_match(text) {
                return Comparison::Stop;
            }
        }
        Comparison::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion() {
        let exclusions = vec![PathRegex::from_str("iso/archive").unwrap()];
        let manager = ExclusionManager::new(exclusions, vec![]);
        assert_eq!(manager.match_str("iso/archive/2013"), Comparison::Stop);
        assert_eq!(manager.match_str("iso/current"), Comparison::Ok);
    }

    #[test]
    fn test_inclusion_wins() {
        let exclusions = vec![PathRegex::from_str("^iso").unwrap()];
        let inclusions = vec![PathRegex::from_str("^iso/keep").unwrap()];
        let manager = ExclusionManager::new(exclusions, inclusions);
        assert_eq!(manager.match_str("iso/keep/x"), Comparison::Ok);
        assert_eq!(manager.match_str("iso/drop"), Comparison::Stop);
    }
}
