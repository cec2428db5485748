//! Issuer directory with ranked matching.

use std::collections::HashMap;
use yuho_data::Issuer;
use yuho_data::edinet::CodeList;
use yuho_data::text::{fold, normalize_name};

/// How a candidate matched a mention, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    /// The mention is the filer code
    FilerCode,
    /// The mention is the 4-digit securities code
    SecuritiesCode,
    /// The mention equals the registered name or an alias
    ExactName,
    /// The mention is contained in the registered name
    NameContains,
    /// The mention is contained in an alias
    AliasContains,
}

/// A directory hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Matched issuer
    pub issuer: Issuer,
    /// Strength of the match
    pub kind: MatchKind,
}

#[derive(Debug, Clone)]
struct Entry {
    issuer: Issuer,
    name: String,
    aliases: Vec<String>,
}

impl Entry {
    fn new(issuer: Issuer) -> Self {
        let name = normalize_name(&issuer.canonical_name);
        let aliases = issuer
            .name_aliases
            .iter()
            .map(|a| normalize_name(a))
            .filter(|a| !a.is_empty())
            .collect();
        Self {
            issuer,
            name,
            aliases,
        }
    }
}

/// Read-only issuer directory.
///
/// Built once at start-up and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct EntityDirectory {
    entries: Vec<Entry>,
    by_filer: HashMap<String, usize>,
    by_securities: HashMap<String, Vec<usize>>,
}

impl EntityDirectory {
    /// Build a directory from issuers. Later duplicates of a filer code are
    /// dropped.
    pub fn new(issuers: impl IntoIterator<Item = Issuer>) -> Self {
        let mut directory = Self::default();
        for issuer in issuers {
            if directory.by_filer.contains_key(&issuer.filer_code) {
                log::debug!("Duplicate filer code {} ignored", issuer.filer_code);
                continue;
            }
            directory.push(issuer);
        }
        directory
    }

    fn push(&mut self, issuer: Issuer) {
        let idx = self.entries.len();
        self.by_filer.insert(issuer.filer_code.clone(), idx);
        if let Some(code) = &issuer.securities_code {
            self.by_securities.entry(code.clone()).or_default().push(idx);
        }
        self.entries.push(Entry::new(issuer));
    }

    /// Build a directory from the raw EDINET code list.
    pub fn from_code_list_csv(raw: &[u8]) -> yuho_data::Result<Self> {
        Ok(Self::from(CodeList::parse(raw)?))
    }

    /// Add alias overrides to an issuer. Unknown filer codes are ignored.
    pub fn with_aliases<I, S>(mut self, filer_code: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(&idx) = self.by_filer.get(filer_code) {
            let mut issuer = self.entries[idx].issuer.clone();
            for alias in aliases {
                issuer = issuer.with_alias(alias);
            }
            self.entries[idx] = Entry::new(issuer);
        } else {
            log::warn!("Alias override for unknown filer code {}", filer_code);
        }
        self
    }

    /// Issuer registered under `filer_code`.
    pub fn get(&self, filer_code: &str) -> Option<&Issuer> {
        self.by_filer
            .get(filer_code)
            .map(|&idx| &self.entries[idx].issuer)
    }

    /// Number of issuers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Issuers matching `mention`, strongest first.
    pub fn resolve(&self, mention: &str) -> Vec<Issuer> {
        self.rank(mention).into_iter().map(|c| c.issuer).collect()
    }

    /// Ranked candidates for `mention`.
    ///
    /// A filer code or securities code settles the match outright; otherwise
    /// exact name and alias hits win over partial ones, and partial hits on
    /// the registered name rank above partial hits on an alias. Ties are
    /// broken by registered name, then filer code.
    pub fn rank(&self, mention: &str) -> Vec<Candidate> {
        let folded = fold(mention);
        if folded.is_empty() {
            return Vec::new();
        }

        let upper = folded.to_ascii_uppercase();
        if is_filer_code(&upper) {
            let issuer = self
                .get(&upper)
                .cloned()
                .unwrap_or_else(|| Issuer::code_only(upper.clone()));
            return vec![Candidate {
                issuer,
                kind: MatchKind::FilerCode,
            }];
        }

        if is_securities_code(&folded) {
            let hits = self
                .by_securities
                .get(&folded)
                .map(|idxs| idxs.iter().map(|&i| (i, MatchKind::SecuritiesCode)).collect())
                .unwrap_or_default();
            return self.sorted(hits);
        }

        let needle = normalize_name(mention);
        if needle.is_empty() {
            return Vec::new();
        }

        let exact: Vec<(usize, MatchKind)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.name == needle || e.aliases.iter().any(|a| *a == needle))
            .map(|(i, _)| (i, MatchKind::ExactName))
            .collect();
        if !exact.is_empty() {
            return self.sorted(exact);
        }

        let partial = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| {
                if e.name.contains(&needle) {
                    Some((i, MatchKind::NameContains))
                } else if e.aliases.iter().any(|a| a.contains(&needle)) {
                    Some((i, MatchKind::AliasContains))
                } else {
                    None
                }
            })
            .collect();
        self.sorted(partial)
    }

    fn sorted(&self, mut hits: Vec<(usize, MatchKind)>) -> Vec<Candidate> {
        hits.sort_by(|(a, ka), (b, kb)| {
            let (a, b) = (&self.entries[*a].issuer, &self.entries[*b].issuer);
            ka.cmp(kb)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
                .then_with(|| a.filer_code.cmp(&b.filer_code))
        });
        hits.into_iter()
            .map(|(idx, kind)| Candidate {
                issuer: self.entries[idx].issuer.clone(),
                kind,
            })
            .collect()
    }
}

impl From<CodeList> for EntityDirectory {
    fn from(list: CodeList) -> Self {
        Self::new(list.into_issuers())
    }
}

/// `E` followed by five digits.
pub fn is_filer_code(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 6
        && matches!(bytes[0], b'E' | b'e')
        && bytes[1..].iter().all(u8::is_ascii_digit)
}

/// Exactly four ASCII digits.
pub fn is_securities_code(text: &str) -> bool {
    text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit())
}
