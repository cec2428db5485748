//! EDINET code list parsing.
//!
//! The code list (`EdinetcodeDlInfo.csv`) maps every filer code to its
//! registered name, reading, English name, securities code and fiscal
//! year-end date. It is published as CP932 with a one-line preamble before
//! the header row; UTF-8 copies are accepted as well.

use crate::error::{DataError, Result};
use crate::text::fold;
use crate::types::Issuer;
use std::borrow::Cow;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reading suffix for 株式会社 in the ヨミ column.
const READING_CORPORATE_FORM: &str = "カブシキガイシャ";

/// Parsed EDINET code list.
#[derive(Debug, Clone, Default)]
pub struct CodeList {
    issuers: Vec<Issuer>,
}

#[derive(Debug)]
struct Columns {
    filer_code: usize,
    name: usize,
    english_name: Option<usize>,
    reading: Option<usize>,
    securities_code: Option<usize>,
    fiscal_year_end: Option<usize>,
}

impl Columns {
    fn locate(header: &csv::StringRecord) -> Option<Self> {
        let folded: Vec<String> = header.iter().map(fold).collect();
        let exact = |name: &str| folded.iter().position(|h| h == name);
        let containing = |name: &str| folded.iter().position(|h| h.contains(name));

        Some(Self {
            filer_code: containing("edinetコード")?,
            name: exact("提出者名").or_else(|| exact("会社名"))?,
            english_name: containing("英字"),
            reading: containing("ヨミ"),
            securities_code: containing("証券コード"),
            fiscal_year_end: containing("決算日"),
        })
    }
}

impl CodeList {
    /// Parse the raw code-list bytes.
    ///
    /// # Errors
    /// Returns `DataError::Parse` when no header row can be found, and
    /// `DataError::Csv` when the file is not CSV at all.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = decode(raw);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut columns: Option<Columns> = None;
        let mut issuers = Vec::new();

        for record in reader.records() {
            let record = record?;
            if let Some(cols) = &columns {
                if let Some(issuer) = issuer_from_record(&record, cols) {
                    issuers.push(issuer);
                }
            } else {
                columns = Columns::locate(&record);
            }
        }

        if columns.is_none() {
            return Err(DataError::Parse(
                "EDINET code list header row not found".to_string(),
            ));
        }
        Ok(Self { issuers })
    }

    /// Build a code list from already-known issuers.
    pub const fn from_issuers(issuers: Vec<Issuer>) -> Self {
        Self { issuers }
    }

    /// All issuers in file order.
    pub fn issuers(&self) -> &[Issuer] {
        &self.issuers
    }

    /// Consume the list.
    pub fn into_issuers(self) -> Vec<Issuer> {
        self.issuers
    }

    /// Number of issuers.
    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}

fn decode(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let (text, _, _) = encoding_rs::SHIFT_JIS.decode(raw);
            text
        }
    }
}

fn issuer_from_record(record: &csv::StringRecord, cols: &Columns) -> Option<Issuer> {
    let field = |idx: Option<usize>| {
        idx.and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let filer_code = field(Some(cols.filer_code))?;
    let name = field(Some(cols.name))?;
    let mut issuer = Issuer::new(filer_code, name);

    if let Some(code) = field(cols.securities_code) {
        let digits: String = code.chars().filter(char::is_ascii_digit).take(4).collect();
        if digits.len() == 4 {
            issuer = issuer.with_securities_code(digits);
        }
    }
    if let Some(english) = field(cols.english_name) {
        issuer = issuer.with_alias(english);
    }
    if let Some(reading) = field(cols.reading) {
        let short = reading
            .trim_start_matches(READING_CORPORATE_FORM)
            .trim_end_matches(READING_CORPORATE_FORM);
        if !short.is_empty() {
            issuer = issuer.with_alias(short);
        }
    }
    if let Some(month) = field(cols.fiscal_year_end).and_then(year_end_month) {
        issuer = issuer.with_fiscal_year_end_month(month);
    }
    Some(issuer)
}

/// Month of a `決算日` value such as `3月31日`.
fn year_end_month(value: &str) -> Option<u32> {
    fold(value).split('月').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE_LIST: &str = "\
ダウンロード実行日,2024年10月01日現在,件数,3件
ＥＤＩＮＥＴコード,提出者種別,上場区分,連結の有無,資本金,決算日,提出者名,提出者名（英字）,提出者名（ヨミ）,所在地,提出者業種,証券コード,提出者法人番号
E02144,内国法人・組合,上場,有,635401,3月31日,トヨタ自動車株式会社,TOYOTA MOTOR CORPORATION,トヨタジドウシャカブシキガイシャ,愛知県豊田市トヨタ町１番地,輸送用機器,72030,1180301018771
E01777,内国法人・組合,上場,有,100000,12月31日,サンプル工業株式会社,SAMPLE INDUSTRIES,サンプルコウギョウカブシキガイシャ,東京都,電気機器,99990,
E99990,内国法人・組合,非上場,無,,,非上場株式会社,,,,,,
";

    #[test]
    fn test_parse_utf8_code_list() {
        let list = CodeList::parse(CODE_LIST.as_bytes()).unwrap();
        assert_eq!(list.len(), 3);

        let toyota = &list.issuers()[0];
        assert_eq!(toyota.filer_code, "E02144");
        assert_eq!(toyota.canonical_name, "トヨタ自動車株式会社");
        assert_eq!(toyota.securities_code.as_deref(), Some("7203"));
        assert_eq!(toyota.fiscal_year_end_month, Some(3));
        assert!(toyota.name_aliases.contains("TOYOTA MOTOR CORPORATION"));
        assert!(toyota.name_aliases.contains("トヨタジドウシャ"));

        let sample = &list.issuers()[1];
        assert_eq!(sample.fiscal_year_end_month, Some(12));

        let unlisted = &list.issuers()[2];
        assert_eq!(unlisted.securities_code, None);
        assert!(unlisted.name_aliases.is_empty());
        assert_eq!(unlisted.fiscal_year_end_month, None);
    }

    #[test]
    fn test_parse_shift_jis_code_list() {
        let (encoded, _, had_errors) = encoding_rs::SHIFT_JIS.encode(CODE_LIST);
        assert!(!had_errors);
        let list = CodeList::parse(&encoded).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.issuers()[0].canonical_name, "トヨタ自動車株式会社");
    }

    #[test]
    fn test_parse_with_bom() {
        let mut raw = UTF8_BOM.to_vec();
        raw.extend_from_slice(CODE_LIST.as_bytes());
        let list = CodeList::parse(&raw).unwrap();
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_missing_header() {
        let result = CodeList::parse("a,b,c\n1,2,3\n".as_bytes());
        assert!(matches!(result, Err(DataError::Parse(_))));
    }
}
