//! Controlled vocabulary of annual securities report sections.

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use yuho_data::text::fold;

/// Number of keyword-ranked sections returned when no section is named.
const KEYWORD_FALLBACK_LIMIT: usize = 3;

/// Canonical report section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SectionCode {
    /// 1-1 主要な経営指標等の推移
    KeyFinancialIndicators,
    /// 1-2 沿革
    CompanyHistory,
    /// 1-3 事業の内容
    BusinessOverview,
    /// 1-4 関係会社の状況
    AffiliatedEntities,
    /// 1-5 従業員の状況
    Employees,
    /// 2-1 経営方針、経営環境及び対処すべき課題等
    ManagementPolicy,
    /// 2-2 サステナビリティに関する考え方及び取組
    Sustainability,
    /// 2-3 事業等のリスク
    RiskFactors,
    /// 2-4 経営者による財政状態、経営成績及びキャッシュ・フローの状況の分析
    ManagementAnalysis,
    /// 2-5 重要な契約等
    MaterialContracts,
    /// 2-6 研究開発活動
    ResearchAndDevelopment,
    /// 3-1 設備投資等の概要
    CapitalExpenditures,
    /// 3-2 主要な設備の状況
    MajorFacilities,
    /// 3-3 設備の新設、除却等の計画
    FacilityPlans,
    /// 4-1-1 株式の総数等
    SharesOutstanding,
    /// 4-1-5 所有者別状況
    ShareholderComposition,
    /// 4-1-6 大株主の状況
    MajorShareholders,
    /// 4-3 配当政策
    DividendPolicy,
    /// 4-4-1 コーポレート・ガバナンスの概要
    CorporateGovernance,
    /// 4-4-2 役員の状況
    Officers,
    /// 4-4-3 監査の状況
    Audit,
    /// 4-4-4 役員の報酬等
    OfficerCompensation,
    /// 5-1-1 連結財務諸表
    ConsolidatedStatements,
    /// 5-1-2 その他（連結）
    ConsolidatedOther,
    /// 5-2-1 財務諸表（単体）
    NonConsolidatedStatements,
    /// 5-2-2 主な資産及び負債の内容
    MajorAssetsAndLiabilities,
    /// 5-2-3 その他（単体）
    NonConsolidatedOther,
    /// 6 提出会社の株式事務の概要
    ShareHandling,
    /// 7-1 提出会社の親会社等の情報
    ParentCompany,
    /// 7-2 その他の参考情報
    OtherReference,
    /// 8 提出会社の保証会社等の情報
    GuarantorCompanies,
}

/// Definition of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDef {
    /// Canonical code
    pub code: SectionCode,
    /// Dotted item id (`2-3`)
    pub id: &'static str,
    /// Japanese item title
    pub title: &'static str,
    /// Other names for the section
    pub aliases: &'static [&'static str],
    /// Routing keywords used when no section is named
    pub keywords: &'static [&'static str],
    /// XBRL text-block elements carrying the section, preferred first
    pub tags: &'static [&'static str],
}

macro_rules! section {
    ($code:ident, $id:literal, $title:literal, [$($alias:literal),*], [$($kw:literal),*], [$($tag:literal),+]) => {
        SectionDef {
            code: SectionCode::$code,
            id: $id,
            title: $title,
            aliases: &[$($alias),*],
            keywords: &[$($kw),*],
            tags: &[$($tag),+],
        }
    };
}

static SECTIONS: [SectionDef; 31] = [
    section!(KeyFinancialIndicators, "1-1", "主要な経営指標等の推移", ["主要KPI", "指標推移"], ["経営指標", "kpi", "推移"], ["BusinessResultsOfGroupTextBlock"]),
    section!(CompanyHistory, "1-2", "沿革", ["会社の歴史"], ["沿革", "歴史", "創業"], ["CompanyHistoryTextBlock"]),
    section!(BusinessOverview, "1-3", "事業の内容", ["事業内容", "ビジネスモデル"], ["事業", "ビジネス", "セグメント"], ["DescriptionOfBusinessTextBlock"]),
    section!(AffiliatedEntities, "1-4", "関係会社の状況", [], ["関係会社", "子会社", "関連会社"], ["OverviewOfAffiliatedEntitiesTextBlock"]),
    section!(Employees, "1-5", "従業員の状況", ["従業員数"], ["従業員", "社員", "人員", "人的資本"], ["InformationAboutEmployeesTextBlock"]),
    section!(ManagementPolicy, "2-1", "経営方針、経営環境及び対処すべき課題等", ["経営課題", "経営方針"], ["経営環境", "課題", "対処"], ["BusinessPolicyBusinessEnvironmentIssuesToAddressEtcTextBlock"]),
    section!(Sustainability, "2-2", "サステナビリティに関する考え方及び取組", ["サステナビリティ", "ESG"], ["気候", "脱炭素", "人的資本"], ["DisclosureOfSustainabilityRelatedFinancialInformationTextBlock"]),
    section!(RiskFactors, "2-3", "事業等のリスク", ["リスク情報"], ["リスク", "不確実性", "懸念", "継続企業"], ["BusinessRisksTextBlock", "MaterialMattersRelatingToGoingConcernEtcBusinessRisksTextBlock"]),
    section!(ManagementAnalysis, "2-4", "経営者による財政状態、経営成績及びキャッシュ・フローの状況の分析", ["MD&A", "経営者分析"], ["財政状態", "経営成績", "キャッシュフロー", "キャッシュ・フロー", "業績", "分析"], ["ManagementAnalysisOfFinancialPositionOperatingResultsAndCashFlowsTextBlock"]),
    section!(MaterialContracts, "2-5", "重要な契約等", [], ["契約", "提携", "ライセンス"], ["MaterialContractsTextBlock", "SignificantContractsTextBlock"]),
    section!(ResearchAndDevelopment, "2-6", "研究開発活動", [], ["研究開発", "r&d"], ["ResearchAndDevelopmentActivitiesTextBlock"]),
    section!(CapitalExpenditures, "3-1", "設備投資等の概要", [], ["設備投資", "capex"], ["OverviewOfCapitalExpendituresEtcTextBlock", "CapitalExpendituresOverviewTextBlock"]),
    section!(MajorFacilities, "3-2", "主要な設備の状況", [], ["設備", "工場", "拠点"], ["MajorFacilitiesTextBlock", "MainFacilitiesTextBlock"]),
    section!(FacilityPlans, "3-3", "設備の新設、除却等の計画", [], ["新設", "除却", "設備計画"], ["PlansForNewConstructionRemovalEtcOfFacilitiesTextBlock"]),
    section!(SharesOutstanding, "4-1-1", "株式の総数等", [], ["株式数", "発行済株式", "株数"], ["TotalNumberOfSharesEtcTextBlock"]),
    section!(ShareholderComposition, "4-1-5", "所有者別状況", [], ["所有者別", "株主構成"], ["DistributionOfShareholdersTextBlock"]),
    section!(MajorShareholders, "4-1-6", "大株主の状況", ["大株主"], ["主要株主"], ["MajorShareholdersTextBlock"]),
    section!(DividendPolicy, "4-3", "配当政策", [], ["配当", "配当性向"], ["DividendPolicyTextBlock"]),
    section!(CorporateGovernance, "4-4-1", "コーポレート・ガバナンスの概要", ["ガバナンス"], ["コーポレートガバナンス"], ["OverviewOfCorporateGovernanceTextBlock"]),
    section!(Officers, "4-4-2", "役員の状況", [], ["役員", "取締役", "監査役"], ["InformationAboutOfficersTextBlock", "OfficersTextBlock"]),
    section!(Audit, "4-4-3", "監査の状況", [], ["監査", "内部監査", "会計監査"], ["AuditTextBlock", "StatusOfAuditTextBlock"]),
    section!(OfficerCompensation, "4-4-4", "役員の報酬等", ["役員報酬"], ["報酬"], ["RemunerationForDirectorsAndOtherOfficersTextBlock", "CompensationForOfficersTextBlock"]),
    section!(ConsolidatedStatements, "5-1-1", "連結財務諸表", [], ["連結"], ["ConsolidatedFinancialStatementsTextBlock"]),
    section!(ConsolidatedOther, "5-1-2", "その他（連結）", [], ["連結注記", "連結その他"], ["OtherInformationConsolidatedTextBlock"]),
    section!(NonConsolidatedStatements, "5-2-1", "財務諸表（単体）", [], ["財務諸表", "単体", "貸借対照表", "損益計算書"], ["NonConsolidatedFinancialStatementsTextBlock", "FinancialStatementsTextBlock"]),
    section!(MajorAssetsAndLiabilities, "5-2-2", "主な資産及び負債の内容", [], ["資産", "負債"], ["MajorAssetsAndLiabilitiesTextBlock"]),
    section!(NonConsolidatedOther, "5-2-3", "その他（単体）", [], ["単体その他"], ["OtherInformationNonConsolidatedTextBlock"]),
    section!(ShareHandling, "6", "提出会社の株式事務の概要", ["株式事務"], [], ["ShareHandlingProceduresTextBlock"]),
    section!(ParentCompany, "7-1", "提出会社の親会社等の情報", [], ["親会社"], ["InformationAboutParentCompanyEtcTextBlock"]),
    section!(OtherReference, "7-2", "その他の参考情報", [], ["参考情報"], ["OtherReferenceInformationTextBlock"]),
    section!(GuarantorCompanies, "8", "提出会社の保証会社等の情報", ["保証会社"], [], ["InformationAboutGuarantorCompaniesEtcTextBlock"]),
];

impl SectionCode {
    /// Definition of this section.
    pub fn def(self) -> &'static SectionDef {
        // The table is in declaration order.
        &SECTIONS[self as usize]
    }

    /// Dotted item id.
    pub fn id(self) -> &'static str {
        self.def().id
    }

    /// Japanese item title.
    pub fn title(self) -> &'static str {
        self.def().title
    }

    /// XBRL text-block candidates.
    pub fn tags(self) -> &'static [&'static str] {
        self.def().tags
    }
}

impl fmt::Display for SectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id(), self.title())
    }
}

/// Fold and drop brackets, so `その他（連結）` and `その他連結` compare equal.
fn normalize(text: &str) -> String {
    fold(text)
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '[' | ']' | '【' | '】' | '「' | '」'))
        .collect()
}

/// The section vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct SectionVocabulary {
    sections: &'static [SectionDef],
}

impl Default for SectionVocabulary {
    fn default() -> Self {
        Self::standard()
    }
}

impl SectionVocabulary {
    /// The sections of the annual securities report.
    pub const fn standard() -> Self {
        Self {
            sections: &SECTIONS,
        }
    }

    /// All definitions in item order.
    pub const fn all(&self) -> &'static [SectionDef] {
        self.sections
    }

    /// Section for a phrase.
    ///
    /// Tries the item id, the code name (`RiskFactors`), an exact title or
    /// alias, then containment in either direction.
    pub fn lookup(&self, phrase: &str) -> Option<SectionCode> {
        let trimmed = phrase.trim();
        if let Some(def) = self.sections.iter().find(|d| d.id == trimmed) {
            return Some(def.code);
        }
        if let Some(def) = self
            .sections
            .iter()
            .find(|d| format!("{:?}", d.code).eq_ignore_ascii_case(trimmed))
        {
            return Some(def.code);
        }

        let needle = normalize(phrase);
        if needle.is_empty() {
            return None;
        }
        let names = |d: &SectionDef| {
            std::iter::once(d.title)
                .chain(d.aliases.iter().copied())
                .map(normalize)
                .collect::<Vec<_>>()
        };
        if let Some(def) = self
            .sections
            .iter()
            .find(|d| names(d).iter().any(|n| *n == needle))
        {
            return Some(def.code);
        }
        self.sections
            .iter()
            .find(|d| {
                names(d)
                    .iter()
                    .any(|n| n.contains(&needle) || needle.contains(n.as_str()))
            })
            .map(|d| d.code)
    }

    /// Sections a question asks for, in order of appearance.
    ///
    /// Titles, aliases and dashed item ids named in the question are
    /// returned first-mentioned first. When none is named, up to three
    /// sections are ranked by routing-keyword hits.
    pub fn scan(&self, question: &str) -> Vec<SectionCode> {
        let text = normalize(question);
        let mut named: Vec<(usize, usize, SectionCode)> = self
            .sections
            .iter()
            .enumerate()
            .filter_map(|(order, def)| {
                let by_name = std::iter::once(def.title)
                    .chain(def.aliases.iter().copied())
                    .filter_map(|name| text.find(&normalize(name)));
                let by_id = find_item_id(&text, def.id);
                by_name
                    .chain(by_id)
                    .min()
                    .map(|pos| (pos, order, def.code))
            })
            .collect();

        if !named.is_empty() {
            named.sort_unstable();
            return named.into_iter().map(|(_, _, code)| code).collect();
        }

        let mut scored: Vec<(usize, usize, SectionCode)> = self
            .sections
            .iter()
            .enumerate()
            .filter_map(|(order, def)| {
                let hits = def
                    .keywords
                    .iter()
                    .filter(|kw| text.contains(&normalize(kw)))
                    .count();
                (hits > 0).then(|| {
                    // narrative items of part 2 win ties
                    let bonus = usize::from(def.id.starts_with("2-"));
                    (hits * 2 + bonus, order, def.code)
                })
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(KEYWORD_FALLBACK_LIMIT)
            .map(|(_, _, code)| code)
            .collect()
    }

    /// Remove named titles and aliases from `text`, leaving a space.
    ///
    /// Names are matched as written and in NFKC form, so full-width
    /// brackets in `その他（連結）` also match NFKC-normalized text.
    pub fn strip(&self, text: &str) -> String {
        let mut names: Vec<String> = Vec::new();
        for name in self
            .sections
            .iter()
            .flat_map(|d| std::iter::once(d.title).chain(d.aliases.iter().copied()))
        {
            let nfkc: String = name.nfkc().collect();
            if nfkc != name {
                names.push(name.to_string());
            }
            names.push(nfkc);
        }
        // longest first, so 事業等のリスク goes before リスク情報 fragments
        names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));
        names.dedup();
        let mut out = text.to_string();
        for name in &names {
            out = out.replace(name.as_str(), " ");
        }
        out
    }
}

/// Position of a dashed item id that is not part of a longer number.
fn find_item_id(text: &str, id: &str) -> Option<usize> {
    if !id.contains('-') {
        return None;
    }
    let boundary = |c: Option<char>| c.is_none_or(|c| !(c.is_ascii_digit() || c == '-'));
    text.match_indices(id)
        .find(|(pos, _)| {
            boundary(text[..*pos].chars().next_back())
                && boundary(text[pos + id.len()..].chars().next())
        })
        .map(|(pos, _)| pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_table_matches_codes() {
        let vocabulary = SectionVocabulary::standard();
        assert_eq!(vocabulary.all().len(), 31);
        for (idx, def) in vocabulary.all().iter().enumerate() {
            assert_eq!(def.code as usize, idx, "{}", def.id);
            assert_eq!(def.code.def().id, def.id);
            assert!(!def.tags.is_empty());
        }
    }

    #[rstest]
    #[case("2-3", SectionCode::RiskFactors)]
    #[case("事業等のリスク", SectionCode::RiskFactors)]
    #[case("RiskFactors", SectionCode::RiskFactors)]
    #[case("リスク", SectionCode::RiskFactors)]
    #[case("ｍｄ＆ａ", SectionCode::ManagementAnalysis)]
    #[case("配当政策について", SectionCode::DividendPolicy)]
    #[case("その他(連結)", SectionCode::ConsolidatedOther)]
    #[case("6", SectionCode::ShareHandling)]
    fn test_lookup(#[case] phrase: &str, #[case] expected: SectionCode) {
        assert_eq!(SectionVocabulary::standard().lookup(phrase), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("天気")]
    fn test_lookup_miss(#[case] phrase: &str) {
        assert_eq!(SectionVocabulary::standard().lookup(phrase), None);
    }

    #[rstest]
    #[case("トヨタ(7203)の2024年3月期の事業等のリスクを教えて", vec![SectionCode::RiskFactors])]
    #[case("配当政策と事業等のリスク", vec![SectionCode::DividendPolicy, SectionCode::RiskFactors])]
    #[case("2-4と4-4-2を比較", vec![SectionCode::ManagementAnalysis, SectionCode::Officers])]
    #[case("ESGの取り組み", vec![SectionCode::Sustainability])]
    fn test_scan_named(#[case] question: &str, #[case] expected: Vec<SectionCode>) {
        assert_eq!(SectionVocabulary::standard().scan(question), expected);
    }

    #[test]
    fn test_scan_ignores_dates() {
        let found = SectionVocabulary::standard().scan("2024-3期の天気");
        assert!(found.is_empty());
    }

    #[test]
    fn test_scan_keyword_fallback() {
        let found = SectionVocabulary::standard().scan("取締役の報酬はいくら？");
        assert_eq!(
            found,
            vec![SectionCode::Officers, SectionCode::OfficerCompensation]
        );
    }

    #[test]
    fn test_scan_nothing() {
        assert!(SectionVocabulary::standard().scan("ホンダの2024年3月期を教えて").is_empty());
    }

    #[test]
    fn test_strip() {
        let stripped = SectionVocabulary::standard().strip("トヨタの事業等のリスク");
        assert_eq!(stripped.trim(), "トヨタの");
    }

    #[rstest]
    #[case("トヨタのその他（連結）")]
    #[case("トヨタのその他(連結)")]
    fn test_strip_bracketed_titles(#[case] text: &str) {
        let stripped = SectionVocabulary::standard().strip(text);
        assert_eq!(stripped.trim(), "トヨタの");
    }
}
