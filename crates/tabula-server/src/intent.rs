// crates/tabula-server/src/intent.rs
// Regex-ladder intent classification

use crate::patterns::{AGGREGATION_RE, COMPARISON_RE, EXPLORATORY_RE, FILTER_RE, TREND_RE};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Confidence for a ladder hit
pub const MATCHED_CONFIDENCE: u8 = 90;
/// Confidence for the retrieval default
pub const DEFAULT_CONFIDENCE: u8 = 60;

/// Question category
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IntentCategory {
    Retrieval,
    Aggregation,
    Filter,
    Trend,
    Comparison,
    Exploratory,
    /// Small talk; no data needed
    Conversational,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Suggested chart for this category
    pub fn visualization(&self) -> Visualization {
        match self {
            Self::Aggregation => Visualization::Bar,
            Self::Trend => Visualization::Line,
            Self::Comparison => Visualization::GroupedBar,
            Self::Filter | Self::Retrieval => Visualization::Table,
            Self::Exploratory | Self::Conversational => Visualization::Summary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Visualization {
    Bar,
    Line,
    GroupedBar,
    Table,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: IntentCategory,
    pub confidence: u8,
    pub visualization: Visualization,
}

/// Ordered rules. The first match wins; order is the tie-break.
static LADDER: LazyLock<[(IntentCategory, &'static LazyLock<Regex>); 5]> = LazyLock::new(|| {
    [
        (IntentCategory::Aggregation, &AGGREGATION_RE),
        (IntentCategory::Trend, &TREND_RE),
        (IntentCategory::Comparison, &COMPARISON_RE),
        (IntentCategory::Filter, &FILTER_RE),
        (IntentCategory::Exploratory, &EXPLORATORY_RE),
    ]
});

/// Classify a message. Pure function of the text.
pub fn classify(message: &str) -> Classification {
    let category = LADDER
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map(|(category, _)| *category);

    match category {
        Some(category) => Classification {
            category,
            confidence: MATCHED_CONFIDENCE,
            visualization: category.visualization(),
        },
        None => Classification {
            category: IntentCategory::Retrieval,
            confidence: DEFAULT_CONFIDENCE,
            visualization: Visualization::Table,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_each_rung() {
        assert_eq!(classify("Quantos clientes temos?").category, IntentCategory::Aggregation);
        assert_eq!(classify("evolução das vendas por mês").category, IntentCategory::Trend);
        assert_eq!(classify("compare norte versus sul").category, IntentCategory::Comparison);
        assert_eq!(classify("pedidos onde status é pago").category, IntentCategory::Filter);
        assert_eq!(classify("descreva a estrutura de orders").category, IntentCategory::Exploratory);
    }

    #[test]
    fn test_default_is_retrieval() {
        let c = classify("mostre os pedidos");
        assert_eq!(c.category, IntentCategory::Retrieval);
        assert_eq!(c.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(c.visualization, Visualization::Table);
    }

    #[test]
    fn test_ladder_order_breaks_ties() {
        // aggregation + trend -> aggregation
        assert_eq!(classify("total de vendas por mês").category, IntentCategory::Aggregation);
        // trend + comparison -> trend
        assert_eq!(classify("compare the monthly growth").category, IntentCategory::Trend);
        // comparison + filter -> comparison
        assert_eq!(classify("compare orders where status is paid").category, IntentCategory::Comparison);
        // filter + exploratory -> filter
        assert_eq!(classify("describe only active clients").category, IntentCategory::Filter);
    }

    #[test]
    fn test_matched_confidence_and_visualization() {
        let c = classify("how many orders?");
        assert_eq!(c.confidence, MATCHED_CONFIDENCE);
        assert_eq!(c.visualization, Visualization::Bar);
        assert_eq!(classify("sales trend").visualization, Visualization::Line);
        assert_eq!(classify("a vs b").visualization, Visualization::GroupedBar);
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(IntentCategory::Aggregation.as_str(), "aggregation");
        assert_eq!(IntentCategory::from_str("Trend").unwrap(), IntentCategory::Trend);
        assert_eq!(IntentCategory::Comparison.to_string(), "comparison");
    }
}
