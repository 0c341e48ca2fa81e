// crates/tabula-server/src/patterns.rs
// Shared keyword/regex tables for the fast-path matcher, the intent ladder and
// the context resolvers
//
// All patterns are case-insensitive and cover Portuguese and English phrasing.
// Callers pass trimmed text; nothing here allocates per match.

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// Conversational families (fast path)
// ============================================================================

/// Whole-message greetings, optionally followed by a short pleasantry
#[allow(clippy::expect_used)]
pub static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(oi+|ol[áa]|e a[íi]|eai|bom dia|boa tarde|boa noite|hello|hi|hey|good (morning|afternoon|evening))([\s,]+(tudo bem|tudo bom|como vai|there|everyone|pessoal))?[\s!.,?]*$",
    )
    .expect("valid greeting regex")
});

#[allow(clippy::expect_used)]
pub static THANKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^((muito|muit[íi]ssimo)\s+)?(obrigad[oa]|brigad[oa]|valeu|thanks|thank you|thx|ty)(\s+\w+){0,2}[\s!.]*$",
    )
    .expect("valid thanks regex")
});

#[allow(clippy::expect_used)]
pub static FAREWELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(tchau|at[ée] (logo|mais|breve)|falou|bye|goodbye|see you( later)?|cya)[\s!.]*$",
    )
    .expect("valid farewell regex")
});

#[allow(clippy::expect_used)]
pub static HELP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(ajuda|help|socorro|o que (voc[êe]|vc) (pode fazer|faz|sabe fazer)|como (funciona|te uso|usar)|what can you do|how (does this work|do i use (this|you)))[\s!.?]*$",
    )
    .expect("valid help regex")
});

/// Canonical "which tables exist" phrasing. The only table-referencing form
/// the fast path may answer.
#[allow(clippy::expect_used)]
pub static TABLES_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^((quais|que) (s[ãa]o as )?tabelas( (existem|tem|t[êe]m|h[áa]|temos|est[ãa]o dispon[íi]veis|dispon[íi]veis|voc[êe] tem|voc[êe] conhece))?|(which|what) tables( (exist|are there|are available|do you have|can i query))?|(listar?|liste|mostr[ae]r?|show|list)( (as|the|all|todas as))? (tabelas|tables))[\s!.?]*$",
    )
    .expect("valid tables list regex")
});

/// Any phrase that points at a table
#[allow(clippy::expect_used)]
pub static TABLE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(tabelas?|tables?|planilhas?|datasets?)\b").expect("valid table reference regex")
});

/// Marks English phrasing for canned replies
#[allow(clippy::expect_used)]
pub static ENGLISH_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(hello|hi|hey|good|thanks|thank|thx|bye|goodbye|see|help|what|which|how|show|list|tables|you|the)\b",
    )
    .expect("valid english marker regex")
});

// ============================================================================
// Intent ladder
// ============================================================================

#[allow(clippy::expect_used)]
pub static AGGREGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(quant[oa]s|quantidade|total|totais|soma|somar|m[ée]dia|contar|conte|contagem|m[áa]xim[oa]|m[íi]nim[oa]|how many|count|sum|average|avg|max|min|maximum|minimum|number of)\b",
    )
    .expect("valid aggregation regex")
});

#[allow(clippy::expect_used)]
pub static TREND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(tend[êe]ncia|evolu[çc][ãa]o|ao longo|por (m[êe]s|dia|semana|ano|trimestre)|mensal|semanal|di[áa]rio|anual|hist[óo]rico|crescimento|trend|over time|per (month|day|week|year)|monthly|weekly|daily|yearly|growth|timeline)\b",
    )
    .expect("valid trend regex")
});

#[allow(clippy::expect_used)]
pub static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(compar[ae]r?|compara[çc][ãa]o|versus|vs|diferen[çc]a|contra|compare|comparison|difference|between)\b",
    )
    .expect("valid comparison regex")
});

#[allow(clippy::expect_used)]
pub static FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(onde|cujo|cuja|filtr[ae]r?|apenas|somente|s[óo]|acima de|abaixo de|maior que|menor que|igual a|com (status|email|e-mail|valor|nome)|where|filter|only|whose|greater than|less than|equal to|above|below)\b",
    )
    .expect("valid filter regex")
});

#[allow(clippy::expect_used)]
pub static EXPLORATORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(explor[ae]r?|descrev[ae]r?|vis[ãa]o geral|estrutura|colunas|campos|resumo|analis[ae]r?|explore|describe|overview|structure|columns|fields|summary|summarize|analy[sz]e)\b",
    )
    .expect("valid exploratory regex")
});

// ============================================================================
// Context resolution
// ============================================================================

#[allow(clippy::expect_used)]
pub static PRONOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(dele|dela|deles|delas|nele|nela|neles|nelas|disso|nisso|isso|isto|esse|essa|esses|essas|it|its|them|those|these|that one|this one)\b",
    )
    .expect("valid pronoun regex")
});

#[allow(clippy::expect_used)]
pub static SAME_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b((n?a|d?a) )?(mesma|essa|esta|nessa|nesta|dessa|desta) tabela\b|\b(same|that|this) table\b",
    )
    .expect("valid same-table regex")
});

#[allow(clippy::expect_used)]
pub static SAME_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(mesmo|mesma) (valor|email|e-mail|cliente|id|c[óo]digo|nome)\b|\bsame (value|email|client|customer|id|name)\b",
    )
    .expect("valid same-value regex")
});

/// Messages that open with a query verb
#[allow(clippy::expect_used)]
pub static QUERY_VERB_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(mostr[ae]r?|list[ae]r?|cont[ae]r?|quant[oa]s|busc[ae]r?|procur[ae]r?|filtr[ae]r?|tra[zg]a|exib[ae]|show|list|count|find|search|get|filter|display|how many)\b",
    )
    .expect("valid query verb regex")
});

/// Bare confirmations that replay the previous turn
#[allow(clippy::expect_used)]
pub static CONFIRMATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(sim|ok|okay|mostr[ae]|pode( ser)?|claro|beleza|isso|por favor|yes|yep|yeah|sure|show( me)?|go ahead|please)[\s!.]*$",
    )
    .expect("valid confirmation regex")
});

#[allow(clippy::expect_used)]
pub static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

// ============================================================================
// Offered options
// ============================================================================

/// `(A)` style option markers
#[allow(clippy::expect_used)]
pub static LETTERED_OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Za-z])\)").expect("valid lettered option regex"));

/// `1. text` or `1) text` list lines
#[allow(clippy::expect_used)]
pub static NUMBERED_OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(\d{1,2})[.)]\s+(.+?)\s*$").expect("valid numbered option regex")
});

/// A bare choice token: `B`, `(b)`, `2`, `opção B`, `option 2`
#[allow(clippy::expect_used)]
pub static CHOICE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:a )?op[çc][ãa]o|option|letra|n[úu]mero|number)?\s*\(?([a-z]|\d{1,2})\)?[\s!.]*$")
        .expect("valid choice token regex")
});

/// Ordinal choice words mapped to zero-based indices
pub const ORDINALS: &[(&str, usize)] = &[
    ("primeira", 0),
    ("primeiro", 0),
    ("first", 0),
    ("segunda", 1),
    ("segundo", 1),
    ("second", 1),
    ("terceira", 2),
    ("terceiro", 2),
    ("third", 2),
    ("quarta", 3),
    ("quarto", 3),
    ("fourth", 3),
    ("quinta", 4),
    ("quinto", 4),
    ("fifth", 4),
    ("última", usize::MAX),
    ("ultima", usize::MAX),
    ("último", usize::MAX),
    ("ultimo", usize::MAX),
    ("last", usize::MAX),
];

/// Ordinal phrase: optional article, the ordinal, optional trailing noun
#[allow(clippy::expect_used)]
pub static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:a |o |the )?([a-zúç]+)(?: (?:op[çc][ãa]o|opcao|tabela|one|option))?[\s!.]*$",
    )
    .expect("valid ordinal regex")
});

/// Whole-word, case-insensitive match of `word` in `text`
pub fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    let word = word.to_lowercase();
    text.match_indices(&word).any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
