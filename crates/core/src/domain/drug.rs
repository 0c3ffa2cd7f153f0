use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Therapeutic equivalence code for drugs with no substitutable rating.
pub const NO_EQUIVALENCE_CODE: &str = "NA";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrugName(pub String);

impl DrugName {
    /// Canonical form used for identity and lookup: trimmed, upper-cased.
    pub fn canonical(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DrugName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Drug {
    pub drug_name: String,
    pub generic_name: String,
    pub therapeutic_class: String,
    pub therapeutic_equivalence_code: String,
    pub pmpm_cost: f64,
    #[serde(default)]
    pub drug_interactions: InteractionField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_drug_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Mean member age for the drug's claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_age: Option<f64>,
}

impl Drug {
    pub fn new(
        drug_name: impl AsRef<str>,
        generic_name: impl AsRef<str>,
        therapeutic_class: impl Into<String>,
        therapeutic_equivalence_code: impl AsRef<str>,
        pmpm_cost: f64,
    ) -> Self {
        let code = therapeutic_equivalence_code.as_ref().trim();
        Self {
            drug_name: DrugName::canonical(drug_name.as_ref()).0,
            generic_name: DrugName::canonical(generic_name.as_ref()).0,
            therapeutic_class: therapeutic_class.into(),
            therapeutic_equivalence_code: if code.is_empty() {
                NO_EQUIVALENCE_CODE.to_string()
            } else {
                code.to_string()
            },
            pmpm_cost,
            drug_interactions: InteractionField::default(),
            ndc: None,
            total_drug_cost: None,
            member_count: None,
            state: None,
            avg_age: None,
        }
    }

    pub fn with_interactions<I, S>(mut self, descriptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drug_interactions =
            InteractionField::List(descriptions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_raw_interactions(mut self, raw: &str) -> Self {
        self.drug_interactions = InteractionField::parse(raw);
        self
    }

    /// A drug rated `NA` has no equivalent and is never swapped out.
    pub fn is_substitutable(&self) -> bool {
        self.therapeutic_equivalence_code != NO_EQUIVALENCE_CODE
    }

    /// Same generic compound within the same therapeutic class.
    pub fn is_same_compound(&self, other: &Drug) -> bool {
        self.generic_name == other.generic_name
            && self.therapeutic_class == other.therapeutic_class
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("interaction field is not a valid list literal: {raw}")]
pub struct InteractionParseError {
    pub raw: String,
}

/// Free-text interaction descriptions as they arrive from the dataset.
///
/// The source column holds either a list literal (`['...', '...']`) or a bare
/// string. A value that opens like a list but fails to parse is kept as
/// `Unparseable` so the classifier can fall back to a cautious risk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionField {
    List(Vec<String>),
    Text(String),
    Unparseable(String),
}

impl Default for InteractionField {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl InteractionField {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::List(Vec::new());
        }
        if trimmed.starts_with('[') {
            return match parse_list_literal(trimmed) {
                Some(entries) => Self::List(entries),
                None => Self::Unparseable(raw.to_string()),
            };
        }
        Self::Text(raw.to_string())
    }

    pub fn entries(&self) -> Result<Vec<&str>, InteractionParseError> {
        match self {
            Self::List(entries) => Ok(entries.iter().map(String::as_str).collect()),
            Self::Text(text) => Ok(vec![text.as_str()]),
            Self::Unparseable(raw) => Err(InteractionParseError { raw: raw.clone() }),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::List(entries) if entries.is_empty())
    }
}

impl Serialize for InteractionField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::List(entries) => entries.serialize(serializer),
            Self::Text(text) | Self::Unparseable(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for InteractionField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawInteractions {
            List(Vec<String>),
            Text(String),
        }

        Ok(match Option::<RawInteractions>::deserialize(deserializer)? {
            None => Self::default(),
            Some(RawInteractions::List(entries)) => Self::List(entries),
            Some(RawInteractions::Text(text)) => Self::parse(&text),
        })
    }
}

/// Parses a list of string literals. Accepts JSON (`["a"]`) and the
/// single-quoted form pandas writes out (`['a', "b's"]`).
fn parse_list_literal(input: &str) -> Option<Vec<String>> {
    if let Ok(entries) = serde_json::from_str::<Vec<String>>(input) {
        return Some(entries);
    }

    let mut chars = input.chars().peekable();
    if chars.next()? != '[' {
        return None;
    }

    let mut entries = Vec::new();
    loop {
        skip_whitespace(&mut chars);
        match chars.next()? {
            ']' => break,
            quote @ ('\'' | '"') => {
                let mut entry = String::new();
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            'n' => entry.push('\n'),
                            't' => entry.push('\t'),
                            other => entry.push(other),
                        },
                        ch if ch == quote => break,
                        ch => entry.push(ch),
                    }
                }
                entries.push(entry);

                skip_whitespace(&mut chars);
                match chars.next()? {
                    ',' => continue,
                    ']' => break,
                    _ => return None,
                }
            }
            _ => return None,
        }
    }

    skip_whitespace(&mut chars);
    chars.next().is_none().then_some(entries)
}

fn skip_whitespace(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().is_some_and(|ch| ch.is_whitespace()) {
        chars.next();
    }
}
