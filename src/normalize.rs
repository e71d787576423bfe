use std::{io::Read, path::Path};

use anyhow::{Context, Error};

use crate::Result;

/// Rewrites a name to `canonical` when every substring in `contains` appears
/// in the uppercased name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRule {
    pub contains: Vec<String>,
    pub canonical: String,
}

impl AliasRule {
    pub fn new<S: AsRef<str>>(contains: &[S], canonical: &str) -> Self {
        Self {
            contains: contains
                .iter()
                .map(|s| s.as_ref().trim().to_uppercase())
                .collect(),
            canonical: canonical.trim().to_uppercase(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        !self.contains.is_empty() && self.contains.iter().all(|s| name.contains(s.as_str()))
    }
}

/// Builds the join key between trade history and profit/loss rows.
/// Rules are tried in order and the first match wins.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    rules: Vec<AliasRule>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self {
            rules: vec![AliasRule::new(&["XYZ", "LIMITED"], "XYZ LTD")],
        }
    }
}

impl NameNormalizer {
    pub fn with_rules(rules: Vec<AliasRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AliasRule] {
        &self.rules
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = AliasRule>) {
        self.rules.extend(rules);
    }

    /// Missing or blank names map to the empty key.
    pub fn normalize(&self, raw_name: Option<&str>) -> String {
        let Some(raw_name) = raw_name else {
            return String::new();
        };
        let name = raw_name.to_uppercase().trim().to_string();
        self.rules
            .iter()
            .find(|rule| rule.matches(&name))
            .map(|rule| rule.canonical.clone())
            .unwrap_or(name)
    }

    /// Loads extra rules from a CSV with `contains` and `canonical` columns.
    /// `contains` may list several substrings separated by `+`.
    pub fn load_rules_csv<R: Read>(reader: R) -> Result<Vec<AliasRule>> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let contains_index = headers
            .iter()
            .position(|h| h == "contains")
            .context("failed to find contains header")?;
        let canonical_index = headers
            .iter()
            .position(|h| h == "canonical")
            .context("failed to find canonical header")?;

        let mut rules = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            let contains: Vec<&str> = record
                .get(contains_index)
                .unwrap_or_default()
                .split('+')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            let canonical = record.get(canonical_index).unwrap_or_default();
            if contains.is_empty() || canonical.is_empty() {
                return Err(Error::msg(format!(
                    "alias rule on line {} needs both contains and canonical",
                    i + 2
                )));
            }
            rules.push(AliasRule::new(&contains, canonical));
        }
        Ok(rules)
    }

    pub fn load_rules_csv_path<P: AsRef<Path>>(path: P) -> Result<Vec<AliasRule>> {
        let file = std::fs::File::open(&path).with_context(|| {
            format!("failed to open alias file {}", path.as_ref().display())
        })?;
        Self::load_rules_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_variants_share_a_key() {
        let n = NameNormalizer::default();
        assert_eq!(n.normalize(Some("XYZ LIMITED")), "XYZ LTD");
        assert_eq!(n.normalize(Some("xyz limited ")), "XYZ LTD");
        assert_eq!(n.normalize(Some("Xyz Limited")), "XYZ LTD");
    }

    #[test]
    fn missing_name_is_empty_key() {
        let n = NameNormalizer::default();
        assert_eq!(n.normalize(None), "");
        assert_eq!(n.normalize(Some("   ")), "");
    }

    #[test]
    fn unmapped_names_pass_through() {
        let n = NameNormalizer::default();
        assert_eq!(n.normalize(Some("  Acme Industries ")), "ACME INDUSTRIES");
        // Needs both substrings.
        assert_eq!(n.normalize(Some("XYZ Corp")), "XYZ CORP");
    }

    #[test]
    fn rules_loaded_from_csv() {
        let data = "contains,canonical\nACME + INDUSTRIES,acme ind\n";
        let rules = NameNormalizer::load_rules_csv(data.as_bytes()).unwrap();
        assert_eq!(rules, vec![AliasRule::new(&["ACME", "INDUSTRIES"], "ACME IND")]);

        let mut n = NameNormalizer::default();
        n.extend(rules);
        assert_eq!(n.normalize(Some("Acme Industries Ltd")), "ACME IND");
        assert_eq!(n.normalize(Some("XYZ Limited")), "XYZ LTD");
    }

    #[test]
    fn first_matching_rule_wins() {
        let n = NameNormalizer::with_rules(vec![
            AliasRule::new(&["ACME"], "ACME"),
            AliasRule::new(&["ACME", "LIMITED"], "ACME LTD"),
        ]);
        assert_eq!(n.rules().len(), 2);
        assert_eq!(n.normalize(Some("Acme Limited")), "ACME");
        // No built-in rules once replaced.
        assert_eq!(n.normalize(Some("XYZ Limited")), "XYZ LIMITED");
    }

    #[test]
    fn incomplete_csv_rule_is_rejected() {
        let data = "contains,canonical\nACME,\n";
        assert!(NameNormalizer::load_rules_csv(data.as_bytes()).is_err());
    }
}
