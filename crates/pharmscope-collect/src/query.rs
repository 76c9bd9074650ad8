//! Per-source search query construction.
//!
//! Each upstream speaks its own query dialect; the builders here turn one
//! `KeywordSet` (plus the request context) into the expression each
//! adapter submits.

use pharmscope_common::{KeywordSet, ResearchRequest};

/// Search input handed to every source adapter for one run.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub keywords: KeywordSet,
    pub drug_name: Option<String>,
    pub indication: Option<String>,
}

impl SourceQuery {
    pub fn new(request: &ResearchRequest, keywords: KeywordSet) -> Self {
        Self {
            keywords,
            drug_name: request.drug_name.clone(),
            indication: request.indication.clone(),
        }
    }

    /// Plain OR-joined expression (ClinicalTrials.gov full-text `query.term`).
    pub fn trials_term(&self) -> String {
        self.keywords
            .iter()
            .map(quote_if_phrase)
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// PubMed term expression: each keyword restricted to title/abstract.
    pub fn pubmed_term(&self) -> String {
        self.keywords
            .iter()
            .map(|k| format!("{}[tiab]", quote_if_phrase(k)))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// openFDA drug-label `search` expression. Keywords are quoted and
    /// OR-joined; a known drug name becomes the primary filter, ANDed in
    /// front of the keyword broadening.
    pub fn openfda_search(&self) -> String {
        let mut clauses: Vec<String> = self.keywords.iter().map(|k| format!("\"{k}\"")).collect();
        if let Some(ref indication) = self.indication {
            clauses.push(format!("indications_and_usage:\"{indication}\""));
        }
        let broadened = clauses.join(" OR ");

        match &self.drug_name {
            Some(drug) => format!("(openfda.generic_name:\"{drug}\") AND ({broadened})"),
            None => broadened,
        }
    }
}

/// Quotes multi-word terms so upstreams treat them as phrases.
fn quote_if_phrase(term: &str) -> String {
    if term.contains(char::is_whitespace) {
        format!("\"{term}\"")
    } else {
        term.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(terms: &[&str]) -> SourceQuery {
        SourceQuery {
            keywords: KeywordSet::build(terms.iter().copied()).unwrap(),
            drug_name: None,
            indication: None,
        }
    }

    #[test]
    fn trials_term_quotes_phrases() {
        let q = query(&["sotorasib", "kras g12c"]);
        assert_eq!(q.trials_term(), "sotorasib OR \"kras g12c\"");
    }

    #[test]
    fn pubmed_term_tags_title_abstract() {
        let q = query(&["osimertinib", "egfr"]);
        assert_eq!(q.pubmed_term(), "osimertinib[tiab] OR egfr[tiab]");
    }

    #[test]
    fn openfda_search_without_drug_is_or_joined() {
        let q = query(&["glp-1", "obesity"]);
        assert_eq!(q.openfda_search(), "\"glp-1\" OR \"obesity\"");
    }

    #[test]
    fn openfda_search_with_drug_filters_on_generic_name() {
        let mut q = query(&["weight loss"]);
        q.drug_name = Some("semaglutide".into());
        q.indication = Some("obesity".into());
        assert_eq!(
            q.openfda_search(),
            "(openfda.generic_name:\"semaglutide\") AND (\"weight loss\" OR indications_and_usage:\"obesity\")"
        );
    }
}
