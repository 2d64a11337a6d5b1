//! The four stages wired together.

use crate::action::{Extraction, extract};
use crate::config::EscapeConfig;
use crate::context::{Classification, classify};
use crate::error::EscapeError;
use crate::reassemble::{Escaped, reassemble};
use crate::tokenizer::{Tokenized, tokenize};

/// Intermediate results of one run, kept for reporting and debugging.
#[derive(Clone, Debug)]
pub struct Stages {
    pub extraction: Extraction,
    pub tokenized: Tokenized,
    pub classification: Classification,
    pub escaped: Escaped,
}

/// Escapes templates with one configuration. Holds no per-run state, so a
/// single instance can serve any number of runs, including concurrent ones.
#[derive(Clone, Debug, Default)]
pub struct Autoescaper {
    config: EscapeConfig,
}

impl Autoescaper {
    pub fn new(config: EscapeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EscapeConfig {
        &self.config
    }

    pub fn escape(&self, source: &str) -> Result<Escaped, EscapeError> {
        self.stages(source).map(|stages| stages.escaped)
    }

    pub fn stages(&self, source: &str) -> Result<Stages, EscapeError> {
        run(source, &self.config)
    }
}

/// Escape `source` with `config`.
pub fn escape_template(source: &str, config: &EscapeConfig) -> Result<Escaped, EscapeError> {
    run(source, config).map(|stages| stages.escaped)
}

fn run(source: &str, config: &EscapeConfig) -> Result<Stages, EscapeError> {
    let extraction = extract(source, &config.delimiters)?;
    let tokenized = tokenize(&extraction)?;
    let classification = classify(&extraction, &tokenized, config)?;
    let escaped = reassemble(&extraction, &tokenized, &classification, config)?;
    log::debug!(
        target: "autoescape.pipeline",
        "escaped {} of {} actions ({} rewrites, {} tokens)",
        escaped.escaped_count(),
        extraction.actions.len(),
        tokenized.stats.rewrites,
        tokenized.tokens.len()
    );
    Ok(Stages {
        extraction,
        tokenized,
        classification,
        escaped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;

    #[test]
    fn facade_and_stages_agree() {
        let source = "<ul>{{range .Items}}<li><a href={{.URL}}>{{.Title}}</a></li>{{end}}</ul>";
        let escaper = Autoescaper::default();
        let stages = escaper.stages(source).unwrap();
        assert_eq!(stages.extraction.actions.len(), 4);
        assert_eq!(
            escape_template(source, escaper.config()).unwrap(),
            stages.escaped
        );
        assert_eq!(
            stages.escaped.text,
            "<ul>{{range .Items}}<li><a href=\"{{.URL | escape_url | escape_html_attr}}\">\
             {{.Title | escape_html}}</a></li>{{end}}</ul>"
        );
    }

    #[test]
    fn errors_name_their_stage() {
        let escaper = Autoescaper::default();
        let stage = |source: &str| escaper.escape(source).unwrap_err().stage();
        assert_eq!(stage("{{.A"), Stage::Extraction);
        assert_eq!(stage("<a href=\"x"), Stage::Tokenization);
        assert_eq!(stage("<{{.T}}>"), Stage::Classification);
        assert_eq!(stage("<style>{{.S}}</style>"), Stage::Reassembly);
    }

    #[test]
    fn both_entry_points_fail_alike() {
        let config = EscapeConfig::default();
        let escaper = Autoescaper::new(config.clone());
        for source in ["{{.A", "<a href=\"x", "<{{.T}}>", "<style>{{.S}}</style>"] {
            assert_eq!(
                escape_template(source, &config).unwrap_err(),
                escaper.stages(source).unwrap_err(),
                "{source}"
            );
        }
    }

    #[test]
    fn autoescaper_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Autoescaper>();
        assert_send_sync::<EscapeConfig>();
    }
}
