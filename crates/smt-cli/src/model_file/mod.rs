//! Model files: weights, feature switches, phrase table, grammars and an
//! optional bigram language model, all in one TOML document.
//!
//! ```toml
//! [weights]
//! TranslationModel = [1.0]
//! Distortion = [0.3]
//!
//! [features]
//! distortion = true
//!
//! [[phrases]]
//! source = "das haus"
//! target = "the house"
//! scores = [-0.5]
//!
//! [[grammars]]
//! name = "main"
//! max_span = 10
//! rules = [{ lhs = "X", source = "[X] von [X]", target = "[2] of [1]", scores = [-1.0] }]
//!
//! [lm]
//! unigrams = [["the", -1.0, -0.3]]
//! bigrams = [["the", "house", -0.2]]
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use smt_core::chart::{Grammar, GrammarError, RuleEntry};
use smt_core::model::{
    BigramLanguageModel, Distortion, Feature, PhrasePenalty, UnknownWordPenalty, WeightError,
    WordPenalty,
};
use smt_core::phrase::{PhraseEntry, PhraseTable, TableError};
use smt_core::settings::Settings;
use smt_core::SearchContext;

#[derive(Debug, thiserror::Error)]
pub enum ModelFileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("phrase table: {0}")]
    Table(#[from] TableError),

    #[error("grammar {name:?}: {source}")]
    Grammar {
        name: String,
        #[source]
        source: GrammarError,
    },

    #[error("weights: {0}")]
    Weights(#[from] WeightError),

    #[error("model file has no {0}")]
    Missing(&'static str),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFile {
    #[serde(default)]
    pub weights: HashMap<String, Vec<f32>>,
    #[serde(default)]
    pub features: FeatureSwitches,
    #[serde(default)]
    pub phrases: Vec<PhraseEntry>,
    #[serde(default)]
    pub grammars: Vec<GrammarSection>,
    #[serde(default)]
    pub lm: Option<LmSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureSwitches {
    #[serde(default)]
    pub word_penalty: bool,
    #[serde(default)]
    pub phrase_penalty: bool,
    #[serde(default)]
    pub distortion: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrammarSection {
    pub name: String,
    #[serde(default)]
    pub max_span: Option<usize>,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LmSection {
    /// `[word, log10 prob, log10 backoff]`
    #[serde(default)]
    pub unigrams: Vec<(String, f32, f32)>,
    /// `[previous, word, log10 prob]`
    #[serde(default)]
    pub bigrams: Vec<(String, String, f32)>,
    #[serde(default)]
    pub oov: Option<f32>,
}

pub fn load(path: &Path) -> Result<ModelFile, ModelFileError> {
    let content = fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<ModelFile, ModelFileError> {
    toml::from_str(content).map_err(|e| ModelFileError::Parse(e.to_string()))
}

impl ModelFile {
    pub fn phrase_table(&self) -> Result<PhraseTable, ModelFileError> {
        if self.phrases.is_empty() {
            return Err(ModelFileError::Missing("phrases"));
        }
        Ok(PhraseTable::from_entries(self.phrases.iter().cloned())?)
    }

    /// Grammars in file order; the first one is tried first.
    pub fn grammars(&self) -> Result<Vec<Grammar>, ModelFileError> {
        if self.grammars.is_empty() {
            return Err(ModelFileError::Missing("grammars"));
        }
        self.grammars
            .iter()
            .map(|g| {
                Grammar::from_entries(&g.name, g.max_span, g.rules.iter().cloned()).map_err(
                    |source| ModelFileError::Grammar {
                        name: g.name.clone(),
                        source,
                    },
                )
            })
            .collect()
    }

    /// Features in the order their weights are laid out: the switched-on
    /// penalties, distortion, the language model, then the unknown-word
    /// penalty.
    pub fn features(&self, settings: &Settings) -> Vec<Feature> {
        let mut features = Vec::new();
        if self.features.word_penalty {
            features.push(Feature::stateless(WordPenalty));
        }
        if self.features.phrase_penalty {
            features.push(Feature::stateless(PhrasePenalty));
        }
        if self.features.distortion {
            features.push(Feature::stateful(Distortion));
        }
        if let Some(lm) = &self.lm {
            let mut model = BigramLanguageModel::from_entries(
                lm.unigrams.iter().map(|(w, p, b)| (w.as_str(), *p, *b)),
                lm.bigrams
                    .iter()
                    .map(|(prev, w, p)| (prev.as_str(), w.as_str(), *p)),
            );
            if let Some(oov) = lm.oov {
                model = model.with_oov(oov);
            }
            features.push(Feature::stateful(model));
        }
        features.push(Feature::stateless(UnknownWordPenalty::new(
            settings.unknown.penalty,
        )));
        features
    }

    /// Builds the search context, looking every producer's weights up by
    /// name.
    pub fn context(
        &self,
        settings: Settings,
        num_translation_scores: usize,
    ) -> Result<SearchContext, ModelFileError> {
        let features = self.features(&settings);
        let ctx = SearchContext::new(settings, num_translation_scores, features, |name| {
            self.weights.get(name).cloned()
        })?;
        Ok(ctx)
    }
}
