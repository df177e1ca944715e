use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use tracing::{debug, debug_span};

use smt_core::chart::{decode_chart, Grammar};
use smt_core::error::{DecodeError, DecodeResult};
use smt_core::output;
use smt_core::phrase::{PhraseSource, PhraseTable, Sentence};
use smt_core::search::decode_phrase;
use smt_core::settings::{parse_settings_toml, Settings};
use smt_core::{CancelToken, SearchContext, SearchResult};

use crate::model_file::{self, ModelFile, ModelFileError};

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Phrase-based stack decoding
    Phrase,
    /// Hierarchical chart decoding
    Chart,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeOpsError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    /// Translations per sentence; 0 prints the best one only.
    pub nbest: usize,
    pub distinct: bool,
    pub json: bool,
    pub alignment: bool,
    pub segmentation: bool,
}

pub struct DecodeOptions {
    pub model: PathBuf,
    pub mode: Mode,
    pub config: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub threads: usize,
    pub format: OutputFormat,
    pub search_graph: Option<PathBuf>,
}

enum Supply {
    Phrase(PhraseTable),
    Chart(Vec<Grammar>),
}

/// A loaded model ready to decode sentences from any thread.
pub struct Engine {
    ctx: SearchContext,
    supply: Supply,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(model: &ModelFile, settings: Settings, mode: Mode) -> Result<Self, ModelFileError> {
        let (supply, num_scores) = match mode {
            Mode::Phrase => {
                let table = model.phrase_table()?;
                let n = table.num_scores();
                (Supply::Phrase(table), n)
            }
            Mode::Chart => {
                let grammars = model.grammars()?;
                let n = grammars.first().map_or(0, Grammar::num_scores);
                (Supply::Chart(grammars), n)
            }
        };
        Ok(Self {
            ctx: model.context(settings, num_scores)?,
            supply,
            cancel: CancelToken::new(),
        })
    }

    pub fn context(&self) -> &SearchContext {
        &self.ctx
    }

    pub fn decode(&self, sentence: &Sentence) -> DecodeResult<SearchResult> {
        match &self.supply {
            Supply::Phrase(table) => decode_phrase(&self.ctx, sentence, table, &self.cancel),
            Supply::Chart(grammars) => decode_chart(&self.ctx, sentence, grammars, &self.cancel),
        }
    }
}

pub fn decode_cmd(opts: &DecodeOptions) {
    let mut settings = match &opts.config {
        Some(path) => {
            let content = die!(
                fs::read_to_string(path),
                "Error reading {}: {}",
                path.display()
            );
            die!(parse_settings_toml(&content), "Error: {}")
        }
        None => Settings::default(),
    };
    let mut format = opts.format.clone();
    if format.nbest > 0 {
        settings.nbest.size = format.nbest;
    } else {
        format.nbest = settings.nbest.size;
    }
    format.distinct |= settings.nbest.distinct;
    if opts.search_graph.is_some() && settings.nbest.size == 0 {
        // keep recombination arcs so the dump shows them
        settings.nbest.size = 1;
    }

    let model = die!(
        model_file::load(&opts.model),
        "Error loading model {}: {}",
        opts.model.display()
    );
    let engine = die!(Engine::new(&model, settings, opts.mode), "Error: {}");
    if let Some(dir) = &opts.search_graph {
        die!(fs::create_dir_all(dir), "Error creating {}: {}", dir.display());
    }

    let lines = die!(read_lines(opts.input.as_deref()), "Error reading input: {}");
    let outputs = decode_batch(
        &engine,
        &lines,
        opts.threads,
        &format,
        opts.search_graph.as_deref(),
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for text in outputs {
        die!(writeln!(out, "{text}"), "Error writing output: {}");
    }
}

fn read_lines(input: Option<&Path>) -> io::Result<Vec<String>> {
    match input {
        Some(path) => Ok(fs::read_to_string(path)?
            .lines()
            .map(str::to_string)
            .collect()),
        None => io::stdin().lock().lines().collect(),
    }
}

/// Derivations are walked recursively, one level per phrase or rule
/// application, so long sentences need a deep stack. The cubic future-cost
/// table keeps practical sentences to a few thousand words, well inside this.
const WORKER_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Decodes every line, `threads` at a time, and returns the rendered output
/// in input order. A line that fails to decode renders as an empty string.
pub fn decode_batch(
    engine: &Engine,
    lines: &[String],
    threads: usize,
    format: &OutputFormat,
    graph_dir: Option<&Path>,
) -> Vec<String> {
    let _span = debug_span!("decode_batch", sentences = lines.len(), threads).entered();
    let threads = threads.clamp(1, lines.len().max(1));
    let mut outputs = vec![String::new(); lines.len()];

    thread::scope(|scope| {
        let mut workers = Vec::with_capacity(threads);
        for t in 0..threads {
            let spawned = thread::Builder::new()
                .name(format!("decode-{t}"))
                .stack_size(WORKER_STACK_SIZE)
                .spawn_scoped(scope, move || {
                    lines
                        .iter()
                        .enumerate()
                        .skip(t)
                        .step_by(threads)
                        .map(|(id, line)| {
                            let text = decode_line(engine, id, line, format, graph_dir)
                                .unwrap_or_else(|e| {
                                    eprintln!("Error decoding line {}: {e}", id + 1);
                                    String::new()
                                });
                            (id, text)
                        })
                        .collect::<Vec<_>>()
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => eprintln!("Error: cannot start decoding thread {t}: {e}"),
            }
        }
        for worker in workers {
            match worker.join() {
                Ok(done) => {
                    for (id, text) in done {
                        outputs[id] = text;
                    }
                }
                Err(_) => eprintln!("Error: decoding thread panicked"),
            }
        }
    });
    debug!(sentences = lines.len(), "batch decoded");
    outputs
}

fn decode_line(
    engine: &Engine,
    id: usize,
    line: &str,
    format: &OutputFormat,
    graph_dir: Option<&Path>,
) -> Result<String, DecodeOpsError> {
    let sentence = Sentence::new(id as u64, line);
    let result = engine.decode(&sentence)?;
    if let Some(dir) = graph_dir {
        let graph = output::search_graph(&result);
        fs::write(
            dir.join(format!("{id}.json")),
            serde_json::to_string_pretty(&graph)?,
        )?;
    }
    render(engine.context(), &result, format)
}

/// Text or JSON output for one decoded sentence.
pub fn render(
    ctx: &SearchContext,
    result: &SearchResult,
    format: &OutputFormat,
) -> Result<String, DecodeOpsError> {
    if format.nbest == 0 {
        let best = output::best_translation(result)?;
        if format.json {
            return Ok(serde_json::to_string(&best)?);
        }
        let Some(t) = best else {
            return Ok(String::new());
        };
        let mut line = if format.segmentation {
            t.segmentation_text()
        } else {
            t.text()
        };
        if format.alignment {
            line.push_str(" ||| ");
            line.push_str(&t.alignment_text());
        }
        return Ok(line);
    }

    let list = output::nbest(result, format.nbest, format.distinct)?;
    if format.json {
        return Ok(serde_json::to_string(&list)?);
    }
    let lines: Vec<String> = list
        .iter()
        .map(|t| {
            let mut line = t.nbest_line(ctx.layout());
            if format.alignment {
                line.push_str(" ||| ");
                line.push_str(&t.alignment_text());
            }
            line
        })
        .collect();
    Ok(lines.join("\n"))
}
