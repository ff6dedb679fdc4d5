//! Sentence classification corpora and cross-validation splits.
//!
//! Every corpus file holds one example per line in the form `<label> <text>`.

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Seed used to shuffle single-file corpora before splitting.
pub const DEFAULT_SEED: u64 = 1234;

/// Supported benchmark datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// Movie review polarity.
    Mr,
    /// Subjectivity.
    Subj,
    /// Customer reviews.
    Cr,
    /// Opinion polarity.
    Mpqa,
    /// Question type classification.
    Trec,
    /// Stanford sentiment treebank, binary.
    Sst,
}

impl Dataset {
    /// Whether batches should be length-sorted (phrase-level SST data).
    pub fn sort_batches(self) -> bool {
        matches!(self, Dataset::Sst)
    }
}

impl FromStr for Dataset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "mr" => Dataset::Mr,
            "subj" => Dataset::Subj,
            "cr" => Dataset::Cr,
            "mpqa" => Dataset::Mpqa,
            "trec" => Dataset::Trec,
            "sst" => Dataset::Sst,
            other => bail!("unknown dataset: {other}"),
        })
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dataset::Mr => "mr",
            Dataset::Subj => "subj",
            Dataset::Cr => "cr",
            Dataset::Mpqa => "mpqa",
            Dataset::Trec => "trec",
            Dataset::Sst => "sst",
        };
        f.write_str(name)
    }
}

/// Tokenized sentences with integer labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub sentences: Vec<Vec<String>>,
    pub labels: Vec<usize>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Number of classes, assuming labels start at zero.
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |max| max + 1)
    }

    fn select(&self, indices: &[usize]) -> Corpus {
        Corpus {
            sentences: indices.iter().map(|&i| self.sentences[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    fn shuffled(self, seed: u64) -> Corpus {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        self.select(&order)
    }
}

/// A dataset as it is stored on disk.
#[derive(Debug, Clone)]
pub enum RawDataset {
    /// One file; test and validation sets come from cross-validation.
    Single(Corpus),
    /// Fixed test set; validation comes from cross-validation over train.
    TrainTest { train: Corpus, test: Corpus },
    /// Fixed train, validation and test sets.
    TrainValidTest {
        train: Corpus,
        valid: Corpus,
        test: Corpus,
    },
}

impl RawDataset {
    /// Every sentence, used to build the vocabulary.
    pub fn all_sentences(&self) -> Vec<&[String]> {
        let corpora: Vec<&Corpus> = match self {
            RawDataset::Single(corpus) => vec![corpus],
            RawDataset::TrainTest { train, test } => vec![train, test],
            RawDataset::TrainValidTest { train, valid, test } => vec![train, valid, test],
        };
        corpora
            .into_iter()
            .flat_map(|corpus| corpus.sentences.iter().map(Vec::as_slice))
            .collect()
    }
}

/// Train, validation and test sets of one run.
#[derive(Debug, Clone)]
pub struct Splits {
    pub train: Corpus,
    pub valid: Corpus,
    pub test: Corpus,
}

/// Normalize a sentence the way the benchmark tokenization expects.
///
/// Keeps letters, digits and `(),!?'` plus backtick, splits off clitics and
/// punctuation, and collapses whitespace. Lowercases unless `keep_case`.
pub fn clean_str(text: &str, keep_case: bool) -> String {
    let kept: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "(),!?'`".contains(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    let mut out = kept;
    for (from, to) in [
        ("'s", " 's"),
        ("'ve", " 've"),
        ("n't", " n't"),
        ("'re", " 're"),
        ("'d", " 'd"),
        ("'ll", " 'll"),
        (",", " , "),
        ("!", " ! "),
        ("(", " ( "),
        (")", " ) "),
        ("?", " ? "),
    ] {
        out = out.replace(from, to);
    }
    let joined = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if keep_case {
        joined
    } else {
        joined.to_lowercase()
    }
}

/// Read a file as UTF-8, falling back to Latin-1.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    })
}

/// Parse a `<label> <text>` corpus file.
///
/// With `clean` set every sentence goes through [`clean_str`].
pub fn read_corpus(path: &Path, clean: bool, keep_case: bool) -> Result<Corpus> {
    let text = read_text(path)?;
    let mut corpus = Corpus::default();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (label, sentence) = line.split_once(' ').unwrap_or((line, ""));
        let label: usize = label.parse().with_context(|| {
            format!("{}:{}: invalid label {label:?}", path.display(), line_no + 1)
        })?;
        let sentence = if clean {
            clean_str(sentence.trim(), keep_case)
        } else {
            sentence.trim().to_string()
        };
        corpus
            .sentences
            .push(sentence.split_whitespace().map(str::to_string).collect());
        corpus.labels.push(label);
    }
    Ok(corpus)
}

/// Load `dataset` from the directory `dir`.
pub fn load_dataset(dataset: Dataset, dir: &Path, seed: u64) -> Result<RawDataset> {
    let single = |file: &str| -> Result<RawDataset> {
        let corpus = read_corpus(&dir.join(file), true, false)?;
        Ok(RawDataset::Single(corpus.shuffled(seed)))
    };
    let raw = match dataset {
        Dataset::Mr => single("rt-polarity.all")?,
        Dataset::Subj => single("subj.all")?,
        Dataset::Cr => single("custrev.all")?,
        Dataset::Mpqa => single("mpqa.all")?,
        Dataset::Trec => RawDataset::TrainTest {
            train: read_corpus(&dir.join("TREC.train.all"), true, true)?,
            test: read_corpus(&dir.join("TREC.test.all"), true, true)?,
        },
        Dataset::Sst => RawDataset::TrainValidTest {
            train: read_corpus(&dir.join("stsa.binary.phrases.train"), false, false)?,
            valid: read_corpus(&dir.join("stsa.binary.dev"), false, false)?,
            test: read_corpus(&dir.join("stsa.binary.test"), false, false)?,
        },
    };
    Ok(raw)
}

/// Hold out fold `test_id` of `nfold` as test and split the rest 90/10 into
/// train and validation after a seeded shuffle.
pub fn cv_split(corpus: &Corpus, nfold: usize, test_id: usize, seed: u64) -> Result<Splits> {
    check_fold(nfold, test_id)?;
    let (rest, test): (Vec<usize>, Vec<usize>) =
        (0..corpus.len()).partition(|i| i % nfold != test_id);
    let mut rest = rest;
    rest.shuffle(&mut StdRng::seed_from_u64(seed));
    let train_len = rest.len() * 9 / 10;
    Ok(Splits {
        train: corpus.select(&rest[..train_len]),
        valid: corpus.select(&rest[train_len..]),
        test: corpus.select(&test),
    })
}

/// Use fold `valid_id` of `nfold` as validation and the rest as train.
pub fn cv_split_valid(corpus: &Corpus, nfold: usize, valid_id: usize) -> Result<(Corpus, Corpus)> {
    check_fold(nfold, valid_id)?;
    let (train, valid): (Vec<usize>, Vec<usize>) =
        (0..corpus.len()).partition(|i| i % nfold != valid_id);
    Ok((corpus.select(&train), corpus.select(&valid)))
}

fn check_fold(nfold: usize, fold: usize) -> Result<()> {
    if nfold < 2 || fold >= nfold {
        bail!("fold {fold} is out of range for {nfold}-fold cross-validation");
    }
    Ok(())
}

/// Turn a raw dataset into train/valid/test sets for fold `fold` of 10.
pub fn make_splits(raw: RawDataset, fold: usize, seed: u64) -> Result<Splits> {
    const NFOLD: usize = 10;
    match raw {
        RawDataset::Single(corpus) => cv_split(&corpus, NFOLD, fold, seed),
        RawDataset::TrainTest { train, test } => {
            let (train, valid) = cv_split_valid(&train, NFOLD, fold)?;
            Ok(Splits { train, valid, test })
        }
        RawDataset::TrainValidTest { train, valid, test } => Ok(Splits { train, valid, test }),
    }
}
