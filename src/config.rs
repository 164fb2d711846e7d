
use clap::Parser;
use serde::Deserialize;
use std::{ffi::OsString, fmt::Display, fs, path::PathBuf, str::FromStr};
use crate::error::{Error, Result};

pub const DEFAULT_WINDOW_SIZE: usize = 2;
pub const DEFAULT_EMBEDDING_DIM: usize = 50;
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;
pub const DEFAULT_BATCH_SIZE: usize = 1024;
pub const DEFAULT_N_ITERS: usize = 5;
pub const DEFAULT_SAMPLE_SIZE: usize = 5;
pub const DEFAULT_LAMBDA_M: f32 = 0.2;
pub const DEFAULT_LAMBDA_V: f32 = 0.1;
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// A corpus path tagged with its language code, written `lang:path`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct LangPath {
    pub lang: String,
    pub path: PathBuf,
}

impl FromStr for LangPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((lang, path)) if !lang.is_empty() && !path.is_empty() => Ok(Self {
                lang: lang.to_owned(),
                path: PathBuf::from(path),
            }),
            _ => Err(Error::Config(format!("expected LANG:PATH, got '{}'", s))),
        }
    }
}

impl TryFrom<String> for LangPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl Display for LangPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.lang, self.path.display())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainParams {
    pub window_size: usize,
    pub embedding_dim: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub n_iters: usize,
    pub sample_size: usize,
    pub lambda_m: f32,
    pub lambda_v: f32,
    pub random_seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            learning_rate: DEFAULT_LEARNING_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
            n_iters: DEFAULT_N_ITERS,
            sample_size: DEFAULT_SAMPLE_SIZE,
            lambda_m: DEFAULT_LAMBDA_M,
            lambda_v: DEFAULT_LAMBDA_V,
            random_seed: DEFAULT_RANDOM_SEED,
        }
    }
}

impl Display for TrainParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "training hyper parameters:
        window_size: {},
        embedding_dim: {},
        learning_rate: {},
        batch_size: {},
        n_iters: {},
        sample_size: {},
        lambda_m: {},
        lambda_v: {},
        random_seed: {}",
        self.window_size, self.embedding_dim, self.learning_rate, self.batch_size, self.n_iters,
        self.sample_size, self.lambda_m, self.lambda_v, self.random_seed
        )
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Params {
    pub src: LangPath,
    pub trg: LangPath,
    pub output: PathBuf,
    #[serde(default)]
    pub save_npy: Option<PathBuf>,
    #[serde(default)]
    pub cuda: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub train: TrainParams,
}

impl Params {

    /// Rejects combinations that can only be usage errors.
    pub fn validate(&self) -> Result<()> {
        if self.src.lang == self.trg.lang {
            return Err(Error::Config(format!("source and target languages are both '{}'", self.src.lang)));
        }
        let positive = [
            ("window_size", self.train.window_size),
            ("embedding_dim", self.train.embedding_dim),
            ("batch_size", self.train.batch_size),
            ("sample_size", self.train.sample_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }
        if !(self.train.learning_rate.is_finite() && self.train.learning_rate > 0.0) {
            return Err(Error::Config(format!("learning_rate must be a positive number, got {}", self.train.learning_rate)));
        }
        Ok(())
    }
}

impl Display for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using hyper-params:
        src: {}
        trg: {}
        output: {}
        save_npy: {:?}
        cuda: {}
        Using training hyper-params: {}",
        self.src, self.trg, self.output.display(), self.save_npy, self.cuda, self.train)
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "xling-cbow",
    version,
    about = "Cross-lingual CBOW embeddings from two monolingual corpora"
)]
struct Cli {
    /// Read all parameters from a JSON file instead of flags
    #[arg(long, value_name = "FILE", conflicts_with_all = ["src", "trg", "output"])]
    config: Option<PathBuf>,

    /// Source corpus, plain text or .gz/.xz
    #[arg(short = 's', long = "src", value_name = "LANG:PATH", required_unless_present = "config")]
    src: Option<String>,

    /// Target corpus, plain text or .gz/.xz
    #[arg(short = 't', long = "trg", value_name = "LANG:PATH", required_unless_present = "config")]
    trg: Option<String>,

    /// Where to write the word vectors
    #[arg(short = 'o', long = "output", value_name = "FILE", required_unless_present = "config")]
    output: Option<PathBuf>,

    /// Window size on each side
    #[arg(long = "window-size", default_value_t = DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Learning rate
    #[arg(long = "lr", default_value_t = DEFAULT_LEARNING_RATE)]
    learning_rate: f32,

    /// Number of (context, target) pairs per update
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Number of iterations over both corpora
    #[arg(long = "iter", default_value_t = DEFAULT_N_ITERS)]
    n_iters: usize,

    /// Seed for initialisation, shuffling and negative draws
    #[arg(long = "seed", default_value_t = DEFAULT_RANDOM_SEED)]
    random_seed: u64,

    /// Embedding dimension
    #[arg(long = "dim", default_value_t = DEFAULT_EMBEDDING_DIM)]
    embedding_dim: usize,

    /// Negatives per positive, drawn once from each language
    #[arg(long = "negative", default_value_t = DEFAULT_SAMPLE_SIZE)]
    sample_size: usize,

    /// Weight of the mean-matching term
    #[arg(long = "lambda-m", default_value_t = DEFAULT_LAMBDA_M)]
    lambda_m: f32,

    /// Weight of the covariance-matching term
    #[arg(long = "lambda-v", default_value_t = DEFAULT_LAMBDA_V)]
    lambda_v: f32,

    /// Also save the context table as .npy
    #[arg(long = "save-npy", value_name = "FILE")]
    save_npy: Option<PathBuf>,

    /// Use CUDA
    #[arg(long)]
    cuda: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

pub struct Config {
    params: Params
}

impl Config {

    pub fn get_params(&self) -> Params {
        return self.params.clone()
    }

    /// Parses `args` (program name first), failing instead of exiting on
    /// bad input.
    pub fn new<I, T>(args: I) -> Result<Config>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| Error::Config(e.to_string()))?;
        Config::from_cli(cli)
    }

    /// Parses the process arguments; `--help`, `--version` and malformed
    /// flags exit the way clap does.
    pub fn from_env() -> Result<Config> {
        Config::from_cli(Cli::parse())
    }

    pub fn from_json(path: &std::path::Path) -> Result<Config> {
        let f = fs::File::open(path)?;
        let params: Params = serde_json::from_reader(std::io::BufReader::new(f))?;
        params.validate()?;
        Ok(Self { params })
    }

    fn from_cli(cli: Cli) -> Result<Config> {

        if let Some(path) = &cli.config {
            let mut config = Config::from_json(path)?;
            config.params.cuda |= cli.cuda;
            config.params.verbose |= cli.verbose;
            return Ok(config);
        }

        let missing = |name: &str| Error::Config(format!("--{} is required", name));
        let params = Params {
            src: cli.src.as_deref().ok_or_else(|| missing("src"))?.parse()?,
            trg: cli.trg.as_deref().ok_or_else(|| missing("trg"))?.parse()?,
            output: cli.output.ok_or_else(|| missing("output"))?,
            save_npy: cli.save_npy,
            cuda: cli.cuda,
            verbose: cli.verbose,
            train: TrainParams {
                window_size: cli.window_size,
                embedding_dim: cli.embedding_dim,
                learning_rate: cli.learning_rate,
                batch_size: cli.batch_size,
                n_iters: cli.n_iters,
                sample_size: cli.sample_size,
                lambda_m: cli.lambda_m,
                lambda_v: cli.lambda_v,
                random_seed: cli.random_seed,
            },
        };
        params.validate()?;

        Ok(Self { params })
    }

}


pub mod files_handling {

    use std::fs::{self, File};
    use std::io::{self, BufRead, BufReader, BufWriter, Write};
    use std::path::Path;
    use flate2::read::MultiGzDecoder;
    use ndarray::ArrayView2;
    use ndarray_npy::write_npy;
    use xz2::read::XzDecoder;
    use crate::error::Error;

    /// Opens a corpus file as a stream of text lines.
    pub trait OpenText {
        fn open_text(&self, path: &Path) -> io::Result<Box<dyn BufRead>>;
    }

    /// Picks the decompressor from the file extension: `.xz`, `.gz`, anything
    /// else is read as plain text.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct CompressedText;

    impl OpenText for CompressedText {
        fn open_text(&self, path: &Path) -> io::Result<Box<dyn BufRead>> {
            let f = File::open(path)?;
            let reader: Box<dyn BufRead> = match path.extension().and_then(|ext| ext.to_str()) {
                Some("xz") => Box::new(BufReader::new(XzDecoder::new(f))),
                Some("gz") => Box::new(BufReader::new(MultiGzDecoder::new(f))),
                _ => Box::new(BufReader::new(f)),
            };
            Ok(reader)
        }
    }

    pub fn save_output<S: SaveFile>(path: &Path, item: S) -> Result<(), <S as SaveFile>::Error>
    where
        <S as SaveFile>::Error: From<io::Error>,
    {
        // create output folder
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        item.save_file(path)?;
        Ok(())
    }

    pub trait SaveFile {
        type Error;
        fn save_file(&self, path: &Path) -> Result<(), Self::Error>;
    }

    /// Word vectors in the usual text layout: a `"<rows> <dim>"` header, then
    /// one `"<word> <v1> <v2> ..."` line per row.
    pub struct WordVectors<'a> {
        pub words: &'a [String],
        pub vectors: ArrayView2<'a, f32>,
    }

    impl SaveFile for WordVectors<'_> {
        type Error = Error;

        fn save_file(&self, path: &Path) -> Result<(), Self::Error> {
            let (rows, dim) = self.vectors.dim();
            if self.words.len() != rows {
                return Err(Error::RowMismatch { words: self.words.len(), rows });
            }

            let mut f = BufWriter::new(File::create(path)?);
            writeln!(f, "{} {}", rows, dim)?;
            for (word, row) in self.words.iter().zip(self.vectors.rows()) {
                write!(f, "{}", word)?;
                for v in row {
                    write!(f, " {}", v)?;
                }
                writeln!(f)?;
            }
            f.flush()?;
            Ok(())
        }
    }

    impl SaveFile for ArrayView2<'_, f32> {
        type Error = Error;

        fn save_file(&self, path: &Path) -> Result<(), Self::Error> {
            write_npy(path, self)?;
            Ok(())
        }
    }
}


#[cfg(test)]
mod tests {

    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut v = vec!["xling-cbow".to_string()];
        v.extend(extra.iter().map(|s| s.to_string()));
        v
    }

    #[test]
    fn flags_with_defaults() {
        let params = Config::new(args(&["-s", "en:data/en.txt.gz", "-t", "it:data/it.txt", "-o", "out/vecs.txt"]))
            .unwrap()
            .get_params();
        assert_eq!(params.src.lang, "en");
        assert_eq!(params.src.path, PathBuf::from("data/en.txt.gz"));
        assert_eq!(params.trg.lang, "it");
        assert_eq!(params.train, TrainParams::default());
        assert!(!params.verbose);
        assert!(params.save_npy.is_none());
    }

    #[test]
    fn overrides_and_errors() {
        let params = Config::new(args(&[
            "-s", "en:a", "-t", "fr:b", "-o", "c", "--window-size", "3", "--lr", "0.5",
            "--batch-size", "8", "--iter", "2", "--seed", "7", "--dim", "16", "-v",
        ]))
        .unwrap()
        .get_params();
        assert_eq!(params.train.window_size, 3);
        assert_eq!(params.train.batch_size, 8);
        assert_eq!(params.train.embedding_dim, 16);
        assert_eq!(params.train.random_seed, 7);
        assert!(params.verbose);

        assert!(Config::new(args(&["-s", "a", "-t", "fr:b", "-o", "c"])).is_err());
        assert!(Config::new(args(&["-s", "en:a", "-t", "en:b", "-o", "c"])).is_err());
        assert!(Config::new(args(&["-s", "en:a", "-t", "fr:b", "-o", "c", "--batch-size", "0"])).is_err());
        assert!(Config::new(args(&["-s", "en:a", "-t", "fr:b"])).is_err());
    }

    #[test]
    fn json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{
            "src": "en:corpus.en",
            "trg": "it:corpus.it.xz",
            "output": "vecs.txt",
            "train": { "window_size": 4, "n_iters": 1 }
        }"#).unwrap();

        let params = Config::new(args(&["--config", path.to_str().unwrap(), "--verbose"]))
            .unwrap()
            .get_params();
        assert_eq!(params.trg.path, PathBuf::from("corpus.it.xz"));
        assert_eq!(params.train.window_size, 4);
        assert_eq!(params.train.n_iters, 1);
        assert_eq!(params.train.batch_size, DEFAULT_BATCH_SIZE);
        assert!(params.verbose);

        fs::write(&path, r#"{ "src": "en", "trg": "it:x", "output": "o" }"#).unwrap();
        assert!(Config::from_json(&path).is_err());
    }

    #[test]
    fn word_vectors_need_one_word_per_row() {
        use super::files_handling::{SaveFile, WordVectors};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vecs.txt");
        let vectors = ndarray::array![[0.5f32, -1.0], [2.0, 0.25]];
        let words = vec!["<unk>".to_string(), "en:cat".to_string()];

        WordVectors { words: &words, vectors: vectors.view() }.save_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "2 2\n<unk> 0.5 -1\nen:cat 2 0.25\n");

        let short = WordVectors { words: &words[..1], vectors: vectors.view() }.save_file(&path);
        assert!(matches!(short, Err(Error::RowMismatch { words: 1, rows: 2 })));
    }
}
