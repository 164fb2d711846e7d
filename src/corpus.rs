// imports
use crate::config::files_handling::OpenText;

use std::collections::HashMap;
use std::io::{self, BufRead, Lines};
use std::ops::Range;
use std::path::Path;
use log::info;

pub const UNK: usize = 0;
pub const BOS: usize = 1;
pub const EOS: usize = 2;

/// `[BOS] + token ids + [EOS]`
pub type Sentence = Vec<usize>;

/// Which of the two corpora a batch or statistic belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Source => Side::Target,
            Side::Target => Side::Source,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Side::Source => 0,
            Side::Target => 1,
        }
    }
}

/// Bilingual vocabulary plus the per-language bookkeeping gathered while
/// reading corpora.
pub struct Corpus {
    window_size: usize,
    verbose: bool,
    w2i: HashMap<String, usize>,
    freq: Vec<u64>,
    vocab_range: HashMap<String, Range<usize>>,
    i2w: Vec<String>,
}

impl Corpus {

    pub fn new(window_size: usize, verbose: bool) -> Self {
        let mut corpus = Self {
            window_size,
            verbose,
            w2i: HashMap::new(),
            freq: Vec::new(),
            vocab_range: HashMap::new(),
            i2w: Vec::new(),
        };
        for sentinel in ["<unk>", "<s>", "</s>"] {
            corpus.intern(sentinel);
        }
        corpus
    }

    /// Returns the id of `key`, assigning the next free id on first sight.
    pub fn intern(&mut self, key: &str) -> usize {
        if let Some(&id) = self.w2i.get(key) {
            return id;
        }
        let id = self.w2i.len();
        self.w2i.insert(key.to_owned(), id);
        self.freq.push(0);
        id
    }

    /// Minimum number of tokens a line needs to yield one full window.
    pub fn min_tokens(&self) -> usize {
        (2 * self.window_size).saturating_sub(1)
    }

    /// Turns one raw line into a framed sentence, or `None` if it is too short.
    /// Tokens are keyed as `lang:token` so each language owns its own ids.
    fn encode_line(&mut self, line: &str, lang: &str, count: bool) -> Option<Sentence> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() < self.min_tokens() {
            return None;
        }

        let mut sentence = Vec::with_capacity(words.len() + 2);
        sentence.push(BOS);
        for word in words {
            let id = self.intern(&format!("{}:{}", lang, word));
            if count {
                self.freq[id] += 1;
            }
            sentence.push(id);
        }
        sentence.push(EOS);
        Some(sentence)
    }

    /// Lazily reads `path` as `lang`. The language's id range is recorded once
    /// the returned reader is exhausted.
    pub fn read<'c, O: OpenText>(&'c mut self, opener: &O, path: &Path, lang: &str, count: bool) -> io::Result<SentenceReader<'c>> {
        let lines = opener.open_text(path)?.lines();
        if self.verbose {
            info!("Read from {}", path.display());
        }
        let vocab_start = self.w2i.len();
        Ok(SentenceReader {
            corpus: self,
            lines,
            lang: lang.to_owned(),
            count,
            vocab_start,
            finished: false,
        })
    }

    /// Reads a whole corpus into memory.
    pub fn read_all<O: OpenText>(&mut self, opener: &O, path: &Path, lang: &str) -> io::Result<Vec<Sentence>> {
        self.read(opener, path, lang, true)?.collect()
    }

    /// Builds the id-ordered surface forms; call after every corpus is read.
    pub fn set_i2w(&mut self) {
        let mut pairs: Vec<(&String, &usize)> = self.w2i.iter().collect();
        pairs.sort_by_key(|pair| *pair.1);
        self.i2w = pairs.into_iter().map(|(w, _)| w.to_owned()).collect();
    }

    pub fn i2w(&self) -> &[String] {
        &self.i2w
    }

    pub fn get_vocabsize(&self) -> usize {
        self.w2i.len()
    }

    pub fn lookup(&self, key: &str) -> Option<usize> {
        self.w2i.get(key).copied()
    }

    /// Occurrence counts indexed by id.
    pub fn freq(&self) -> &[u64] {
        &self.freq
    }

    pub fn vocab_range(&self, lang: &str) -> Option<Range<usize>> {
        self.vocab_range.get(lang).cloned()
    }

    pub fn vocab_ranges(&self) -> &HashMap<String, Range<usize>> {
        &self.vocab_range
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

/// Iterator over the accepted sentences of one corpus file.
pub struct SentenceReader<'c> {
    corpus: &'c mut Corpus,
    lines: Lines<Box<dyn BufRead>>,
    lang: String,
    count: bool,
    vocab_start: usize,
    finished: bool,
}

impl SentenceReader<'_> {
    fn finish(&mut self) {
        self.finished = true;
        if self.corpus.verbose {
            info!("Done.");
        }
        // Record vocabulary range
        let vocab_end = self.corpus.w2i.len();
        self.corpus.vocab_range.insert(self.lang.clone(), self.vocab_start..vocab_end);
    }
}

impl Iterator for SentenceReader<'_> {
    type Item = io::Result<Sentence>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.lines.next() {
                None => {
                    self.finish();
                    return None;
                }
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(line)) => {
                    if let Some(sentence) = self.corpus.encode_line(&line, &self.lang, self.count) {
                        return Some(Ok(sentence));
                    }
                }
            }
        }
    }
}


#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use std::io::Cursor;

    /// Serves in-memory files keyed by path.
    pub(crate) struct MemoryText(pub HashMap<&'static str, &'static str>);

    impl OpenText for MemoryText {
        fn open_text(&self, path: &Path) -> io::Result<Box<dyn BufRead>> {
            let key = path.to_str().unwrap_or_default();
            match self.0.get(key) {
                Some(text) => Ok(Box::new(Cursor::new(text.as_bytes().to_vec()))),
                None => Err(io::Error::new(io::ErrorKind::NotFound, key.to_owned())),
            }
        }
    }

    pub(crate) fn two_languages() -> MemoryText {
        MemoryText(HashMap::from([
            ("en.txt", "the cat sat on the mat\nhi\nthe dog sat\n"),
            ("it.txt", "il gatto era sul tappeto\nciao ciao ciao\nil cane\n"),
        ]))
    }

    #[test]
    fn sentences_are_framed_and_short_lines_dropped() {
        let files = two_languages();
        let mut corpus = Corpus::new(2, false);
        let sents = corpus.read_all(&files, Path::new("en.txt"), "en").unwrap();

        // "hi" has fewer than 2 * 2 - 1 tokens
        assert_eq!(sents.len(), 2);
        assert_eq!(sents[0].len(), 6 + 2);
        assert_eq!(sents[1].len(), 3 + 2);
        for s in &sents {
            assert_eq!(s[0], BOS);
            assert_eq!(*s.last().unwrap(), EOS);
        }
        assert_eq!(corpus.lookup("en:hi"), None);

        let the = corpus.lookup("en:the").unwrap();
        assert_eq!(the, 3);
        assert_eq!(sents[0][1], the);
        assert_eq!(sents[0][5], the);
        assert_eq!(corpus.freq()[the], 3);
        assert_eq!(corpus.freq()[corpus.lookup("en:sat").unwrap()], 2);
        assert_eq!(&corpus.freq()[..3], &[0, 0, 0]);
    }

    #[test]
    fn ranges_partition_the_vocabulary() {
        let files = two_languages();
        let mut corpus = Corpus::new(2, false);
        corpus.read_all(&files, Path::new("en.txt"), "en").unwrap();
        corpus.read_all(&files, Path::new("it.txt"), "it").unwrap();
        corpus.set_i2w();

        let en = corpus.vocab_range("en").unwrap();
        let it = corpus.vocab_range("it").unwrap();
        assert_eq!(en.start, 3);
        assert_eq!(en.end, it.start);
        assert_eq!(it.end, corpus.get_vocabsize());
        assert!(corpus.vocab_range("fr").is_none());

        // identical surface forms stay apart across languages
        let it_ciao = corpus.lookup("it:ciao").unwrap();
        assert!(it.contains(&it_ciao));
        assert_eq!(corpus.freq()[it_ciao], 3);

        assert_eq!(corpus.i2w().len(), corpus.get_vocabsize());
        for (i, w) in corpus.i2w().iter().enumerate() {
            assert_eq!(corpus.lookup(w), Some(i));
        }
        assert_eq!(&corpus.i2w()[..3], &["<unk>", "<s>", "</s>"]);
    }

    #[test]
    fn range_is_recorded_only_after_exhaustion() {
        let files = two_languages();
        let mut corpus = Corpus::new(2, false);
        {
            let mut reader = corpus.read(&files, Path::new("en.txt"), "en", false).unwrap();
            assert!(reader.next().is_some());
        }
        assert!(corpus.vocab_range("en").is_none());
        assert!(corpus.freq().iter().all(|&c| c == 0));

        // a second pass only captures ids introduced during that pass
        let sents = corpus.read_all(&files, Path::new("en.txt"), "en").unwrap();
        assert_eq!(sents.len(), 2);
        let en = corpus.vocab_range("en").unwrap();
        assert!(en.start > 3);
        assert_eq!(en.end, corpus.get_vocabsize());
    }

    #[test]
    fn missing_file_is_an_error() {
        let files = two_languages();
        let mut corpus = Corpus::new(2, false);
        assert!(corpus.read_all(&files, Path::new("fr.txt"), "fr").is_err());
    }
}
