use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser};

use klz_codecs::default_codec;
use klz_core::request::DEFAULT_SUFFIX;
use klz_core::{AtomicFileTranscoder, Level, Mode, Suffix, TranscodeRequest};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "klzip",
    about = "gzip-compatible compression with atomic file replacement",
    version,
    group(
        ArgGroup::new("preset")
            .args(["fast", "best", "l1", "l2", "l3", "l4", "l5", "l6", "l7", "l8", "l9"])
            .multiple(false)
    )
)]
struct Cli {
    /// Files to compress, decompress, or test
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Decompress instead of compressing
    #[arg(short, long)]
    decompress: bool,

    /// Test the integrity of compressed files
    #[arg(short, long, conflicts_with = "decompress")]
    test: bool,

    /// Overwrite existing output files
    #[arg(short, long)]
    force: bool,

    /// Keep (don't delete) input files
    #[arg(short, long)]
    keep: bool,

    /// Do not save the original file name and timestamp
    #[arg(short = 'n', long, conflicts_with = "name")]
    no_name: bool,

    /// Save the original file name and timestamp (default)
    #[arg(short = 'N', long)]
    name: bool,

    /// Sync-flush every 64 KiB so unchanged regions compress identically
    #[arg(long)]
    rsyncable: bool,

    /// Suffix for compressed files
    #[arg(short = 'S', long, default_value = DEFAULT_SUFFIX)]
    suffix: String,

    /// Compression level, 1 (fastest) to 9 (best)
    #[arg(
        short,
        long,
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..=9)
    )]
    level: u32,

    /// Same as --level 1
    #[arg(long)]
    fast: bool,

    /// Same as --level 9
    #[arg(long)]
    best: bool,

    /// -1 (fastest) through -9 (best), gzip style
    #[arg(short = '1')]
    l1: bool,
    #[arg(short = '2', hide = true)]
    l2: bool,
    #[arg(short = '3', hide = true)]
    l3: bool,
    #[arg(short = '4', hide = true)]
    l4: bool,
    #[arg(short = '5', hide = true)]
    l5: bool,
    #[arg(short = '6', hide = true)]
    l6: bool,
    #[arg(short = '7', hide = true)]
    l7: bool,
    #[arg(short = '8', hide = true)]
    l8: bool,
    #[arg(short = '9')]
    l9: bool,

    /// Report each file's sizes and timing
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.test {
            Mode::Test
        } else if self.decompress {
            Mode::Decompress
        } else {
            Mode::Compress
        }
    }

    /// Level picked by `--fast`, `--best` or a digit flag, if any.
    fn preset(&self) -> Option<u32> {
        let digits = [
            self.l1, self.l2, self.l3, self.l4, self.l5, self.l6, self.l7, self.l8, self.l9,
        ];
        if self.fast {
            Some(1)
        } else if self.best {
            Some(9)
        } else {
            digits.iter().position(|&set| set).map(|i| i as u32 + 1)
        }
    }

    fn level(&self) -> anyhow::Result<Level> {
        let level = self.preset().unwrap_or(self.level);
        Level::new(level).context("invalid --level")
    }

    fn request(&self, source: &Path, suffix: &Suffix, level: Level) -> TranscodeRequest {
        TranscodeRequest {
            suffix: suffix.clone(),
            level,
            overwrite: self.force,
            keep_source: self.keep,
            embed_name: !self.no_name,
            chunked: self.rsyncable,
            verbose: self.verbose,
            ..TranscodeRequest::new(source, self.mode())
        }
    }
}

// ── Logging ────────────────────────────────────────────────────────────────

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let suffix = Suffix::new(&cli.suffix).context("invalid --suffix")?;
    let level = cli.level()?;
    let transcoder = AtomicFileTranscoder::new(default_codec());

    let mut failed = 0usize;
    for file in &cli.files {
        let request = cli.request(file, &suffix, level);
        match transcoder.run(&request) {
            Ok(outcome) => log::debug!("{:?}", outcome),
            Err(err) => {
                log::error!("{}", err);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", failed, cli.files.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("klzip").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_compress_with_name_at_level_5() {
        let cli = parse(&["a.txt"]);
        let req = cli.request(Path::new("a.txt"), &Suffix::default(), cli.level().unwrap());
        assert_eq!(req.mode, Mode::Compress);
        assert_eq!(req.level.get(), 5);
        assert!(req.embed_name);
        assert!(!req.chunked);
        assert_eq!(req.suffix.as_str(), ".gz");
    }

    #[test]
    fn flags_map_onto_request() {
        let cli = parse(&["-d", "-k", "-f", "-n", "--rsyncable", "-v", "x.gz", "y.gz"]);
        assert_eq!(cli.files.len(), 2);
        let req = cli.request(&cli.files[1], &Suffix::default(), cli.level().unwrap());
        assert_eq!(req.mode, Mode::Decompress);
        assert!(req.keep_source && req.overwrite && req.chunked && req.verbose);
        assert!(!req.embed_name);
        assert_eq!(req.source, PathBuf::from("y.gz"));
    }

    #[test]
    fn fast_and_best_override_level() {
        assert_eq!(parse(&["--fast", "a"]).level().unwrap(), Level::FASTEST);
        assert_eq!(parse(&["--best", "a"]).level().unwrap(), Level::BEST);
        assert_eq!(parse(&["-l", "7", "a"]).level().unwrap().get(), 7);
    }

    #[test]
    fn digit_flags_pick_level() {
        for digit in 1..=9u32 {
            let flag = format!("-{}", digit);
            let cli = parse(&[flag.as_str(), "a.txt"]);
            assert_eq!(cli.level().unwrap().get(), digit);
            assert_eq!(cli.files, vec![PathBuf::from("a.txt")]);
        }
        assert_eq!(parse(&["-3", "-l", "8", "a"]).level().unwrap().get(), 3);
    }

    #[test]
    fn rejects_bad_combinations() {
        let bad: &[&[&str]] = &[
            &["-n", "-N", "a"],
            &["-d", "-t", "a"],
            &["--fast", "--best", "a"],
            &["-1", "-9", "a"],
            &["--fast", "-6", "a"],
            &["-l", "0", "a"],
            &["-l", "10", "a"],
            &[],
        ];
        for args in bad {
            let argv = std::iter::once("klzip").chain(args.iter().copied());
            assert!(Cli::try_parse_from(argv).is_err(), "{:?}", args);
        }
    }
}
