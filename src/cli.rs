// Command-line arguments for the lyric-rnn trainer.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lyric_rnn::{Budget, RnnError, TrainConfig};

/// Train a character-level RNN on song lyrics and print samples as it learns.
#[derive(Parser, Debug)]
#[command(name = "lyric-rnn")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// CSV files (with --column) or plain text files, one record per file
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Read the named column from each CSV input
    #[arg(short = 'c', long = "column")]
    pub column: Option<String>,

    /// Text placed between records; accepts \n and \t escapes
    #[arg(long = "separator", default_value = "\\n\\n")]
    pub separator: String,

    /// JSON file with training settings; flags below override it
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "hidden-size")]
    pub hidden_size: Option<usize>,

    #[arg(long = "window")]
    pub window: Option<usize>,

    #[arg(long = "learning-rate")]
    pub learning_rate: Option<f32>,

    #[arg(long = "weight-decay")]
    pub weight_decay: Option<f32>,

    #[arg(long = "clip")]
    pub clip: Option<f32>,

    #[arg(long = "init-scale")]
    pub init_scale: Option<f32>,

    /// Symbols per sample
    #[arg(long = "sample-len")]
    pub sample_len: Option<usize>,

    /// Steps between samples
    #[arg(long = "sample-every")]
    pub sample_every: Option<usize>,

    /// Steps between printing the latest sample
    #[arg(long = "print-every")]
    pub print_every: Option<usize>,

    /// Steps between loss log lines
    #[arg(long = "log-every")]
    pub log_every: Option<usize>,

    #[arg(long = "temperature")]
    pub temperature: Option<f32>,

    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Stop after this many steps
    #[arg(long = "steps")]
    pub steps: Option<usize>,

    /// Stop after this many seconds
    #[arg(long = "time-limit", allow_negative_numbers = true)]
    pub time_limit: Option<f64>,
}

impl Cli {
    /// The config file (or defaults) with every given flag applied on top.
    pub fn train_config(&self) -> lyric_rnn::Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };
        config.hidden_size = self.hidden_size.unwrap_or(config.hidden_size);
        config.window = self.window.unwrap_or(config.window);
        config.learning_rate = self.learning_rate.unwrap_or(config.learning_rate);
        config.weight_decay = self.weight_decay.unwrap_or(config.weight_decay);
        config.clip = self.clip.unwrap_or(config.clip);
        config.init_scale = self.init_scale.unwrap_or(config.init_scale);
        config.sample_len = self.sample_len.unwrap_or(config.sample_len);
        config.sample_every = self.sample_every.unwrap_or(config.sample_every);
        config.print_every = self.print_every.unwrap_or(config.print_every);
        config.log_every = self.log_every.unwrap_or(config.log_every);
        config.temperature = self.temperature.unwrap_or(config.temperature);
        config.seed = self.seed.or(config.seed);
        config.validate()?;
        Ok(config)
    }

    /// Step and wall-clock limits. A time limit must be a non-negative
    /// number of seconds that fits in a `Duration`.
    pub fn budget(&self) -> lyric_rnn::Result<Budget> {
        let time_limit = self
            .time_limit
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|e| {
                    RnnError::InvalidConfig(format!("time limit {secs} is not usable: {e}"))
                })
            })
            .transpose()?;
        Ok(Budget {
            max_steps: self.steps,
            time_limit,
        })
    }

    #[must_use]
    pub fn separator(&self) -> String {
        unescape(&self.separator)
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["lyric-rnn"]).is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["lyric-rnn", "songs.txt"]);
        assert_eq!(cli.inputs, vec![PathBuf::from("songs.txt")]);
        assert!(cli.column.is_none());
        assert_eq!(cli.separator(), "\n\n");
        assert_eq!(cli.train_config().unwrap(), TrainConfig::default());
        assert_eq!(cli.budget().unwrap(), Budget::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "lyric-rnn",
            "a.csv",
            "b.csv",
            "-c",
            "lyrics",
            "--hidden-size",
            "64",
            "--window",
            "16",
            "--learning-rate",
            "0.01",
            "--seed",
            "42",
            "--steps",
            "1000",
            "--time-limit",
            "1.5",
        ]);
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(cli.column.as_deref(), Some("lyrics"));
        let config = cli.train_config().unwrap();
        assert_eq!(config.hidden_size, 64);
        assert_eq!(config.window, 16);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.sample_len, 500);
        let budget = cli.budget().unwrap();
        assert_eq!(budget.max_steps, Some(1000));
        assert_eq!(budget.time_limit, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_cli_rejects_invalid_override() {
        let cli = Cli::parse_from(["lyric-rnn", "a.txt", "--window", "0"]);
        assert!(cli.train_config().is_err());
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hidden_size": 32, "window": 10}}"#).unwrap();
        file.flush().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::parse_from([
            "lyric-rnn",
            "a.txt",
            "--config",
            path.as_str(),
            "--window",
            "12",
        ]);
        let config = cli.train_config().unwrap();
        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.window, 12);
    }

    #[test]
    fn test_cli_rejects_bad_time_limit() {
        for bad in ["-5", "1e20", "NaN", "inf"] {
            let cli = Cli::parse_from(["lyric-rnn", "a.txt", "--time-limit", bad]);
            assert!(
                matches!(cli.budget(), Err(RnnError::InvalidConfig(_))),
                "time limit {bad}"
            );
        }
        let cli = Cli::parse_from(["lyric-rnn", "a.txt", "--time-limit", "0"]);
        assert_eq!(cli.budget().unwrap().time_limit, Some(Duration::ZERO));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\n\\n"), "\n\n");
        assert_eq!(unescape("a\\tb"), "a\tb");
        assert_eq!(unescape(" | "), " | ");
        assert_eq!(unescape("\\x"), "\\x");
        assert_eq!(unescape("end\\"), "end\\");
    }
}
