// lyric-rnn: train a character-level RNN on lyrics and print what it writes.

mod cli;

use anyhow::Context;
use clap::Parser;
use lyric_rnn::{read_csv_column, Corpus, TrainingSession};

use crate::cli::Cli;

fn load_corpus(cli: &Cli) -> anyhow::Result<Corpus> {
    let separator = cli.separator();
    let corpus = match &cli.column {
        Some(column) => {
            let mut records = Vec::new();
            for path in &cli.inputs {
                let rows = read_csv_column(path, column)
                    .with_context(|| format!("reading column {column:?} from {}", path.display()))?;
                records.extend(rows);
            }
            Corpus::from_records(records, &separator)?
        }
        None => Corpus::load_text_files(cli.inputs.as_slice(), &separator)?,
    };
    Ok(corpus)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lyric_rnn=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.train_config().context("loading training config")?;
    let budget = cli.budget()?;
    let corpus = load_corpus(&cli)?;
    tracing::info!(
        inputs = cli.inputs.len(),
        chars = corpus.len(),
        vocab = corpus.vocab().len(),
        "corpus ready"
    );

    let mut session = TrainingSession::new(corpus, config)?;
    if budget.max_steps.is_none() && budget.time_limit.is_none() {
        tracing::warn!("no --steps or --time-limit given; training until interrupted");
    }

    let summary = session.run(budget, |event| {
        println!(
            "\n--- iteration {} | smooth loss {:.4} ---\n{}\n{}",
            event.iteration,
            event.smooth_loss,
            event.text,
            "-".repeat(70)
        );
    })?;

    tracing::info!(
        steps = summary.steps,
        passes = summary.passes,
        best_loss = summary.best_loss,
        smooth_loss = summary.smooth_loss,
        secs = summary.elapsed.as_secs_f64(),
        "done"
    );
    Ok(())
}
