use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, error, trace, LevelFilter};
use tokio::sync::mpsc;

use rnn_decoder::cancel::CancellationToken;
use rnn_decoder::convert::{convert_checkpoint, ConverterConfig};
use rnn_decoder::decode::{Decoder, DecodingStep};
use rnn_decoder::download;
use rnn_decoder::options::DecodingOptions;
use rnn_decoder::rnn::RnnLm;
use rnn_decoder::store;
use rnn_decoder::vocab::Vocabulary;

#[derive(Parser)]
#[command(
    name = "rnn-decoder",
    about = "Streaming decode engine for recurrent language models"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download model artifacts. The directory's last two components name
    /// the `organization/model` repository to fetch from.
    Download { model_dir: PathBuf },

    /// Convert a downloaded checkpoint into the runtime layout.
    Convert { model_dir: PathBuf },

    /// Read prompts from stdin, one per line, and stream generated text
    /// to stdout.
    Inference {
        model_dir: PathBuf,
        /// Log level (error, warn, info, debug, trace).
        log_level: Option<LevelFilter>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match &cli.command {
        Commands::Inference { log_level, .. } => log_level.unwrap_or(LevelFilter::Trace),
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    match cli.command {
        Commands::Download { model_dir } => {
            let model_name = model_name_from_dir(&model_dir)?;
            debug!("downloading model '{model_name}' into {}", model_dir.display());
            download::download(&model_dir, &model_name, false).await?;
            debug!("Done.");
        }
        Commands::Convert { model_dir } => {
            debug!("converting model in {}", model_dir.display());
            convert_checkpoint(ConverterConfig {
                model_dir,
                overwrite_if_exist: false,
            })?;
            debug!("Done.");
        }
        Commands::Inference { model_dir, .. } => {
            run_inference(model_dir).await?;
        }
    }
    Ok(())
}

/// The model repository name is the last two components of the model
/// directory, in `organization/model` form.
fn model_name_from_dir(path: &Path) -> Result<String> {
    let components: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    if components.len() < 2 {
        bail!("model dir must end with organization/model components");
    }
    Ok(format!(
        "{}/{}",
        components[components.len() - 2],
        components[components.len() - 1]
    ))
}

async fn run_inference(model_dir: PathBuf) -> Result<()> {
    debug!("Loading model...");
    let (model, vocab) = store::load(&model_dir)?;
    let vocab = Arc::new(vocab);
    debug!("Ready.");

    let options = DecodingOptions {
        min_len: 0,
        max_len: 200,
        end_token_id: 0,
        skip_end_token_id: true,
        temperature: 1.0,
        top_p: 0.8,
        top_k: 120,
        use_sampling: true,
        end_threshold: Some(1.0),
        stop_sequences_ids: vec![
            vec![187, 23433, 27],    // \nQuestion:
            vec![187, 50, 708, 329], // \nQ & A:
            vec![187, 50, 27],       // \nQ:
        ],
        ..Default::default()
    };
    let decoder = Decoder::new(Arc::new(model), options)?;

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim_end_matches('\n').trim_end_matches('\r');
        if text.is_empty() {
            continue;
        }
        let text = text.replace("\\n", "\n");

        // A failed prompt is logged and the loop moves on; only load-time
        // errors are fatal.
        if let Err(err) = run_prompt(&decoder, &vocab, &text).await {
            error!("{err:#}");
        }
    }
    Ok(())
}

async fn run_prompt(
    decoder: &Decoder<RnnLm>,
    vocab: &Arc<Vocabulary>,
    text: &str,
) -> Result<()> {
    let start = Instant::now();
    let prompt = vocab.tokenize(text).context("tokenizing prompt")?;

    // Sized to max_len so the producer never waits on the terminal.
    let (buffer, stream) = mpsc::channel(decoder.options().max_len);
    let consumer = tokio::spawn(render_stream(stream, vocab.clone()));

    let (cancel, handle) = CancellationToken::new();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let result = decoder.decode(&prompt, buffer, cancel).await;
    interrupt.abort();

    // The consumer drains the whole stream (after cancellation too)
    // before the prompt counts as complete.
    consumer.await??;

    let reason = result?;
    trace!(
        "Inference time: {:.2} seconds ({reason:?})",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Renders each streamed token through the vocabulary and closes the line
/// when the stream ends.
async fn render_stream(
    mut stream: mpsc::Receiver<DecodingStep>,
    vocab: Arc<Vocabulary>,
) -> Result<()> {
    let mut out = std::io::stdout();
    while let Some(step) = stream.recv().await {
        let token = vocab.token_by_id(step.token_id).with_context(|| {
            format!("failed to reconstruct text for token ID {}", step.token_id)
        })?;
        out.write_all(token.as_bytes())?;
        out.flush()?;
    }
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
