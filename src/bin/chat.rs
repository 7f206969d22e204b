//! strata-chat: Next assistant turn for a batch of dialogs.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde::Serialize;

use strata_generation::cli;
use strata_generation::engine::generate::DEFAULT_SEED;
use strata_generation::engine::{ChatPrediction, Dialog};
use strata_generation::GenerationParams;

#[derive(Parser)]
#[command(name = "strata-chat", about = "Generate assistant replies for dialogs")]
struct Args {
    /// Path to the model JSON file (transition table)
    #[arg(short = 'm', long)]
    model: PathBuf,

    /// Path to the vocabulary JSON file
    #[arg(long)]
    vocab: PathBuf,

    /// Optional params JSON with max_seq_len / max_batch_size
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// JSON file holding an array of dialogs
    #[arg(short = 'f', long, conflicts_with = "stdin")]
    file: Option<PathBuf>,

    /// Read the dialogs JSON from stdin
    #[arg(long)]
    stdin: bool,

    /// Maximum tokens to generate per reply (default: max_seq_len - 1)
    #[arg(short = 'n', long)]
    max_gen_len: Option<usize>,

    /// Temperature (0.0 = greedy)
    #[arg(long, default_value = "0.6")]
    temperature: f32,

    /// Top-p (nucleus) sampling
    #[arg(long, default_value = "0.9")]
    top_p: f32,

    /// Random seed for sampling
    #[arg(short = 's', long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Report per-token log-probabilities
    #[arg(long)]
    logprobs: bool,

    /// Output format: text or json
    #[arg(long, default_value = "text", value_parser = validate_output_format)]
    output_format: String,

    /// Suppress all logging
    #[arg(long)]
    log_disable: bool,
}

fn validate_output_format(s: &str) -> Result<String, String> {
    match s {
        "text" | "json" => Ok(s.to_string()),
        _ => Err(format!(
            "Unknown output format '{}'. Options: text, json",
            s
        )),
    }
}

#[derive(Serialize)]
struct ChatOutput {
    dialog: Dialog,
    #[serde(flatten)]
    prediction: ChatPrediction,
}

fn main() {
    let args = Args::parse();
    cli::init_logging(args.log_disable);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let raw = cli::read_input(None, args.file.as_deref(), args.stdin)?;
    let dialogs = cli::parse_dialogs(&raw)?;

    let mut generator =
        cli::load_generator(args.config.as_deref(), &args.model, &args.vocab, args.seed)?;

    let params = GenerationParams {
        temperature: args.temperature,
        top_p: args.top_p,
        max_gen_len: args.max_gen_len,
        logprobs: args.logprobs,
        echo: false,
    };
    let predictions = generator.chat_completion(&dialogs, &params)?;

    match args.output_format.as_str() {
        "json" => {
            let out: Vec<ChatOutput> = dialogs
                .into_iter()
                .zip(predictions)
                .map(|(dialog, prediction)| ChatOutput { dialog, prediction })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            for (dialog, prediction) in dialogs.iter().zip(&predictions) {
                for msg in dialog {
                    println!("{}: {}", msg.role, msg.content);
                }
                println!(
                    "> {}: {}",
                    prediction.generation.role, prediction.generation.content
                );
                println!();
            }
        }
    }

    Ok(())
}
