//! strata-complete: Batched text completion from a vocabulary and bigram model.

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;

use strata_generation::cli;
use strata_generation::engine::generate::DEFAULT_SEED;
use strata_generation::engine::CompletionPrediction;
use strata_generation::GenerationParams;

#[derive(Parser)]
#[command(name = "strata-complete", about = "Complete a batch of text prompts")]
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

    /// Prompt text (repeat for a batch)
    #[arg(short = 'p', long, conflicts_with_all = ["file", "stdin"])]
    prompt: Vec<String>,

    /// Read prompts from file, one per line
    #[arg(short = 'f', long, conflicts_with = "stdin")]
    file: Option<PathBuf>,

    /// Read prompts from stdin, one per line
    #[arg(long)]
    stdin: bool,

    /// Maximum tokens to generate per prompt (default: max_seq_len - 1)
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

    /// Include the prompt in each completion
    #[arg(long)]
    echo: bool,

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
struct ConfigOutput {
    max_gen_len: Option<usize>,
    temperature: f32,
    top_p: f32,
    seed: u64,
}

#[derive(Serialize)]
struct CompletionOutput {
    prompt: String,
    #[serde(flatten)]
    prediction: CompletionPrediction,
}

#[derive(Serialize)]
struct JsonOutput {
    completions: Vec<CompletionOutput>,
    total_ms: f64,
    config: ConfigOutput,
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
    let prompts = cli::read_prompts(&args.prompt, args.file.as_deref(), args.stdin)?;

    let start = Instant::now();
    let mut generator =
        cli::load_generator(args.config.as_deref(), &args.model, &args.vocab, args.seed)?;

    let params = GenerationParams {
        temperature: args.temperature,
        top_p: args.top_p,
        max_gen_len: args.max_gen_len,
        logprobs: args.logprobs,
        echo: args.echo,
    };
    let refs: Vec<&str> = prompts.iter().map(String::as_str).collect();
    let predictions = generator.text_completion(&refs, &params)?;
    let total_ms = start.elapsed().as_secs_f64() * 1000.0;

    match args.output_format.as_str() {
        "json" => {
            let json = JsonOutput {
                completions: prompts
                    .into_iter()
                    .zip(predictions)
                    .map(|(prompt, prediction)| CompletionOutput { prompt, prediction })
                    .collect(),
                total_ms,
                config: ConfigOutput {
                    max_gen_len: args.max_gen_len,
                    temperature: args.temperature,
                    top_p: args.top_p,
                    seed: args.seed,
                },
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            for (prompt, prediction) in prompts.iter().zip(&predictions) {
                if !args.echo {
                    print!("{} ", prompt);
                }
                println!("{}", prediction.generation);
                if let (Some(tokens), Some(logprobs)) = (&prediction.tokens, &prediction.logprobs) {
                    for (token, lp) in tokens.iter().zip(logprobs) {
                        println!("  {:>12} {:>9.4}", token, lp);
                    }
                }
                println!();
            }
        }
    }

    Ok(())
}
