//! Activity HMM CLI
//!
//! Command-line interface for training, prediction, and evaluation over
//! pre-extracted feature sequences.

use activity_hmm::data::{read_sequences_csv, write_predictions_csv};
use activity_hmm::labeling::{evaluate, ActivityClassifier};
use activity_hmm::models::{CovarianceKind, HmmParams, TrainConfig, TrainStatus};
use activity_hmm::persist::{load_classifier, save_classifier};
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "activity_hmm")]
#[command(about = "Gaussian HMM training and decoding for activity sequences")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on a labeled feature CSV
    Train {
        /// Input CSV (sequence_id,activity,f0,...)
        #[arg(short, long)]
        input: String,

        /// Number of hidden states
        #[arg(short = 'n', long, default_value = "5")]
        states: usize,

        /// Maximum training iterations
        #[arg(long, default_value = "100")]
        iterations: usize,

        /// Log-likelihood convergence tolerance
        #[arg(long, default_value = "1e-4")]
        tolerance: f64,

        /// Elementwise variance floor
        #[arg(long, default_value = "1e-6")]
        variance_floor: f64,

        /// Estimate full covariance matrices instead of diagonal
        #[arg(long)]
        full_covariance: bool,

        /// RNG seed for initialization
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output model file
        #[arg(short, long)]
        output: String,
    },

    /// Classify sequences with a trained model
    Predict {
        /// Trained model file
        #[arg(short, long)]
        model: String,

        /// Input CSV (activity column may be empty)
        #[arg(short, long)]
        input: String,

        /// Optional CSV output for predictions
        #[arg(short, long)]
        output: Option<String>,

        /// Also print the decoded state path per sequence
        #[arg(long)]
        paths: bool,
    },

    /// Evaluate a trained model against labeled sequences
    Eval {
        /// Trained model file
        #[arg(short, long)]
        model: String,

        /// Labeled input CSV
        #[arg(short, long)]
        input: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("activity_hmm=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            input,
            states,
            iterations,
            tolerance,
            variance_floor,
            full_covariance,
            seed,
            output,
        } => {
            train_model(
                &input,
                states,
                iterations,
                tolerance,
                variance_floor,
                full_covariance,
                seed,
                &output,
            )?;
        }
        Commands::Predict {
            model,
            input,
            output,
            paths,
        } => {
            predict(&model, &input, output.as_deref(), paths)?;
        }
        Commands::Eval { model, input } => {
            eval_model(&model, &input)?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn train_model(
    input: &str,
    states: usize,
    iterations: usize,
    tolerance: f64,
    variance_floor: f64,
    full_covariance: bool,
    seed: u64,
    output: &str,
) -> Result<()> {
    println!("{}", "Loading sequences...".cyan());
    let sequences = read_sequences_csv(input)?;
    let n_frames: usize = sequences.iter().map(|s| s.len()).sum();
    println!(
        "Loaded {} sequences ({} frames, {} features)",
        sequences.len(),
        n_frames,
        sequences.first().map(|s| s.dim()).unwrap_or(0)
    );

    println!(
        "{}",
        format!("Training {states}-state HMM (max {iterations} iterations)...").cyan()
    );
    let init = HmmParams::kmeans_seeded(states, &sequences, seed)?;
    let config = TrainConfig {
        max_iterations: iterations,
        tolerance,
        variance_floor,
        covariance: if full_covariance {
            CovarianceKind::Full
        } else {
            CovarianceKind::Diagonal
        },
        seed: Some(seed),
    };
    let (classifier, summary) = ActivityClassifier::train(init, &sequences, config)?;

    match summary.status {
        TrainStatus::Converged { iterations } => println!(
            "{}",
            format!(
                "Converged after {} iterations, log-likelihood {:.4}",
                iterations, summary.log_likelihood
            )
            .green()
        ),
        TrainStatus::MaxIterationsReached => println!(
            "{}",
            format!(
                "Iteration cap reached, log-likelihood {:.4}",
                summary.log_likelihood
            )
            .yellow()
        ),
    }
    if summary.degenerate_resets > 0 {
        println!(
            "{}",
            format!("{} state(s) reinitialized during training", summary.degenerate_resets)
                .yellow()
        );
    }

    println!("\nTransition Matrix:");
    let trans = classifier.params().transition();
    for i in 0..states {
        print!("  State {}: ", i);
        for j in 0..states {
            print!("{:.2}  ", trans[[i, j]]);
        }
        println!();
    }

    println!("\nState labels:");
    for s in 0..states {
        println!("  State {} -> {}", s, classifier.label_map().label_of(s));
    }

    save_classifier(output, &classifier)?;
    println!("{}", format!("Saved model to {}", output).green());

    Ok(())
}

fn predict(model: &str, input: &str, output: Option<&str>, paths: bool) -> Result<()> {
    println!("{}", "Loading model...".cyan());
    let classifier = load_classifier(model)?;

    println!("{}", "Loading sequences...".cyan());
    let sequences = read_sequences_csv(input)?;

    let predictions = classifier.predict_batch(&sequences)?;

    println!("\n{}", "=== Predictions ===".bold());
    let mut rows = Vec::with_capacity(sequences.len());
    for (seq, pred) in sequences.iter().zip(&predictions) {
        let id = seq.id().unwrap_or("<unnamed>");
        println!(
            "  {} {} (log-prob {:.2})",
            id,
            pred.label.bold(),
            pred.path.log_prob
        );
        if paths {
            let path: Vec<String> = pred.path.states.iter().map(|s| s.to_string()).collect();
            println!("    path: {}", path.join(" "));
        }
        rows.push((id.to_string(), pred.label.clone()));
    }

    if let Some(path) = output {
        write_predictions_csv(path, &rows)?;
        println!("\n{}", format!("Saved predictions to {}", path).green());
    }

    Ok(())
}

fn eval_model(model: &str, input: &str) -> Result<()> {
    println!("{}", "Loading model...".cyan());
    let classifier = load_classifier(model)?;

    println!("{}", "Loading sequences...".cyan());
    let sequences = read_sequences_csv(input)?;

    let report = evaluate(&classifier, &sequences)?;

    println!("\n{}", "=== Evaluation ===".bold());
    print!("{report}");

    Ok(())
}
