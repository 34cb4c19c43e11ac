use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facereg_core::{
    CenterCropLocator, DirectoryPersistence, EmbeddingStore, EnrollOutcome, FaceNetEmbedder,
    FacePipeline, MatchDecision, OnnxSpoofCheck, RecognitionOutcome, RegistrationSession,
    Thresholds,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod worker;

use config::Config;
use worker::{spawn_worker, WorkerHandle};

#[derive(Parser)]
#[command(name = "facereg", about = "Face enrollment and recognition")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the face in an image under an identity
    Enroll {
        /// Identity to enroll (re-enrolling replaces the stored face)
        #[arg(short, long)]
        id: String,
        /// Display name shown in messages
        #[arg(short, long, default_value = "")]
        name: String,
        /// Image containing the face
        image: PathBuf,
    },
    /// Recognize the face in an image against enrolled identities
    Recognize {
        /// Image containing the face
        image: PathBuf,
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// List enrolled identities
    List,
    /// Compare two enrolled identities
    Compare { a: String, b: String },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Enroll { id, name, image } => {
            let session = RegistrationSession::new(&id, &name)?;
            let image = open_image(&image)?;
            let worker = start_worker(&config)?;

            match worker.enroll(session.clone(), image).await? {
                EnrollOutcome::Enrolled { identity } => {
                    println!("Enrolled {} (id {identity})", session.display_name());
                }
                EnrollOutcome::NoFace => bail!("no face detected"),
                EnrollOutcome::SpoofDetected => bail!("spoof detected; face not enrolled"),
            }
        }
        Commands::Recognize { image, json } => {
            let image = open_image(&image)?;
            let worker = start_worker(&config)?;

            match worker.recognize(image).await? {
                RecognitionOutcome::Decision(decision) if json => {
                    println!("{}", serde_json::to_string_pretty(&decision)?);
                }
                RecognitionOutcome::Decision(decision) => {
                    print!("{}", render_decision(&decision, config.thresholds()));
                }
                RecognitionOutcome::NoFace => {
                    bail!("could not produce a probe: no face detected")
                }
            }
        }
        Commands::List => {
            let store = open_store(&config)?;
            let snapshot = store.snapshot();
            if snapshot.is_empty() {
                println!("No identities enrolled");
            }
            for record in snapshot.iter() {
                println!("{}\t{} values", record.identity, record.embedding.len());
            }
        }
        Commands::Compare { a, b } => {
            let store = open_store(&config)?;
            let snapshot = store.snapshot();
            let find = |id: &str| {
                snapshot
                    .iter()
                    .find(|r| r.identity == id)
                    .with_context(|| format!("identity {id:?} is not enrolled"))
            };
            let (ra, rb) = (find(&a)?, find(&b)?);
            println!(
                "Cosine Similarity: {:.4}\nEuclidean Distance: {:.4}",
                ra.embedding.similarity(&rb.embedding),
                ra.embedding.euclidean_distance(&rb.embedding),
            );
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("opening image {}", path.display()))
}

fn open_store(config: &Config) -> Result<EmbeddingStore> {
    let persistence = DirectoryPersistence::new(config.embeddings_dir());
    EmbeddingStore::open(persistence, config.embedding_dim).with_context(|| {
        format!(
            "loading enrollments from {}",
            config.embeddings_dir().display()
        )
    })
}

/// Load models and the store, then hand the pipeline to the worker thread.
fn start_worker(config: &Config) -> Result<WorkerHandle> {
    let store = Arc::new(open_store(config)?);
    let model = FaceNetEmbedder::load_with_dim(config.embedding_model_path(), config.embedding_dim)?;

    let mut pipeline = FacePipeline::new(CenterCropLocator, model, store, config.thresholds());
    if let Some(path) = config.spoof_model_path() {
        pipeline = pipeline.with_spoof_check(OnnxSpoofCheck::load(path, config.spoof_threshold)?);
    } else {
        tracing::debug!("no anti-spoof model configured; enrollment is ungated");
    }

    Ok(spawn_worker(pipeline)?)
}

/// Human-readable decision with both scores and the thresholds applied.
fn render_decision(decision: &MatchDecision, thresholds: Thresholds) -> String {
    let mut out = match decision.identity() {
        Some(identity) => format!(
            "Recognized: {identity}\nCosine Similarity: {:.4}\nEuclidean Distance: {:.4}\n",
            decision.best_cosine_similarity, decision.corresponding_euclidean_distance
        ),
        None => format!(
            "Not recognized\nBest Cosine Similarity: {:.4}\nEuclidean Distance: {:.4}\n",
            decision.best_cosine_similarity, decision.corresponding_euclidean_distance
        ),
    };
    out.push_str(&format!(
        "(Cosine Threshold: {}, Euclidean Threshold: {})\n",
        thresholds.cosine, thresholds.euclidean
    ));
    out
}
