//! Training binary for the CATS comparison networks.
//!
//! Loads train/test embedding tables and labeled-pair files, builds the flat
//! feature datasets, reports the untrained cosine/Euclidean baselines, runs
//! the training loop, and prints the terminal test report.
//!
//! # Usage
//!
//! ```bash
//! cats-train --data-dir data/ --variant triamese --epochs 20
//! cats-train --data-dir data/ --variant qscale --lr 0.0001 --save models/qscale
//! ```

use std::path::PathBuf;

use cats_core::config::ComputeDevice;
use cats_core::dataset::PairDatasetBuilder;
use cats_core::io::{
    load_embedding_table, load_feature_cache, read_pairs_tsv, save_feature_cache,
};
use cats_core::model::{ComparisonNetwork, Variant};
use cats_core::training::{AdamConfig, TrainConfig, Trainer};

/// CLI arguments.
struct Args {
    /// Directory prefixed onto every data file name.
    data_dir: PathBuf,
    train_pairs: String,
    test_pairs: String,
    train_passage_ids: String,
    train_passage_vecs: String,
    test_passage_ids: String,
    test_passage_vecs: String,
    train_query_ids: String,
    train_query_vecs: String,
    test_query_ids: String,
    test_query_vecs: String,
    variant: Variant,
    lr: f64,
    batch_size: usize,
    epochs: usize,
    seed: u64,
    device: ComputeDevice,
    shuffle: bool,
    /// Reuse/write built feature tensors under this directory.
    cache_dir: Option<PathBuf>,
    /// Save a checkpoint here after training.
    save: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            train_pairs: "train-qry-attn.tsv".into(),
            test_pairs: "test-qry-attn.tsv".into(),
            train_passage_ids: "train-paraids.json".into(),
            train_passage_vecs: "train-paravecs.npy".into(),
            test_passage_ids: "test-paraids.json".into(),
            test_passage_vecs: "test-paravecs.npy".into(),
            train_query_ids: "train-qids.json".into(),
            train_query_vecs: "train-qvecs.npy".into(),
            test_query_ids: "test-qids.json".into(),
            test_query_vecs: "test-qvecs.npy".into(),
            variant: Variant::Triamese,
            lr: 1e-4,
            batch_size: 32,
            epochs: 20,
            seed: 42,
            device: ComputeDevice::Cpu,
            shuffle: false,
            cache_dir: None,
            save: None,
        }
    }
}

fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args::default();

    let mut i = 1;
    while i < argv.len() {
        let mut take = |i: &mut usize| -> String {
            *i += 1;
            argv.get(*i).cloned().unwrap_or_else(|| {
                eprintln!("Missing value for {}", argv[*i - 1]);
                std::process::exit(1);
            })
        };
        match argv[i].as_str() {
            "--data-dir" | "-d" => args.data_dir = PathBuf::from(take(&mut i)),
            "--train-pairs" => args.train_pairs = take(&mut i),
            "--test-pairs" => args.test_pairs = take(&mut i),
            "--train-passage-ids" => args.train_passage_ids = take(&mut i),
            "--train-passage-vecs" => args.train_passage_vecs = take(&mut i),
            "--test-passage-ids" => args.test_passage_ids = take(&mut i),
            "--test-passage-vecs" => args.test_passage_vecs = take(&mut i),
            "--train-query-ids" => args.train_query_ids = take(&mut i),
            "--train-query-vecs" => args.train_query_vecs = take(&mut i),
            "--test-query-ids" => args.test_query_ids = take(&mut i),
            "--test-query-vecs" => args.test_query_vecs = take(&mut i),
            "--variant" | "-v" => {
                let s = take(&mut i);
                args.variant = Variant::parse(&s).unwrap_or_else(|| {
                    eprintln!("Unknown variant: {s} (triamese|scaled|qscale|manhattan)");
                    std::process::exit(1);
                });
            }
            "--lr" => args.lr = take(&mut i).parse().unwrap_or(1e-4),
            "--batch-size" | "-b" => args.batch_size = take(&mut i).parse().unwrap_or(32),
            "--epochs" | "-e" => args.epochs = take(&mut i).parse().unwrap_or(20),
            "--seed" => args.seed = take(&mut i).parse().unwrap_or(42),
            "--device" => {
                let s = take(&mut i);
                args.device = ComputeDevice::parse(&s).unwrap_or_else(|| {
                    eprintln!("Unknown device: {s} (cpu|cuda|cuda:N)");
                    std::process::exit(1);
                });
            }
            "--shuffle" => args.shuffle = true,
            "--cache-dir" => args.cache_dir = Some(PathBuf::from(take(&mut i))),
            "--save" | "-s" => args.save = Some(PathBuf::from(take(&mut i))),
            "--help" | "-h" => {
                println!("cats-train: train a CATS pairwise comparison network");
                println!();
                println!("Usage: cats-train [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --data-dir <DIR>        Data directory (default: data)");
                println!("      --train-pairs <FILE>    Train pairs TSV");
                println!("      --test-pairs <FILE>     Test pairs TSV");
                println!("      --train-passage-ids/--train-passage-vecs <FILE>");
                println!("      --test-passage-ids/--test-passage-vecs <FILE>");
                println!("      --train-query-ids/--train-query-vecs <FILE>");
                println!("      --test-query-ids/--test-query-vecs <FILE>");
                println!("  -v, --variant <V>           triamese|scaled|qscale|manhattan");
                println!("      --lr <F>                Learning rate (default: 0.0001)");
                println!("  -b, --batch-size <N>        Batch size (default: 32)");
                println!("  -e, --epochs <N>            Epochs (default: 20)");
                println!("      --seed <N>              Random seed (default: 42)");
                println!("      --device <D>            cpu|cuda|cuda:N (default: cpu)");
                println!("      --shuffle               Shuffle training batches per epoch");
                println!("      --cache-dir <DIR>       Cache built feature tensors");
                println!("  -s, --save <DIR>            Save a checkpoint after training");
                println!("  -h, --help                  Show this help");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }
    args
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = parse_args();
    let device = args.device.resolve().expect("Failed to resolve device");

    println!("=== CATS training ===");
    println!("Variant:    {}", args.variant);
    println!("Data dir:   {}", args.data_dir.display());
    println!("Batch size: {}", args.batch_size);
    println!("Epochs:     {}", args.epochs);
    println!("Seed:       {}", args.seed);
    println!();

    let cached = args.cache_dir.as_ref().and_then(|dir| {
        let train = load_feature_cache(dir, "train", &device).ok()?;
        let test = load_feature_cache(dir, "test", &device).ok()?;
        println!("Using cached feature tensors from {}", dir.display());
        Some((train, test))
    });

    let ((x_train, y_train), (x_test, y_test)) = match cached {
        Some(data) => data,
        None => {
            let at = |name: &str| args.data_dir.join(name);
            let train_passages = load_embedding_table(
                &at(&args.train_passage_ids),
                &at(&args.train_passage_vecs),
                &device,
            )
            .expect("Failed to load train passage table");
            let train_queries = load_embedding_table(
                &at(&args.train_query_ids),
                &at(&args.train_query_vecs),
                &device,
            )
            .expect("Failed to load train query table");
            let test_passages = load_embedding_table(
                &at(&args.test_passage_ids),
                &at(&args.test_passage_vecs),
                &device,
            )
            .expect("Failed to load test passage table");
            let test_queries = load_embedding_table(
                &at(&args.test_query_ids),
                &at(&args.test_query_vecs),
                &device,
            )
            .expect("Failed to load test query table");

            let train_pairs =
                read_pairs_tsv(&at(&args.train_pairs)).expect("Failed to read train pairs");
            let test_pairs =
                read_pairs_tsv(&at(&args.test_pairs)).expect("Failed to read test pairs");
            println!(
                "Pairs: {} train, {} test",
                train_pairs.len(),
                test_pairs.len()
            );

            let train_builder =
                PairDatasetBuilder::new(&train_queries, &train_passages, device.clone())
                    .expect("Mismatched train embedding dimensions");
            let test_builder =
                PairDatasetBuilder::new(&test_queries, &test_passages, device.clone())
                    .expect("Mismatched test embedding dimensions");

            let train = train_builder
                .build_flat(&train_pairs)
                .expect("Failed to build train dataset");
            let test = test_builder
                .build_flat(&test_pairs)
                .expect("Failed to build test dataset");
            if !train.missing_queries.is_empty() {
                println!(
                    "Skipped {} train queries without embeddings",
                    train.missing_queries.len()
                );
            }

            if let Some(ref dir) = args.cache_dir {
                save_feature_cache(dir, "train", &train.features, &train.labels)
                    .expect("Failed to write train cache");
                save_feature_cache(dir, "test", &test.features, &test.labels)
                    .expect("Failed to write test cache");
            }
            (
                (train.features, train.labels),
                (test.features, test.labels),
            )
        }
    };

    let width = x_train.dims2().expect("train features must be 2-D").1;
    let emb_dim = width / 3;
    println!(
        "Train features: {:?}, test features: {:?}, emb dim {emb_dim}",
        x_train.dims(),
        x_test.dims()
    );

    let network = ComparisonNetwork::new(args.variant, emb_dim, args.seed, &device)
        .expect("Failed to build network");
    let mut trainer = Trainer::new(
        network,
        TrainConfig {
            batch_size: args.batch_size,
            epochs: args.epochs,
            shuffle: args.shuffle,
            seed: args.seed,
            optimizer: AdamConfig {
                lr: args.lr,
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .expect("Failed to build trainer");

    trainer.fit(&x_train, &y_train).expect("Training failed");

    let report = trainer
        .test_report(&x_test, &y_test)
        .expect("Test evaluation failed");
    println!();
    println!("=== Test report ===");
    println!("Test loss:      {:.5}", report.loss);
    println!("Test AUC:       {:.5}", report.auc);
    println!("Cosine AUC:     {:.5}", report.baselines.cosine_auc);
    println!("Euclidean AUC:  {:.5}", report.baselines.euclidean_auc);

    if let Some(ref dir) = args.save {
        trainer
            .network()
            .save(dir)
            .expect("Failed to save checkpoint");
        println!("Checkpoint saved to {}", dir.display());
    }

    println!("Done.");
}
