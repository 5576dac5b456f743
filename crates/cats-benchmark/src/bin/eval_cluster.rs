//! Clustering evaluation binary.
//!
//! Loads a self-describing checkpoint, the test embedding tables, and the
//! ground-truth qrels at both granularities, then reports per-page and mean
//! ARI for the model and the cosine/Euclidean baselines with paired t-tests.
//! Optionally also reports test loss/AUC from a pairs TSV and per-page AUC
//! from a parapairs file.
//!
//! # Usage
//!
//! ```bash
//! cats-eval-cluster --model models/triamese --data-dir data/
//! cats-eval-cluster --model models/qscale --data-dir data/ --parapairs parapairs.json
//! ```

use std::path::PathBuf;

use cats_benchmark::evaluator::ClusterEvaluator;
use cats_benchmark::loader::{read_article_qrels, read_parapairs, read_section_qrels};
use cats_benchmark::metrics::stats::TTestResult;
use cats_core::config::ComputeDevice;
use cats_core::dataset::PairDatasetBuilder;
use cats_core::io::{load_embedding_table, read_pairs_tsv};
use cats_core::model::ComparisonNetwork;
use cats_core::training::{baseline_aucs, roc_auc};

struct Args {
    model: PathBuf,
    data_dir: PathBuf,
    passage_ids: String,
    passage_vecs: String,
    query_ids: String,
    query_vecs: String,
    article_qrels: String,
    top_qrels: String,
    hier_qrels: String,
    pairs: Option<String>,
    parapairs: Option<String>,
    device: ComputeDevice,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/triamese"),
            data_dir: PathBuf::from("data"),
            passage_ids: "test-paraids.json".into(),
            passage_vecs: "test-paravecs.npy".into(),
            query_ids: "test-qids.json".into(),
            query_vecs: "test-qvecs.npy".into(),
            article_qrels: "article.qrels".into(),
            top_qrels: "top-level.qrels".into(),
            hier_qrels: "hierarchical.qrels".into(),
            pairs: None,
            parapairs: None,
            device: ComputeDevice::Cpu,
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
            "--model" | "-m" => args.model = PathBuf::from(take(&mut i)),
            "--data-dir" | "-d" => args.data_dir = PathBuf::from(take(&mut i)),
            "--passage-ids" => args.passage_ids = take(&mut i),
            "--passage-vecs" => args.passage_vecs = take(&mut i),
            "--query-ids" => args.query_ids = take(&mut i),
            "--query-vecs" => args.query_vecs = take(&mut i),
            "--article-qrels" => args.article_qrels = take(&mut i),
            "--top-qrels" => args.top_qrels = take(&mut i),
            "--hier-qrels" => args.hier_qrels = take(&mut i),
            "--pairs" => args.pairs = Some(take(&mut i)),
            "--parapairs" => args.parapairs = Some(take(&mut i)),
            "--device" => {
                let s = take(&mut i);
                args.device = ComputeDevice::parse(&s).unwrap_or_else(|| {
                    eprintln!("Unknown device: {s} (cpu|cuda|cuda:N)");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                println!("cats-eval-cluster: clustering evaluation of a CATS checkpoint");
                println!();
                println!("Usage: cats-eval-cluster [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -m, --model <DIR>         Checkpoint directory");
                println!("  -d, --data-dir <DIR>      Data directory (default: data)");
                println!("      --passage-ids/--passage-vecs <FILE>");
                println!("      --query-ids/--query-vecs <FILE>");
                println!("      --article-qrels <FILE> Page -> passages qrels");
                println!("      --top-qrels <FILE>     Top-level ground truth");
                println!("      --hier-qrels <FILE>    Hierarchical ground truth");
                println!("      --pairs <FILE>         Optional pairs TSV for test AUC");
                println!("      --parapairs <FILE>     Optional parapairs JSON for page AUC");
                println!("      --device <D>           cpu|cuda|cuda:N (default: cpu)");
                println!("  -h, --help                Show this help");
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

fn print_t_test(label: &str, result: &Option<TTestResult>) {
    match result {
        Some(t) => println!(
            "{label}: t = {:.4}, df = {}, p = {:.5}",
            t.statistic, t.df, t.p_value
        ),
        None => println!("{label}: not enough pages for a paired test"),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = parse_args();
    let device = args.device.resolve().expect("Failed to resolve device");
    let at = |name: &str| args.data_dir.join(name);

    let network =
        ComparisonNetwork::load(&args.model, &device).expect("Failed to load checkpoint");
    println!("=== CATS clustering evaluation ===");
    println!("Model:   {} ({})", args.model.display(), network.variant());
    println!("Emb dim: {}", network.emb_dim());
    println!();

    let passages = load_embedding_table(&at(&args.passage_ids), &at(&args.passage_vecs), &device)
        .expect("Failed to load passage table");
    let queries = load_embedding_table(&at(&args.query_ids), &at(&args.query_vecs), &device)
        .expect("Failed to load query table");

    // Optional pairwise test report, as at the end of training.
    if let Some(ref pairs_file) = args.pairs {
        let pairs = read_pairs_tsv(&at(pairs_file)).expect("Failed to read pairs");
        let builder = PairDatasetBuilder::new(&queries, &passages, device.clone())
            .expect("Mismatched embedding dimensions");
        let dataset = builder.build_flat(&pairs).expect("Failed to build dataset");
        let scores = network
            .forward(&dataset.features)
            .expect("Forward pass failed");
        let loss: f32 = scores
            .sub(&dataset.labels)
            .and_then(|d| d.sqr())
            .and_then(|d| d.mean_all())
            .and_then(|d| d.to_scalar())
            .expect("Loss computation failed");
        let pred = scores.to_vec1::<f32>().expect("Score extraction failed");
        let labels = dataset
            .labels
            .to_vec1::<f32>()
            .expect("Label extraction failed");
        let auc = roc_auc(&pred, &labels);
        let baselines = baseline_aucs(&dataset.features, &dataset.labels, network.emb_dim())
            .expect("Baseline computation failed");
        println!("Test loss:      {loss:.5}");
        println!("Test AUC:       {auc:.5}");
        println!("Cosine AUC:     {:.5}", baselines.cosine_auc);
        println!("Euclidean AUC:  {:.5}", baselines.euclidean_auc);
        println!();
    }

    let page_paras =
        read_article_qrels(&at(&args.article_qrels)).expect("Failed to read article qrels");
    let evaluator = ClusterEvaluator::new(&network, &queries, &passages, device.clone())
        .expect("Failed to build evaluator");

    for (granularity, qrels_file) in [
        ("top-level", &args.top_qrels),
        ("hierarchical", &args.hier_qrels),
    ] {
        let para_labels =
            read_section_qrels(&at(qrels_file)).expect("Failed to read section qrels");
        let report = evaluator
            .evaluate_pages(&page_paras, &para_labels)
            .expect("Cluster evaluation failed");

        println!("=== {granularity} ground truth ({} pages) ===", report.pages.len());
        for page in &report.pages {
            println!(
                "  {}: ARI {:.4} (cosine {:.4}, euclidean {:.4}, {} passages, {} clusters)",
                page.page,
                page.model_ari,
                page.cosine_ari,
                page.euclidean_ari,
                page.passages,
                page.clusters
            );
        }
        println!("Mean ARI (model):     {:.5}", report.mean_model_ari);
        println!("Mean ARI (cosine):    {:.5}", report.mean_cosine_ari);
        println!("Mean ARI (euclidean): {:.5}", report.mean_euclidean_ari);
        print_t_test("model vs cosine", &report.model_vs_cosine);
        print_t_test("model vs euclidean", &report.model_vs_euclidean);
        println!();
    }

    if let Some(ref parapairs_file) = args.parapairs {
        let parapairs =
            read_parapairs(&at(parapairs_file)).expect("Failed to read parapairs");
        let report = evaluator
            .parapairs_auc(&parapairs)
            .expect("Parapairs evaluation failed");
        println!("=== parapairs AUC ({} pages) ===", report.pages.len());
        for (page, auc) in &report.pages {
            println!("  {page}: AUC {auc:.4}");
        }
        println!("Mean AUC: {:.5}", report.mean_auc);
    }

    println!("Done.");
}
