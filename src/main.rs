//! CLI entry point: load the source/target tables, build the shared
//! context, run the plain iterative loop and the evolutionary search, and
//! write the flat-text run report.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use serde::Deserialize;

use meda_search::baseline::{LabelPredictor, NearestCentroid, OneNearestNeighbor};
use meda_search::context::{AdaptContext, MedaParams};
use meda_search::data::{accuracy, load_table, rebase_labels, zscore_normalize};
use meda_search::discrepancy::{FixedMixing, MixingEstimator, ProxyDistanceMixing};
use meda_search::error::{AdaptError, Result};
use meda_search::evolve::{LabelSearch, SearchConfig};
use meda_search::matrices::KernelKind;
use meda_search::meda;
use meda_search::report::RunReport;
use meda_search::transform::IdentityTransform;

#[derive(Parser, Debug)]
#[command(name = "meda-search")]
#[command(about = "Evolutionary manifold-regularized domain adaptation")]
struct Args {
    /// Delimited source table (features plus trailing label column)
    #[arg(long, default_value = "Source")]
    source: PathBuf,

    /// Delimited target table (labels used only for evaluation)
    #[arg(long, default_value = "Target")]
    target: PathBuf,

    /// Where to write the run report
    #[arg(short, long, default_value = "run.txt")]
    output: PathBuf,

    /// TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Random seed for the evolutionary search
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Mixing-coefficient strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MixingChoice {
    #[default]
    Fixed,
    ProxyDistance,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunConfig {
    #[serde(default)]
    normalize: bool,
    /// Mutation rate as a percentage.
    #[serde(default = "default_mutation_pct")]
    mutation_rate_pct: f64,
    #[serde(default = "default_true")]
    opposite_init: bool,
    #[serde(default = "default_dim")]
    subspace_dim: usize,
    /// Ridge weight eta as a percentage.
    #[serde(default = "default_eta_pct")]
    eta_pct: f64,
    #[serde(default = "default_kernel")]
    kernel: String,
    #[serde(default = "default_gamma")]
    gamma: f64,
    #[serde(default = "default_neighbors")]
    neighbors: usize,
    #[serde(default = "default_lambda")]
    lambda: f64,
    #[serde(default = "default_rho")]
    rho: f64,
    #[serde(default = "default_population")]
    population: usize,
    #[serde(default = "default_generations")]
    generations: usize,
    #[serde(default = "default_iterations")]
    iterations: usize,
    #[serde(default)]
    mixing: MixingChoice,
}

fn default_mutation_pct() -> f64 {
    20.0
}
fn default_true() -> bool {
    true
}
fn default_dim() -> usize {
    20
}
fn default_eta_pct() -> f64 {
    10.0
}
fn default_kernel() -> String {
    "rbf".to_string()
}
fn default_gamma() -> f64 {
    0.5
}
fn default_neighbors() -> usize {
    10
}
fn default_lambda() -> f64 {
    10.0
}
fn default_rho() -> f64 {
    1.0
}
fn default_population() -> usize {
    50
}
fn default_generations() -> usize {
    10
}
fn default_iterations() -> usize {
    10
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            normalize: false,
            mutation_rate_pct: default_mutation_pct(),
            opposite_init: default_true(),
            subspace_dim: default_dim(),
            eta_pct: default_eta_pct(),
            kernel: default_kernel(),
            gamma: default_gamma(),
            neighbors: default_neighbors(),
            lambda: default_lambda(),
            rho: default_rho(),
            population: default_population(),
            generations: default_generations(),
            iterations: default_iterations(),
            mixing: MixingChoice::default(),
        }
    }
}

impl RunConfig {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let contents = std::fs::read_to_string(p)?;
                toml::from_str(&contents)
                    .map_err(|e| AdaptError::config(format!("{}: {}", p.display(), e)))?
            }
            None => RunConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.population < 2 {
            return Err(AdaptError::config("population size must be at least 2"));
        }
        if !(0.0..=100.0).contains(&self.mutation_rate_pct) {
            return Err(AdaptError::config(
                "mutation_rate_pct must lie in [0, 100]",
            ));
        }
        if self.neighbors == 0 {
            return Err(AdaptError::config("neighbor count must be positive"));
        }
        if self.gamma <= 0.0 {
            return Err(AdaptError::config("gamma must be positive"));
        }
        if self.eta_pct < 0.0 {
            return Err(AdaptError::config("eta_pct must be non-negative"));
        }
        Ok(())
    }

    fn meda_params(&self) -> Result<MedaParams> {
        Ok(MedaParams {
            kernel: self.kernel.parse::<KernelKind>()?,
            gamma: self.gamma,
            lambda: self.lambda,
            rho: self.rho,
            eta: self.eta_pct / 100.0,
            neighbors: self.neighbors,
            iterations: self.iterations,
        })
    }

    fn search_config(&self) -> SearchConfig {
        SearchConfig {
            population_size: self.population,
            generations: self.generations,
            mutation_rate: self.mutation_rate_pct / 100.0,
            opposite_init: self.opposite_init,
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = RunConfig::load(args.config.as_ref())?;
    let params = config.meda_params()?;

    let (mut xs, ys_raw) = load_table(&args.source)?;
    let (mut xt, yt_raw) = load_table(&args.target)?;
    if xs.ncols() != xt.ncols() {
        return Err(AdaptError::shape(format!(
            "source has {} features, target has {}",
            xs.ncols(),
            xt.ncols()
        )));
    }
    let (ys, yt, n_classes) = rebase_labels(&ys_raw, &yt_raw)?;
    log::info!(
        "loaded {} source and {} target samples, {} classes",
        xs.nrows(),
        xt.nrows(),
        n_classes
    );

    if config.normalize {
        zscore_normalize(&mut xs, &mut xt);
    }

    let mut report = RunReport::new();
    report.section("Setting");
    report.kv("Pop size", config.population);
    report.kv("Max generations", config.generations);
    report.kv("Normalize", config.normalize);
    report.kv("Mutation rate", config.mutation_rate_pct / 100.0);
    report.kv("Fully opposite initialize", config.opposite_init);
    report.kv("Subspace dim", config.subspace_dim);
    report.kv("Eta", params.eta);
    report.kv("Kernel", &config.kernel);
    report.section("End setting");

    // Baseline: single-neighbor classifier on the preprocessed features.
    let baseline = OneNearestNeighbor.fit_predict(&xs, &ys, &xt);
    report.kv("1NN accuracy", format!("{:.6}", accuracy(&baseline, &yt)));

    let ctx = AdaptContext::build(
        &xs,
        &ys,
        &xt,
        n_classes,
        &IdentityTransform,
        config.subspace_dim,
        &params,
    )?;

    let estimator: Box<dyn MixingEstimator> = match config.mixing {
        MixingChoice::Fixed => Box::new(FixedMixing::default()),
        MixingChoice::ProxyDistance => Box::new(ProxyDistanceMixing {
            seed: args.seed,
            ..ProxyDistanceMixing::default()
        }),
    };

    // Plain iterative loop.
    let start = Instant::now();
    let outcome = meda::fit_predict(&ctx, &params, estimator.as_ref())?;
    let meda_seconds = start.elapsed().as_secs_f64();
    report.kv(
        "MEDA accuracy",
        format!("{:.6}", accuracy(&outcome.labels, &yt)),
    );
    for (i, labels) in outcome.per_iteration.iter().enumerate() {
        report.line(format!(
            "MEDA iteration [{}/{}]: accuracy {:.6}",
            i + 1,
            params.iterations,
            accuracy(labels, &yt)
        ));
    }
    report.kv("MEDA time", format!("{:.3}", meda_seconds));

    // Evolutionary search seeded by the cheap classifiers.
    report.section("GA-MEDA");
    let seeders: Vec<Box<dyn LabelPredictor>> =
        vec![Box::new(OneNearestNeighbor), Box::new(NearestCentroid)];
    let search = LabelSearch::new(
        &ctx,
        &params,
        config.search_config(),
        estimator.as_ref(),
        &seeders,
        args.seed,
    );
    let search_outcome = search.run(&yt)?;

    for stats in &search_outcome.history {
        report.generation(stats);
    }
    report.final_results(&search_outcome);

    report.write_to(&args.output)?;
    println!("report written to {}", args.output.display());
    Ok(())
}

fn main() {
    let args = Args::parse();
    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
