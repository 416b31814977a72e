//! warped-gp CLI
//!
//! `warped-gp forecast` runs the expanding-window backtest on an `x,y` CSV
//! (stdin, `--input`, or the bundled `--selfcheck` series) and writes one
//! record per step to stdout. `warped-gp nlpd` scores such a file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use warped_gp::evaluation::{NlpdOptions, mean_nlpd};
use warped_gp::gp::{kernel::SimilarityKind, noise::NoiseKind};
use warped_gp::io::{RecordWriter, load_series};
use warped_gp::optimization::loglik_optimizer::{LineSearcher, MLEOptions, Tolerances};
use warped_gp::warping::{ForecastLoop, ForecastOptions, InitPolicy, ModelSpec, ModelVariant};

#[derive(Parser)]
#[command(name = "warped-gp")]
#[command(about = "Gaussian-process forecasting on a warped time axis")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-step-ahead forecasts over an expanding window
    Forecast(ForecastArgs),

    /// Average negative log predictive density of a forecast file
    Nlpd {
        /// Forecast CSV. Defaults to stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Initial records to skip
        #[arg(short, long, default_value = "0")]
        skip: usize,

        /// Add the recorded observation noise to the predictive variance
        #[arg(long)]
        with_noise: bool,

        /// Field separator
        #[arg(long, default_value = ",")]
        comma: char,
    },
}

#[derive(clap::Args)]
struct ForecastArgs {
    /// Input CSV of x,y lines. Defaults to stdin.
    #[arg(short, long, conflicts_with = "selfcheck")]
    input: Option<PathBuf>,

    /// Use the bundled demonstration series
    #[arg(long)]
    selfcheck: bool,

    /// Similarity kernel: matern, normal, seasonal[:period]
    #[arg(long, default_value = "matern")]
    kernel: String,

    /// Period of the seasonal kernel
    #[arg(long)]
    period: Option<f64>,

    /// Noise kernel: uniform, constant[:variance]
    #[arg(long, default_value = "uniform")]
    noise: String,

    /// Variance of the constant noise kernel
    #[arg(long)]
    noise_variance: Option<f64>,

    /// Parameter layout: warped, latent
    #[arg(long, default_value = "warped")]
    variant: String,

    /// Iteration cap per fit
    #[arg(long, default_value = "100")]
    max_iter: usize,

    /// Gradient-norm convergence threshold
    #[arg(long, default_value = "1e-6")]
    tol_grad: f64,

    /// Cost-change convergence threshold
    #[arg(long)]
    tol_cost: Option<f64>,

    /// L-BFGS line search: morethuente, hagerzhang
    #[arg(long, default_value = "morethuente")]
    line_search: String,

    /// Smallest fitted window
    #[arg(long, default_value = "2")]
    min_window: usize,

    /// Warn about optimizer failures within this many iterations
    #[arg(long, default_value = "1")]
    warn_within: usize,

    /// Initial point: zeros, jitter
    #[arg(long, default_value = "zeros")]
    init: String,

    /// Half-width of the jitter distribution
    #[arg(long, default_value = "0.1")]
    jitter_scale: f64,

    /// Jitter seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Keep outputs in their original units
    #[arg(long)]
    no_normalize: bool,

    /// Print the optimizer trace (needs the obs_slog feature)
    #[arg(long)]
    verbose: bool,
}

const SELFCHECK_DATA: &str = "0.1,-3.376024003717768007e+00
0.3,-1.977828720240523142e+00
0.5,-1.170229755402199645e+00
0.7,-9.583612412106726763e-01
0.9,-8.570477029219900622e-01
1.1,-8.907618364403485645e-01
1.3,-2.611461145416017482e-01
1.5,1.495844460881872728e-01
1.7,-4.165391766465373347e-01
1.9,-2.875013255153459069e-01
2.1,3.869524825854843142e-01
2.3,9.258652056784907325e-01
2.5,5.858145290237386504e-01
2.7,8.788023289396607041e-01
2.9,1.233057437482850682e+00
3.1,1.066540422694190138e+00
3.3,9.137144265931921305e-01
3.5,7.412075911286820640e-01
3.7,1.332146185234786673e+00
3.9,1.439962957400109378e+00
4.1,1.222960311200699257e+00
4.3,2.026371435028667956e-01
4.5,-1.659683673486037625e+00
4.7,-9.881392068563286113e-01
4.9,-3.948046844798779875e-01
5.1,-2.635420428119399916e-01
5.3,-1.610738281677652317e+00
5.5,-3.092358176820052540e-01
5.7,-2.958870744615414994e-01
5.9,-1.619124030623840138e+00
6.1,-1.241765328045226102e+00
6.3,-2.933200084576037536e-01
6.5,-6.066731986714126723e-01
6.7,5.866702176917204525e-01
6.9,6.282566869554838673e-01
7.1,1.013316587545910918e+00
7.3,1.123871563448763267e+00
7.5,1.094949286471081251e+00
7.7,1.113603299433020055e+00
7.9,8.567255613058102348e-01
8.1,7.384693873911447604e-01
8.3,3.434834982521656199e-01
8.5,-2.514717991306942083e-02
";

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Forecast(args) => cmd_forecast(&args),
        Commands::Nlpd { input, skip, with_noise, comma } => {
            cmd_nlpd(input.as_ref(), NlpdOptions { skip, with_noise, comma })
        }
    }
}

fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(p) => {
            let file = File::open(p).with_context(|| format!("opening {}", p.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn model_spec(args: &ForecastArgs) -> Result<ModelSpec> {
    let mut similarity: SimilarityKind = args.kernel.parse()?;
    if let Some(period) = args.period {
        match similarity {
            SimilarityKind::Seasonal { .. } => similarity = SimilarityKind::Seasonal { period },
            _ => bail!("--period only applies to the seasonal kernel"),
        }
    }
    let mut noise: NoiseKind = args.noise.parse()?;
    if let Some(variance) = args.noise_variance {
        match noise {
            NoiseKind::Constant { .. } => noise = NoiseKind::Constant { variance },
            NoiseKind::Uniform => bail!("--noise-variance only applies to the constant noise kernel"),
        }
    }
    Ok(ModelSpec { similarity, noise })
}

fn forecast_options(args: &ForecastArgs) -> Result<(MLEOptions, ForecastOptions)> {
    let tols = Tolerances::new(Some(args.tol_grad), args.tol_cost, Some(args.max_iter))?;
    let line_searcher: LineSearcher = args.line_search.parse()?;
    let mle = MLEOptions::new(tols, line_searcher, args.verbose, None)?;

    let init = match args.init.trim().to_lowercase().as_str() {
        "zeros" => InitPolicy::Zeros,
        "jitter" => InitPolicy::jitter(args.jitter_scale, args.seed)?,
        other => bail!("unknown --init '{other}': expected zeros or jitter"),
    };
    let variant: ModelVariant = args.variant.parse()?;
    let opts = ForecastOptions {
        min_window: args.min_window,
        warn_within: args.warn_within,
        init,
        variant,
        normalize: !args.no_normalize,
    };
    Ok((mle, opts))
}

fn cmd_forecast(args: &ForecastArgs) -> Result<()> {
    let spec = model_spec(args)?;
    let (mle, opts) = forecast_options(args)?;
    let fl = ForecastLoop::from_spec(&spec, mle, opts)?;

    info!("loading");
    let series = if args.selfcheck {
        load_series(SELFCHECK_DATA.as_bytes())?
    } else {
        load_series(open_input(args.input.as_ref())?).context("loading series")?
    };
    info!(points = series.len(), "loaded");

    let stdout = io::stdout();
    let mut writer = RecordWriter::new(BufWriter::new(stdout.lock()), fl.hyper_names());
    let steps = fl.for_each_step(&series, |record| writer.write(record))?;
    writer.flush()?;
    info!(steps, "done");
    Ok(())
}

fn cmd_nlpd(input: Option<&PathBuf>, opts: NlpdOptions) -> Result<()> {
    let summary = mean_nlpd(open_input(input)?, &opts).context("reading forecasts")?;
    info!(count = summary.count, invalid = summary.invalid, "scored");
    let mut out = io::stdout().lock();
    writeln!(out, "{:.6}", summary.mean)?;
    Ok(())
}
