use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use config_file::FromConfigFile;
use rustvi::config::RunConfig;
use rustvi::logger::CsvProgress;
use rustvi::render::{GridLayout, HeatmapRenderer, NoRender, Renderer};
use rustvi::rollout::MonteCarloRollout;
use rustvi::stopping::StoppingRule;
use rustvi::{Result, TabularEnv, TabularMdp, TabularPolicy, TabularValueFun, ValueIteration};

/// Pixels per state in rendered frames.
const CELL_PIXELS: usize = 16;

/// Command line argument parser.
#[derive(Parser, Debug)]
#[command(about = "Solve finite MDPs with tabular value iteration", long_about = None)]
pub struct Args {
    /// Path to the TOML run configuration.
    config_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run value iteration and print the final values and policy.
    Solve,
    /// Print transition and reward tensors.
    Show,
    /// Print the worst-case stopping bound for the configured model.
    Bound,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    log::info!("reading config file {}", args.config_path.display());
    let config = RunConfig::from_config_file(&args.config_path)?;
    let mdp = config.env.build()?;

    match &args.command {
        Commands::Solve => {
            let (rows, cols) = config.env.board();
            let layout = GridLayout::new(rows, cols, CELL_PIXELS);
            if config.engine.render {
                let renderer = HeatmapRenderer::new(config.output.dir.clone(), layout);
                solve(&mdp, &config, layout, renderer)
            } else {
                solve(&mdp, &config, layout, NoRender)
            }
        }
        Commands::Show => {
            println!("discount: {}", mdp.discount());
            for a in 0..mdp.num_actions() {
                println!("\n=== Action {a} transitions [state, next state] ===");
                println!("{:8.4}", mdp.transitions().index_axis(ndarray::Axis(1), a));
                println!("\n=== Action {a} rewards [state, next state] ===");
                println!("{:8.4}", mdp.rewards().index_axis(ndarray::Axis(1), a));
            }
            Ok(())
        }
        Commands::Bound => {
            let rule = StoppingRule::for_env(&mdp, config.engine.precision);
            println!("Rmax:                 {}", rule.rmax);
            println!("Residual threshold:   {:e}", rule.residual_threshold());
            match rule.certified_iteration() {
                Some(n) => println!("Certified iteration:  {n}"),
                None => println!("Certified iteration:  never"),
            }
            Ok(())
        }
    }
}

fn solve<D: Renderer<TabularMdp>>(
    mdp: &TabularMdp, config: &RunConfig, layout: GridLayout, mut renderer: D,
) -> Result<()> {
    let mut value_fun = TabularValueFun::zeros(mdp.num_states());
    let mut policy = TabularPolicy::zeros(mdp.num_states(), mdp.num_actions());
    let mut rollout = MonteCarloRollout::new(&config.rollout).with_layout(layout);
    let mut progress = CsvProgress::create(Path::new(&config.output.dir))?;

    let report = {
        let mut vi = ValueIteration::new(mdp, &mut value_fun, &mut policy, config.engine.clone())?;
        vi.train(&mut rollout, &mut progress, &mut renderer)?
    };

    println!(
        "{} after {} iterations, final average return {:.4}",
        if report.converged { "Converged" } else { "Stopped" },
        report.iterations,
        report.final_return
    );
    println!("\n=== Values ===");
    println!("{:8.4}", value_fun.values());
    println!("\n=== Policy [state, action] ===");
    println!("{:6.3}", policy.probs());
    let greedy = (0..policy.num_states())
        .map(|s| policy.greedy_action(s))
        .collect::<Result<Vec<usize>>>()?;
    println!("\n=== Greedy action per state ===");
    for row in greedy.chunks(layout.cols.max(1)) {
        println!("{row:?}");
    }
    Ok(())
}
