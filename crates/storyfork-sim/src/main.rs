use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use storyfork_core::ForkConfig;
use storyfork_sim::{run_scenario, run_simulator, SimulatorConfig};

fn cli() -> Command {
    Command::new("storyfork-sim")
        .version(storyfork_service::VERSION)
        .about("Exercise the storyfork branch-tree service")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("max-branches")
                .long("max-branches")
                .global(true)
                .value_parser(value_parser!(usize))
                .help("Override the fork-width limit"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run random concurrent mutations and check every published tree")
                .arg(
                    Arg::new("stories")
                        .long("stories")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Stories shared by all actors"),
                )
                .arg(
                    Arg::new("actors")
                        .long("actors")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent actors"),
                )
                .arg(
                    Arg::new("ops")
                        .long("ops")
                        .default_value("250")
                        .value_parser(value_parser!(u64))
                        .help("Operations per actor"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for each actor's operation sequence"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop all actors after the first violation"),
                ),
        )
        .subcommand(
            Command::new("scenario").about("Run the scripted session and print each step as JSON"),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<ForkConfig> {
    // global flags may follow the subcommand
    let matches = matches.subcommand().map_or(matches, |(_, sub)| sub);
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ForkConfig::from_path(path)?,
        None => ForkConfig::default(),
    };
    if let Some(max) = matches.get_one::<usize>("max-branches") {
        config = config.with_max_branches(*max);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    storyfork_service::init(&config)?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let sim = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
                stories: args.get_one::<usize>("stories").copied().unwrap_or(4),
                actors: args.get_one::<usize>("actors").copied().unwrap_or(8),
                ops_per_actor: args.get_one::<u64>("ops").copied().unwrap_or(250),
                fork: config,
                stop_on_first_violation: args.get_flag("stop-on-violation"),
            };

            let report = run_simulator(sim).await?;
            println!("{}", report.generate_text());

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("scenario", _)) => {
            let steps = run_scenario(config).await?;
            println!("{}", serde_json::to_string_pretty(&steps)?);
        }
        _ => unreachable!("subcommand required"),
    }
    Ok(())
}
