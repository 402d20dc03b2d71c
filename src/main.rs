use anyhow::{Context, Result, anyhow};
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::PathBuf;
use std::process;

use lora_mesh_simulator::common::config::{ConfigLoadError, SimulationConfig, load_config, validate_config};
use lora_mesh_simulator::simulation::{SimulationError, build_network, run_until_terminal};

const USAGE: &str = "usage: lora-mesh-simulator <nodeCount> <txPower> <spreadingFactor> <batteryCapacity> <packetSize> <period> [stopAtTraffic] [--config <file>] [--snapshot <file>]";

struct CliArgs {
    node_count: usize,
    tx_power_dbm: i32,
    spreading_factor: u8,
    battery_capacity: f64,
    packet_size: usize,
    /// 0 selects the duty-cycle sleep rule.
    period_s: f64,
    stop_at_traffic: Option<u64>,
    config_path: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
}

fn parse_positional<T: std::str::FromStr>(value: Option<&String>, name: &str) -> Result<T> {
    let value = value.ok_or_else(|| anyhow!("missing argument <{}>", name))?;
    value.parse().map_err(|_| anyhow!("invalid value '{}' for <{}>", value, name))
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut positional = Vec::new();
    let mut config_path = None;
    let mut snapshot_path = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| anyhow!("--config needs a file"))?;
                config_path = Some(PathBuf::from(path));
            }
            "--snapshot" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| anyhow!("--snapshot needs a file"))?;
                snapshot_path = Some(PathBuf::from(path));
            }
            arg if arg.starts_with("--") => return Err(anyhow!("unknown option {}", arg)),
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    if positional.len() > 7 {
        return Err(anyhow!("too many arguments"));
    }

    let mut values = positional.iter();
    Ok(CliArgs {
        node_count: parse_positional(values.next(), "nodeCount")?,
        tx_power_dbm: parse_positional(values.next(), "txPower")?,
        spreading_factor: parse_positional(values.next(), "spreadingFactor")?,
        battery_capacity: parse_positional(values.next(), "batteryCapacity")?,
        packet_size: parse_positional(values.next(), "packetSize")?,
        period_s: parse_positional(values.next(), "period")?,
        stop_at_traffic: match values.next() {
            Some(value) => Some(parse_positional(Some(value), "stopAtTraffic")?),
            None => None,
        },
        config_path,
        snapshot_path,
    })
}

fn apply_cli(config: &mut SimulationConfig, cli: &CliArgs) {
    config.run.node_count = cli.node_count;
    config.radio.node_tx_power_dbm = cli.tx_power_dbm;
    config.radio.spreading_factor = cli.spreading_factor;
    config.energy.battery_capacity = cli.battery_capacity;
    config.traffic.packet_payload_bytes = cli.packet_size;
    config.energy.period_s = (cli.period_s > 0.0).then_some(cli.period_s);
    if cli.stop_at_traffic.is_some() {
        config.run.stop_at_traffic = cli.stop_at_traffic;
    }
}

fn run(cli: CliArgs) -> Result<()> {
    let mut config = match &cli.config_path {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    apply_cli(&mut config, &cli);
    validate_config(&config)
        .map_err(SimulationError::InvalidConfig)
        .context("Invalid configuration")?;

    let seed = config.run.seed.unwrap_or_else(rand::random::<u64>);
    info!("Using seed {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut state = build_network(
        config.run.node_count,
        config.radio.node_tx_power_dbm,
        config.radio.carrier_frequency_mhz,
        config.clone(),
        &mut rng,
    )
    .context("Failed to build network")?;

    let formation = state.form_mesh().context("Mesh formation failed")?;
    println!(
        "Formation: {} joined, {} out of range, depth {}",
        formation.joined.len(),
        formation.out_of_range.len(),
        formation.depth
    );

    let reroute = state.apply_rerouting(config.traffic.reroute_passes).context("Rerouting failed")?;
    println!("Rerouting: {} moves, residual overflow {:?}", reroute.moves.len(), reroute.residual_overflow);

    println!("{}", state.gateway_summary());
    for summary in state.summaries()? {
        println!("{}", summary);
    }

    let summary = run_until_terminal(&mut state, &mut rng, config.run.max_iterations).context("Simulation run failed")?;
    println!(
        "Run: {} packets sent, {} delivered, {:.0} s simulated, stopped because {}",
        summary.iterations, summary.packets_delivered, summary.simulated_time_s, summary.outcome
    );
    for node in state.summaries()? {
        println!("{}", node);
    }

    if let Some(path) = &cli.snapshot_path {
        let json = state.snapshot()?.to_json().context("Failed to serialise snapshot")?;
        fs::write(path, json).with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        info!("Snapshot written to {}", path.display());
    }

    Ok(())
}

/// Exit status for a failed run: 2 when the configuration was at fault, 1 otherwise.
fn exit_code(error: &anyhow::Error) -> i32 {
    let config_error = error.chain().any(|cause| {
        cause.is::<ConfigLoadError>() || cause.downcast_ref::<SimulationError>().is_some_and(SimulationError::is_configuration_error)
    });
    if config_error { 2 } else { 1 }
}

fn main() {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("lora_mesh_simulator"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = run(cli) {
        warn!("Simulation aborted");
        eprintln!("Error: {:#}", e);
        process::exit(exit_code(&e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_arguments_map_onto_config() {
        let cli = parse_args(&args(&["40", "10", "9", "500", "30", "0", "100", "--snapshot", "out.json"])).unwrap();
        let mut config = SimulationConfig::default();
        apply_cli(&mut config, &cli);
        assert_eq!(config.run.node_count, 40);
        assert_eq!(config.radio.node_tx_power_dbm, 10);
        assert_eq!(config.radio.spreading_factor, 9);
        assert_eq!(config.energy.battery_capacity, 500.0);
        assert_eq!(config.traffic.packet_payload_bytes, 30);
        assert_eq!(config.energy.period_s, None);
        assert_eq!(config.run.stop_at_traffic, Some(100));
        assert_eq!(cli.snapshot_path, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn missing_or_bad_arguments_are_usage_errors() {
        assert!(parse_args(&args(&["40", "10", "9", "500", "30"])).is_err());
        assert!(parse_args(&args(&["forty", "10", "9", "500", "30", "60"])).is_err());
        assert!(parse_args(&args(&["40", "10", "9", "500", "30", "60", "--config"])).is_err());

        let cli = parse_args(&args(&["40", "10", "9", "500", "30", "60"])).unwrap();
        assert_eq!(cli.period_s, 60.0);
        assert_eq!(cli.stop_at_traffic, None);
    }

    #[test]
    fn out_of_range_spreading_factor_exits_with_config_status() {
        let cli = parse_args(&args(&["10", "14", "13", "100", "20", "0"])).unwrap();
        let error = run(cli).unwrap_err();
        assert!(error.chain().any(|cause| cause.is::<SimulationError>()));
        assert_eq!(exit_code(&error), 2);
    }

    #[test]
    fn config_file_failures_exit_with_config_status() {
        let error = anyhow::Error::new(ConfigLoadError::ParseError("expected `=`".to_string())).context("Failed to load config sim.toml");
        assert_eq!(exit_code(&error), 2);

        let mut cli = parse_args(&args(&["10", "14", "9", "100", "20", "0"])).unwrap();
        cli.config_path = Some(PathBuf::from("does/not/exist.toml"));
        assert_eq!(exit_code(&run(cli).unwrap_err()), 2);
    }

    #[test]
    fn runtime_failures_exit_with_general_status() {
        let error = anyhow::Error::new(SimulationError::NoNextHop { node_id: 3 }).context("Simulation run failed");
        assert_eq!(exit_code(&error), 1);
        assert_eq!(exit_code(&anyhow!("Failed to write snapshot out.json")), 1);
    }
}
