use anyhow::Context;
use clap::{Parser, Subcommand};
use ruidakit::commands::{
    decode_file, load_commands, load_moves, open_transport, parse_magic, render_decode,
    write_job_file,
};
use ruidakit::{
    execute_commands, init_logging, init_logging_json, Config, DummyLaser, DummyRotary,
    PanelClient, PanelCommand, ReadinessMonitor, RuidaLaser,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ruidakit", version = ruidakit::VERSION, about = "Ruida laser controller toolkit")]
struct Cli {
    /// Config file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Controller host, overrides the config file
    #[arg(long, global = true)]
    host: Option<String>,

    /// Controller model, selects the swizzle key
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log packets instead of sending them
    #[arg(long, global = true)]
    offline: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a captured stream or RD file
    Decode {
        file: PathBuf,
        /// The file is swizzled
        #[arg(long)]
        swizzled: bool,
        /// Swizzle key, defaults to the configured one
        #[arg(long, value_parser = parse_magic)]
        magic: Option<u8>,
        /// Print a summary of what the job does
        #[arg(long)]
        summary: bool,
        /// Print the decode as JSON
        #[arg(long)]
        json: bool,
    },
    /// Poll and print controller status
    Status {
        #[arg(long, default_value_t = 1)]
        polls: u32,
    },
    /// Send a panel command
    Panel {
        /// stop, origin, frame, y-up, y-down, z-up or z-down
        command: PanelCommand,
    },
    /// Build a job from a JSON move list and run it
    SendJob {
        moves: PathBuf,
        /// Absolute Z for the job
        #[arg(long)]
        z: Option<f64>,
    },
    /// Run a JSON list of planner commands
    Run {
        commands: PathBuf,
        /// Log the commands against an in-memory laser
        #[arg(long)]
        dummy: bool,
    },
    /// Build a job from a JSON move list and save it swizzled
    BuildJob {
        moves: PathBuf,
        out: PathBuf,
        #[arg(long)]
        z: Option<f64>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match Config::default_path() {
            Ok(path) => Config::load_or_default(&path)?,
            Err(_) => Config::default(),
        },
    };
    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
    }
    if let Some(profile) = &cli.profile {
        config.connection.profile = Some(profile.clone());
    }
    if cli.offline {
        config.connection.offline = true;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        init_logging_json()?;
    } else {
        init_logging()?;
    }
    let config = load_config(&cli)?;
    info!("ruidakit {} (built {})", ruidakit::VERSION, ruidakit::BUILD_DATE);

    match cli.command {
        Commands::Decode {
            file,
            swizzled,
            magic,
            summary,
            json,
        } => {
            let default_magic = config.connection.swizzle_magic();
            let key = swizzled.then(|| magic.unwrap_or(default_magic));
            let output = decode_file(&file, key)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", render_decode(&output, summary));
            }
        }
        Commands::Status { polls } => {
            let mut transport = open_transport(&config);
            let mut monitor = ReadinessMonitor::new();
            let policy = config.readiness_policy();
            for i in 0..polls {
                if i > 0 {
                    std::thread::sleep(policy.poll_delay);
                }
                match monitor.poll(&mut transport, &policy)? {
                    Some(state) => println!(
                        "{} x={:?} y={:?} z={:?}",
                        state.flags(),
                        state.x,
                        state.y,
                        state.z
                    ),
                    None => println!("no status (mode={})", transport.mode()),
                }
            }
        }
        Commands::Panel { command } => {
            let mut panel = if config.connection.offline {
                PanelClient::offline(config.panel_config())
            } else {
                PanelClient::new(config.panel_config())
            };
            panel.send(command)?;
            panel.close();
        }
        Commands::SendJob { moves, z } => {
            let moves = load_moves(&moves)?;
            let mut laser = RuidaLaser::new(open_transport(&config), config.laser_config());
            let result = laser.send_rd_job(&moves, z, true);
            laser.cleanup();
            result?;
            println!("Job with {} moves finished", moves.len());
        }
        Commands::Run { commands, dummy } => {
            let commands = load_commands(&commands)?;
            let mut rotary = DummyRotary::new();
            if dummy {
                execute_commands(&commands, &mut DummyLaser::new(), &mut rotary)?;
            } else {
                let mut laser = RuidaLaser::new(open_transport(&config), config.laser_config());
                execute_commands(&commands, &mut laser, &mut rotary)?;
            }
            println!("Ran {} commands", commands.len());
        }
        Commands::BuildJob { moves, out, z } => {
            let moves = load_moves(&moves)?;
            let written = write_job_file(&moves, z, &config, &out)?;
            println!("Wrote {} bytes to {}", written, out.display());
        }
    }
    Ok(())
}
