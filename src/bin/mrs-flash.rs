//! Command-line front end: wires a transport, a power agent and the
//! session/module controllers together for one programming action.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

#[cfg(not(feature = "socketcan-bus"))]
use anyhow::bail;
use anyhow::{Context, Result};
use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;

use mrs_flash::{
    Config, FileSrecords, ManualPower, ModuleController, ParameterInput, ProgressSink,
    SessionController,
};

#[derive(Parser)]
#[command(
    name = "mrs-flash",
    about = "Host-side programmer for MRS Microplex 7* and CC16 CAN bootloader modules"
)]
struct Cli {
    /// CAN interface name, e.g. can0.
    #[arg(long, default_value = "can0")]
    interface_name: String,

    /// Interface channel, for adapters multiplexing several buses.
    #[arg(long, default_value = "")]
    interface_channel: String,

    /// CAN bitrate in kbit/s.
    #[arg(long, default_value_t = 500)]
    bitrate: u32,

    #[command(flatten)]
    action: Action,

    /// Cycle power (off, then T30+T15) after a successful upload/erase.
    #[arg(long)]
    power_cycle_after_upload: bool,

    /// Apply T30+T15 (run the application) after a successful upload/erase.
    #[arg(long)]
    kl15_after_upload: bool,

    /// Print console output after a successful upload/erase.
    #[arg(long)]
    console_after_upload: bool,

    /// Leave module power on at exit instead of turning it off.
    #[arg(long)]
    no_power_off: bool,

    /// Raise logging to debug level.
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Action {
    /// Upload an S-record file.
    #[arg(long, value_name = "FILE")]
    upload: Option<PathBuf>,

    /// Erase the module's flash without uploading.
    #[arg(long)]
    erase: bool,

    /// Print console output until interrupted.
    #[arg(long)]
    console: bool,

    /// Print every readable EEPROM parameter.
    #[arg(long)]
    print_parameters: bool,

    /// Set the bootloader CAN bitrate, in kbit/s.
    #[arg(long, value_name = "N")]
    set_bootloader_bitrate: Option<u32>,

    /// Set the module name (max 30 bytes).
    #[arg(long, value_name = "S")]
    set_module_name: Option<String>,

    /// Set the software version string (max 20 bytes).
    #[arg(long, value_name = "S")]
    set_software_version: Option<String>,
}

/// Renders an ERASE/FLASH progress update as a 60-column bar.
struct StdoutProgress;
impl ProgressSink for StdoutProgress {
    fn progress(&mut self, title: &str, position: u32, limit: u32) {
        let scale = 60 / limit.max(1);
        let filled = (position * scale) as usize;
        let bar: String = (0..60)
            .map(|i| if i < filled { '#' } else { '-' })
            .collect();
        println!("{title:>5} [{bar}] {position}/{limit}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).expect("filter literal is valid"))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config {
        interface_name: cli.interface_name.clone(),
        interface_channel: cli.interface_channel.clone(),
        bitrate: cli.bitrate,
        verbose: cli.verbose,
    };

    let bus = open_bus(&cli.interface_name)?;
    let mut session = SessionController::new(bus, ManualPower, config);

    let module_id = session.detect().context("detecting module")?;
    tracing::info!(module_id = format_args!("{module_id:#010x}"), "module ready");

    {
        let mut module = ModuleController::new(&mut session, module_id);
        run_action(&cli.action, &mut module)?;
    }

    if cli.power_cycle_after_upload {
        session.set_power_off();
        thread::sleep(Duration::from_millis(250));
        session.set_power_t30_t15();
    } else if cli.kl15_after_upload {
        session.set_power_t30_t15();
    }

    if cli.console_after_upload || cli.action.console {
        loop {
            let data = session.get_console_data().context("reading console")?;
            print!("{}", String::from_utf8_lossy(&data));
        }
    }

    if !cli.no_power_off {
        session.set_power_off();
    }

    Ok(())
}

fn run_action<B: mrs_flash::BusAdapter, P: mrs_flash::PowerAgent>(
    action: &Action,
    module: &mut ModuleController<'_, B, P>,
) -> Result<()> {
    if let Some(path) = &action.upload {
        let srecords = FileSrecords::load(path)
            .with_context(|| format!("reading S-record file {}", path.display()))?;
        module
            .upload(&srecords, &mut StdoutProgress)
            .context("uploading firmware")?;
        return Ok(());
    }
    if action.erase {
        module.erase(&mut StdoutProgress).context("erasing flash")?;
        return Ok(());
    }
    if action.console {
        return Ok(());
    }
    if action.print_parameters {
        let names: Vec<&'static str> = module.parameter_names().collect();
        for name in names {
            let value = module.parameter(name).with_context(|| format!("reading {name}"))?;
            println!("{name} = {value:?}");
        }
        return Ok(());
    }
    if let Some(kbps) = action.set_bootloader_bitrate {
        module
            .set_parameter("BaudrateBootloader1", ParameterInput::U32(kbps))
            .context("setting bootloader bitrate")?;
        return Ok(());
    }
    if let Some(name) = &action.set_module_name {
        module
            .set_parameter("ModuleName", ParameterInput::Str(name.clone()))
            .context("setting module name")?;
        return Ok(());
    }
    if let Some(version) = &action.set_software_version {
        module
            .set_parameter("SoftwareVersion", ParameterInput::Str(version.clone()))
            .context("setting software version")?;
        return Ok(());
    }
    unreachable!("clap's required/multiple=false group guarantees exactly one action")
}

#[cfg(feature = "socketcan-bus")]
fn open_bus(interface: &str) -> Result<mrs_flash::SocketCanBus> {
    mrs_flash::SocketCanBus::open(interface)
        .with_context(|| format!("opening CAN interface {interface}"))
}

#[cfg(not(feature = "socketcan-bus"))]
fn open_bus(_interface: &str) -> Result<mrs_flash::bus::SimulatedBus> {
    bail!("this build has no CAN transport compiled in (rebuild with --features socketcan-bus)")
}
