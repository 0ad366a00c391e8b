//! USB Periodic Bandwidth Scheduler - CLI entry point.

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::info;
use ratatui::prelude::*;
use std::io::stdout;
use std::path::PathBuf;

use usbsch::config::{Config, Outcome, StepOutcome, example_config, replay};
use usbsch::model::bandwidth::bandwidth_bar;
use usbsch::model::{
    DeviceContext, Direction, EndpointDescriptor, TransferType, UsbSpeed, format_load,
};
use usbsch::sched::{SchedEntry, Scheduler, need_bw_sch};
use usbsch::ui::{App, ViewMode, render};

#[derive(Parser)]
#[command(name = "usbsch")]
#[command(about = "Periodic bandwidth scheduler for USB host controllers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config / scenario file path (default: auto-detect)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the scenario and print every scheduling decision
    Simulate,

    /// Replay the scenario and show domain occupancy
    Summary {
        /// Also list the endpoints of each domain
        #[arg(short, long)]
        verbose: bool,
    },

    /// Replay the scenario and browse the result interactively
    View,

    /// Show the budget table of a single endpoint
    Budget {
        /// Device speed: low, full, high, super
        #[arg(long)]
        speed: String,
        /// Transfer type: int, isoc
        #[arg(long = "type")]
        transfer_type: String,
        /// Endpoint direction: in, out
        #[arg(long, default_value = "in")]
        dir: String,
        /// Max packet size in bytes
        #[arg(long)]
        maxp: u32,
        /// Max burst (additional transactions)
        #[arg(long, default_value_t = 0)]
        burst: u32,
        /// SuperSpeed isochronous Mult
        #[arg(long, default_value_t = 0)]
        mult: u32,
        /// Interval exponent (service every 2^N slots)
        #[arg(long, default_value_t = 0)]
        interval: u32,
        /// Max ESIT payload in bytes
        #[arg(long, default_value_t = 0)]
        esit_payload: u32,
        /// Device is behind a transaction translator
        #[arg(long)]
        tt: bool,
    },

    /// Print example config file
    InitConfig,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions early (doesn't need config)
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "usbsch", &mut std::io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load()?,
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.settings.log_level.as_str()),
    )
    .init();

    match cli.command {
        Some(Commands::Simulate) => {
            let (scheduler, outcomes) = run_scenario(&config)?;
            print_outcomes(&outcomes);
            scheduler.teardown();
        }
        Some(Commands::Summary { verbose }) => {
            let (scheduler, _) = run_scenario(&config)?;
            print_summary(&scheduler, &config, verbose);
            scheduler.teardown();
        }
        Some(Commands::Budget {
            speed,
            transfer_type,
            dir,
            maxp,
            burst,
            mult,
            interval,
            esit_payload,
            tt,
        }) => {
            let Some(speed) = UsbSpeed::from_name(&speed) else {
                bail!("unknown speed '{}'", speed);
            };
            let Some(transfer_type) = TransferType::from_name(&transfer_type) else {
                bail!("unknown transfer type '{}'", transfer_type);
            };
            let Some(direction) = Direction::from_name(&dir) else {
                bail!("unknown direction '{}'", dir);
            };
            let mut device = DeviceContext::new(1, speed, 1);
            device.has_tt = tt;
            let address = match direction {
                Direction::In => 0x81,
                Direction::Out => 0x01,
            };
            let ep = EndpointDescriptor::new(address, transfer_type, maxp, interval)
                .with_burst(burst, mult)
                .with_esit_payload(esit_payload);
            print_budget(&device, &ep)?;
        }
        Some(Commands::View) => {
            let (scheduler, outcomes) = run_scenario(&config)?;
            let app = App::new(&scheduler, &outcomes, config.settings.bar_width);
            run_tui(app)?;
            scheduler.teardown();
        }
        Some(Commands::InitConfig) => {
            print!("{}", example_config());
        }
        Some(Commands::Completions { .. }) => {
            // Handled above before loading config
            unreachable!()
        }
        None => {
            let (scheduler, outcomes) = run_scenario(&config)?;
            print_outcomes(&outcomes);
            println!();
            print_summary(&scheduler, &config, false);
            scheduler.teardown();
        }
    }

    Ok(())
}

fn run_scenario(config: &Config) -> Result<(Scheduler, Vec<StepOutcome>)> {
    let scheduler = Scheduler::init(config.layout())?;
    let outcomes = replay(config, &scheduler)?;
    info!(
        "replayed {} steps over {} domains",
        outcomes.len(),
        scheduler.domain_count()
    );
    Ok((scheduler, outcomes))
}

fn print_outcomes(outcomes: &[StepOutcome]) {
    let mut rejected = 0;
    for (i, outcome) in outcomes.iter().enumerate() {
        if matches!(outcome.outcome, Outcome::Rejected(_)) {
            rejected += 1;
        }
        println!("{:>3}  {}", i + 1, outcome);
    }
    if rejected > 0 {
        println!("Warning: {} endpoint(s) rejected (not enough bandwidth)", rejected);
    }
}

fn print_summary(scheduler: &Scheduler, config: &Config, verbose: bool) {
    println!("Bandwidth Domain Summary");
    println!("========================\n");

    let layout = scheduler.layout();
    let ss_domains = usize::from(layout.usb3_ports) * 2;

    for (index, domain) in scheduler.snapshot().iter().enumerate() {
        let speed = if index < ss_domains {
            UsbSpeed::Super
        } else {
            UsbSpeed::High
        };
        let usage = domain.usage(speed.bw_boundary());

        println!("{} ({})", layout.describe(index), speed.short_name());
        println!(
            "  Peak slot:  {} {} ({:.1}%)",
            format_load(usage.peak, usage.boundary),
            bandwidth_bar(usage.peak_percent(), config.settings.bar_width),
            usage.peak_percent()
        );
        println!("  Headroom:   {}", usage.headroom());
        println!("  Endpoints:  {}", domain.members().len());

        if verbose {
            for entry in domain.members() {
                let name = config
                    .device(entry.id.slot_id)
                    .and_then(|d| d.name.clone())
                    .unwrap_or_else(|| format!("slot {}", entry.id.slot_id));
                println!(
                    "    EP{:02X} {} [{}] esit={} offset={} budget={:?}",
                    entry.id.address,
                    entry.transfer_type,
                    name,
                    entry.esit,
                    entry.offset,
                    entry.budget_table
                );
            }
        }
        println!();
    }
}

fn print_budget(device: &DeviceContext, ep: &EndpointDescriptor) -> Result<()> {
    if !need_bw_sch(ep.transfer_type, device.speed, device.has_tt) {
        println!("{}: not scheduled by the bandwidth scheduler", ep);
        return Ok(());
    }

    let entry = SchedEntry::build(device, ep)?;
    println!("{} ({})", ep, device.speed);
    println!("  esit:        {}", entry.esit);
    println!("  pkts:        {}", entry.pkts);
    println!("  cs_count:    {}", entry.cs_count);
    println!("  burst_mode:  {}", entry.burst_mode);
    println!("  repeat:      {}", entry.repeat);
    println!("  cost/slot:   {}", entry.bw_cost_per_slot);
    println!("  budget:      {:?}", entry.budget_table);
    println!("  per interval: {} bytes", entry.bytes_per_interval());
    Ok(())
}

fn run_tui(mut app: App) -> Result<()> {
    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    loop {
        terminal.draw(|f| render(f, &app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') => break,
                KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
                KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
                KeyCode::Char('g') => app.goto_top(),
                KeyCode::Char('G') => app.goto_bottom(),
                KeyCode::Char('d') => app.set_view_mode(ViewMode::Domains),
                KeyCode::Char('s') => app.set_view_mode(ViewMode::Steps),
                KeyCode::Char('b') => app.toggle_bandwidth_bars(),
                KeyCode::Char('?') => app.show_help = !app.show_help,
                KeyCode::Esc => app.show_help = false,
                KeyCode::PageUp | KeyCode::Char('K') => app.scroll_details_up(),
                KeyCode::PageDown | KeyCode::Char('J') => app.scroll_details_down(),
                _ => {}
            }
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    Ok(())
}
