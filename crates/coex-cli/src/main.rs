//! coexctl
//!
//! Computes the Wi-Fi channels to avoid for a given set of active cellular
//! carriers, using a coex rule table.
//!
//! ```text
//! coexctl --table coex_table.toml --cell lte:40:2399900:10000
//! coexctl --table coex_table.toml --cell lte:46:5150000:1000 \
//!         --subscription 1 --avoid-softap --json
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use coex_core::cell::CellularChannel;
use coex_core::config::CoexConfig;
use coex_core::restriction::{CarrierConfig, StaticCarrierConfigs, SubscriptionId};
use coex_core::rules::RuleTable;
use coex_core::{CoexCollaborators, CoexEngine, CoexEvents, TelephonySource};

#[derive(Parser, Debug)]
#[command(name = "coexctl", about = "Wi-Fi / cellular coexistence calculator")]
struct Cli {
    /// Engine config (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rule table (TOML). Overrides `table_path` from the config.
    #[arg(long)]
    table: Option<PathBuf>,

    /// Active cellular carrier: rat:band:dl_khz:dl_bw_khz[:ul_khz:ul_bw_khz].
    #[arg(long = "cell")]
    cells: Vec<CellularChannel>,

    /// Active data subscription id.
    #[arg(long, default_value_t = 1)]
    subscription: SubscriptionId,

    /// Carrier asks to keep SoftAP off 5 GHz while LAA is active.
    #[arg(long, default_value_t = false)]
    avoid_softap: bool,

    /// Carrier asks to keep Wi-Fi Direct off 5 GHz while LAA is active.
    #[arg(long, default_value_t = false)]
    avoid_wifi_direct: bool,

    #[arg(long, default_value_t = false)]
    disable_default_algorithm: bool,

    /// Print the snapshot as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Print the full engine state instead of the snapshot.
    #[arg(long, default_value_t = false)]
    dump: bool,
}

/// Hands the engine's event sink back to `main`.
#[derive(Default)]
struct CliTelephony {
    events: Mutex<Option<CoexEvents>>,
}

impl TelephonySource for CliTelephony {
    fn register(&self, events: CoexEvents) {
        if let Ok(mut slot) = self.events.lock() {
            *slot = Some(events);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CoexConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            CoexConfig::from_toml_str(&text).map_err(anyhow::Error::msg)?
        }
        None => CoexConfig::default(),
    };
    if let Some(table) = &cli.table {
        config.table_path = Some(table.clone());
    }
    if cli.disable_default_algorithm {
        config.default_algorithm_enabled = false;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let table = match &config.table_path {
        Some(path) => RuleTable::from_file(path)?,
        None => {
            tracing::warn!("no rule table given; only carrier restrictions apply");
            RuleTable::empty()
        }
    };

    let carriers = Arc::new(StaticCarrierConfigs::new());
    carriers.set(
        cli.subscription,
        CarrierConfig {
            avoid_5ghz_softap_for_laa: cli.avoid_softap,
            avoid_5ghz_wifi_direct_for_laa: cli.avoid_wifi_direct,
        },
    );
    let telephony = Arc::new(CliTelephony::default());

    let engine = CoexEngine::with_config(
        &config,
        table,
        CoexCollaborators {
            carrier_configs: carriers,
            telephony: Some(telephony.clone()),
            ..CoexCollaborators::default()
        },
    );

    let events = telephony.events.lock().ok().and_then(|slot| slot.clone());
    match events {
        Some(events) => {
            events.active_subscription_changed(cli.subscription)?;
            events.cell_channels_changed(cli.cells.clone())?;
        }
        None if !cli.cells.is_empty() => {
            tracing::warn!(cells = cli.cells.len(), "default algorithm inactive; cells ignored");
        }
        None => {}
    }

    if cli.dump {
        println!("{}", engine.dump()?);
    } else if cli.json {
        println!("{}", serde_json::to_string_pretty(&*engine.snapshot())?);
    } else {
        println!("{}", engine.snapshot());
    }
    Ok(())
}
