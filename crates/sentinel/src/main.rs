//! `sentinel` - CLI for the fraud-defense agent
//!
//! This binary runs the agent loop (in the terminal or behind the browser
//! dashboard) and inspects or adjusts the stored state.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use sentinel::cli::{
    Cli, Command, ConfigCommand, ImportCommand, OutputFormat, ServeCommand, SimulateCommand,
    StatusCommand, ThresholdCommand, TransactionsCommand,
};
use sentinel::dataset::{self, ImportReport};
use sentinel::runner::{self, AgentControl};
use sentinel::server::{self, AppState};
use sentinel::{init_logging, Config, SentinelAgent, Storage, Transaction, TransactionFilter};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match cli.command {
        // Config commands must work even when the config is broken
        Command::Config(cmd) => handle_config(cli.config, cmd),
        command => {
            let config =
                Config::load_from(cli.config).context("failed to load configuration")?;
            dispatch(config, command)
        }
    }
}

fn dispatch(config: Config, command: Command) -> Result<()> {
    match command {
        Command::Serve(cmd) => handle_serve(config, &cmd),
        Command::Simulate(cmd) => handle_simulate(config, &cmd),
        Command::Step(cmd) => handle_step(config, cmd.count),
        Command::Status(cmd) => handle_status(config, &cmd),
        Command::Logs(cmd) => handle_logs(&config, cmd.limit),
        Command::Transactions(cmd) => handle_transactions(&config, &cmd),
        Command::Import(cmd) => handle_import(&config, cmd),
        Command::Reset(cmd) => handle_reset(config, cmd.yes),
        Command::Threshold(cmd) => handle_threshold(config, cmd),
        Command::Inject(cmd) => handle_inject(config, cmd.scenario.into()),
        Command::Config(cmd) => handle_config(None, cmd),
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

fn open_agent(config: Config) -> Result<SentinelAgent> {
    let storage = open_storage(&config)?;
    Ok(SentinelAgent::new(config, storage)?)
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn handle_serve(mut config: Config, cmd: &ServeCommand) -> Result<()> {
    if let Some(bind) = &cmd.bind {
        config.server.bind.clone_from(bind);
    }
    let bind = config.bind_addr()?;
    let period = config.loop_interval();
    let autostart = cmd.autostart || config.agent.autostart;

    let mut agent = open_agent(config)?;
    agent.initialize()?;

    let state = AppState {
        agent: runner::share(agent),
        control: AgentControl::new(),
        autostart,
    };

    println!("Sentinel dashboard at http://{bind}");
    build_runtime()?.block_on(server::serve(state, bind, period))?;
    Ok(())
}

fn handle_simulate(mut config: Config, cmd: &SimulateCommand) -> Result<()> {
    if let Some(interval_ms) = cmd.interval_ms {
        if interval_ms == 0 {
            bail!("--interval-ms must be greater than 0");
        }
        config.agent.loop_interval_ms = interval_ms;
    }
    let period = config.loop_interval();

    let mut agent = open_agent(config)?;
    agent.initialize()?;

    let mut out = io::stdout().lock();
    let completed = build_runtime()?.block_on(runner::run_console(
        &mut agent,
        cmd.cycles,
        period,
        &mut out,
    ))?;
    drop(out);

    let stats = agent.stats();
    println!();
    println!(
        "{completed} cycles: {} processed, {} blocked, {} investigated, {} alerts",
        stats.processed, stats.blocked, stats.investigated, stats.alerts
    );
    println!("Fraud threshold: {:.2}", agent.fraud_threshold()?);
    Ok(())
}

fn handle_step(config: Config, count: u32) -> Result<()> {
    let mut agent = open_agent(config)?;
    agent.initialize()?;

    for _ in 0..count {
        let report = agent.run_cycle()?;
        for entry in &report.logs {
            println!("{}", entry.render());
        }
        println!(
            "    threshold {:.2} -> {:.2}, {} evaluated, {} findings",
            report.threshold_before,
            report.threshold_after,
            report.evaluated,
            report.findings.len()
        );
    }
    Ok(())
}

fn handle_status(config: Config, cmd: &StatusCommand) -> Result<()> {
    let database_path = config.database_path();
    let learning_mode = config.learning.mode;
    let agent = open_agent(config)?;
    let storage_stats = agent.storage().stats()?;
    let dashboard = agent.dashboard_stats()?;
    let policy = agent.policy()?;

    if cmd.json {
        let status = serde_json::json!({
            "database_path": database_path,
            "learning_mode": learning_mode,
            "policy": policy,
            "dashboard": dashboard,
            "storage": storage_stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("sentinel status");
        println!("---------------");
        println!("Database:         {}", database_path.display());
        println!("Size:             {} bytes", storage_stats.db_size_bytes);
        println!("Learning mode:    {learning_mode:?}");
        println!("Fraud threshold:  {:.2}", policy.fraud_threshold);
        println!("High risk above:  {}", policy.high_risk_trigger);
        println!("Max retries:      {}", policy.max_retries);
        println!();
        println!("Transactions:     {}", storage_stats.total_transactions);
        println!("  failed:         {}", storage_stats.failed);
        println!("  blocked:        {}", storage_stats.blocked);
        println!("  high fraud:     {}", storage_stats.high_fraud_count);
        println!("Failure rate:     {:.2}%", dashboard.failure_rate);
        println!("Avg risk score:   {:.2}", dashboard.avg_risk_score);
        println!("Open cases:       {}", storage_stats.open_investigations);
        println!("Log entries:      {}", storage_stats.log_entries);
        if let (Some(oldest), Some(newest)) = (
            storage_stats.oldest_transaction,
            storage_stats.newest_transaction,
        ) {
            println!("Oldest:           {}", oldest.format("%Y-%m-%d %H:%M:%S"));
            println!("Newest:           {}", newest.format("%Y-%m-%d %H:%M:%S"));
        }
        if dashboard.fraud_spike_detected {
            println!();
            println!("Fraud spike detected.");
        }
    }
    Ok(())
}

fn handle_logs(config: &Config, limit: usize) -> Result<()> {
    let storage = open_storage(config)?;
    let mut entries = storage.recent_logs(limit)?;
    entries.reverse();
    for entry in &entries {
        println!("{}", entry.render());
    }
    Ok(())
}

fn handle_transactions(config: &Config, cmd: &TransactionsCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let filter = TransactionFilter {
        status: cmd.status.map(Into::into),
        min_risk: cmd.min_risk,
        bank: cmd.bank.clone(),
        limit: cmd.limit,
    };
    let transactions = storage.list_transactions(&filter)?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&transactions)?),
        OutputFormat::Plain => {
            for tx in &transactions {
                println!(
                    "{} {} {} {} {:.2} risk={} p={:.2} {}",
                    tx.id,
                    tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    tx.merchant,
                    tx.bank,
                    tx.amount,
                    tx.risk_score,
                    tx.fraud_probability,
                    tx.status
                );
            }
        }
        OutputFormat::Table => print_table(&transactions),
    }
    Ok(())
}

fn print_table(transactions: &[Transaction]) {
    let id_width = transactions
        .iter()
        .map(|tx| tx.id.len())
        .max()
        .unwrap_or(2)
        .max(2);
    println!(
        "{:<id_width$}  {:<19}  {:<10}  {:<8}  {:>9}  {:>4}  {:>5}  {:<19}  ERROR",
        "ID", "TIME", "MERCHANT", "BANK", "AMOUNT", "RISK", "PROB", "STATUS"
    );
    for tx in transactions {
        println!(
            "{:<id_width$}  {:<19}  {:<10}  {:<8}  {:>9.2}  {:>4}  {:>5.2}  {:<19}  {}",
            tx.id,
            tx.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            tx.merchant,
            tx.bank,
            tx.amount,
            tx.risk_score,
            tx.fraud_probability,
            tx.status.to_string(),
            tx.error_code.as_deref().unwrap_or("-")
        );
    }
    println!("{} transactions", transactions.len());
}

fn handle_import(config: &Config, cmd: ImportCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let reports = if cmd.files.is_empty() {
        dataset::import_all(&storage, &config.dataset.paths)?
    } else {
        cmd.files
            .iter()
            .map(|path| dataset::import_file(&storage, path))
            .collect::<sentinel::Result<Vec<ImportReport>>>()?
    };

    if reports.is_empty() {
        println!("No dataset files found.");
    }
    for report in &reports {
        if report.duplicate_file {
            println!("{}: already imported", report.path.display());
        } else {
            println!(
                "{}: {} imported, {} skipped",
                report.path.display(),
                report.imported,
                report.skipped
            );
        }
    }
    Ok(())
}

fn handle_reset(config: Config, yes: bool) -> Result<()> {
    if !yes {
        println!("This will delete all transactions, logs, investigations and alerts.");
        println!("Use --yes to confirm.");
        return Ok(());
    }

    let mut agent = open_agent(config)?;
    agent.reset()?;
    println!(
        "Reset complete. {} transactions after re-initialization, threshold {:.2}.",
        agent.storage().count_transactions()?,
        agent.fraud_threshold()?
    );
    Ok(())
}

fn handle_threshold(config: Config, cmd: ThresholdCommand) -> Result<()> {
    let mut agent = open_agent(config)?;
    match cmd {
        ThresholdCommand::Show => println!("{:.2}", agent.fraud_threshold()?),
        ThresholdCommand::Set { value } => {
            agent.set_fraud_threshold(value)?;
            println!("Fraud threshold set to {:.2}", agent.fraud_threshold()?);
        }
    }
    Ok(())
}

fn handle_inject(config: Config, scenario: sentinel::Scenario) -> Result<()> {
    let mut agent = open_agent(config)?;
    let records = agent.inject_scenario(scenario)?;
    println!(
        "Injected {} {scenario} transactions; the next cycle will evaluate them.",
        records.len()
    );
    Ok(())
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Max transactions:   {}", config.storage.max_transactions);
                println!("  Max log entries:    {}", config.storage.max_log_entries);
                println!();
                println!("[Agent]");
                println!("  High risk above:    {}", config.agent.high_risk_threshold);
                println!("  Fraud threshold:    {}", config.agent.fraud_threshold);
                println!("  Max retries:        {}", config.agent.retry_count_threshold);
                println!("  Auth failure regex: {}", config.agent.auth_failure_pattern);
                println!("  Loop interval (ms): {}", config.agent.loop_interval_ms);
                println!(
                    "  Batch size:         {}..={}",
                    config.agent.batch_min, config.agent.batch_max
                );
                println!();
                println!("[Learning]");
                println!("  Mode:               {:?}", config.learning.mode);
                println!("  Step:               {}", config.learning.step);
                println!();
                println!("[Generator]");
                println!("  Seed:               {:?}", config.generator.seed);
                println!("  Fraud rate:         {}", config.generator.fraud_rate);
                println!("  Spam rate:          {}", config.generator.spam_rate);
                println!();
                println!("[Dataset]");
                println!("  Files:              {}", config.dataset.paths.len());
                println!("  Backfill:           {}", config.dataset.backfill);
                println!();
                println!("[Server]");
                println!("  Bind:               {}", config.server.bind);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
