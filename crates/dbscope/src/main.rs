//! dbscope - PostgreSQL schema discovery, column profiling, and ad-hoc queries.

mod cli;
mod output;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Command, SnapshotArgs};
use dbscope_core::logging::{init_logging, log_dir, LogConfig};
use dbscope_core::{DbScopeError, Introspector, ProfilerOptions, SnapshotEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::new(log_dir());
    if let Some(filter) = &cli.global.log {
        log_config = log_config.with_filter(filter);
    }
    let _logging_guard = init_logging(log_config);

    let config = cli.connection.to_config().map_err(|e| anyhow!(e))?;
    let password = match &cli.connection.password {
        Some(password) => password.clone(),
        None => rpassword::prompt_password(format!("Password for {}: ", config.display_url()))
            .context("Failed to read password")?,
    };

    let options = match &cli.command {
        Command::Snapshot(args) => args.profiler_options(),
        _ => ProfilerOptions::default(),
    };
    let introspector = Introspector::connect(config, &password)
        .await
        .map_err(report)?
        .with_options(options);

    let outcome = run(&introspector, cli.command, cli.global.quiet).await;
    introspector.close().await;
    outcome.map_err(report)
}

async fn run(introspector: &Introspector, command: Command, quiet: bool) -> Result<(), DbScopeError> {
    match command {
        Command::Tables => {
            for table in introspector.tables().await? {
                println!("{table}");
            }
        }
        Command::Columns { table } => {
            for column in introspector.columns(&table).await? {
                println!("{column}");
            }
        }
        Command::Snapshot(args) => snapshot(introspector, args, quiet).await?,
        Command::Profile { table, column } => {
            let (descriptor, profile) = introspector.profile_column(&table, &column).await?;
            println!("{}", output::format_profiled_column(&descriptor, &profile));
        }
        Command::Query { sql, json } => {
            let result = introspector.query(&sql).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", output::format_query_result(&result));
            }
        }
    }
    Ok(())
}

async fn snapshot(
    introspector: &Introspector,
    args: SnapshotArgs,
    quiet: bool,
) -> Result<(), DbScopeError> {
    let cancel = CancellationToken::new();

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let (tx, mut rx) = mpsc::channel(64);
    let reporter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if quiet {
                continue;
            }
            match event {
                SnapshotEvent::Discovered { tables, columns } => {
                    eprintln!("Found {tables} tables, {columns} columns");
                }
                SnapshotEvent::ColumnProfiled { descriptor, completed, total, .. } => {
                    eprintln!("[{completed}/{total}] {descriptor}");
                }
                SnapshotEvent::Complete { elapsed_ms, .. } => {
                    eprintln!("Done in {elapsed_ms} ms");
                }
            }
        }
    });

    let built = introspector.build_snapshot_with_cancellation(cancel, Some(tx)).await;
    ctrl_c.abort();
    let _ = reporter.await;

    let snapshot = built?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    } else {
        println!("{}", output::format_snapshot(&snapshot));
    }
    Ok(())
}

/// Flatten an error and its hint into the message printed on exit.
fn report(err: DbScopeError) -> anyhow::Error {
    tracing::debug!(category = err.category(), code = ?err.pg_code(), "Command failed");

    let info = err.to_error_info();
    let mut message = format!("{}: {}", info.error_type, info.message);
    if let Some(detail) = &info.technical_detail {
        message.push_str(&format!("\n  {detail}"));
    }
    if let Some(hint) = &info.hint {
        message.push_str(&format!("\n  Hint: {hint}"));
    }
    anyhow!(message)
}
