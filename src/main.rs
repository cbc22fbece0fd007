use std::time::Duration;

use anyhow::bail;
use clap::Parser;

mod cli;
mod config;
mod daemon;
mod engine;
mod errors;
mod query;
mod records;
mod rpc;
mod settings;
mod tags;
#[cfg(test)]
mod tests;
mod vector;

use cli::Command;
use config::Config;
use rpc::{ClientError, RpcClient};
use settings::{DateFilter, SearchSettings, UserFilter};
use vector::Mode;

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let data_dir = config::resolve_data_dir(args.data_dir)?;
    let config = Config::load(&data_dir)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match args.command {
        Command::Daemon {} => {
            init_daemon_logging(&config)?;
            runtime.block_on(daemon::runtime::run(config))
        }

        Command::Start {} => {
            init_cli_logging();
            let outcome = runtime.block_on(daemon::start(&config))?;
            let status = match outcome {
                daemon::LaunchOutcome::AlreadyRunning(status) => status,
                daemon::LaunchOutcome::Started(status) => status,
            };
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }

        Command::Stop {} => {
            init_cli_logging();
            match runtime.block_on(client(&config).stop_server()) {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    Ok(())
                }
                Err(ClientError::NotRunning) => {
                    println!("daemon is not running");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }

        Command::Status {} => {
            init_cli_logging();
            match runtime.block_on(client(&config).get_status()) {
                Ok(status) => {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                    Ok(())
                }
                Err(ClientError::NotRunning) => {
                    println!("daemon is not running");
                    Ok(())
                }
                Err(ClientError::Timeout(t)) => {
                    println!("daemon did not answer within {t:?} (still initializing?)");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }

        Command::Search {
            query,
            top_k,
            mode,
            weights,
            from,
            to,
            user,
            exclude_user,
            min_posts,
            max_posts,
        } => {
            init_cli_logging();
            let mode = parse_mode(&mode)?;
            let weights = weights.as_deref().map(parse_weights).transpose()?;

            let settings = SearchSettings {
                user_filter: UserFilter {
                    includes: (!user.is_empty()).then_some(user),
                    excludes: (!exclude_user.is_empty()).then_some(exclude_user),
                    min_posts,
                    max_posts,
                },
                date_filter: DateFilter { from, to },
                top_k,
            };

            let results = runtime.block_on(client(&config).search_similar(
                &query,
                &settings,
                mode,
                weights.as_deref(),
            ))?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        Command::Vector { query, top_k, mode } => {
            init_cli_logging();
            let mode = parse_mode(&mode)?;
            let pairs =
                runtime.block_on(client(&config).vector_search(&query, mode, top_k))?;

            println!("{} results", pairs.len());
            for (rank, (post_id, score)) in pairs.iter().enumerate() {
                println!("{:3}. similarity={score:.5} post_id={post_id}", rank + 1);
            }
            Ok(())
        }

        Command::Text {
            terms,
            limit,
            source,
        } => {
            init_cli_logging();
            let results = runtime.block_on(client(&config).search_text(
                &terms,
                limit,
                source.as_deref(),
            ))?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        Command::Stats {} => {
            init_cli_logging();
            let stats = runtime.block_on(client(&config).get_database_stats())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Command::Users { limit } => {
            init_cli_logging();
            let stats = runtime.block_on(client(&config).get_user_stats(limit))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn client(config: &Config) -> RpcClient {
    RpcClient::new(
        config.addr(),
        Duration::from_secs(config.request_timeout_secs),
    )
}

fn parse_mode(raw: &str) -> anyhow::Result<Mode> {
    raw.parse().map_err(|err: String| anyhow::anyhow!(err))
}

fn parse_weights(raw: &str) -> anyhow::Result<Vec<f32>> {
    let weights: Result<Vec<f32>, _> = raw.split(',').map(|w| w.trim().parse()).collect();
    match weights {
        Ok(weights) => Ok(weights),
        Err(_) => bail!("weights must be comma-separated numbers, got '{raw}'"),
    }
}

/// The daemon runs detached with null stdio; logs go to a file in the
/// data directory.
fn init_daemon_logging(config: &Config) -> anyhow::Result<()> {
    let log_file = std::fs::File::create(config.data_dir().join("daemon.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::sync::Arc::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn init_cli_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
