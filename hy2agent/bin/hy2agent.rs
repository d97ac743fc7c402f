use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser};
use hy2agent::{
    cli::{AnsiStyles, Hy2AgentArgs, Hy2AgentSubcommand},
    config::{
        AgentConfig, PolicyStore, DEFAULT_HYSTERIA_CONFIG_PATH, DEFAULT_REQUEST_TIMEOUT,
    },
    server::{self, AgentState},
    utils, AgentResult,
};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> AgentResult<()> {
    let args = Hy2AgentArgs::parse();

    // Initialize tracing subscriber with EnvFilter
    let default_level = if args.verbose { "debug" } else { "info" };
    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match args.subcommand {
        Some(Hy2AgentSubcommand::Serve {
            port,
            host,
            cert,
            key,
            home,
            hysteria_config,
            timeout_secs,
        }) => {
            let home = home.unwrap_or_else(utils::agent_home_path);
            tracing::trace!("serving: host={host}, port={port}, home={}", home.display());

            let config = AgentConfig::builder()
                .home_dir(home)
                .hysteria_config_path(
                    hysteria_config.unwrap_or_else(|| DEFAULT_HYSTERIA_CONFIG_PATH.clone()),
                )
                .request_timeout(
                    timeout_secs.map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
                )
                .build();

            let policy = Arc::new(PolicyStore::load_or_init(config.policy_path()).await?);
            {
                let current = policy.read().await;
                tracing::info!("api key: {}", current.get_api_key());
                if current.whitelist_is_empty() {
                    tracing::warn!("whitelist is empty, any source with a valid api key is accepted");
                }
            }

            let state = AgentState::new(&config, policy);
            let addr = SocketAddr::new(host, port);
            match (cert, key) {
                (Some(cert), Some(key)) => server::serve_tls(addr, state, cert, key).await?,
                _ => {
                    tracing::warn!("no certificate given, serving plain http");
                    server::serve(TcpListener::bind(addr).await?, state).await?;
                }
            }
        }
        Some(Hy2AgentSubcommand::Key { home }) => {
            let home = home.unwrap_or_else(utils::agent_home_path);
            let policy = PolicyStore::load_from_home(&home).await?;
            let current = policy.read().await;
            println!("{}", current.get_api_key().as_str().literal());
        }
        None => {
            Hy2AgentArgs::command().print_help()?;
        }
    }

    Ok(())
}
