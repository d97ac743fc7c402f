use std::{net::IpAddr, path::PathBuf};

use clap::Parser;

use crate::config::{DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT};

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// hy2agent - remote management agent for a Hysteria 2 server
#[derive(Debug, Parser)]
#[command(name = "hy2agent", author, about, version, styles=styles::styles())]
pub struct Hy2AgentArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<Hy2AgentSubcommand>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum Hy2AgentSubcommand {
    /// Serve the management API
    #[command(name = "serve")]
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = DEFAULT_SERVER_HOST)]
        host: IpAddr,

        /// PEM certificate chain; enables HTTPS
        #[arg(long, value_name = "PATH", requires = "key")]
        cert: Option<PathBuf>,

        /// PEM private key matching the certificate
        #[arg(long, value_name = "PATH", requires = "cert")]
        key: Option<PathBuf>,

        /// Agent home directory [default: $HY2AGENT_HOME or /etc/hy2agent]
        #[arg(long, value_name = "PATH")]
        home: Option<PathBuf>,

        /// Path of the Hysteria configuration file
        #[arg(long, value_name = "PATH")]
        hysteria_config: Option<PathBuf>,

        /// Deadline in seconds for service and configuration requests
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
    },

    /// Print the API key, creating the access policy if needed
    #[command(name = "key")]
    Key {
        /// Agent home directory [default: $HY2AGENT_HOME or /etc/hy2agent]
        #[arg(long, value_name = "PATH")]
        home: Option<PathBuf>,
    },
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_debug_assert() {
        Hy2AgentArgs::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() -> anyhow::Result<()> {
        let args = Hy2AgentArgs::try_parse_from(["hy2agent", "serve"])?;
        match args.subcommand {
            Some(Hy2AgentSubcommand::Serve {
                port,
                host,
                cert,
                key,
                ..
            }) => {
                assert_eq!(port, DEFAULT_SERVER_PORT);
                assert_eq!(host.to_string(), DEFAULT_SERVER_HOST);
                assert!(cert.is_none());
                assert!(key.is_none());
            }
            other => panic!("unexpected subcommand: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_serve_cert_requires_key() {
        let result = Hy2AgentArgs::try_parse_from(["hy2agent", "serve", "--cert", "/tmp/cert.pem"]);
        assert!(result.is_err());

        let result = Hy2AgentArgs::try_parse_from([
            "hy2agent",
            "serve",
            "--cert",
            "/tmp/cert.pem",
            "--key",
            "/tmp/key.pem",
        ]);
        assert!(result.is_ok());
    }
}
