use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use connect_core::{
    token::decode_public_token, BridgeAction, ConnectBridge, DecodedTokenInfo,
};
use serde_json::json;
use shared::protocol::HostEvent;
use tracing::info;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides the connect base url from settings.
    #[arg(long)]
    base_url: Option<String>,
    /// Overrides the reserved callback scheme from settings.
    #[arg(long)]
    scheme: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feeds redirect URLs through the bridge and prints one JSON line per input.
    Replay {
        #[arg(long)]
        client_secret: Option<String>,
        /// Link token handed back whenever an institution is selected.
        #[arg(long)]
        link_token: Option<String>,
        /// URLs to replay; read line by line from stdin when empty.
        urls: Vec<String>,
    },
    /// Decodes a public token surrogate, or a link token's fallback info.
    DecodeToken { token: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }
    if let Some(scheme) = cli.scheme {
        settings.reserved_scheme = scheme;
    }

    match cli.command {
        Command::Replay {
            client_secret,
            link_token,
            urls,
        } => {
            let client_secret = client_secret
                .or_else(|| settings.client_secret.clone())
                .context("a client secret is required (flag, CONNECT_CLIENT_SECRET or connect.toml)")?;
            let bridge = ConnectBridge::new(settings.connect_config()?, client_secret);
            let urls = if urls.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .collect::<Result<Vec<_>, _>>()
                    .context("failed to read urls from stdin")?
            } else {
                urls
            };
            replay(bridge, link_token.as_deref(), &urls, &mut io::stdout().lock())?;
        }
        Command::DecodeToken { token } => {
            let decoded = match decode_public_token(&token) {
                Ok(envelope) => json!({
                    "kind": envelope.data.kind(),
                    "envelope": envelope,
                }),
                Err(err) => {
                    info!(error = %err, "not a public token surrogate; reading as link token");
                    let info = DecodedTokenInfo::decode(&token)
                        .context("token is neither a public token surrogate nor a decodable link token")?;
                    json!({
                        "has_fallback": info.has_fallback(),
                        "link_token": info,
                    })
                }
            };
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }
    }

    Ok(())
}

fn replay(
    mut bridge: ConnectBridge,
    link_token: Option<&str>,
    urls: &[String],
    out: &mut impl Write,
) -> Result<()> {
    let intro = bridge.start();
    writeln!(out, "{}", json!({ "input": "start", "actions": intro }))?;

    for url in urls.iter().map(|url| url.trim()).filter(|url| !url.is_empty()) {
        let decision = bridge.handle_navigation(url);
        let selected = decision.actions.iter().any(|action| {
            matches!(action, BridgeAction::Host(HostEvent::SelectInstitution { .. }))
        });
        writeln!(
            out,
            "{}",
            json!({ "input": url, "policy": decision.policy, "actions": decision.actions })
        )?;

        if let (true, Some(link_token)) = (selected, link_token) {
            let continued = bridge.continue_with_link_token(link_token);
            writeln!(
                out,
                "{}",
                json!({ "input": "link_token", "actions": continued })
            )?;
        }
    }

    info!(
        attempt_id = %bridge.session().attempt_id(),
        concluded = bridge.session().is_concluded(),
        "replay finished"
    );
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
