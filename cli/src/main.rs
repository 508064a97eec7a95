//! Development driver for a running volley server
//!
//! Posts the same form payloads Slack would, so the whole webhook surface
//! can be exercised from a terminal without a Slack workspace.

use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "volley-cli", version)]
struct Cli {
    /// Base URL of the volley server
    #[arg(long, env = "VOLLEY_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Verification token the server expects
    #[arg(long, env = "SLACK_VERIFICATION_TOKEN", default_value = "dev-token")]
    token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Post a slash-command payload
    Command {
        /// Requesting user id
        #[arg(long, default_value = "U0")]
        user: String,

        /// Origin channel id
        #[arg(long, default_value = "C0")]
        channel: String,

        /// Raw command text, mentions included
        text: String,
    },
    /// Post an accept/reject button payload
    Respond {
        /// The callback id from the button message ("<id>:<requester>")
        callback_id: String,

        /// Responding user id
        #[arg(long)]
        user: String,

        /// Channel the request lives in
        #[arg(long, default_value = "C0")]
        channel: String,

        /// Accept instead of reject
        #[arg(long)]
        accept: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Command::Command {
            user,
            channel,
            text,
        } => {
            let response = client
                .post(format!("{}/command", cli.url))
                .form(&[
                    ("token", cli.token.as_str()),
                    ("text", text.as_str()),
                    ("user_id", user.as_str()),
                    ("channel_id", channel.as_str()),
                ])
                .send()
                .await
                .context("failed to reach the server")?;

            println!("{}", response.status());
            let body = response.text().await?;
            if !body.is_empty() {
                println!("{}", body);
            }
        }
        Command::Respond {
            callback_id,
            user,
            channel,
            accept,
        } => {
            let payload = serde_json::json!({
                "token": cli.token,
                "callback_id": callback_id,
                "user": { "id": user },
                "channel": { "id": channel },
                "actions": [ { "name": if accept { "yes" } else { "no" } } ],
            });
            let response = client
                .post(format!("{}/interaction", cli.url))
                .form(&[("payload", payload.to_string().as_str())])
                .send()
                .await
                .context("failed to reach the server")?;

            println!("{}", response.status());
        }
    }

    Ok(())
}
