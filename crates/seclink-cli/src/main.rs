mod common;
mod demo;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use seclink_protocol::{
    now_secs, LinkRouter, LinkType, MemberId, MessageBuilder, Priority, ProtocolConfig,
    RecordingChannel, SecureMessage, Verifier, DEFAULT_TTL_SECS,
};

#[derive(Parser)]
#[command(name = "seclink", about = "Sign, verify and route secure link messages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign a message and print it as JSON.
    Sign {
        /// Shared secret (hex).
        #[arg(long)]
        key: String,
        /// Comma-separated member list.
        #[arg(long, value_delimiter = ',', required = true)]
        members: Vec<MemberId>,
        #[arg(long)]
        from: MemberId,
        #[arg(long)]
        to: MemberId,
        /// low, normal, high, critical (or 1-4).
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// Lifetime in seconds.
        #[arg(long, default_value_t = DEFAULT_TTL_SECS)]
        ttl: i64,
        /// Override the random nonce.
        #[arg(long)]
        nonce: Option<String>,
        #[arg(long)]
        payload: String,
    },

    /// Verify a JSON message from FILE (or stdin). Exit status 1 on rejection.
    Verify {
        /// Shared secret (hex).
        #[arg(long)]
        key: String,
        /// Comma-separated member list.
        #[arg(long, value_delimiter = ',', required = true)]
        members: Vec<MemberId>,
        /// Replay window in seconds. Defaults to SECLINK_REPLAY_WINDOW_SECS or 300.
        #[arg(long)]
        window: Option<i64>,
        file: Option<PathBuf>,
    },

    /// Show which link a send to `--to` would use.
    Route {
        /// Route policy (JSON).
        #[arg(long)]
        policy: PathBuf,
        /// Comma-separated member list.
        #[arg(long, value_delimiter = ',', required = true)]
        members: Vec<MemberId>,
        #[arg(long)]
        to: MemberId,
        /// Comma-separated links currently up.
        #[arg(long, value_delimiter = ',')]
        available: Vec<LinkType>,
    },

    /// Run a two-member exchange end to end with logging channels.
    Demo {
        /// Shared secret (hex).
        #[arg(long, default_value = "6b")]
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sign {
            key,
            members,
            from,
            to,
            priority,
            ttl,
            nonce,
            payload,
        } => {
            let key = common::parse_key(&key)?;
            let registry = common::registry(&members);
            let mut builder = MessageBuilder::new(from, to, payload)
                .priority(priority)
                .ttl(ttl);
            if let Some(nonce) = nonce {
                builder = builder.nonce(nonce);
            }
            let message = builder.sign(&key, &registry)?;
            println!("{}", message.to_json()?);
        }

        Command::Verify {
            key,
            members,
            window,
            file,
        } => {
            let key = common::parse_key(&key)?;
            let mut config = ProtocolConfig::new();
            if let Some(secs) = window {
                config = config.replay_window_secs(secs);
            }
            config.validate()?;

            let message = SecureMessage::from_json(&common::read_input(file.as_deref())?)?;
            let verifier = Verifier::from_config(key, common::registry(&members), &config);
            let verdict = verifier.check_at(&message, now_secs());
            if verdict.is_accepted() {
                println!("accepted");
            } else {
                println!("rejected");
                eprintln!("reason: {verdict}");
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Route {
            policy,
            members,
            to,
            available,
        } => {
            let policy = common::load_policy(&policy)?;
            let (channels, _) = RecordingChannel::set();
            let router = LinkRouter::new(policy, common::registry(&members), channels);

            let selection = router.explain_selection(&available);
            if router.send(&to, &[], &available).await? {
                match selection.link {
                    Some(link) => println!("{link}"),
                    None => println!("none"),
                }
            } else {
                println!("none");
                eprintln!("reason: {:?}", selection.reason);
            }
        }

        Command::Demo { key } => {
            let key = common::parse_key(&key)?;
            let report = demo::run(&key).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "links": report.router_stats,
                    "verifier": report.verifier_stats,
                }))?
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
