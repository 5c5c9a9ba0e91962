use clap::Parser;
use compose_assets::config::AppConfig;
use compose_assets::utils::auth::create_session_token;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Issues a session token accepted by the upload, lookup and delete endpoints.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Subject recorded in the token, usually the editor's user name
    subject: String,

    /// Token lifetime in hours
    #[arg(long, default_value_t = 24)]
    ttl_hours: i64,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issue_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env();

    if std::env::var("SESSION_SECRET").is_err() {
        tracing::warn!("⚠️  SESSION_SECRET not set, signing with the development secret");
    }

    let token = create_session_token(&args.subject, &config.session_secret, args.ttl_hours)?;
    info!("🔑 Session for '{}' valid for {}h", args.subject, args.ttl_hours);
    println!("{}", token);

    Ok(())
}
