use anyhow::Result;
use to_parquet::{process, Config};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) resolve config ───────────────────────────────────────────
    let config = Config::load()?;
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        pattern = %config.pattern,
        "configured"
    );

    // ─── 3) convert every input ──────────────────────────────────────
    let summary = process::run(&config)?;
    if summary.failed() > 0 {
        anyhow::bail!("{} file(s) failed to convert", summary.failed());
    }

    Ok(())
}
