use anyhow::{Context, Result, bail};
use lode_loader::transport::FsTransport;
use lode_loader::{
    ByteTransform, EncryptionConfig, LoaderConfig, ResourceManager, Transport, encrypted_url,
};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const USAGE: &str = "usage:
    lode load <root> <url>...    load resources relative to <root> and report them
    lode encrypt <in> [out]      write the encrypted form of <in>

environment:
    LODE_LOG        max log level, defaults to info
    LODE_ENCRYPTED  set to 1 if the resources under <root> are encrypted";

const FRAME: Duration = Duration::from_micros(16_667);
const TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    let level = std::env::var("LODE_LOG")
        .ok()
        .and_then(|level| level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("load") if args.len() >= 3 => load(&args[1], &args[2..]),
        Some("encrypt") if args.len() == 2 || args.len() == 3 => {
            encrypt(&args[1], args.get(2).map(String::as_str))
        }
        _ => {
            eprintln!("{USAGE}");
            bail!("Invalid arguments {:?}", args);
        }
    }
}

fn encryption() -> EncryptionConfig {
    let encrypted = std::env::var("LODE_ENCRYPTED").is_ok_and(|value| value == "1");
    EncryptionConfig::default().with_encrypted_images(encrypted)
}

#[cfg(feature = "http")]
fn transport(root: &str, runtime: &tokio::runtime::Runtime) -> Box<dyn Transport> {
    if root.starts_with("http://") || root.starts_with("https://") {
        Box::new(lode_loader::transport::HttpTransport::new(
            root,
            runtime.handle().clone(),
        ))
    } else {
        Box::new(FsTransport::new(root, runtime.handle().clone()))
    }
}

#[cfg(not(feature = "http"))]
fn transport(root: &str, runtime: &tokio::runtime::Runtime) -> Box<dyn Transport> {
    Box::new(FsTransport::new(root, runtime.handle().clone()))
}

/// Drive a manager frame by frame until every url is decoded, or one of them fails
fn load(root: &str, urls: &[String]) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let config = LoaderConfig::default().with_encryption(encryption());
    let mut manager = ResourceManager::new(config, transport(root, &runtime))?;
    let units: Vec<_> = urls.iter().map(|url| manager.load(url)).collect();

    let started = Instant::now();
    let mut frames: u64 = 0;
    while !manager.is_ready() {
        if let Some(unit) = manager.error_unit() {
            let reason = unit
                .error()
                .map(|err| err.to_string())
                .unwrap_or_default();
            bail!("Failed to load {}: {}", unit.url(), reason);
        }
        if started.elapsed() > TIMEOUT {
            bail!(
                "Timed out after {} frames, {} fetches in flight",
                frames,
                manager.in_flight()
            );
        }
        std::thread::sleep(FRAME);
        manager.update(1, FRAME.as_secs_f64());
        frames += 1;
    }

    for unit in units.iter() {
        match unit.texture() {
            Some(texture) => tracing::info!(
                "{}: {}x{} ({} pixels)",
                unit.url(),
                texture.width(),
                texture.height(),
                texture.cost()
            ),
            None => tracing::info!("{}: blank", unit.url()),
        }
    }
    tracing::info!(
        "Loaded {} resources in {} frames ({:.2?})",
        units.len(),
        frames,
        started.elapsed()
    );
    Ok(())
}

fn encrypt(input: &str, output: Option<&str>) -> Result<()> {
    let output = output
        .map(str::to_string)
        .unwrap_or_else(|| encrypted_url(input));
    if output == input {
        bail!("{input} has no encrypted form, pass an output path");
    }
    let transform = ByteTransform::new(&EncryptionConfig::default())?;
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {input}"))?;
    std::fs::write(&output, transform.encrypt(&bytes))
        .with_context(|| format!("Failed to write {output}"))?;
    tracing::info!("Wrote {} ({} bytes)", output, bytes.len());
    Ok(())
}
