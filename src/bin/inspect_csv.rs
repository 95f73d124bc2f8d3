use anyhow::{Context, Result};
use merprep::{
    load::dataset_name,
    report,
    table::{parse_table, DatasetDict, Decoding, LoadOptions},
};
use std::{env, fs, path::Path, process::exit};
use tracing_subscriber::{fmt, EnvFilter};

/// Load one local CSV the way the pipeline would and print its inferred schema.
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <CSV_FILE> [strict|relaxed|<encoding label>]", args[0]);
        exit(1);
    }

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    if let Err(e) = inspect(Path::new(&args[1]), args.get(2).map(String::as_str)) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

fn inspect(path: &Path, decoding: Option<&str>) -> Result<()> {
    let decoding = match decoding {
        Some(d) => Decoding::try_from(d.to_string())?,
        None => Decoding::Strict,
    };
    let bytes = fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let text = decoding
        .decode(&bytes)
        .with_context(|| format!("decoding {:?} as {}", path, decoding))?;

    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let name = dataset_name(&file);
    let table = parse_table(&name, &text, &LoadOptions::default())?;
    report::dataset(&name, &DatasetDict::single(table), true);
    Ok(())
}
