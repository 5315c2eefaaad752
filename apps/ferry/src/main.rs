//! fileferry command-line client.
//!
//! Usage: `ferry [FILE]`. Greets the server, lists its files, uploads FILE
//! when given, lists again and downloads the first regular file.

mod config;

use std::path::PathBuf;

use fileferry_client::FileClient;
use fileferry_protocol::FileInfo;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::load()?;
    let upload = std::env::args_os().nth(1).map(PathBuf::from);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, upload))
}

async fn run(config: config::Config, upload: Option<PathBuf>) -> anyhow::Result<()> {
    let client = FileClient::connect(config.client_config()).await?;

    let greeting = client.say_hello("world").await?;
    tracing::info!("greeting: {greeting}");

    let files = client.list().await?;
    print_listing(&files);

    if let Some(path) = upload {
        let status = client.upload(&path).await?;
        println!("upload {}: {status:?}", path.display());
    }

    let files = client.list().await?;
    print_listing(&files);

    if let Some(first) = files.first().filter(|f| !f.is_dir) {
        let report = client.download(&first.name).await?;
        println!("downloaded {} ({} bytes)", report.path.display(), report.size);
    }

    client.close();
    Ok(())
}

fn print_listing(files: &[FileInfo]) {
    println!("{:<6} {:>12}  name", "isdir", "size");
    for file in files {
        println!("{:<6} {:>12}  {}", file.is_dir, file.size, file.name);
    }
}
