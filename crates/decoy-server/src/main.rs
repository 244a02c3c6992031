use anyhow::Context;
use clap::Parser;
use decoy_server::{DecoyServer, ProxyAndRecordSettings, ServerSettings};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Programmable HTTP test double with proxy-and-record.
#[derive(Parser, Debug)]
#[command(name = "decoy")]
#[command(author, version, about)]
struct Args {
    /// Settings file (YAML, or JSON by extension)
    #[arg(short, long, env = "DECOY_CONFIG")]
    config: Option<PathBuf>,

    /// Listening port (0 for an ephemeral port)
    #[arg(short, long, env = "DECOY_PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(long, env = "DECOY_HOST")]
    host: Option<String>,

    /// Forward unmatched requests to this upstream
    #[arg(long, env = "DECOY_PROXY_URL")]
    proxy_url: Option<String>,

    /// Register recorded mappings in memory (requires --proxy-url)
    #[arg(long)]
    save_mapping: bool,

    /// Write recorded mappings to the mappings directory (requires --proxy-url)
    #[arg(long)]
    save_mapping_to_file: bool,

    /// Report the closest mapping when nothing matches
    #[arg(long)]
    allow_partial_mapping: bool,

    /// Do not register the /__admin endpoints
    #[arg(long)]
    no_admin: bool,

    /// Directory for static and recorded mapping files
    #[arg(long, env = "DECOY_MAPPINGS_DIR")]
    mappings_dir: Option<PathBuf>,

    /// Load mapping files from the mappings directory at start
    #[arg(long)]
    read_static_mappings: bool,

    /// Log output format: text (default), json
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    fn into_settings(self) -> anyhow::Result<ServerSettings> {
        let mut settings = match &self.config {
            Some(path) => ServerSettings::from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => ServerSettings::default(),
        };

        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(dir) = self.mappings_dir {
            settings.mappings_directory = dir;
        }
        settings.allow_partial_mapping |= self.allow_partial_mapping;
        settings.read_static_mappings |= self.read_static_mappings;
        if self.no_admin {
            settings.start_admin_interface = false;
        }

        if let Some(url) = self.proxy_url {
            let proxy = settings
                .proxy_and_record_settings
                .get_or_insert_with(|| ProxyAndRecordSettings::new(url.clone()));
            proxy.url = url;
        }
        if let Some(proxy) = settings.proxy_and_record_settings.as_mut() {
            proxy.save_mapping |= self.save_mapping;
            proxy.save_mapping_to_file |= self.save_mapping_to_file;
        } else if self.save_mapping || self.save_mapping_to_file {
            anyhow::bail!("--save-mapping and --save-mapping-to-file require --proxy-url");
        }

        settings.validate()?;
        Ok(settings)
    }
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_format);

    let settings = args.into_settings()?;
    let server = DecoyServer::start(settings).await?;
    info!("Decoy ready at {}", server.url());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Received ctrl-c, stopping");
    server.stop().await;
    Ok(())
}
