use clap::Parser;

use docker_exporter::config::Config;

/// Entry point of the docker exporter.
///
/// Parses the configuration from the command line and environment, sets up
/// logging and serves metrics until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if startup fails (e.g., an unsupported docker host or a
/// listen address that cannot be bound).
///
/// # Examples
///
/// ```bash
/// DOCKER_HOST=unix:///var/run/docker.sock docker-exporter --web.port 9100 -v
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
    docker_exporter::run(config).await?;
    Ok(())
}
