use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `chunkline-server` binary.
///
/// Every value can be passed as a CLI flag or as an environment variable
/// (optionally via a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chunkline-server",
    version,
    about = "Streams batches of base64-encoded images over chunked HTTP responses"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:8080" or "/tmp/chunkline.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Directory that resource identifiers are resolved against.
    ///
    /// `?paths=/images/a.png` reads `<ROOT_DIR>/images/a.png`.
    ///
    /// Environment variable: `ROOT_DIR`
    #[arg(long, env = "ROOT_DIR", default_value = ".")]
    pub root_dir: PathBuf,

    /// Maximum number of identifiers accepted in one batch request.
    ///
    /// The concurrent endpoint spawns one task per identifier, so this also
    /// caps per-request fan-out.
    ///
    /// Environment variable: `MAX_PATHS`
    #[arg(long, env = "MAX_PATHS", default_value_t = 256)]
    pub max_paths: usize,

    /// Deadline for loading a single item, in milliseconds. Items that take
    /// longer are dropped from the batch. `0` disables the deadline.
    ///
    /// Environment variable: `ITEM_TIMEOUT_MS`
    #[arg(long, env = "ITEM_TIMEOUT_MS", default_value_t = 10_000)]
    pub item_timeout_ms: u64,

    /// Capacity in bytes of the in-memory pipe between the frame writer and
    /// the HTTP body.
    ///
    /// Environment variable: `PIPE_BUFFER_BYTES`
    #[arg(long, env = "PIPE_BUFFER_BYTES", default_value_t = 64 * 1024)]
    pub pipe_buffer_bytes: usize,

    /// Size of each chunk written by the `/data` endpoint.
    ///
    /// Environment variable: `RAW_CHUNK_SIZE`
    #[arg(long, env = "RAW_CHUNK_SIZE", default_value_t = 1024)]
    pub raw_chunk_size: usize,

    /// Total payload size served by the `/data` endpoint.
    ///
    /// Environment variable: `DEMO_BYTES`
    #[arg(long, env = "DEMO_BYTES", default_value_t = 5 * 1024)]
    pub demo_bytes: usize,

    /// Seconds to let in-flight streams drain on shutdown before they are
    /// cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub root_dir: PathBuf,
    pub max_paths: usize,
    pub item_timeout: Option<Duration>,
    pub pipe_buffer_bytes: usize,
    pub raw_chunk_size: usize,
    pub demo_bytes: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_paths == 0 {
            bail!("MAX_PATHS must be greater than 0");
        }

        if args.pipe_buffer_bytes == 0 {
            bail!("PIPE_BUFFER_BYTES must be greater than 0");
        }

        if args.raw_chunk_size == 0 {
            bail!("RAW_CHUNK_SIZE must be greater than 0");
        }

        let item_timeout =
            (args.item_timeout_ms > 0).then(|| Duration::from_millis(args.item_timeout_ms));

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            root_dir: args.root_dir,
            max_paths: args.max_paths,
            item_timeout,
            pipe_buffer_bytes: args.pipe_buffer_bytes,
            raw_chunk_size: args.raw_chunk_size,
            demo_bytes: args.demo_bytes,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:8080"),
            uds: false,
            root_dir: PathBuf::from("."),
            max_paths: 256,
            item_timeout: Some(Duration::from_secs(10)),
            pipe_buffer_bytes: 64 * 1024,
            raw_chunk_size: 1024,
            demo_bytes: 5 * 1024,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = core::iter::once("chunkline-server").chain(args.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn zero_timeout_disables_deadline() -> anyhow::Result<()> {
        let config = parse(&["--item-timeout-ms", "0"])?;
        assert_eq!(config.item_timeout, None);
        Ok(())
    }

    #[test]
    fn explicit_flags_override_defaults() -> anyhow::Result<()> {
        let config = parse(&[
            "--server-addr",
            "127.0.0.1:9000",
            "--root-dir",
            "/srv/thumbs",
            "--max-paths",
            "8",
            "--item-timeout-ms",
            "250",
        ])?;
        assert_eq!(config.server_addr, "127.0.0.1:9000");
        assert_eq!(config.root_dir, PathBuf::from("/srv/thumbs"));
        assert_eq!(config.max_paths, 8);
        assert_eq!(config.item_timeout, Some(Duration::from_millis(250)));
        Ok(())
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(parse(&["--max-paths", "0"]).is_err());
        assert!(parse(&["--raw-chunk-size", "0"]).is_err());
        assert!(parse(&["--pipe-buffer-bytes", "0"]).is_err());
    }
}
