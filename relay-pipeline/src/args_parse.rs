use clap::Parser;
use relay_pipeline::UploadSpec;

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    version,
    about = "Replicates uploads into a destination store and purges it when the size alarm fires",
    after_help = EXAMPLES_TEXT
)]
pub(crate) struct Args {
    #[arg(
        long,
        short = 'c',
        help = "Path to the YAML config file. Built-in defaults are used when absent"
    )]
    pub(crate) config_file: Option<String>,

    #[arg(
        long,
        env = "DESTINATION_BUCKET_NAME",
        help = "Destination store root (bucket), overrides destination.root"
    )]
    pub(crate) destination_root: Option<String>,

    #[arg(long, help = "Prometheus exporter http address. Example: 0.0.0.0:9040")]
    pub(crate) prom_exporter: Option<String>,

    #[arg(
        long = "upload",
        value_name = "KEY:SIZE",
        help = "Write SIZE bytes under KEY into the source store once started. Repeatable"
    )]
    pub(crate) uploads: Vec<UploadSpec>,

    #[arg(
        long,
        default_value_t = 60,
        help = "Seconds to wait between two uploads"
    )]
    pub(crate) upload_interval_secs: u64,
}

const EXAMPLES_TEXT: &str = r#"
EXAMPLES:
    # Run with defaults (in-memory stores) and upload two objects a minute apart
    relay --upload temp.txt:4096 --upload small.txt:100

    # Use a config file and expose metrics
    relay -c config/relay.yaml --prom-exporter 0.0.0.0:9040

    # Point the destination at another bucket
    DESTINATION_BUCKET_NAME=s3://relay-backup relay -c config/relay.yaml
"#;
