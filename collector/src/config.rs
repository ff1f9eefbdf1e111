use envconfig::Envconfig;
use tracing::Level;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,

    pub cookie_domain: Option<String>,

    // Worker-parallelism hint, tokio defaults to one worker per core
    pub worker_threads: Option<usize>,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    pub otel_url: Option<String>,

    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(default = "collector")]
    pub otel_service_name: String,

    #[envconfig(default = "info")]
    pub log_level: Level,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic
    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds
    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,
    pub kafka_topic: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}
