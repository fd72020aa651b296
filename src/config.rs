#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // address the app will bind to
    #[clap(long, env, default_value = "0.0.0.0")]
    pub host: String,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // default ttl for cached segment bytes. playlists refresh constantly so they get
    // their own much shorter ttl below
    #[clap(long, env, default_value = "300")]
    pub cache_ttl_seconds: u64,

    // live playlists rotate every few seconds, anything longer than ~10s serves stale
    // media sequence numbers to the player
    #[clap(long, env, default_value = "10")]
    pub playlist_cache_ttl_seconds: u64,

    // deadline for a single upstream fetch, in milliseconds
    #[clap(long, env, default_value = "10000")]
    pub request_timeout_ms: u64,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            host: "0.0.0.0".to_string(),
            port: 5000,
            cache_ttl_seconds: 300,
            playlist_cache_ttl_seconds: 10,
            request_timeout_ms: 10_000,
            cors_origin: "*".to_string(),
            sentry_dsn: None,
        }
    }
}
