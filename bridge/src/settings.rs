//! Compile-time configuration loaded via `toml-cfg`.
//!
//! Override any value in a `cfg.toml` under a `[bridge]` table.

#[toml_cfg::toml_config]
pub struct Settings {
    #[default(20)]
    pub tick_interval_ms: u64,
    #[default("udp")]
    pub transport: &'static str,
    #[default(32)]
    pub max_commands_per_tick: usize,
    #[default("")]
    pub engine_log_path: &'static str,
    #[default("alice")]
    pub demo_username: &'static str,
    #[default("secret")]
    pub demo_password: &'static str,
    #[default("example.com")]
    pub demo_domain: &'static str,
    #[default("sip:bob@example.com")]
    pub demo_caller: &'static str,
}
