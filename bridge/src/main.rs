fn main() {
    let env = env_logger::Env::default()
        .filter_or("SIPBRIDGE_LOG", "debug")
        .write_style_or("SIPBRIDGE_LOG_STYLE", "always");

    env_logger::init_from_env(env);

    if let Err(err) = bridge::run() {
        log::error!("bridge error: {err}");
    }
}
