/// Install a stderr `tracing-subscriber` with an `EnvFilter`.
///
/// `RUST_LOG` overrides the default filter. Safe to call more than once; a
/// driver that already installed its own subscriber keeps it.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sphere_chat_core=debug,info".into()),
        )
        .try_init();
}
