/// Logging initialization.
///
/// - stderr: `tracing-subscriber::fmt`
/// - file: `<data_dir>/duet.log`, plain text, so logs stay retrievable when
///   stderr is not captured.
///
/// The filter comes from `RUST_LOG` and defaults to `duet_core=debug,info`.
/// Called at the start of `DuetApp` construction; later calls are no-ops.
pub fn init_logging(data_dir: &std::path::Path) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "duet_core=debug,info".into());

    let log_path = data_dir.join("duet.log");
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}
