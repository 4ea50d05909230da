use std::io;

use tracing::level_filters::LevelFilter;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

pub fn init_logging(directory: &str) {
    let log_file = rolling::never(directory, "rust_t_router.log");

    let collector = tracing_subscriber::registry()
        .with(fmt::Layer::new().with_writer(log_file).with_ansi(false))
        .with(
            fmt::Layer::new()
                .with_writer(io::stdout)
                .with_filter(LevelFilter::INFO),
        );
    tracing::subscriber::set_global_default(collector).expect("Unable to set a global collector");
}
