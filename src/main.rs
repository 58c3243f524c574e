use podtrack::app::App;
use podtrack::cli::parse_args;
use podtrack::config::Config;
use podtrack::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let invocation = match parse_args(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let config = Config::load()?;
    let app = App::new(&config).await?;

    if let Err(e) = app.run(invocation).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
