use clap::Parser;

fn main() {
    let cli = pdstatsctl::Cli::parse();
    pdstatsctl::init_tracing(&cli.log_level);
    if let Err(err) = pdstatsctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
