use apkalign::InspectError;
use apkalign::inspect::Inspector;
use clap::CommandFactory;
use std::process::ExitCode;
use tracing::Level;

mod args;

const EXIT_MISSING_ARCHIVE: u8 = 2;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(arg: &args::Arg) -> eyre::Result<()> {
    let inspector = Inspector::open(&arg.archive, arg.page_size)?;
    let names = if arg.all_native_libs {
        inspector.native_libraries()
    } else {
        arg.entry_names()
    };

    println!("Checking: {}", inspector.path().display());
    println!();
    for report in inspector.inspect_all(&names)? {
        println!("{report}");
        println!();
    }
    Ok(())
}

fn main() -> ExitCode {
    let arg = match args::parse_args() {
        Ok(arg) => arg,
        Err(err) => {
            // Exit 2 is reserved for a missing archive.
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };
    init_tracing(arg.verbose);

    match run(&arg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<InspectError>() {
            Some(missing @ InspectError::MissingArchive(_)) => {
                println!("{missing}");
                println!();
                println!("{}", args::Arg::command().render_usage());
                ExitCode::from(EXIT_MISSING_ARCHIVE)
            }
            _ => {
                eprintln!("Error: {err:?}");
                ExitCode::FAILURE
            }
        },
    }
}
